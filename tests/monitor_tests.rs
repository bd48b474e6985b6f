//! 监控器集成测试

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;
use workspace_conflict_monitor::{
    ActivityKind, Error, FsChangeKind, ManualFileWatcher, MonitorConfig, MonitorState,
    WorkspaceMonitor,
};

/// 创建测试配置（临时端口 + 临时数据目录）
fn test_config() -> MonitorConfig {
    let temp_dir = tempdir().unwrap();
    let mut config = MonitorConfig::default();
    config.websocket.port = 0;
    config.data_dir = temp_dir.into_path();
    config.monitoring.watch_paths = Vec::new();
    config
}

#[tokio::test]
async fn test_two_editors_trigger_conflict() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let alice = monitor.register_developer_session("alice", HashMap::new());
    let bob = monitor.register_developer_session("bob", HashMap::new());
    let path = Path::new("/ws/src/UserProfile.jsx");

    // 第一个编辑者：无冲突
    let a1 = monitor
        .report_file_activity(&alice, path, ActivityKind::Edit)
        .unwrap();
    assert!(!a1.has_conflict);
    assert!(a1.concurrent_developers.is_empty());

    // 第二个编辑者：触发告警，附带建议
    let a2 = monitor
        .report_file_activity(&bob, path, ActivityKind::Edit)
        .unwrap();
    assert!(a2.has_conflict);
    assert!(a2.probability >= 0.7);
    assert!(a2.preventable);
    assert!(!a2.suggestions.is_empty());
    assert_eq!(a2.concurrent_developers.len(), 1);
    assert_eq!(a2.concurrent_developers[0].developer_id, "alice");

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_detection_latency_stays_low() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let token = monitor.register_developer_session("dev", HashMap::new());
    for i in 0..10 {
        let path = format!("/ws/src/file_{}.rs", i);
        monitor
            .report_file_activity(&token, Path::new(&path), ActivityKind::Edit)
            .unwrap();
    }

    let status = monitor.get_workspace_status();
    assert_eq!(status.total_analyses, 10);
    assert!(status.average_detection_ms < 200.0);

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_status_idempotent_without_intervening_activity() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let alice = monitor.register_developer_session("alice", HashMap::new());
    let bob = monitor.register_developer_session("bob", HashMap::new());
    let path = Path::new("/ws/src/shared.rs");
    monitor
        .report_file_activity(&alice, path, ActivityKind::Edit)
        .unwrap();
    monitor
        .report_file_activity(&bob, path, ActivityKind::Edit)
        .unwrap();

    // 两次连续查询之间没有任何活动，所有指标应逐项相等
    let first = monitor.get_workspace_status();
    let second = monitor.get_workspace_status();
    assert_eq!(first, second);
    assert_eq!(first.active_sessions, 2);
    assert_eq!(first.monitored_files, 1);

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_report_after_stop_fails_fast() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let token = monitor.register_developer_session("alice", HashMap::new());
    monitor.stop_monitoring().await.unwrap();
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let err = monitor
        .report_file_activity(&token, Path::new("/a.rs"), ActivityKind::Edit)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    // 重复停止同样快速失败
    let err = monitor.stop_monitoring().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_invalid_config_prevents_startup() {
    let mut config = test_config();
    config.conflict_detection.threshold = 1.5;

    let monitor = WorkspaceMonitor::new(config);
    let err = monitor.start_monitoring().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    // 启动失败后状态回退，绝不进入 Running
    assert_eq!(monitor.state(), MonitorState::Created);
}

#[tokio::test]
async fn test_restart_resets_runtime_state() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    monitor.register_developer_session("alice", HashMap::new());
    assert_eq!(monitor.get_workspace_status().active_sessions, 1);

    monitor.stop_monitoring().await.unwrap();
    // 会话生命周期与监控器绑定，停止即销毁
    assert_eq!(monitor.get_workspace_status().active_sessions, 0);

    monitor.start_monitoring().await.unwrap();
    assert_eq!(monitor.state(), MonitorState::Running);
    assert_eq!(monitor.get_workspace_status().active_sessions, 0);
    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_unknown_token_rejected() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let err = monitor
        .report_file_activity("bogus-token", Path::new("/a.rs"), ActivityKind::Edit)
        .unwrap_err();
    assert!(matches!(err, Error::SessionNotFound(_)));

    let err = monitor.unregister_session("bogus-token").unwrap_err();
    assert!(matches!(err, Error::SessionNotFound(_)));

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_conflict_subscription_delivers_alerts() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();
    let mut conflicts = monitor.subscribe_conflicts();

    let alice = monitor.register_developer_session("alice", HashMap::new());
    let bob = monitor.register_developer_session("bob", HashMap::new());
    let path = Path::new("/ws/src/shared.rs");

    monitor
        .report_file_activity(&alice, path, ActivityKind::Edit)
        .unwrap();
    monitor
        .report_file_activity(&bob, path, ActivityKind::Edit)
        .unwrap();

    let analysis = timeout(Duration::from_secs(1), conflicts.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(analysis.has_conflict);
    assert_eq!(analysis.path, "/ws/src/shared.rs");

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_external_change_rescores_contended_path() {
    let mut config = test_config();
    // 需要非空监听目录才会启动文件事件循环
    config.monitoring.watch_paths = vec!["/ws".into()];

    let watcher = ManualFileWatcher::new();
    let handle = watcher.handle();
    let monitor = WorkspaceMonitor::with_watcher(config, Box::new(watcher));
    monitor.start_monitoring().await.unwrap();
    let mut conflicts = monitor.subscribe_conflicts();

    let alice = monitor.register_developer_session("alice", HashMap::new());
    let bob = monitor.register_developer_session("bob", HashMap::new());
    let path = Path::new("/ws/src/shared.rs");

    monitor
        .report_file_activity(&alice, path, ActivityKind::Edit)
        .unwrap();
    monitor
        .report_file_activity(&bob, path, ActivityKind::Edit)
        .unwrap();
    // 上报阶段的告警
    timeout(Duration::from_secs(1), conflicts.recv())
        .await
        .unwrap()
        .unwrap();

    // 带外文件变化落在争用路径上，触发复查并再次告警
    assert!(handle.emit(path, FsChangeKind::Modified));
    let analysis = timeout(Duration::from_secs(1), conflicts.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(analysis.has_conflict);
    assert_eq!(analysis.concurrent_developers.len(), 2);

    monitor.stop_monitoring().await.unwrap();
}

#[tokio::test]
async fn test_outcome_feedback_reaches_statistics() {
    let monitor = WorkspaceMonitor::new(test_config());
    monitor.start_monitoring().await.unwrap();

    let alice = monitor.register_developer_session("alice", HashMap::new());
    let bob = monitor.register_developer_session("bob", HashMap::new());
    let path = Path::new("/ws/src/App.jsx");

    monitor
        .report_file_activity(&alice, path, ActivityKind::Edit)
        .unwrap();
    let analysis = monitor
        .report_file_activity(&bob, path, ActivityKind::Edit)
        .unwrap();
    assert!(analysis.has_conflict);

    let devs = vec!["alice".to_string(), "bob".to_string()];
    monitor.learn_from_success(path, &devs, "pair", Some("coordinated via chat"));

    let stats = monitor.get_statistics();
    assert_eq!(stats.accuracy, 1.0);
    assert_eq!(stats.pattern_count, 1);
    assert_eq!(monitor.get_workspace_status().conflicts_prevented, 1);

    monitor.stop_monitoring().await.unwrap();
}
