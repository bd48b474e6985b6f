//! 工作区监控器（编排器）
//!
//! 把注册表、追踪器、检测器、分析器与广播 Hub 接成一个整体，
//! 对外暴露公共 API，管理 Created → Starting → Running → Stopping → Stopped
//! 生命周期。检测结果同步返回给调用方，同时异步推给 Hub 订阅者。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use globset::GlobSet;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::MonitorConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::hub::{publish_conflict, Broadcaster, HubServer};
use crate::patterns::PatternStore;
use crate::protocol::HubEvent;
use crate::types::{
    ActivityKind, ConflictAnalysis, DetectorStatistics, SessionToken, WorkspaceStatus,
};
use crate::watcher::{FileWatcher, FsEvent, NotifyFileWatcher};

/// 停止时给在途发送的宽限期
const STOP_GRACE: Duration = Duration::from_millis(200);

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorState::Created => "created",
            MonitorState::Starting => "starting",
            MonitorState::Running => "running",
            MonitorState::Stopping => "stopping",
            MonitorState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// 工作区监控器
pub struct WorkspaceMonitor {
    config: MonitorConfig,
    patterns: Arc<PatternStore>,
    engine: Arc<Mutex<Engine>>,
    broadcaster: Arc<Broadcaster>,
    state: Arc<RwLock<MonitorState>>,
    conflict_tx: broadcast::Sender<ConflictAnalysis>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<Box<dyn FileWatcher>>>,
    /// 实际绑定的端口（配置 0 时为临时端口）
    port: AtomicU16,
}

impl WorkspaceMonitor {
    /// 创建监控器（生产文件监听器）
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_watcher(config, Box::new(NotifyFileWatcher::new()))
    }

    /// 创建监控器并注入自定义监听器（测试用确定性实现）
    pub fn with_watcher(config: MonitorConfig, watcher: Box<dyn FileWatcher>) -> Self {
        let patterns = Arc::new(PatternStore::new());
        let engine = Arc::new(Mutex::new(Engine::new(&config, patterns.clone())));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (conflict_tx, _) = broadcast::channel(64);

        Self {
            config,
            patterns,
            engine,
            broadcaster: Broadcaster::new(),
            state: Arc::new(RwLock::new(MonitorState::Created)),
            conflict_tx,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
            watcher: Mutex::new(Some(watcher)),
            port: AtomicU16::new(0),
        }
    }

    /// 当前生命周期状态
    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    /// 实际监听端口（未启动时为 0）
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    /// 启动监控
    ///
    /// Created/Stopped → Starting → Running。配置校验失败是致命错误，
    /// 状态回退，监控器不会进入 Running。
    pub async fn start_monitoring(&self) -> Result<()> {
        let previous = {
            let mut st = self.state.write();
            match *st {
                MonitorState::Created | MonitorState::Stopped => {
                    let prev = *st;
                    *st = MonitorState::Starting;
                    prev
                }
                s => {
                    return Err(Error::InvalidState(format!(
                        "start_monitoring 不允许在 {} 状态调用",
                        s
                    )))
                }
            }
        };

        match self.start_inner().await {
            Ok(()) => {
                *self.state.write() = MonitorState::Running;
                tracing::info!(
                    "🚀 Workspace monitor running: port={}, threshold={}",
                    self.port(),
                    self.config.conflict_detection.threshold
                );
                Ok(())
            }
            Err(e) => {
                *self.state.write() = previous;
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        self.config.validate()?;
        let ignore = self.config.ignore_set()?;

        // 复位上一轮的停止信号
        let _ = self.shutdown_tx.send(false);

        // 学习状态快照：缺失 → 空表；损坏 → 告警后空表，绝不阻止启动
        if self.config.conflict_detection.learning_enabled {
            let snapshot = self.config.pattern_snapshot_path();
            if let Err(e) = self.patterns.load_snapshot(&snapshot) {
                tracing::warn!("🩹 Pattern snapshot unusable, starting empty: {}", e);
            }
        }

        // 推送通道
        let listener = TcpListener::bind(("127.0.0.1", self.config.websocket.port))
            .await
            .map_err(|e| Error::Transport(format!("绑定端口失败: {}", e)))?;
        let local_port = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("获取本地地址失败: {}", e)))?
            .port();
        self.port.store(local_port, Ordering::Relaxed);

        let server = HubServer::new(
            self.engine.clone(),
            self.broadcaster.clone(),
            self.state.clone(),
            self.conflict_tx.clone(),
            self.config.websocket.max_connections,
            self.shutdown_rx.clone(),
        );
        self.spawn_task(server.run(listener));

        // 文件监听
        if self.config.monitoring.enabled && !self.config.monitoring.watch_paths.is_empty() {
            let (tx, rx) = mpsc::channel::<FsEvent>(256);
            if let Some(watcher) = self.watcher.lock().as_mut() {
                watcher.start(&self.config.monitoring.watch_paths, tx)?;
            }
            self.spawn_task(Self::fs_event_loop(
                rx,
                ignore,
                self.engine.clone(),
                self.broadcaster.clone(),
                self.conflict_tx.clone(),
                self.shutdown_rx.clone(),
            ));
        }

        // 周期性状态快照推送
        {
            let engine = self.engine.clone();
            let broadcaster = self.broadcaster.clone();
            let mut shutdown = self.shutdown_rx.clone();
            let period = Duration::from_secs(self.config.websocket.status_interval_secs.max(1));
            self.spawn_task(async move {
                let mut ticker = interval(period);
                ticker.tick().await; // 第一个 tick 立即返回，跳过
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let status = engine.lock().status();
                            broadcaster.broadcast(HubEvent::Status(status));
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        // 周期性模式快照落盘
        if self.config.conflict_detection.learning_enabled {
            let patterns = self.patterns.clone();
            let snapshot = self.config.pattern_snapshot_path();
            let mut shutdown = self.shutdown_rx.clone();
            let period =
                Duration::from_secs(self.config.conflict_detection.checkpoint_interval_secs.max(1));
            self.spawn_task(async move {
                let mut ticker = interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = patterns.checkpoint(&snapshot) {
                                tracing::warn!("模式快照落盘失败: {}", e);
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        Ok(())
    }

    /// 外部文件变化事件循环
    async fn fs_event_loop(
        mut rx: mpsc::Receiver<FsEvent>,
        ignore: GlobSet,
        engine: Arc<Mutex<Engine>>,
        broadcaster: Arc<Broadcaster>,
        conflict_tx: broadcast::Sender<ConflictAnalysis>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let event = match event {
                        Some(e) => e,
                        None => break,
                    };
                    if ignore.is_match(&event.path) {
                        continue;
                    }
                    tracing::debug!("📝 File change detected: {:?}", event.path);

                    // 带外修改落在争用路径上时复查一次
                    let analysis = engine.lock().rescore_path(&event.path);
                    broadcaster.broadcast(HubEvent::FileChanged {
                        path: event.path.to_string_lossy().to_string(),
                    });
                    if let Some(analysis) = analysis {
                        publish_conflict(&broadcaster, &conflict_tx, analysis);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// 停止监控
    ///
    /// Running → Stopping → Stopped。在途的 `report_file_activity` 允许完成，
    /// Stopping 开始后的新调用快速失败。
    pub async fn stop_monitoring(&self) -> Result<()> {
        {
            let mut st = self.state.write();
            match *st {
                MonitorState::Running => *st = MonitorState::Stopping,
                s => {
                    return Err(Error::InvalidState(format!(
                        "stop_monitoring 不允许在 {} 状态调用",
                        s
                    )))
                }
            }
        }

        let _ = self.shutdown_tx.send(true);

        // 在途发送宽限期，随后关闭全部连接
        tokio::time::sleep(STOP_GRACE).await;
        self.broadcaster.clear();

        if let Some(watcher) = self.watcher.lock().as_mut() {
            watcher.stop();
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if self.config.conflict_detection.learning_enabled {
            let snapshot = self.config.pattern_snapshot_path();
            if let Err(e) = self.patterns.checkpoint(&snapshot) {
                tracing::warn!("停止时模式快照落盘失败: {}", e);
            }
        }

        // 会话生命周期与监控器绑定，停止即销毁
        self.engine.lock().reset_runtime_state();
        self.port.store(0, Ordering::Relaxed);

        *self.state.write() = MonitorState::Stopped;
        tracing::info!("🧹 Workspace monitor stopped");
        Ok(())
    }

    /// 注册开发者会话，返回签发的 token
    pub fn register_developer_session(
        &self,
        developer_id: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> SessionToken {
        self.engine.lock().register_session(developer_id, metadata)
    }

    /// 注销会话并释放其文件占用
    pub fn unregister_session(&self, token: &str) -> Result<()> {
        self.engine.lock().unregister_session(token)
    }

    /// 上报文件活动（主入口，仅 Running 状态可用）
    ///
    /// 同步返回分析结果；告警同时推给进程内订阅者与 Hub 客户端。
    pub fn report_file_activity(
        &self,
        token: &str,
        path: &Path,
        kind: ActivityKind,
    ) -> Result<ConflictAnalysis> {
        {
            let st = self.state.read();
            if *st != MonitorState::Running {
                return Err(Error::InvalidState(format!(
                    "report_file_activity 仅在 running 状态可用（当前 {}）",
                    st
                )));
            }
        }

        let analysis = self.engine.lock().process_activity(token, path, kind)?;
        if analysis.has_conflict {
            publish_conflict(&self.broadcaster, &self.conflict_tx, analysis.clone());
        }
        Ok(analysis)
    }

    /// 工作区状态快照（任何状态可用）
    pub fn get_workspace_status(&self) -> WorkspaceStatus {
        self.engine.lock().status()
    }

    /// 检测统计
    pub fn get_statistics(&self) -> DetectorStatistics {
        self.engine.lock().statistics()
    }

    /// 成功结果反馈：告警后协作顺利完成
    pub fn learn_from_success(
        &self,
        path: &Path,
        developer_ids: &[String],
        collaboration_type: &str,
        details: Option<&str>,
    ) {
        self.engine
            .lock()
            .record_outcome(path, developer_ids, collaboration_type, true, details);
    }

    /// 失败结果反馈：真实冲突被确认
    pub fn learn_from_failure(
        &self,
        path: &Path,
        developer_ids: &[String],
        collaboration_type: &str,
        details: Option<&str>,
    ) {
        self.engine
            .lock()
            .record_outcome(path, developer_ids, collaboration_type, false, details);
    }

    /// 订阅进程内冲突告警通道
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<ConflictAnalysis> {
        self.conflict_tx.subscribe()
    }

    fn spawn_task(&self, fut: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.lock().push(tokio::spawn(fut));
    }
}
