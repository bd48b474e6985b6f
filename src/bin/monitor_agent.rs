//! monitor-agent - 工作区冲突监控 Agent
//!
//! 负责：
//! - 检测引擎（唯一写入者）
//! - 文件监听
//! - 冲突告警推送
//! - 接收客户端活动上报

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workspace_conflict_monitor::{MonitorConfig, WorkspaceMonitor};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("workspace_conflict_monitor=debug".parse()?),
        )
        .init();

    tracing::info!("🚀 monitor-agent v{}", env!("CARGO_PKG_VERSION"));

    // 解析配置：第一个参数为配置文件路径，缺省用默认配置
    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::from_file(&path)?,
        None => MonitorConfig::default(),
    };

    let monitor = WorkspaceMonitor::new(config);
    monitor.start_monitoring().await?;
    tracing::info!("📡 Push channel listening on port {}", monitor.port());

    // Ctrl+C 触发优雅停止
    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown signal received");
    monitor.stop_monitoring().await?;

    tracing::info!("👋 monitor-agent exiting");
    Ok(())
}
