//! workspace-conflict-monitor - 工作区编辑冲突实时检测
//!
//! 监控同一共享工作区内多个开发者的文件活动，在并发编辑造成
//! 合并冲突之前发出告警。
//!
//! # 核心功能
//!
//! - **会话注册表**: 开发者会话的 token 签发与解析
//! - **活动追踪**: 按文件路径维护并发访问窗口（惰性过期）
//! - **冲突检测**: 并发度 + 活动类型 + 时近度评分，历史模式在线学习
//! - **协作建议**: 按置信度排序的处置建议目录
//! - **实时推送**: WebSocket Hub，按事件类别订阅过滤
//!
//! # 架构
//!
//! 所有可变状态集中在检测引擎（单把锁，单写者纪律），编排器
//! [`WorkspaceMonitor`] 管理生命周期并接入文件监听与推送通道。
//! 同步 API 直接返回分析结果，告警同时推给 Hub 订阅者。

pub mod activity;
pub mod analyzer;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod hub;
pub mod monitor;
pub mod patterns;
pub mod protocol;
pub mod session;
pub mod types;
pub mod watcher;

// Re-exports
pub use config::{
    CollaborationConfig, ConflictDetectionConfig, MonitorConfig, MonitoringConfig, WebsocketConfig,
};
pub use error::{Error, Result};
pub use hub::{Broadcaster, ConnId, HubServer};
pub use monitor::{MonitorState, WorkspaceMonitor};
pub use patterns::{collaboration_shape, pattern_key, LearnedPattern, PatternStore};
pub use protocol::{ClientMessage, EventKind, HubEvent, ServerMessage};
pub use types::{
    ActivityKind, ConflictAnalysis, DetectorStatistics, DeveloperSession, FileActivityEvent,
    Priority, SessionSnapshot, SessionToken, Suggestion, SuggestionType, WorkspaceStatus,
};
pub use watcher::{
    FileWatcher, FsChangeKind, FsEvent, ManualFileWatcher, ManualWatcherHandle, NotifyFileWatcher,
};
