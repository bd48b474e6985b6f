//! 推送协议定义
//!
//! 通信方式：WebSocket 文本帧，每帧一个 JSON 对象。
//! 未知消息类型静默忽略（向前兼容），不是协议错误。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{ActivityKind, ConflictAnalysis, SessionToken, WorkspaceStatus};

/// 客户端 → 服务端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// 订阅事件类别
    Subscribe { events: Vec<EventKind> },

    /// 取消订阅
    Unsubscribe { events: Vec<EventKind> },

    /// 上报本地活动（经由推送通道转发进检测引擎）
    Activity {
        token: SessionToken,
        path: PathBuf,
        kind: ActivityKind,
    },

    /// 心跳（保持连接）
    Heartbeat,

    /// 未知类型（向前兼容，收到后忽略）
    #[serde(other)]
    Unknown,
}

/// 服务端 → 客户端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// 请求成功
    Ok,

    /// 请求错误（只影响当前连接）
    Error { code: i32, message: String },

    /// 连接建立后的欢迎消息
    Welcome { server_version: String },

    /// 冲突告警
    #[serde(rename = "conflict:detected")]
    ConflictDetected { analysis: ConflictAnalysis },

    /// 周期性状态快照
    Status { status: WorkspaceStatus },

    /// 外部文件变化通知
    #[serde(rename = "file:changed")]
    FileChanged { path: String },
}

/// 事件类别（用于订阅过滤）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Conflict,
    Status,
    File,
}

impl EventKind {
    /// 新连接默认订阅全部类别，Subscribe/Unsubscribe 在此基础上收窄
    pub fn all() -> Vec<EventKind> {
        vec![EventKind::Conflict, EventKind::Status, EventKind::File]
    }
}

/// 广播事件（内部使用）
#[derive(Debug, Clone)]
pub enum HubEvent {
    ConflictDetected(ConflictAnalysis),
    Status(WorkspaceStatus),
    FileChanged { path: String },
}

impl HubEvent {
    /// 获取事件类别
    pub fn kind(&self) -> EventKind {
        match self {
            HubEvent::ConflictDetected(_) => EventKind::Conflict,
            HubEvent::Status(_) => EventKind::Status,
            HubEvent::FileChanged { .. } => EventKind::File,
        }
    }

    /// 转换为推送消息
    pub fn to_message(&self) -> ServerMessage {
        match self {
            HubEvent::ConflictDetected(analysis) => ServerMessage::ConflictDetected {
                analysis: analysis.clone(),
            },
            HubEvent::Status(status) => ServerMessage::Status {
                status: status.clone(),
            },
            HubEvent::FileChanged { path } => ServerMessage::FileChanged { path: path.clone() },
        }
    }
}
