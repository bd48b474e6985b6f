//! 错误类型定义

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误（启动阶段致命，监控器不会进入 Running）
    #[error("配置错误: {0}")]
    Config(String),

    /// 会话不存在（token 无效或已注销）
    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    /// 生命周期状态错误（API 在非法状态下被调用）
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// 推送通道传输错误（仅影响单个连接）
    #[error("传输错误: {0}")]
    Transport(String),

    /// 学习状态快照损坏（回退到空表，非致命）
    #[error("学习状态损坏: {0}")]
    LearningStateCorrupt(String),

    /// 文件监听错误
    #[error("监听错误: {0}")]
    Watch(#[from] notify::Error),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;
