//! Hub 服务器
//!
//! WebSocket 服务，处理客户端连接、订阅与活动转发

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use super::{publish_conflict, Broadcaster, ConnId};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::monitor::MonitorState;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::types::ConflictAnalysis;

/// 服务器版本号（跟随 crate 版本）
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 连接关闭时写端排空在途消息的时间上限
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Hub 服务器
pub struct HubServer {
    engine: Arc<Mutex<Engine>>,
    broadcaster: Arc<Broadcaster>,
    state: Arc<RwLock<MonitorState>>,
    conflict_tx: broadcast::Sender<ConflictAnalysis>,
    max_connections: usize,
    shutdown: watch::Receiver<bool>,
}

impl HubServer {
    pub fn new(
        engine: Arc<Mutex<Engine>>,
        broadcaster: Arc<Broadcaster>,
        state: Arc<RwLock<MonitorState>>,
        conflict_tx: broadcast::Sender<ConflictAnalysis>,
        max_connections: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            broadcaster,
            state,
            conflict_tx,
            max_connections,
            shutdown,
        })
    }

    /// 接受连接直到收到停止信号
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.broadcaster.connection_count() >= self.max_connections {
                                tracing::warn!(
                                    "🚧 Connection limit reached ({}), rejecting {}",
                                    self.max_connections,
                                    addr
                                );
                                drop(stream);
                                continue;
                            }
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    tracing::debug!("连接处理结束: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("接受连接失败: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("🛑 Hub server shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// 处理单个连接
    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::Transport(format!("WebSocket 握手失败: {}", e)))?;
        let (mut sink, mut ws_rx) = ws.split();

        // 每连接独立发送通道
        let (tx, mut rx) = mpsc::channel::<String>(100);
        let conn_id = self.broadcaster.register(tx);
        tracing::debug!("📥 新连接: conn_id={}", conn_id);

        // 写端任务：通道 → WebSocket 文本帧
        let mut write_handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        let welcome = serde_json::to_string(&ServerMessage::Welcome {
            server_version: SERVER_VERSION.to_string(),
        })?;
        self.broadcaster.send_to(conn_id, welcome).await;

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(response) = self.handle_text(conn_id, text.as_str()) {
                                let json = serde_json::to_string(&response)?;
                                if !self.broadcaster.send_to(conn_id, json).await {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {
                            // ping/pong/binary 忽略
                        }
                        Some(Err(e)) => {
                            tracing::debug!("读取失败: conn_id={}, {}", conn_id, e);
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // 注销后通道发送端全部释放，写端排空队列里的在途消息后
        // 自然退出（发送 Close 收尾）；排空超时才强制中止
        self.broadcaster.unregister(conn_id);
        if tokio::time::timeout(WRITE_DRAIN_TIMEOUT, &mut write_handle)
            .await
            .is_err()
        {
            write_handle.abort();
        }
        tracing::debug!("📤 连接关闭: conn_id={}", conn_id);

        Ok(())
    }

    /// 解析并处理一条客户端消息，返回要回复的响应（None = 不回复）
    fn handle_text(&self, conn_id: ConnId, text: &str) -> Option<ServerMessage> {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("解析消息失败: conn_id={}, {}", conn_id, e);
                return Some(ServerMessage::Error {
                    code: 400,
                    message: format!("Invalid JSON: {}", e),
                });
            }
        };

        match message {
            ClientMessage::Subscribe { events } => {
                self.broadcaster.subscribe(conn_id, events);
                Some(ServerMessage::Ok)
            }

            ClientMessage::Unsubscribe { events } => {
                self.broadcaster.unsubscribe(conn_id, events);
                Some(ServerMessage::Ok)
            }

            ClientMessage::Heartbeat => Some(ServerMessage::Ok),

            ClientMessage::Activity { token, path, kind } => {
                if *self.state.read() != MonitorState::Running {
                    return Some(ServerMessage::Error {
                        code: 409,
                        message: "monitor is not running".to_string(),
                    });
                }

                let result = self.engine.lock().process_activity(&token, &path, kind);
                match result {
                    Ok(analysis) => {
                        if analysis.has_conflict {
                            publish_conflict(&self.broadcaster, &self.conflict_tx, analysis);
                        }
                        Some(ServerMessage::Ok)
                    }
                    Err(Error::SessionNotFound(t)) => Some(ServerMessage::Error {
                        code: 404,
                        message: format!("session not found: {}", t),
                    }),
                    Err(e) => Some(ServerMessage::Error {
                        code: 500,
                        message: e.to_string(),
                    }),
                }
            }

            // 未知类型静默忽略（向前兼容）
            ClientMessage::Unknown => None,
        }
    }
}
