//! 事件广播器
//!
//! 维护连接与订阅表，把冲突告警和状态快照推送给客户端。
//! 慢连接不阻塞其他连接（每连接独立通道，fire-and-forget）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::{EventKind, HubEvent};

/// 连接 ID
pub type ConnId = u64;

/// 消息发送通道（已序列化的 JSON 文本）
pub type MessageSender = mpsc::Sender<String>;

/// 事件广播器
pub struct Broadcaster {
    /// 订阅关系：ConnId → 订阅的事件类别
    subscriptions: RwLock<HashMap<ConnId, HashSet<EventKind>>>,
    /// 连接通道：ConnId → 发送通道
    senders: RwLock<HashMap<ConnId, MessageSender>>,
    /// 下一个连接 ID
    next_conn_id: RwLock<ConnId>,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册新连接，返回连接 ID
    ///
    /// 新连接默认订阅全部事件类别。
    pub fn register(&self, sender: MessageSender) -> ConnId {
        let mut next_id = self.next_conn_id.write();
        let conn_id = *next_id;
        *next_id += 1;

        self.senders.write().insert(conn_id, sender);
        self.subscriptions
            .write()
            .insert(conn_id, EventKind::all().into_iter().collect());

        tracing::debug!("📡 Connection registered: conn_id={}", conn_id);
        conn_id
    }

    /// 注销连接
    pub fn unregister(&self, conn_id: ConnId) {
        self.senders.write().remove(&conn_id);
        self.subscriptions.write().remove(&conn_id);
        tracing::debug!("📡 Connection unregistered: conn_id={}", conn_id);
    }

    /// 订阅事件类别
    pub fn subscribe(&self, conn_id: ConnId, events: Vec<EventKind>) {
        if let Some(sub) = self.subscriptions.write().get_mut(&conn_id) {
            for event in &events {
                sub.insert(*event);
            }
            tracing::debug!("📡 Subscribed: conn_id={}, events={:?}", conn_id, events);
        }
    }

    /// 取消订阅
    pub fn unsubscribe(&self, conn_id: ConnId, events: Vec<EventKind>) {
        if let Some(sub) = self.subscriptions.write().get_mut(&conn_id) {
            for event in &events {
                sub.remove(event);
            }
            tracing::debug!("📡 Unsubscribed: conn_id={}, events={:?}", conn_id, events);
        }
    }

    /// 广播事件给所有订阅者（非阻塞，fire-and-forget）
    ///
    /// 通道已关闭的连接在此被检测并移出连接表。
    pub fn broadcast(&self, event: HubEvent) {
        let kind = event.kind();

        let message = match serde_json::to_string(&event.to_message()) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let targets: Vec<(ConnId, MessageSender)> = {
            let subs = self.subscriptions.read();
            let senders = self.senders.read();

            subs.iter()
                .filter(|(_, subscribed)| subscribed.contains(&kind))
                .filter_map(|(conn_id, _)| senders.get(conn_id).map(|s| (*conn_id, s.clone())))
                .collect()
        };

        if targets.is_empty() {
            tracing::trace!("📡 No subscribers: kind={:?}", kind);
            return;
        }

        tracing::debug!(
            "📡 Broadcasting: kind={:?}, subscribers={}",
            kind,
            targets.len()
        );

        let mut dead: Vec<ConnId> = Vec::new();
        for (conn_id, sender) in targets {
            let msg = message.clone();
            if let Err(e) = sender.try_send(msg) {
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        tracing::warn!("📡 Channel full, dropping message: conn_id={}", conn_id);
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        tracing::debug!("📡 Channel closed: conn_id={}", conn_id);
                        dead.push(conn_id);
                    }
                }
            }
        }

        for conn_id in dead {
            self.unregister(conn_id);
        }
    }

    /// 当前连接数
    pub fn connection_count(&self) -> usize {
        self.senders.read().len()
    }

    /// 是否有活跃连接
    pub fn has_connections(&self) -> bool {
        !self.senders.read().is_empty()
    }

    /// 发送消息到指定连接
    pub async fn send_to(&self, conn_id: ConnId, message: String) -> bool {
        let sender = {
            let senders = self.senders.read();
            senders.get(&conn_id).cloned()
        };

        if let Some(sender) = sender {
            sender.send(message).await.is_ok()
        } else {
            false
        }
    }

    /// 尝试发送消息到指定连接（非阻塞）
    pub fn try_send_to(&self, conn_id: ConnId, message: String) -> bool {
        let sender = {
            let senders = self.senders.read();
            senders.get(&conn_id).cloned()
        };

        if let Some(sender) = sender {
            sender.try_send(message).is_ok()
        } else {
            false
        }
    }

    /// 关闭所有连接（hub 停止时调用，发送通道被丢弃后写端任务随之退出）
    pub fn clear(&self) {
        let count = self.connection_count();
        self.senders.write().clear();
        self.subscriptions.write().clear();
        if count > 0 {
            tracing::info!("📡 All connections closed: count={}", count);
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            senders: RwLock::new(HashMap::new()),
            next_conn_id: RwLock::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkspaceStatus;

    fn status_event() -> HubEvent {
        HubEvent::Status(WorkspaceStatus {
            active_sessions: 1,
            monitored_files: 0,
            conflicts_detected: 0,
            conflicts_prevented: 0,
            average_detection_ms: 0.0,
            total_analyses: 0,
        })
    }

    #[test]
    fn test_default_subscription_receives_all_kinds() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(10);
        broadcaster.register(tx);

        broadcaster.broadcast(status_event());
        broadcaster.broadcast(HubEvent::FileChanged {
            path: "/a.rs".to_string(),
        });

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unsubscribe_filters_events() {
        let broadcaster = Broadcaster::new();
        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);

        let conn1 = broadcaster.register(tx1);
        let _conn2 = broadcaster.register(tx2);

        // conn1 退订 status
        broadcaster.unsubscribe(conn1, vec![EventKind::Status]);
        broadcaster.broadcast(status_event());

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_connection_count() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.connection_count(), 0);

        let (tx1, _rx1) = mpsc::channel(10);
        let conn1 = broadcaster.register(tx1);
        assert_eq!(broadcaster.connection_count(), 1);

        let (tx2, _rx2) = mpsc::channel(10);
        let _conn2 = broadcaster.register(tx2);
        assert_eq!(broadcaster.connection_count(), 2);

        broadcaster.unregister(conn1);
        assert_eq!(broadcaster.connection_count(), 1);
    }

    #[test]
    fn test_closed_channel_detected_and_removed() {
        let broadcaster = Broadcaster::new();
        let (tx, rx) = mpsc::channel(10);
        broadcaster.register(tx);
        drop(rx); // 客户端断开

        broadcaster.broadcast(status_event());
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[test]
    fn test_clear_closes_everything() {
        let broadcaster = Broadcaster::new();
        let (tx1, _rx1) = mpsc::channel(10);
        let (tx2, _rx2) = mpsc::channel(10);
        broadcaster.register(tx1);
        broadcaster.register(tx2);

        broadcaster.clear();
        assert!(!broadcaster.has_connections());
    }
}
