//! 实时广播 Hub - 连接管理 + 事件推送
//!
//! 维护 WebSocket 客户端连接，把冲突告警与状态快照推给订阅者：
//! - 每连接独立通道，慢客户端不阻塞其他连接
//! - 断开的连接在广播时被检测并移出
//! - hub 停止时给在途发送一个有界宽限期，随后关闭全部连接

mod broadcaster;
mod server;

pub use broadcaster::{Broadcaster, ConnId, MessageSender};
pub use server::HubServer;

use tokio::sync::broadcast;

use crate::protocol::HubEvent;
use crate::types::ConflictAnalysis;

/// 把一条冲突告警同时交给进程内订阅者与推送通道
pub(crate) fn publish_conflict(
    broadcaster: &Broadcaster,
    conflict_tx: &broadcast::Sender<ConflictAnalysis>,
    analysis: ConflictAnalysis,
) {
    // 没有进程内订阅者时 send 返回 Err，忽略即可
    let _ = conflict_tx.send(analysis.clone());
    broadcaster.broadcast(HubEvent::ConflictDetected(analysis));
}
