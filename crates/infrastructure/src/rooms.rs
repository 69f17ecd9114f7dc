//! WebSocket 房间注册表
//!
//! 每个 WebSocket 连接注册一个出站通道，按会话 id 组成房间。
//! 房间成员资格是投递条件：没有 join 的连接收不到该会话的广播。
//! 连接断开后整体清除，旧的连接 id 不能再加入任何房间。

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use application::ServerEvent;
use domain::ConversationId;

/// 连接标识，升级握手时分配。
pub type ConnectionId = Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// 连接未注册或已被清除
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

#[derive(Default)]
struct RegistryState {
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<ConversationId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<ConversationId>>,
}

/// 进程内房间注册表。单写多读，所有操作持锁时间都很短。
#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<RegistryState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新连接及其出站通道。
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut state = self.state.write().await;
        state.senders.insert(connection_id, sender);
        state.joined.entry(connection_id).or_default();
        tracing::debug!(connection_id = %connection_id, "连接已注册");
    }

    /// 加入房间。重复加入是无操作；已清除的连接拒绝加入。
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        if !state.senders.contains_key(&connection_id) {
            return Err(RegistryError::UnknownConnection(connection_id));
        }
        state
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(connection_id);
        state
            .joined
            .entry(connection_id)
            .or_default()
            .insert(conversation_id);
        Ok(())
    }

    /// 离开房间。对未加入的房间是无操作。
    pub async fn leave(&self, connection_id: ConnectionId, conversation_id: ConversationId) {
        let mut state = self.state.write().await;
        if let Some(members) = state.rooms.get_mut(&conversation_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                state.rooms.remove(&conversation_id);
            }
        }
        if let Some(rooms) = state.joined.get_mut(&connection_id) {
            rooms.remove(&conversation_id);
        }
    }

    pub async fn is_joined(
        &self,
        connection_id: ConnectionId,
        conversation_id: ConversationId,
    ) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(&conversation_id)
            .map(|members| members.contains(&connection_id))
            .unwrap_or(false)
    }

    /// 向单个连接投递事件。通道已关闭时静默丢弃。
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        let state = self.state.read().await;
        if let Some(sender) = state.senders.get(&connection_id) {
            let _ = sender.send(event);
        }
    }

    /// 向房间内所有连接广播，可排除一个连接（打字提示不回显给发起者）。
    pub async fn broadcast_to_room(
        &self,
        conversation_id: ConversationId,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(&conversation_id) else {
            return;
        };
        for connection_id in members {
            if Some(*connection_id) == exclude {
                continue;
            }
            if let Some(sender) = state.senders.get(connection_id) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// 断开清理：移除通道和全部房间成员资格。
    pub async fn purge_connection(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        state.senders.remove(&connection_id);
        if let Some(rooms) = state.joined.remove(&connection_id) {
            for conversation_id in rooms {
                if let Some(members) = state.rooms.get_mut(&conversation_id) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        state.rooms.remove(&conversation_id);
                    }
                }
            }
        }
        tracing::debug!(connection_id = %connection_id, "连接已清除");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> ConversationId {
        ConversationId::from(Uuid::new_v4())
    }

    async fn connect(registry: &RoomRegistry) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_only_joined_connections() {
        let registry = RoomRegistry::new();
        let room = conversation();
        let (joined, mut joined_rx) = connect(&registry).await;
        let (outsider, mut outsider_rx) = connect(&registry).await;

        registry.join(joined, room).await.unwrap();
        registry
            .broadcast_to_room(room, &ServerEvent::UserStopTyping {}, None)
            .await;

        assert!(joined_rx.try_recv().is_ok());
        assert!(outsider_rx.try_recv().is_err());
        let _ = outsider;
    }

    #[tokio::test]
    async fn exclude_skips_the_originator() {
        let registry = RoomRegistry::new();
        let room = conversation();
        let (a, mut a_rx) = connect(&registry).await;
        let (b, mut b_rx) = connect(&registry).await;
        registry.join(a, room).await.unwrap();
        registry.join(b, room).await.unwrap();

        registry
            .broadcast_to_room(
                room,
                &ServerEvent::UserTyping {
                    username: "alice".into(),
                },
                Some(a),
            )
            .await;

        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn purged_connection_cannot_rejoin() {
        let registry = RoomRegistry::new();
        let room = conversation();
        let (id, mut rx) = connect(&registry).await;
        registry.join(id, room).await.unwrap();

        registry.purge_connection(id).await;
        assert!(!registry.is_joined(id, room).await);
        assert!(matches!(
            registry.join(id, room).await,
            Err(RegistryError::UnknownConnection(_))
        ));

        registry
            .broadcast_to_room(room, &ServerEvent::UserStopTyping {}, None)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = conversation();
        let (id, mut rx) = connect(&registry).await;
        registry.join(id, room).await.unwrap();

        registry.leave(id, room).await;
        registry.leave(id, room).await;
        assert!(!registry.is_joined(id, room).await);

        registry
            .broadcast_to_room(room, &ServerEvent::UserStopTyping {}, None)
            .await;
        assert!(rx.try_recv().is_err());
    }
}
