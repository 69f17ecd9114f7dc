//! 基础设施层实现。
//!
//! PostgreSQL 仓储实现和 WebSocket 房间注册表。

pub mod repository;
pub mod rooms;

pub use repository::{
    create_pg_pool, PgConversationRepository, PgFriendRequestRepository, PgMessageRepository,
    PgStorage, PgUserRepository,
};
pub use rooms::{ConnectionId, RegistryError, RoomRegistry};
