//! 私聊系统核心领域模型
//!
//! 包含好友请求、会话、消息等核心实体，以及相关的状态机和不变量。

pub mod conversation;
pub mod errors;
pub mod friend_request;
pub mod message;
pub mod repository;
pub mod user;
pub mod value_objects;

pub use conversation::Conversation;
pub use errors::{DomainError, DomainResult};
pub use friend_request::{FriendRequest, RequestStatus};
pub use message::Message;
pub use repository::{RepositoryError, RepositoryResult};
pub use user::User;
pub use value_objects::{
    ConversationId, MessageId, MessageText, RequestId, Timestamp, UserId, Username,
};
