//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：好友关系状态机、会话注册、
//! 消息日志与未读通知聚合，以及对存储和时钟等外部适配器的抽象。

pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod memory;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use dto::{
    ConversationSummaryDto, FriendRequestDto, FriendshipAccepted, IncomingRequestDto,
    LastMessageDto, MessageDto, NotificationDto, PeerDto, RelationshipStatus, UserRelationDto,
};
pub use error::{ApplicationError, ApplicationResult};
pub use events::{ClientEvent, ServerEvent};
pub use repository::{
    ConversationRepository, FriendRequestRepository, MessageRepository, UserRepository,
};
pub use services::{
    ConversationService, ConversationServiceDependencies, FriendService,
    FriendServiceDependencies, MessageService, MessageServiceDependencies, NotificationService,
    NotificationServiceDependencies,
};
