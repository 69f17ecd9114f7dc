//! 应用层数据传输对象
//!
//! 对外（HTTP / WebSocket）暴露的扁平结构，与领域实体解耦。

use domain::{Conversation, FriendRequest, Message, RequestStatus, Timestamp, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息的对外表示，附带发送者用户名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub text: String,
    pub read: bool,
    pub created_at: Timestamp,
}

impl MessageDto {
    pub fn from_message(message: &Message, sender_username: &str) -> Self {
        Self {
            id: message.id.into(),
            conversation_id: message.conversation_id.into(),
            sender_id: message.sender.into(),
            sender_username: sender_username.to_string(),
            text: message.text.as_str().to_string(),
            read: message.read,
            created_at: message.created_at,
        }
    }
}

/// 会话列表项里的对端成员。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDto {
    pub id: Uuid,
    pub username: String,
}

/// 会话列表排序用的最近一条消息摘要。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessageDto {
    pub text: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummaryDto {
    pub id: Uuid,
    pub peer: PeerDto,
    pub last_message: Option<LastMessageDto>,
    pub updated_at: Timestamp,
}

impl ConversationSummaryDto {
    /// 列表排序键：最近消息时间，没有消息时退回会话更新时间。
    pub fn activity_at(&self) -> Timestamp {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.updated_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestDto {
    pub id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub status: RequestStatus,
    pub created_at: Timestamp,
}

impl From<&FriendRequest> for FriendRequestDto {
    fn from(request: &FriendRequest) -> Self {
        Self {
            id: request.id.into(),
            from_id: request.from.into(),
            to_id: request.to.into(),
            status: request.status,
            created_at: request.created_at,
        }
    }
}

/// 接受请求的结果：更新后的请求加上新建（或复用）的会话。
#[derive(Debug, Clone, Serialize)]
pub struct FriendshipAccepted {
    pub request: FriendRequestDto,
    pub conversation_id: Uuid,
}

/// 收到的待处理请求，带发起者用户名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingRequestDto {
    pub request_id: Uuid,
    pub from_id: Uuid,
    pub from_username: String,
    pub created_at: Timestamp,
}

/// 当前用户与另一用户的关系分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Friends,
    RequestSent,
    RequestReceived,
    NotFriends,
}

/// 关系总览里的一行：用户加上与调用者的关系。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRelationDto {
    pub id: Uuid,
    pub username: String,
    pub status: RelationshipStatus,
    /// 仅在 `request_sent` / `request_received` 时携带。
    pub request_id: Option<Uuid>,
}

impl UserRelationDto {
    pub fn new(user: &User, status: RelationshipStatus, request_id: Option<Uuid>) -> Self {
        Self {
            id: user.id.into(),
            username: user.username.as_str().to_string(),
            status,
            request_id,
        }
    }
}

/// 未读通知：每个会话的发送者聚合为一行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDto {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub count: u64,
    pub latest_message_text: String,
    pub latest_timestamp: Timestamp,
}

/// 把会话实体转成摘要所需的最小拼装（对端信息由服务层补全）。
pub fn summary_of(
    conversation: &Conversation,
    peer: PeerDto,
    last_message: Option<LastMessageDto>,
) -> ConversationSummaryDto {
    ConversationSummaryDto {
        id: conversation.id.into(),
        peer,
        last_message,
        updated_at: conversation.updated_at,
    }
}
