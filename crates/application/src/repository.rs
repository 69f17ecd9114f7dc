//! 仓储接口定义
//!
//! 持久化引擎对核心保持不透明：任何提供按 id / 谓词读写的存储都可以实现。
//! 所有权划分：好友请求与好友集合归 FriendService 调度，会话记录只由
//! ConversationService 创建，消息只由 MessageService 创建和修改。

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, FriendRequest, Message, RepositoryError, RequestId, Timestamp,
    User, UserId,
};

/// 身份存储边界（外部系统拥有用户记录，这里只读取和改写好友集合）。
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
    /// 幂等的集合添加。
    async fn add_friend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FriendRequestRepository: Send + Sync {
    async fn create(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError>;
    async fn update(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError>;
    async fn find_by_id(&self, id: RequestId) -> Result<Option<FriendRequest>, RepositoryError>;
    /// 无序用户对之间的待处理请求（双向匹配，只看 pending）。
    async fn find_pending_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<FriendRequest>, RepositoryError>;
    async fn list_pending_to(&self, to: UserId) -> Result<Vec<FriendRequest>, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;
    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;
    /// 查找无序用户对的会话，与存储顺序无关。
    async fn find_for_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError>;
    /// 会话内全部消息，`created_at` 升序，时间相同按插入顺序。
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;
    async fn last_in_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError>;
    /// 将会话内所有 `sender != reader` 的未读消息置为已读，返回翻转条数。
    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError>;
    /// 全库扫描：所有未读且发送者不是给定用户的消息（通知聚合输入）。
    async fn list_unread_not_from(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Message>, RepositoryError>;
}

/// 供仓储实现内部使用的时间工具。
pub fn newest_first(a: &Timestamp, b: &Timestamp) -> std::cmp::Ordering {
    b.cmp(a)
}
