//! 内存仓储实现
//!
//! 基于 `tokio::sync::RwLock` 的哈希表存储，供服务层单元测试使用，
//! 也可以在没有数据库的环境下直接跑起整个服务。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    Conversation, ConversationId, FriendRequest, Message, RepositoryError, RequestId, User,
    UserId,
};

use crate::repository::{
    ConversationRepository, FriendRequestRepository, MessageRepository, UserRepository,
};

/// 无序用户对的规范化键。
fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试和本地运行时的种子入口。
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        Ok(users)
    }

    async fn add_friend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(RepositoryError::NotFound)?;
        user.add_friend(friend_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFriendRequestRepository {
    requests: Arc<RwLock<HashMap<RequestId, FriendRequest>>>,
}

impl InMemoryFriendRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FriendRequestRepository for InMemoryFriendRequestRepository {
    async fn create(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        // 与数据库的 pending 对唯一索引对齐：同一无序用户对之间
        // 不允许出现第二条待处理请求
        if request.is_pending()
            && requests
                .values()
                .any(|r| r.is_pending() && r.involves(request.from, request.to))
        {
            return Err(RepositoryError::Conflict);
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(RepositoryError::NotFound);
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<FriendRequest>, RepositoryError> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn find_pending_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<FriendRequest>, RepositoryError> {
        Ok(self
            .requests
            .read()
            .await
            .values()
            .find(|r| r.is_pending() && r.involves(a, b))
            .cloned())
    }

    async fn list_pending_to(&self, to: UserId) -> Result<Vec<FriendRequest>, RepositoryError> {
        let mut pending: Vec<FriendRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.is_pending() && r.to == to)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: Arc<RwLock<HashMap<ConversationId, Conversation>>>,
    /// 规范化用户对到会话的索引，create 时同步维护。
    pairs: Arc<RwLock<HashMap<(UserId, UserId), ConversationId>>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let [a, b] = conversation.members();
        let key = pair_key(a, b);
        let mut pairs = self.pairs.write().await;
        if pairs.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        pairs.insert(key, conversation.id);
        self.conversations
            .write()
            .await
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn find_for_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let pairs = self.pairs.read().await;
        let Some(id) = pairs.get(&pair_key(a, b)) else {
            return Ok(None);
        };
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.contains(user_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    /// Vec 保留插入顺序，时间相同的消息保持写入先后。
    messages: Arc<RwLock<Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut result: Vec<Message> = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // 稳定排序，同一时间戳保持插入顺序
        result.sort_by_key(|m| m.created_at);
        Ok(result)
    }

    async fn last_in_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .list_by_conversation(conversation_id)
            .await?
            .pop())
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let mut flipped = 0u64;
        for message in messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender != reader)
        {
            if message.mark_read() {
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn list_unread_not_from(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| !m.read && m.sender != user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pending_request(from: UserId, to: UserId) -> FriendRequest {
        FriendRequest::new(RequestId::from(Uuid::new_v4()), from, to, chrono::Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn second_pending_request_for_the_same_pair_conflicts() {
        let repo = InMemoryFriendRequestRepository::new();
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());

        repo.create(pending_request(a, b)).await.unwrap();

        // 反方向的第二条也要被挡下
        let result = repo.create(pending_request(b, a)).await;
        assert!(matches!(result, Err(RepositoryError::Conflict)));

        // 与其他用户之间不受影响
        let c = UserId::from(Uuid::new_v4());
        repo.create(pending_request(a, c)).await.unwrap();
    }

    #[tokio::test]
    async fn settled_requests_do_not_block_a_new_one() {
        let repo = InMemoryFriendRequestRepository::new();
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());

        let mut first = pending_request(a, b);
        repo.create(first.clone()).await.unwrap();
        first.reject(b).unwrap();
        repo.update(first).await.unwrap();

        repo.create(pending_request(a, b)).await.unwrap();
    }
}
