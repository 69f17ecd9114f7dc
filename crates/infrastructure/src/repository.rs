//! PostgreSQL 仓储实现
//!
//!  记录结构体按表结构定义，通过 `TryFrom` 转换成领域实体，
//! 非法存量数据在转换处报 Storage 错误而不是 panic。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use application::{
    ConversationRepository, FriendRequestRepository, MessageRepository, UserRepository,
};
use domain::{
    Conversation, ConversationId, FriendRequest, Message, MessageId, MessageText,
    RepositoryError, RequestId, RequestStatus, Timestamp, User, UserId, Username,
};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
}

fn user_from(record: UserRecord, friends: HashSet<UserId>) -> Result<User, RepositoryError> {
    let username =
        Username::parse(record.username).map_err(|err| invalid_data(err.to_string()))?;
    Ok(User {
        id: UserId::from(record.id),
        username,
        friends,
    })
}

#[derive(Debug, FromRow)]
struct FriendRequestRecord {
    id: Uuid,
    from_id: Uuid,
    to_id: Uuid,
    status: String,
    created_at: Timestamp,
}

impl TryFrom<FriendRequestRecord> for FriendRequest {
    type Error = RepositoryError;

    fn try_from(value: FriendRequestRecord) -> Result<Self, Self::Error> {
        let status =
            RequestStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;
        Ok(FriendRequest {
            id: RequestId::from(value.id),
            from: UserId::from(value.from_id),
            to: UserId::from(value.to_id),
            status,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    member_a: Uuid,
    member_b: Uuid,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = RepositoryError;

    fn try_from(value: ConversationRecord) -> Result<Self, Self::Error> {
        Conversation::from_parts(
            ConversationId::from(value.id),
            UserId::from(value.member_a),
            UserId::from(value.member_b),
            value.created_at,
            value.updated_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: String,
    is_read: bool,
    created_at: Timestamp,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let text = MessageText::parse(value.body).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            conversation_id: ConversationId::from(value.conversation_id),
            sender: UserId::from(value.sender_id),
            text,
            read: value.is_read,
            created_at: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn friends_of(&self, id: Uuid) -> Result<HashSet<UserId>, RepositoryError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as(r#"SELECT friend_id FROM friendships WHERE user_id = $1"#)
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(|(id,)| UserId::from(id)).collect())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = record else {
            return Ok(None);
        };
        let friends = self.friends_of(record.id).await?;
        Ok(Some(user_from(record, friends)?))
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username FROM users ORDER BY username"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let edges: Vec<(Uuid, Uuid)> =
            sqlx::query_as(r#"SELECT user_id, friend_id FROM friendships"#)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        let mut by_user: HashMap<Uuid, HashSet<UserId>> = HashMap::new();
        for (user_id, friend_id) in edges {
            by_user
                .entry(user_id)
                .or_default()
                .insert(UserId::from(friend_id));
        }

        records
            .into_iter()
            .map(|record| {
                let friends = by_user.remove(&record.id).unwrap_or_default();
                user_from(record, friends)
            })
            .collect()
    }

    async fn add_friend(&self, user_id: UserId, friend_id: UserId) -> Result<(), RepositoryError> {
        // ON CONFLICT DO NOTHING 提供集合语义的幂等
        sqlx::query(
            r#"
            INSERT INTO friendships (user_id, friend_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, friend_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(friend_id))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgFriendRequestRepository {
    pool: PgPool,
}

impl PgFriendRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, from_id, to_id, status, created_at";

#[async_trait]
impl FriendRequestRepository for PgFriendRequestRepository {
    async fn create(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(
            r#"
            INSERT INTO friend_requests (id, from_id, to_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, from_id, to_id, status, created_at
            "#,
        )
        .bind(Uuid::from(request.id))
        .bind(Uuid::from(request.from))
        .bind(Uuid::from(request.to))
        .bind(request.status.as_str())
        .bind(request.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        FriendRequest::try_from(record)
    }

    async fn update(&self, request: FriendRequest) -> Result<FriendRequest, RepositoryError> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(
            r#"
            UPDATE friend_requests
            SET status = $2
            WHERE id = $1
            RETURNING id, from_id, to_id, status, created_at
            "#,
        )
        .bind(Uuid::from(request.id))
        .bind(request.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        FriendRequest::try_from(record)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<FriendRequest>, RepositoryError> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(FriendRequest::try_from).transpose()
    }

    async fn find_pending_between(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<FriendRequest>, RepositoryError> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE status = 'pending'
              AND ((from_id = $1 AND to_id = $2) OR (from_id = $2 AND to_id = $1))
            "#
        ))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(FriendRequest::try_from).transpose()
    }

    async fn list_pending_to(&self, to: UserId) -> Result<Vec<FriendRequest>, RepositoryError> {
        let records = sqlx::query_as::<_, FriendRequestRecord>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE to_id = $1 AND status = 'pending'
            ORDER BY created_at
            "#
        ))
        .bind(Uuid::from(to))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(FriendRequest::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let [a, b] = conversation.members();
        // 表上有 (LEAST, GREATEST) 唯一索引，同一对用户的并发创建
        // 只有一个能成功，冲突方收到 Conflict 后重新查询
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (id, member_a, member_b, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, member_a, member_b, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(conversation.id))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Conversation::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, member_a, member_b, created_at, updated_at
            FROM conversations WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }

    async fn find_for_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, member_a, member_b, created_at, updated_at
            FROM conversations
            WHERE LEAST(member_a, member_b) = LEAST($1::uuid, $2::uuid)
              AND GREATEST(member_a, member_b) = GREATEST($1::uuid, $2::uuid)
            "#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, member_a, member_b, created_at, updated_at
            FROM conversations
            WHERE member_a = $1 OR member_b = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Conversation::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, is_read, created_at";

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, conversation_id, sender_id, body, is_read, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender))
        .bind(message.text.as_str())
        .bind(message.read)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        // seq 列打破相同时间戳的平局，保持插入顺序
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at, seq
            "#
        ))
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn last_in_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#
        ))
        .bind(Uuid::from(conversation_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(reader))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn list_unread_not_from(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE is_read = FALSE AND sender_id <> $1
            ORDER BY created_at, seq
            "#
        ))
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

/// 一次性装配全部 Pg 仓储。
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub friend_request_repository: Arc<PgFriendRequestRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            friend_request_repository: Arc::new(PgFriendRequestRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
