//! 会话注册服务
//!
//! 会话只在这里创建：接受好友请求时调用 `find_or_create_for_pair`，
//! 保证每对用户至多一个会话。成员集在创建后不可变。

use std::sync::Arc;

use domain::{Conversation, ConversationId, DomainError, RepositoryError, UserId};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::{summary_of, ConversationSummaryDto, LastMessageDto, PeerDto};
use crate::error::{ApplicationError, ApplicationResult};
use crate::repository::{ConversationRepository, MessageRepository, UserRepository};

pub struct ConversationServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 返回用户对的会话，不存在则创建。并发创建同一对时靠存储层的
    /// 唯一约束兜底，冲突方重新查询后返回同一个会话。
    pub async fn find_or_create_for_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> ApplicationResult<Conversation> {
        if let Some(existing) = self
            .deps
            .conversation_repository
            .find_for_pair(a, b)
            .await?
        {
            return Ok(existing);
        }

        let now = self.deps.clock.now();
        let conversation = Conversation::new(ConversationId::from(Uuid::new_v4()), a, b, now)?;
        match self.deps.conversation_repository.create(conversation).await {
            Ok(created) => {
                tracing::info!(conversation_id = %created.id, "创建会话");
                Ok(created)
            }
            Err(RepositoryError::Conflict) => {
                let existing = self
                    .deps
                    .conversation_repository
                    .find_for_pair(a, b)
                    .await?
                    .ok_or(ApplicationError::Repository(RepositoryError::Conflict))?;
                Ok(existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: ConversationId) -> ApplicationResult<Conversation> {
        self.deps
            .conversation_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("conversation", id.to_string()).into())
    }

    pub async fn is_member(
        &self,
        id: ConversationId,
        user_id: UserId,
    ) -> ApplicationResult<bool> {
        Ok(self.get(id).await?.contains(user_id))
    }

    /// 当前用户与指定用户的会话。仅好友可见，非好友一律 Forbidden，
    /// 不区分会话是否存在，避免泄露关系信息。
    pub async fn find_for_pair(
        &self,
        me: UserId,
        other: UserId,
    ) -> ApplicationResult<Conversation> {
        let user = self
            .deps
            .user_repository
            .find_by_id(me)
            .await?
            .ok_or_else(|| DomainError::not_found("user", me.to_string()))?;
        if !user.is_friends_with(other) {
            return Err(DomainError::forbidden("access conversation of a non-friend").into());
        }
        self.deps
            .conversation_repository
            .find_for_pair(me, other)
            .await?
            .ok_or_else(|| {
                DomainError::not_found("conversation", format!("{me}/{other}")).into()
            })
    }

    /// 用户参与的原始会话实体（通知聚合等内部调用使用）。
    pub async fn conversations_of(&self, user_id: UserId) -> ApplicationResult<Vec<Conversation>> {
        Ok(self
            .deps
            .conversation_repository
            .list_for_user(user_id)
            .await?)
    }

    /// 会话列表：带对端成员和最近一条消息，按最近活动时间倒序。
    /// 没有消息的会话用 `updated_at` 参与排序。
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> ApplicationResult<Vec<ConversationSummaryDto>> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_user(user_id)
            .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let Some(peer_id) = conversation.peer_of(user_id) else {
                continue;
            };
            let peer = self
                .deps
                .user_repository
                .find_by_id(peer_id)
                .await?
                .ok_or_else(|| DomainError::not_found("user", peer_id.to_string()))?;
            let last_message = self
                .deps
                .message_repository
                .last_in_conversation(conversation.id)
                .await?
                .map(|m| LastMessageDto {
                    text: m.text.as_str().to_string(),
                    created_at: m.created_at,
                });
            summaries.push(summary_of(
                conversation,
                PeerDto {
                    id: peer_id.into(),
                    username: peer.username.as_str().to_string(),
                },
                last_message,
            ));
        }

        summaries.sort_by(|x, y| crate::repository::newest_first(&x.activity_at(), &y.activity_at()));
        Ok(summaries)
    }
}
