//! 消息日志服务
//!
//! 会话内消息的追加、读取和已读标记。所有入口都先做成员校验，
//! 校验顺序固定：会话存在 -> 成员资格 -> 正文合法。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ConversationId, DomainError, Message, MessageId, MessageText, UserId};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::MessageDto;
use crate::error::{ApplicationError, ApplicationResult};
use crate::repository::{MessageRepository, UserRepository};
use crate::services::ConversationService;

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_service: Arc<ConversationService>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    async fn require_member(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> ApplicationResult<()> {
        let conversation = self.deps.conversation_service.get(conversation_id).await?;
        if !conversation.contains(user_id) {
            return Err(DomainError::forbidden("access a conversation as a non-member").into());
        }
        Ok(())
    }

    async fn username_of(&self, user_id: UserId) -> ApplicationResult<String> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))?;
        Ok(user.username.as_str().to_string())
    }

    /// 追加一条消息。消息落库后才算发送成功，广播由调用方负责。
    pub async fn append(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
        text: impl Into<String>,
    ) -> ApplicationResult<MessageDto> {
        self.require_member(conversation_id, sender).await?;
        let text = MessageText::parse(text)?;

        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            conversation_id,
            sender,
            text,
            self.deps.clock.now(),
        );
        let stored = self.deps.message_repository.create(message).await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            "消息已写入"
        );

        let sender_username = self.username_of(sender).await?;
        Ok(MessageDto::from_message(&stored, &sender_username))
    }

    /// 会话内全部消息，时间升序。只有成员可以读取。
    pub async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        requester: UserId,
    ) -> ApplicationResult<Vec<MessageDto>> {
        let conversation = self.deps.conversation_service.get(conversation_id).await?;
        if !conversation.contains(requester) {
            return Err(DomainError::forbidden("access a conversation as a non-member").into());
        }

        // 两人会话，提前解析两个成员的用户名，避免逐条查询
        let [a, b] = conversation.members();
        let name_a = self.username_of(a).await?;
        let name_b = self.username_of(b).await?;

        let messages = self
            .deps
            .message_repository
            .list_by_conversation(conversation_id)
            .await?;
        Ok(messages
            .iter()
            .map(|m| {
                let name = if m.sender == a { &name_a } else { &name_b };
                MessageDto::from_message(m, name)
            })
            .collect())
    }

    /// 把会话里对方发来的未读消息全部置为已读。幂等，返回翻转条数。
    /// 自己发出的消息不受影响。
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> ApplicationResult<u64> {
        self.require_member(conversation_id, reader).await?;
        let flipped = self
            .deps
            .message_repository
            .mark_read(conversation_id, reader)
            .await?;
        if flipped > 0 {
            tracing::debug!(
                conversation_id = %conversation_id,
                reader = %reader,
                flipped,
                "未读消息已标记"
            );
        }
        Ok(flipped)
    }

    /// 用户在所有会话里的未读总数。孤儿消息（会话缺失或用户不在其中）
    /// 不计入。
    pub async fn count_unread_for_user(&self, user_id: UserId) -> ApplicationResult<u64> {
        let unread = self
            .deps
            .message_repository
            .list_unread_not_from(user_id)
            .await?;

        let mut memberships: HashMap<ConversationId, bool> = HashMap::new();
        let mut count = 0u64;
        for message in unread {
            let member = match memberships.get(&message.conversation_id) {
                Some(member) => *member,
                None => {
                    let member = match self
                        .deps
                        .conversation_service
                        .get(message.conversation_id)
                        .await
                    {
                        Ok(conversation) => conversation.contains(user_id),
                        Err(ApplicationError::Domain(DomainError::NotFound { .. })) => false,
                        Err(err) => return Err(err),
                    };
                    memberships.insert(message.conversation_id, member);
                    member
                }
            };
            if member {
                count += 1;
            }
        }
        Ok(count)
    }
}
