//! 未读通知聚合
//!
//! 按需计算：扫描未读消息，按 (会话, 发送者) 分组，
//! 每组给出条数和最新一条摘要。没有任何持久化的通知状态。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ConversationId, DomainError, Message, UserId};

use crate::dto::NotificationDto;
use crate::error::ApplicationResult;
use crate::repository::{newest_first, ConversationRepository, MessageRepository, UserRepository};

pub struct NotificationServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub user_repository: Arc<dyn UserRepository>,
}

pub struct NotificationService {
    deps: NotificationServiceDependencies,
}

impl NotificationService {
    pub fn new(deps: NotificationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 当前用户的未读通知，按最新消息时间倒序。
    /// 标记已读后对应分组在下一次计算中自然消失。
    pub async fn build_notifications(
        &self,
        user_id: UserId,
    ) -> ApplicationResult<Vec<NotificationDto>> {
        let unread = self
            .deps
            .message_repository
            .list_unread_not_from(user_id)
            .await?;

        // 只保留用户所在会话的消息，其余会话的未读与该用户无关
        let mut groups: HashMap<(ConversationId, UserId), Vec<Message>> = HashMap::new();
        let mut memberships: HashMap<ConversationId, bool> = HashMap::new();
        for message in unread {
            let member = match memberships.get(&message.conversation_id) {
                Some(member) => *member,
                None => {
                    let member = self
                        .deps
                        .conversation_repository
                        .find_by_id(message.conversation_id)
                        .await?
                        .map(|c| c.contains(user_id))
                        .unwrap_or(false);
                    memberships.insert(message.conversation_id, member);
                    member
                }
            };
            if member {
                groups
                    .entry((message.conversation_id, message.sender))
                    .or_default()
                    .push(message);
            }
        }

        let mut notifications = Vec::with_capacity(groups.len());
        for ((conversation_id, sender), mut messages) in groups {
            messages.sort_by_key(|m| m.created_at);
            // 分组非空，latest 一定存在
            let latest = messages.last().cloned().ok_or_else(|| {
                DomainError::not_found("message", conversation_id)
            })?;
            let sender_user = self
                .deps
                .user_repository
                .find_by_id(sender)
                .await?
                .ok_or_else(|| DomainError::not_found("user", sender))?;
            notifications.push(NotificationDto {
                conversation_id: conversation_id.into(),
                sender_id: sender.into(),
                sender_username: sender_user.username.as_str().to_string(),
                count: messages.len() as u64,
                latest_message_text: latest.text.as_str().to_string(),
                latest_timestamp: latest.created_at,
            });
        }

        notifications.sort_by(|a, b| newest_first(&a.latest_timestamp, &b.latest_timestamp));
        Ok(notifications)
    }
}
