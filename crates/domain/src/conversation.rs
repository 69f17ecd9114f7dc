//! 会话实体
//!
//! 成员数恒为 2，在构造时强制，之后没有任何增删成员的操作。
//! 每个被接受的好友请求恰好产生一个会话；会话不会被删除。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 两人会话实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    members: [UserId; 2],
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// 创建会话。两个成员必须是不同的用户。
    pub fn new(id: ConversationId, a: UserId, b: UserId, now: Timestamp) -> DomainResult<Self> {
        if a == b {
            return Err(DomainError::invalid_argument(
                "members",
                "conversation members must be two distinct users",
            ));
        }
        Ok(Self {
            id,
            members: [a, b],
            created_at: now,
            updated_at: now,
        })
    }

    /// 从存储加载（成员顺序即存储顺序）。
    pub fn from_parts(
        id: ConversationId,
        a: UserId,
        b: UserId,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> DomainResult<Self> {
        let mut conversation = Self::new(id, a, b, created_at)?;
        conversation.updated_at = updated_at;
        Ok(conversation)
    }

    pub fn members(&self) -> [UserId; 2] {
        self.members
    }

    /// 成员判定，所有消息操作的授权入口。
    pub fn contains(&self, user_id: UserId) -> bool {
        self.members[0] == user_id || self.members[1] == user_id
    }

    /// 返回另一方成员。
    pub fn peer_of(&self, user_id: UserId) -> Option<UserId> {
        if self.members[0] == user_id {
            Some(self.members[1])
        } else if self.members[1] == user_id {
            Some(self.members[0])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn members_must_be_distinct() {
        let user = UserId::from(Uuid::new_v4());
        let result = Conversation::new(
            ConversationId::from(Uuid::new_v4()),
            user,
            user,
            chrono::Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::InvalidArgument { .. })));
    }

    #[test]
    fn membership_and_peer_lookup() {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        let conversation = Conversation::new(
            ConversationId::from(Uuid::new_v4()),
            a,
            b,
            chrono::Utc::now(),
        )
        .unwrap();

        assert!(conversation.contains(a));
        assert!(conversation.contains(b));
        assert_eq!(conversation.peer_of(a), Some(b));
        assert_eq!(conversation.peer_of(b), Some(a));

        let stranger = UserId::from(Uuid::new_v4());
        assert!(!conversation.contains(stranger));
        assert_eq!(conversation.peer_of(stranger), None);
    }
}
