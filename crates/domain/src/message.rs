//! 消息实体
//!
//! 追加写入：创建之后只有 `read` 标记可以变化，且只能从 false 到 true。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageId, MessageText, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub text: MessageText,
    pub read: bool,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender: UserId,
        text: MessageText,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender,
            text,
            read: false,
            created_at: now,
        }
    }

    /// 标记已读。返回此次调用是否真的翻转了标记。
    pub fn mark_read(&mut self) -> bool {
        if self.read {
            false
        } else {
            self.read = true;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn mark_read_flips_once() {
        let mut message = Message::new(
            MessageId::from(Uuid::new_v4()),
            ConversationId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            MessageText::parse("hello").unwrap(),
            chrono::Utc::now(),
        );
        assert!(!message.read);
        assert!(message.mark_read());
        assert!(message.read);
        // 第二次调用是无操作
        assert!(!message.mark_read());
        assert!(message.read);
    }
}
