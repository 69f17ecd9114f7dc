//! WebSocket 事件协议
//!
//! 客户端与服务端之间的 JSON 文本帧，`type` 字段区分事件种类。
//! 未知或格式错误的帧不会断开连接，只回发一个 `error` 事件。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageDto;

/// 客户端入站事件。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: Uuid,
    },
    LeaveConversation {
        conversation_id: Uuid,
    },
    SendMessage {
        conversation_id: Uuid,
        text: String,
    },
    Typing {
        conversation_id: Uuid,
        username: String,
    },
    StopTyping {
        conversation_id: Uuid,
    },
}

/// 服务端出站事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage { message: MessageDto },
    UserTyping { username: String },
    UserStopTyping {},
    Error { message: String },
}
