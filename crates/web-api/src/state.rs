use std::sync::Arc;

use application::{ConversationService, FriendService, MessageService, NotificationService};
use infrastructure::RoomRegistry;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub friend_service: Arc<FriendService>,
    pub conversation_service: Arc<ConversationService>,
    pub message_service: Arc<MessageService>,
    pub notification_service: Arc<NotificationService>,
    pub registry: Arc<RoomRegistry>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        friend_service: Arc<FriendService>,
        conversation_service: Arc<ConversationService>,
        message_service: Arc<MessageService>,
        notification_service: Arc<NotificationService>,
        registry: Arc<RoomRegistry>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            friend_service,
            conversation_service,
            message_service,
            notification_service,
            registry,
            jwt_service,
        }
    }
}
