mod conversation_service;
mod friend_service;
mod message_service;
mod notification_service;

#[cfg(test)]
mod friend_service_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use conversation_service::{ConversationService, ConversationServiceDependencies};
pub use friend_service::{FriendService, FriendServiceDependencies};
pub use message_service::{MessageService, MessageServiceDependencies};
pub use notification_service::{NotificationService, NotificationServiceDependencies};
