//! 服务层测试共用的装配工具。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use domain::{Timestamp, User, UserId, Username};
use uuid::Uuid;

use crate::clock::Clock;
use crate::memory::{
    InMemoryConversationRepository, InMemoryFriendRequestRepository, InMemoryMessageRepository,
    InMemoryUserRepository,
};
use crate::services::{
    ConversationService, ConversationServiceDependencies, FriendService,
    FriendServiceDependencies, MessageService, MessageServiceDependencies, NotificationService,
    NotificationServiceDependencies,
};

/// 每次读取前进一秒的时钟，保证测试里的时间戳严格递增。
pub(crate) struct StepClock {
    base: Timestamp,
    ticks: AtomicI64,
}

impl StepClock {
    pub(crate) fn new() -> Self {
        Self {
            base: chrono::Utc::now(),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> Timestamp {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + Duration::seconds(tick)
    }
}

pub(crate) struct TestHarness {
    pub users: Arc<InMemoryUserRepository>,
    pub requests: Arc<InMemoryFriendRequestRepository>,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub conversation_service: Arc<ConversationService>,
    pub friend_service: FriendService,
    pub message_service: MessageService,
    pub notification_service: NotificationService,
}

pub(crate) fn harness() -> TestHarness {
    let users = Arc::new(InMemoryUserRepository::new());
    let requests = Arc::new(InMemoryFriendRequestRepository::new());
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let clock: Arc<dyn Clock> = Arc::new(StepClock::new());

    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversation_repository: conversations.clone(),
            message_repository: messages.clone(),
            user_repository: users.clone(),
            clock: clock.clone(),
        },
    ));
    let friend_service = FriendService::new(FriendServiceDependencies {
        user_repository: users.clone(),
        friend_request_repository: requests.clone(),
        conversation_service: conversation_service.clone(),
        clock: clock.clone(),
    });
    let message_service = MessageService::new(MessageServiceDependencies {
        message_repository: messages.clone(),
        user_repository: users.clone(),
        conversation_service: conversation_service.clone(),
        clock: clock.clone(),
    });
    let notification_service = NotificationService::new(NotificationServiceDependencies {
        message_repository: messages.clone(),
        conversation_repository: conversations.clone(),
        user_repository: users.clone(),
    });

    TestHarness {
        users,
        requests,
        conversations,
        messages,
        conversation_service,
        friend_service,
        message_service,
        notification_service,
    }
}

impl TestHarness {
    pub(crate) async fn seed_user(&self, name: &str) -> UserId {
        let id = UserId::from(Uuid::new_v4());
        self.users
            .insert(User::new(id, Username::parse(name).unwrap()))
            .await;
        id
    }

    /// 建好友关系并返回会话 id（走完整的请求流程）。
    pub(crate) async fn befriend(&self, a: UserId, b: UserId) -> domain::ConversationId {
        let request = self.friend_service.send_request(a, b).await.unwrap();
        let accepted = self
            .friend_service
            .accept(domain::RequestId::from(request.id), b)
            .await
            .unwrap();
        domain::ConversationId::from(accepted.conversation_id)
    }
}
