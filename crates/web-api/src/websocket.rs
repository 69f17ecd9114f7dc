//! WebSocket 实时通道
//!
//! 升级前先验证 token，无效凭据直接返回 401，不建立连接。
//! 每个连接持有一个出站通道，由独立的发送任务消费。
//! 业务失败只回发给出错的连接一个 error 事件，连接保持打开。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{ClientEvent, ServerEvent};
use domain::{ConversationId, UserId};
use infrastructure::ConnectionId;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // 握手阶段完成认证，升级之后不再携带凭据
    let claims = state.jwt_service.verify_token(&query.token)?;
    let user_id = UserId::from(claims.user_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.registry.register(connection_id, tx).await;
    tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket 连接已建立");

    let (mut sender, mut incoming) = socket.split();

    // 发送任务：唯一写 socket 的地方
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "事件序列化失败");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = incoming.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_client_frame(&state, connection_id, user_id, text.as_str()).await;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection_id = %connection_id, error = %err, "读取帧失败");
                break;
            }
        }
    }

    state.registry.purge_connection(connection_id).await;
    send_task.abort();
    tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket 连接已关闭");
}

async fn handle_client_frame(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: UserId,
    raw: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(err) => {
            send_error(state, connection_id, format!("malformed event: {err}")).await;
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            let conversation_id = ConversationId::from(conversation_id);
            match state
                .conversation_service
                .is_member(conversation_id, user_id)
                .await
            {
                Ok(true) => {
                    if let Err(err) = state.registry.join(connection_id, conversation_id).await {
                        send_error(state, connection_id, err.to_string()).await;
                    }
                }
                Ok(false) => {
                    send_error(
                        state,
                        connection_id,
                        "not a member of this conversation".to_string(),
                    )
                    .await;
                }
                Err(err) => send_error(state, connection_id, err.to_string()).await,
            }
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            state
                .registry
                .leave(connection_id, ConversationId::from(conversation_id))
                .await;
        }
        ClientEvent::SendMessage {
            conversation_id,
            text,
        } => {
            let conversation_id = ConversationId::from(conversation_id);
            // 先落库，成功后才广播；发送者自己的连接也会收到回显
            match state
                .message_service
                .append(conversation_id, user_id, text)
                .await
            {
                Ok(message) => {
                    state
                        .registry
                        .broadcast_to_room(
                            conversation_id,
                            &ServerEvent::NewMessage { message },
                            None,
                        )
                        .await;
                }
                Err(err) => send_error(state, connection_id, err.to_string()).await,
            }
        }
        ClientEvent::Typing {
            conversation_id,
            username,
        } => {
            state
                .registry
                .broadcast_to_room(
                    ConversationId::from(conversation_id),
                    &ServerEvent::UserTyping { username },
                    Some(connection_id),
                )
                .await;
        }
        ClientEvent::StopTyping { conversation_id } => {
            state
                .registry
                .broadcast_to_room(
                    ConversationId::from(conversation_id),
                    &ServerEvent::UserStopTyping {},
                    Some(connection_id),
                )
                .await;
        }
    }
}

async fn send_error(state: &AppState, connection_id: ConnectionId, message: String) {
    state
        .registry
        .send_to(connection_id, ServerEvent::Error { message })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    use application::memory::{
        InMemoryConversationRepository, InMemoryFriendRequestRepository,
        InMemoryMessageRepository, InMemoryUserRepository,
    };
    use application::{
        Clock, ConversationService, ConversationServiceDependencies, FriendService,
        FriendServiceDependencies, MessageService, MessageServiceDependencies,
        NotificationService, NotificationServiceDependencies, SystemClock,
    };
    use config::JwtConfig;
    use domain::{RequestId, User, Username};
    use infrastructure::RoomRegistry;

    use crate::auth::JwtService;

    struct Wired {
        state: AppState,
        users: Arc<InMemoryUserRepository>,
    }

    impl Wired {
        async fn seed_user(&self, name: &str) -> UserId {
            let id = UserId::from(Uuid::new_v4());
            self.users
                .insert(User::new(id, Username::parse(name).unwrap()))
                .await;
            id
        }

        async fn befriend(&self, a: UserId, b: UserId) -> ConversationId {
            let request = self.state.friend_service.send_request(a, b).await.unwrap();
            let accepted = self
                .state
                .friend_service
                .accept(RequestId::from(request.id), b)
                .await
                .unwrap();
            ConversationId::from(accepted.conversation_id)
        }

        async fn connect(&self) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
            let connection_id: ConnectionId = Uuid::new_v4();
            let (tx, rx) = mpsc::unbounded_channel();
            self.state.registry.register(connection_id, tx).await;
            (connection_id, rx)
        }
    }

    fn wired() -> Wired {
        let users = Arc::new(InMemoryUserRepository::new());
        let requests = Arc::new(InMemoryFriendRequestRepository::new());
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let conversation_service = Arc::new(ConversationService::new(
            ConversationServiceDependencies {
                conversation_repository: conversations.clone(),
                message_repository: messages.clone(),
                user_repository: users.clone(),
                clock: clock.clone(),
            },
        ));
        let friend_service = Arc::new(FriendService::new(FriendServiceDependencies {
            user_repository: users.clone(),
            friend_request_repository: requests,
            conversation_service: conversation_service.clone(),
            clock: clock.clone(),
        }));
        let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
            message_repository: messages.clone(),
            user_repository: users.clone(),
            conversation_service: conversation_service.clone(),
            clock,
        }));
        let notification_service = Arc::new(NotificationService::new(
            NotificationServiceDependencies {
                message_repository: messages,
                conversation_repository: conversations,
                user_repository: users.clone(),
            },
        ));

        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-with-enough-length-for-hs256".to_string(),
        }));
        let state = AppState::new(
            friend_service,
            conversation_service,
            message_service,
            notification_service,
            Arc::new(RoomRegistry::new()),
            jwt,
        );
        Wired { state, users }
    }

    fn frame(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[tokio::test]
    async fn message_is_persisted_then_delivered_only_to_joined_connections() {
        let w = wired();
        let alice = w.seed_user("alice").await;
        let bob = w.seed_user("bob").await;
        let conversation_id = w.befriend(alice, bob).await;
        let room = Uuid::from(conversation_id);

        let (alice_conn, mut alice_rx) = w.connect().await;
        // bob 是成员但没有 join，不应收到广播
        let (_bob_conn, mut bob_rx) = w.connect().await;

        handle_client_frame(
            &w.state,
            alice_conn,
            alice,
            &frame(json!({ "type": "join_conversation", "conversation_id": room })),
        )
        .await;

        handle_client_frame(
            &w.state,
            alice_conn,
            alice,
            &frame(json!({
                "type": "send_message",
                "conversation_id": room,
                "text": "hello bob"
            })),
        )
        .await;

        // 发送者自己的连接收到且只收到一条回显
        let event = alice_rx.try_recv().unwrap();
        match event {
            ServerEvent::NewMessage { message } => {
                assert_eq!(message.text, "hello bob");
                assert_eq!(message.sender_username, "alice");
                assert_eq!(message.conversation_id, room);
                assert!(!message.read);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());

        // 广播之前已经落库，未 join 的成员仍能拉取到
        let messages = w
            .state
            .message_service
            .list_by_conversation(conversation_id, bob)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello bob");
    }

    #[tokio::test]
    async fn non_member_gets_a_local_error_and_nothing_is_stored() {
        let w = wired();
        let alice = w.seed_user("alice").await;
        let bob = w.seed_user("bob").await;
        let eve = w.seed_user("eve").await;
        let conversation_id = w.befriend(alice, bob).await;
        let room = Uuid::from(conversation_id);

        let (eve_conn, mut eve_rx) = w.connect().await;

        handle_client_frame(
            &w.state,
            eve_conn,
            eve,
            &frame(json!({ "type": "join_conversation", "conversation_id": room })),
        )
        .await;
        assert!(matches!(eve_rx.try_recv().unwrap(), ServerEvent::Error { .. }));

        handle_client_frame(
            &w.state,
            eve_conn,
            eve,
            &frame(json!({
                "type": "send_message",
                "conversation_id": room,
                "text": "let me in"
            })),
        )
        .await;
        assert!(matches!(eve_rx.try_recv().unwrap(), ServerEvent::Error { .. }));

        let messages = w
            .state
            .message_service
            .list_by_conversation(conversation_id, alice)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_reports_an_error_event() {
        let w = wired();
        let alice = w.seed_user("alice").await;
        let (conn, mut rx) = w.connect().await;

        handle_client_frame(&w.state, conn, alice, "not json at all").await;

        match rx.try_recv().unwrap() {
            ServerEvent::Error { message } => assert!(message.contains("malformed")),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
