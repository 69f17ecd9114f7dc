//! HTTP 路由
//!
//! 所有 /api/v1 端点都要求 Bearer token，user_id 一律取自 token，
//! 不信任请求体里的任何身份字段。

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    ConversationSummaryDto, FriendRequestDto, FriendshipAccepted, IncomingRequestDto, MessageDto,
    NotificationDto, ServerEvent, UserRelationDto,
};
use domain::{ConversationId, RequestId, Timestamp, UserId};

use crate::{error::ApiError, state::AppState, websocket};

#[derive(Debug, Deserialize)]
struct SendRequestPayload {
    to_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct PostMessagePayload {
    text: String,
}

#[derive(Debug, Serialize)]
struct ConversationResponse {
    id: Uuid,
    members: [Uuid; 2],
    created_at: Timestamp,
    updated_at: Timestamp,
}

#[derive(Debug, Serialize)]
struct MarkReadResponse {
    updated: u64,
}

#[derive(Debug, Serialize)]
struct UnreadCountResponse {
    count: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/friends/requests",
            post(send_friend_request).get(incoming_requests),
        )
        .route("/friends/requests/{request_id}/accept", post(accept_request))
        .route("/friends/requests/{request_id}/reject", post(reject_request))
        .route("/conversations", get(list_conversations))
        .route("/conversations/with/{user_id}", get(conversation_with))
        .route(
            "/conversations/{conversation_id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/conversations/{conversation_id}/read", post(mark_read))
        .route("/notifications", get(notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/ws", get(websocket::websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn authed(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(headers)?;
    Ok(UserId::from(user_id))
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserRelationDto>>, ApiError> {
    let me = authed(&state, &headers)?;
    let users = state.friend_service.relationship_overview(me).await?;
    Ok(Json(users))
}

async fn send_friend_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendRequestPayload>,
) -> Result<(StatusCode, Json<FriendRequestDto>), ApiError> {
    let me = authed(&state, &headers)?;
    let request = state
        .friend_service
        .send_request(me, UserId::from(payload.to_id))
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn incoming_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<IncomingRequestDto>>, ApiError> {
    let me = authed(&state, &headers)?;
    let incoming = state.friend_service.list_incoming(me).await?;
    Ok(Json(incoming))
}

async fn accept_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<FriendshipAccepted>, ApiError> {
    let me = authed(&state, &headers)?;
    let accepted = state
        .friend_service
        .accept(RequestId::from(request_id), me)
        .await?;
    Ok(Json(accepted))
}

async fn reject_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<FriendRequestDto>, ApiError> {
    let me = authed(&state, &headers)?;
    let request = state
        .friend_service
        .reject(RequestId::from(request_id), me)
        .await?;
    Ok(Json(request))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummaryDto>>, ApiError> {
    let me = authed(&state, &headers)?;
    let conversations = state.conversation_service.list_for_user(me).await?;
    Ok(Json(conversations))
}

async fn conversation_with(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let me = authed(&state, &headers)?;
    let conversation = state
        .conversation_service
        .find_for_pair(me, UserId::from(user_id))
        .await?;
    let [a, b] = conversation.members();
    Ok(Json(ConversationResponse {
        id: conversation.id.into(),
        members: [a.into(), b.into()],
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let me = authed(&state, &headers)?;
    let messages = state
        .message_service
        .list_by_conversation(ConversationId::from(conversation_id), me)
        .await?;
    Ok(Json(messages))
}

/// REST 方式发消息：落库成功后照常向房间广播，
/// 没有 WebSocket 连接的客户端也能走通完整流程。
async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<PostMessagePayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let me = authed(&state, &headers)?;
    let conversation_id = ConversationId::from(conversation_id);
    let message = state
        .message_service
        .append(conversation_id, me, payload.text)
        .await?;

    state
        .registry
        .broadcast_to_room(
            conversation_id,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let me = authed(&state, &headers)?;
    let updated = state
        .message_service
        .mark_read(ConversationId::from(conversation_id), me)
        .await?;
    Ok(Json(MarkReadResponse { updated }))
}

async fn notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<NotificationDto>>, ApiError> {
    let me = authed(&state, &headers)?;
    let notifications = state.notification_service.build_notifications(me).await?;
    Ok(Json(notifications))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let me = authed(&state, &headers)?;
    let count = state.message_service.count_unread_for_user(me).await?;
    Ok(Json(UnreadCountResponse { count }))
}
