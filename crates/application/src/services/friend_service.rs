//! 好友关系服务
//!
//! 好友请求状态机的用例编排：发起、接受、拒绝，以及关系总览。
//! 接受请求的副作用顺序固定：先落状态，再写双方好友集合，最后建会话。

use std::sync::Arc;

use domain::{DomainError, FriendRequest, RequestId, UserId};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::{
    FriendRequestDto, FriendshipAccepted, IncomingRequestDto, RelationshipStatus, UserRelationDto,
};
use crate::error::ApplicationResult;
use crate::repository::{FriendRequestRepository, UserRepository};
use crate::services::ConversationService;

pub struct FriendServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub friend_request_repository: Arc<dyn FriendRequestRepository>,
    pub conversation_service: Arc<ConversationService>,
    pub clock: Arc<dyn Clock>,
}

pub struct FriendService {
    deps: FriendServiceDependencies,
}

impl FriendService {
    pub fn new(deps: FriendServiceDependencies) -> Self {
        Self { deps }
    }

    async fn require_user(&self, id: UserId) -> ApplicationResult<domain::User> {
        Ok(self
            .deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", id))?)
    }

    /// 发起好友请求。无序用户对之间至多一个待处理请求，
    /// 已是好友或任一方向已有待处理请求都会报 Conflict。
    pub async fn send_request(
        &self,
        from: UserId,
        to: UserId,
    ) -> ApplicationResult<FriendRequestDto> {
        let sender = self.require_user(from).await?;
        self.require_user(to).await?;

        if sender.is_friends_with(to) {
            return Err(DomainError::conflict("users are already friends").into());
        }
        if self
            .deps
            .friend_request_repository
            .find_pending_between(from, to)
            .await?
            .is_some()
        {
            return Err(
                DomainError::conflict("a pending request already exists between these users")
                    .into(),
            );
        }

        let now = self.deps.clock.now();
        let request = FriendRequest::new(RequestId::from(Uuid::new_v4()), from, to, now)?;
        let stored = self.deps.friend_request_repository.create(request).await?;
        tracing::info!(request_id = %stored.id, from = %from, to = %to, "发起好友请求");
        Ok(FriendRequestDto::from(&stored))
    }

    /// 接受请求：状态翻转、双向写好友集合、创建（或复用）会话。
    /// 状态守卫在领域实体里，重复接受在第一步就会被 Conflict 挡下，
    /// 后续副作用全部幂等，部分完成后重试不会产生第二个会话。
    pub async fn accept(
        &self,
        request_id: RequestId,
        acting_user: UserId,
    ) -> ApplicationResult<FriendshipAccepted> {
        let mut request = self
            .deps
            .friend_request_repository
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| DomainError::not_found("friend request", request_id))?;

        request.accept(acting_user)?;
        let stored = self.deps.friend_request_repository.update(request).await?;

        self.deps
            .user_repository
            .add_friend(stored.from, stored.to)
            .await?;
        self.deps
            .user_repository
            .add_friend(stored.to, stored.from)
            .await?;

        let conversation = self
            .deps
            .conversation_service
            .find_or_create_for_pair(stored.from, stored.to)
            .await?;

        tracing::info!(
            request_id = %stored.id,
            conversation_id = %conversation.id,
            "好友请求已接受"
        );
        Ok(FriendshipAccepted {
            request: FriendRequestDto::from(&stored),
            conversation_id: conversation.id.into(),
        })
    }

    /// 拒绝请求。终态，不建立任何关系；之后可以重新发起。
    pub async fn reject(
        &self,
        request_id: RequestId,
        acting_user: UserId,
    ) -> ApplicationResult<FriendRequestDto> {
        let mut request = self
            .deps
            .friend_request_repository
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| DomainError::not_found("friend request", request_id))?;

        request.reject(acting_user)?;
        let stored = self.deps.friend_request_repository.update(request).await?;
        tracing::info!(request_id = %stored.id, "好友请求已拒绝");
        Ok(FriendRequestDto::from(&stored))
    }

    /// 收到的待处理请求列表，带发起者用户名。
    pub async fn list_incoming(&self, user_id: UserId) -> ApplicationResult<Vec<IncomingRequestDto>> {
        let pending = self
            .deps
            .friend_request_repository
            .list_pending_to(user_id)
            .await?;

        let mut incoming = Vec::with_capacity(pending.len());
        for request in pending {
            let sender = self.require_user(request.from).await?;
            incoming.push(IncomingRequestDto {
                request_id: request.id.into(),
                from_id: request.from.into(),
                from_username: sender.username.as_str().to_string(),
                created_at: request.created_at,
            });
        }
        Ok(incoming)
    }

    /// 关系总览：除调用者外的每个用户标注一种关系。
    /// 优先级：已是好友 > 我发出的待处理 > 我收到的待处理 > 无关系。
    pub async fn relationship_overview(
        &self,
        me: UserId,
    ) -> ApplicationResult<Vec<UserRelationDto>> {
        let caller = self.require_user(me).await?;
        let users = self.deps.user_repository.list_all().await?;

        let mut relations = Vec::with_capacity(users.len().saturating_sub(1));
        for user in users.iter().filter(|u| u.id != me) {
            let (status, request_id) = if caller.is_friends_with(user.id) {
                (RelationshipStatus::Friends, None)
            } else {
                match self
                    .deps
                    .friend_request_repository
                    .find_pending_between(me, user.id)
                    .await?
                {
                    Some(request) if request.from == me => {
                        (RelationshipStatus::RequestSent, Some(request.id.into()))
                    }
                    Some(request) => (
                        RelationshipStatus::RequestReceived,
                        Some(request.id.into()),
                    ),
                    None => (RelationshipStatus::NotFriends, None),
                }
            };
            relations.push(UserRelationDto::new(user, status, request_id));
        }
        Ok(relations)
    }
}
