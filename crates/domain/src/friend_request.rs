//! 好友请求实体与状态机
//!
//! 状态是单向棘轮：`Pending -> Accepted | Rejected`，没有回到 Pending 的路径。
//! 已处理的请求不能被重放，新的尝试必须走一次新的 send_request。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RequestId, Timestamp, UserId};

/// 好友请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::invalid_argument("status", other)),
        }
    }
}

/// 好友请求实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: RequestId,
    pub from: UserId,
    pub to: UserId,
    pub status: RequestStatus,
    pub created_at: Timestamp,
}

impl FriendRequest {
    /// 创建新的待处理请求。发起方与接收方不能是同一个用户。
    pub fn new(id: RequestId, from: UserId, to: UserId, now: Timestamp) -> DomainResult<Self> {
        if from == to {
            return Err(DomainError::invalid_argument(
                "to",
                "cannot send a friend request to yourself",
            ));
        }
        Ok(Self {
            id,
            from,
            to,
            status: RequestStatus::Pending,
            created_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// 请求是否涉及给定的无序用户对。
    pub fn involves(&self, a: UserId, b: UserId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// 接受请求。只能由接收方执行，且仅当状态为 Pending。
    pub fn accept(&mut self, acting_user: UserId) -> DomainResult<()> {
        if acting_user != self.to {
            return Err(DomainError::forbidden("accept friend request"));
        }
        self.transition(RequestStatus::Accepted)
    }

    /// 拒绝请求。守卫与 accept 一致。
    pub fn reject(&mut self, acting_user: UserId) -> DomainResult<()> {
        if acting_user != self.to {
            return Err(DomainError::forbidden("reject friend request"));
        }
        self.transition(RequestStatus::Rejected)
    }

    fn transition(&mut self, next: RequestStatus) -> DomainResult<()> {
        match self.status {
            RequestStatus::Pending => {
                self.status = next;
                Ok(())
            }
            RequestStatus::Accepted | RequestStatus::Rejected => {
                Err(DomainError::conflict("friend request already processed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> FriendRequest {
        FriendRequest::new(
            RequestId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn self_request_is_rejected() {
        let user = UserId::from(Uuid::new_v4());
        let result = FriendRequest::new(
            RequestId::from(Uuid::new_v4()),
            user,
            user,
            chrono::Utc::now(),
        );
        assert!(matches!(
            result,
            Err(DomainError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn accept_is_a_one_way_ratchet() {
        let mut req = request();
        req.accept(req.to).unwrap();
        assert_eq!(req.status, RequestStatus::Accepted);

        // 已处理的请求不能再次接受或拒绝
        assert!(matches!(
            req.accept(req.to),
            Err(DomainError::Conflict { .. })
        ));
        assert!(matches!(
            req.reject(req.to),
            Err(DomainError::Conflict { .. })
        ));
    }

    #[test]
    fn only_the_recipient_can_process() {
        let mut req = request();
        let stranger = UserId::from(Uuid::new_v4());
        assert!(matches!(
            req.accept(stranger),
            Err(DomainError::Forbidden { .. })
        ));
        assert!(matches!(
            req.accept(req.from),
            Err(DomainError::Forbidden { .. })
        ));
        assert!(req.is_pending());
    }

    #[test]
    fn involves_matches_both_directions() {
        let req = request();
        assert!(req.involves(req.from, req.to));
        assert!(req.involves(req.to, req.from));
        assert!(!req.involves(req.from, UserId::from(Uuid::new_v4())));
    }
}
