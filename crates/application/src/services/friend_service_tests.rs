//! 好友关系服务单元测试

use domain::{DomainError, RequestId, UserId};
use uuid::Uuid;

use crate::dto::RelationshipStatus;
use crate::error::ApplicationError;
use crate::repository::UserRepository;
use crate::services::test_support::harness;

fn domain_err(err: ApplicationError) -> DomainError {
    match err {
        ApplicationError::Domain(e) => e,
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[tokio::test]
async fn send_request_creates_a_pending_request() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    let request = h.friend_service.send_request(alice, bob).await.unwrap();
    assert_eq!(request.from_id, Uuid::from(alice));
    assert_eq!(request.to_id, Uuid::from(bob));

    let incoming = h.friend_service.list_incoming(bob).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].from_username, "alice");
}

#[tokio::test]
async fn duplicate_pending_request_is_a_conflict_in_both_directions() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    h.friend_service.send_request(alice, bob).await.unwrap();

    let same_direction = h.friend_service.send_request(alice, bob).await.unwrap_err();
    assert!(matches!(
        domain_err(same_direction),
        DomainError::Conflict { .. }
    ));

    // 反方向同样被拒绝
    let reverse = h.friend_service.send_request(bob, alice).await.unwrap_err();
    assert!(matches!(domain_err(reverse), DomainError::Conflict { .. }));
}

#[tokio::test]
async fn request_to_unknown_user_is_not_found() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let ghost = UserId::from(Uuid::new_v4());

    let err = h.friend_service.send_request(alice, ghost).await.unwrap_err();
    assert!(matches!(domain_err(err), DomainError::NotFound { .. }));
}

#[tokio::test]
async fn accept_makes_friends_and_creates_one_conversation() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    let request = h.friend_service.send_request(alice, bob).await.unwrap();
    let accepted = h
        .friend_service
        .accept(RequestId::from(request.id), bob)
        .await
        .unwrap();

    let alice_user = h.users.find_by_id(alice).await.unwrap().unwrap();
    let bob_user = h.users.find_by_id(bob).await.unwrap().unwrap();
    assert!(alice_user.is_friends_with(bob));
    assert!(bob_user.is_friends_with(alice));

    let conversation = h
        .conversation_service
        .get(domain::ConversationId::from(accepted.conversation_id))
        .await
        .unwrap();
    assert!(conversation.contains(alice));
    assert!(conversation.contains(bob));
}

#[tokio::test]
async fn accept_twice_is_a_conflict() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    let request = h.friend_service.send_request(alice, bob).await.unwrap();
    let id = RequestId::from(request.id);
    h.friend_service.accept(id, bob).await.unwrap();

    let err = h.friend_service.accept(id, bob).await.unwrap_err();
    assert!(matches!(domain_err(err), DomainError::Conflict { .. }));
}

#[tokio::test]
async fn only_the_recipient_can_accept() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    let request = h.friend_service.send_request(alice, bob).await.unwrap();
    let err = h
        .friend_service
        .accept(RequestId::from(request.id), alice)
        .await
        .unwrap_err();
    assert!(matches!(domain_err(err), DomainError::Forbidden { .. }));
}

#[tokio::test]
async fn reject_then_resend_is_allowed() {
    let h = harness();
    let alice = h.seed_user("alice").await;
    let bob = h.seed_user("bob").await;

    let request = h.friend_service.send_request(alice, bob).await.unwrap();
    h.friend_service
        .reject(RequestId::from(request.id), bob)
        .await
        .unwrap();

    // 拒绝是终态，不建立关系，但允许重新发起
    let alice_user = h.users.find_by_id(alice).await.unwrap().unwrap();
    assert!(!alice_user.is_friends_with(bob));
    h.friend_service.send_request(alice, bob).await.unwrap();
}

#[tokio::test]
async fn relationship_overview_classifies_every_user() {
    let h = harness();
    let me = h.seed_user("me").await;
    let friend = h.seed_user("friend").await;
    let invited = h.seed_user("invited").await;
    let inviter = h.seed_user("inviter").await;
    let stranger = h.seed_user("stranger").await;

    h.befriend(me, friend).await;
    h.friend_service.send_request(me, invited).await.unwrap();
    h.friend_service.send_request(inviter, me).await.unwrap();

    let overview = h.friend_service.relationship_overview(me).await.unwrap();
    assert_eq!(overview.len(), 4);

    let status_of = |id: UserId| {
        overview
            .iter()
            .find(|r| r.id == Uuid::from(id))
            .unwrap()
            .clone()
    };
    assert_eq!(status_of(friend).status, RelationshipStatus::Friends);
    assert_eq!(status_of(invited).status, RelationshipStatus::RequestSent);
    assert!(status_of(invited).request_id.is_some());
    assert_eq!(
        status_of(inviter).status,
        RelationshipStatus::RequestReceived
    );
    assert!(status_of(inviter).request_id.is_some());
    assert_eq!(status_of(stranger).status, RelationshipStatus::NotFriends);
    assert!(status_of(stranger).request_id.is_none());
}
