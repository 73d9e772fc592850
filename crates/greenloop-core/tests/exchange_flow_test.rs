//! ExchangeService 集成测试
//!
//! 使用真实 PostgreSQL 验证交换创建规则与完整生命周期。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p greenloop-core --test exchange_flow_test -- --ignored
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use greenloop_core::error::CoreError;
use greenloop_core::lifecycle::{ExchangeAction, TransitionError};
use greenloop_core::models::{ExchangeStatus, NewExchange};
use greenloop_core::service::ExchangeService;
use greenloop_shared::test_utils::{TestFixture, test_pool};
use uuid::Uuid;

struct Scenario {
    fixture: TestFixture,
    service: ExchangeService,
    requester: Uuid,
    owner: Uuid,
    requested_item: Uuid,
    offered_item: Uuid,
}

async fn scenario() -> Scenario {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let category = fixture.insert_category("exchange").await;
    let requester = fixture.insert_user("requester").await;
    let owner = fixture.insert_user("owner").await;
    let requested_item = fixture.insert_item(owner, category, "Bicicleta").await;
    let offered_item = fixture.insert_item(requester, category, "Guitarra").await;
    Scenario {
        service: ExchangeService::new(pool),
        fixture,
        requester,
        owner,
        requested_item,
        offered_item,
    }
}

fn request(s: &Scenario) -> NewExchange {
    NewExchange {
        requester_id: s.requester,
        requested_item_id: s.requested_item,
        offered_item_id: s.offered_item,
        message: Some("¿Te interesa?".to_string()),
        cash_difference: None,
        cash_description: None,
    }
}

async fn item_status(s: &Scenario, item_id: Uuid) -> (String, bool) {
    sqlx::query_as("SELECT status, is_available_for_exchange FROM items WHERE id = $1")
        .bind(item_id)
        .fetch_one(s.fixture.pool())
        .await
        .expect("查询物品失败")
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_notifies_owner_and_counts_request() {
    let s = scenario().await;
    let exchange = s.service.create(request(&s)).await.unwrap();

    assert_eq!(exchange.status, ExchangeStatus::Pending);
    assert_eq!(exchange.owner_id, s.owner);

    let notifications: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND related_exchange_id = $2",
    )
    .bind(s.owner)
    .bind(exchange.id)
    .fetch_one(s.fixture.pool())
    .await
    .unwrap();
    assert_eq!(notifications, 1);

    let requests: i32 =
        sqlx::query_scalar("SELECT exchange_requests_count FROM items WHERE id = $1")
            .bind(s.requested_item)
            .fetch_one(s.fixture.pool())
            .await
            .unwrap();
    assert_eq!(requests, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_rejects_own_item() {
    let s = scenario().await;
    let mut new = request(&s);
    new.requester_id = s.owner;
    let err = s.service.create(new).await.unwrap_err();
    assert!(matches!(err, CoreError::OwnItemExchange));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_rejects_duplicate_active_pair() {
    let s = scenario().await;
    s.service.create(request(&s)).await.unwrap();
    let err = s.service.create(request(&s)).await.unwrap_err();
    assert!(matches!(err, CoreError::DuplicateActiveExchange));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_concurrent_creation_of_same_pair_admits_one() {
    let s = scenario().await;
    let service = Arc::new(ExchangeService::new(s.fixture.pool().clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let new = request(&s);
            tokio::spawn(async move { service.create(new).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(
                matches!(e, CoreError::DuplicateActiveExchange),
                "unexpected error: {}",
                e
            ),
        }
    }
    assert_eq!(created, 1);

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exchanges WHERE requested_item_id = $1 AND offered_item_id = $2",
    )
    .bind(s.requested_item)
    .bind(s.offered_item)
    .fetch_one(s.fixture.pool())
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_crossed_requests_both_succeed() {
    let s = scenario().await;
    let service = Arc::new(ExchangeService::new(s.fixture.pool().clone()));
    let category = s.fixture.insert_category("crossed").await;

    for round in 0..10 {
        let alice = s.fixture.insert_user(&format!("alice{}", round)).await;
        let bob = s.fixture.insert_user(&format!("bob{}", round)).await;
        let lamp = s.fixture.insert_item(alice, category, "Lámpara").await;
        let chair = s.fixture.insert_item(bob, category, "Silla").await;

        let crossed = [(alice, chair, lamp), (bob, lamp, chair)];
        let handles: Vec<_> = crossed
            .into_iter()
            .map(|(requester_id, requested_item_id, offered_item_id)| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .create(NewExchange {
                            requester_id,
                            requested_item_id,
                            offered_item_id,
                            message: None,
                            cash_difference: None,
                            cash_description: None,
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let exchange = handle.await.unwrap().unwrap();
            assert_eq!(exchange.status, ExchangeStatus::Pending);
        }
    }
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_rejects_requested_item_not_available() {
    let s = scenario().await;
    for status in ["exchanged", "reserved", "inactive"] {
        sqlx::query("UPDATE items SET status = $2 WHERE id = $1")
            .bind(s.requested_item)
            .bind(status)
            .execute(s.fixture.pool())
            .await
            .unwrap();

        let err = s.service.create(request(&s)).await.unwrap_err();
        assert!(
            matches!(err, CoreError::RequestedItemUnavailable(id) if id == s.requested_item),
            "status {} gave {}",
            status,
            err
        );
    }
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_rejects_negative_cash() {
    let s = scenario().await;
    let mut new = request(&s);
    new.cash_difference = Some(-5.0);
    let err = s.service.create(new).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidCashDifference));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_create_rejects_offered_item_of_someone_else() {
    let s = scenario().await;
    let mut new = request(&s);
    new.offered_item_id = s.requested_item;
    let err = s.service.create(new).await.unwrap_err();
    assert!(matches!(err, CoreError::OfferedItemUnavailable(_)));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_only_owner_can_accept() {
    let s = scenario().await;
    let exchange = s.service.create(request(&s)).await.unwrap();

    let err = s
        .service
        .apply(exchange.id, s.requester, ExchangeAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Transition(TransitionError::NotOwner)));

    let stranger = s.fixture.insert_user("stranger").await;
    let err = s
        .service
        .apply(exchange.id, stranger, ExchangeAction::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Transition(TransitionError::NotParticipant)
    ));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_full_lifecycle_marks_items_exchanged() {
    let s = scenario().await;
    let exchange = s.service.create(request(&s)).await.unwrap();
    let id = exchange.id;

    s.service.apply(id, s.owner, ExchangeAction::Accept).await.unwrap();
    let arranged = s
        .service
        .apply(
            id,
            s.requester,
            ExchangeAction::ArrangeMeeting {
                at: Utc::now() + Duration::days(2),
                location: "Parque del Retiro".to_string(),
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(arranged.status, ExchangeStatus::MeetingArranged);

    let half = s
        .service
        .apply(id, s.owner, ExchangeAction::ConfirmMeeting)
        .await
        .unwrap();
    assert_eq!(half.status, ExchangeStatus::MeetingArranged);
    let started = s
        .service
        .apply(id, s.requester, ExchangeAction::ConfirmMeeting)
        .await
        .unwrap();
    assert_eq!(started.status, ExchangeStatus::InProgress);

    let first = s
        .service
        .apply(id, s.requester, ExchangeAction::Complete { notes: None })
        .await
        .unwrap();
    assert_eq!(first.status, ExchangeStatus::InProgress);
    assert_eq!(item_status(&s, s.requested_item).await, ("available".to_string(), true));

    // 重复完成不改变任何状态
    let repeat = s
        .service
        .apply(id, s.requester, ExchangeAction::Complete { notes: None })
        .await
        .unwrap();
    assert_eq!(repeat.status, ExchangeStatus::InProgress);

    let done = s
        .service
        .apply(id, s.owner, ExchangeAction::Complete { notes: None })
        .await
        .unwrap();
    assert_eq!(done.status, ExchangeStatus::Completed);
    assert!(done.completed_at.is_some());

    for item in [s.requested_item, s.offered_item] {
        assert_eq!(item_status(&s, item).await, ("exchanged".to_string(), false));
    }

    let totals: Vec<i32> =
        sqlx::query_scalar("SELECT total_exchanges FROM users WHERE id = ANY($1) ORDER BY id")
            .bind(vec![s.requester, s.owner])
            .fetch_all(s.fixture.pool())
            .await
            .unwrap();
    assert_eq!(totals, vec![1, 1]);

    let err = s
        .service
        .apply(
            id,
            s.owner,
            ExchangeAction::Cancel {
                reason: "Ya no lo quiero".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Transition(TransitionError::IllegalState { .. })
    ));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_cancel_records_reason_and_actor() {
    let s = scenario().await;
    let exchange = s.service.create(request(&s)).await.unwrap();

    let cancelled = s
        .service
        .apply(
            exchange.id,
            s.requester,
            ExchangeAction::Cancel {
                reason: "Encontré otro".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, ExchangeStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(s.requester));
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Encontré otro"));

    // 终态后可以重新发起同一物品对
    s.service.create(request(&s)).await.unwrap();
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_outsider_cannot_view_exchange() {
    let s = scenario().await;
    let exchange = s.service.create(request(&s)).await.unwrap();
    let stranger = s.fixture.insert_user("viewer").await;

    assert!(s.service.get_for_participant(exchange.id, s.owner).await.is_ok());
    let err = s
        .service
        .get_for_participant(exchange.id, stranger)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Transition(TransitionError::NotParticipant)
    ));
}
