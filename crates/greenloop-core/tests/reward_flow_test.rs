//! RewardService 集成测试
//!
//! 使用真实 PostgreSQL 验证积分重算、兑换与并发库存扣减。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p greenloop-core --test reward_flow_test -- --ignored
//! ```

use std::sync::Arc;

use greenloop_core::error::CoreError;
use greenloop_core::models::{ActorType, RewardEventType, RewardTier};
use greenloop_core::repository::ActivityRepository;
use greenloop_core::service::RewardService;
use greenloop_shared::test_utils::{TestFixture, test_pool};
use sqlx::PgPool;
use uuid::Uuid;

fn service(pool: &PgPool) -> RewardService {
    RewardService::new(
        pool.clone(),
        Arc::new(ActivityRepository::new(pool.clone())),
    )
}

async fn balance(pool: &PgPool, user_id: Uuid) -> (i32, String) {
    sqlx::query_as("SELECT reward_points, reward_tier FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("查询积分失败")
}

async fn event_count(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM reward_events WHERE actor_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("查询流水失败")
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_redeem_drops_tier_and_exhausts_stock() {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let user = fixture.insert_user_with_points("redeemer", 120, "Silver").await;
    let reward = fixture.insert_reward("Bolsa de tela", 50, "Bronze", 1).await;
    let service = service(&pool);

    let receipt = service.redeem(ActorType::User, user, reward).await.unwrap();
    assert_eq!(receipt.remaining_points, 70);
    assert_eq!(receipt.tier_after, RewardTier::Bronze);
    assert_eq!(receipt.remaining_stock, 0);
    assert_eq!(balance(&pool, user).await, (70, "Bronze".to_string()));

    let (events, total) = service
        .events(ActorType::User, user, Some(RewardEventType::Redeem), 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(events[0].points_delta, -50);
    assert_eq!(events[0].tier_before, Some(RewardTier::Silver));

    let err = service.redeem(ActorType::User, user, reward).await.unwrap_err();
    assert!(matches!(err, CoreError::RewardOutOfStock(_)));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_failed_redemption_leaves_no_trace() {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let user = fixture.insert_user_with_points("poor", 20, "Bronze").await;
    let reward = fixture.insert_reward("Taza", 50, "Bronze", 3).await;

    let err = service(&pool)
        .redeem(ActorType::User, user, reward)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InsufficientPoints {
            required: 50,
            available: 20
        }
    ));
    assert_eq!(balance(&pool, user).await, (20, "Bronze".to_string()));
    assert_eq!(event_count(&pool, user).await, 0);

    let stock: i32 = sqlx::query_scalar("SELECT stock FROM rewards WHERE id = $1")
        .bind(reward)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stock, 3);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_concurrent_redemption_of_last_unit() {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let reward = fixture.insert_reward("Última planta", 10, "Bronze", 1).await;
    let mut users = Vec::new();
    for i in 0..5 {
        users.push(
            fixture
                .insert_user_with_points(&format!("racer{}", i), 100, "Silver")
                .await,
        );
    }

    let service = Arc::new(service(&pool));
    let handles: Vec<_> = users
        .into_iter()
        .map(|user| {
            let service = service.clone();
            tokio::spawn(async move { service.redeem(ActorType::User, user, reward).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, CoreError::RewardOutOfStock(_))),
        }
    }
    assert_eq!(succeeded, 1);

    let stock: i32 = sqlx::query_scalar("SELECT stock FROM rewards WHERE id = $1")
        .bind(reward)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stock, 0);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_recompute_persists_and_appends_event() {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let category = fixture.insert_category("recompute").await;
    let user = fixture.insert_user("lister").await;
    for title in ["Lámpara", "Silla", "Mesa"] {
        fixture.insert_item(user, category, title).await;
    }
    let service = service(&pool);

    // 预览不写库
    let preview = service.preview(ActorType::User, user).await.unwrap();
    assert_eq!(preview.computed.points, 30);
    assert!(!preview.in_sync);
    assert_eq!(event_count(&pool, user).await, 0);

    let result = service.recompute(ActorType::User, user).await.unwrap();
    assert_eq!(result.summary.points, 30);
    assert_eq!(result.event.points_delta, 30);
    assert_eq!(balance(&pool, user).await, (30, "Bronze".to_string()));
    assert_eq!(event_count(&pool, user).await, 1);

    let preview = service.preview(ActorType::User, user).await.unwrap();
    assert!(preview.in_sync);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_unknown_reward() {
    let pool = test_pool().await;
    let fixture = TestFixture::new(pool.clone());
    let user = fixture.insert_user_with_points("ghost", 500, "Gold").await;
    let err = service(&pool)
        .redeem(ActorType::User, user, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RewardNotFound(_)));
}
