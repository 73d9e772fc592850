//! 交换生命周期测试套件
//!
//! 两个用户各发布一件物品，完整走完 请求 → 接受 → 约见 → 双方确认 → 双方完成。

use crate::helpers::*;
use chrono::{Duration, Utc};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

struct Pair {
    requester: ApiClient,
    owner: ApiClient,
    requested_item: Uuid,
    offered_item: Uuid,
}

async fn setup_pair() -> Pair {
    let api = ApiClient::from_env();
    let (owner, _) = api.register_user("dueno").await.unwrap();
    let (requester, _) = api.register_user("solicita").await.unwrap();

    let category = owner.first_category().await.unwrap();
    let requested_item = owner
        .create_item(category, "Bicicleta urbana")
        .await
        .unwrap();
    let offered_item = requester
        .create_item(category, "Guitarra acústica")
        .await
        .unwrap();

    Pair {
        requester,
        owner,
        requested_item,
        offered_item,
    }
}

async fn create_exchange(pair: &Pair) -> ExchangeView {
    pair.requester
        .post(
            "/api/v1/exchanges",
            &json!({
                "requestedItemId": pair.requested_item,
                "offeredItemId": pair.offered_item,
                "message": "¿Te interesa cambiar?",
            }),
        )
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_full_exchange_lifecycle() {
    let pair = setup_pair().await;
    let exchange = create_exchange(&pair).await;
    assert_eq!(exchange.status, "pending");
    assert_eq!(exchange.my_role, "requester");

    let path = |action: &str| format!("/api/v1/exchanges/{}/{}", exchange.id, action);

    let accepted: ExchangeView = pair.owner.post(&path("accept"), &json!({})).await.unwrap();
    assert_eq!(accepted.status, "accepted");

    let meeting: ExchangeView = pair
        .requester
        .post(
            &path("meeting"),
            &json!({
                "meetingDatetime": Utc::now() + Duration::days(2),
                "meetingLocation": "Parque de la 93",
            }),
        )
        .await
        .unwrap();
    assert_eq!(meeting.status, "meeting_arranged");

    let first: ExchangeView = pair.owner.post(&path("confirm"), &json!({})).await.unwrap();
    assert_eq!(first.status, "meeting_arranged");
    let both: ExchangeView = pair
        .requester
        .post(&path("confirm"), &json!({}))
        .await
        .unwrap();
    assert_eq!(both.status, "in_progress");

    let half: ExchangeView = pair
        .owner
        .post(&path("complete"), &json!({}))
        .await
        .unwrap();
    assert_eq!(half.status, "in_progress");
    let done: ExchangeView = pair
        .requester
        .post(&path("complete"), &json!({ "notes": "Todo perfecto" }))
        .await
        .unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(done.status_display, "Completado");

    let item: Value = pair
        .owner
        .get(&format!("/api/v1/items/{}", pair.requested_item))
        .await
        .unwrap();
    assert_eq!(item["status"], "exchanged");
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_duplicate_active_exchange_is_rejected() {
    let pair = setup_pair().await;
    create_exchange(&pair).await;

    let failure = pair
        .requester
        .expect_failure(
            Method::POST,
            "/api/v1/exchanges",
            Some(&json!({
                "requestedItemId": pair.requested_item,
                "offeredItemId": pair.offered_item,
            })),
        )
        .await
        .unwrap();
    assert_eq!(failure.status, StatusCode::BAD_REQUEST);
    assert_eq!(failure.code, "DUPLICATE_ACTIVE_EXCHANGE");
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_requester_cannot_accept() {
    let pair = setup_pair().await;
    let exchange = create_exchange(&pair).await;

    let failure = pair
        .requester
        .expect_failure(
            Method::POST,
            &format!("/api/v1/exchanges/{}/accept", exchange.id),
            Some(&json!({})),
        )
        .await
        .unwrap();
    assert_eq!(failure.status, StatusCode::FORBIDDEN);
    assert_eq!(failure.code, "NOT_OWNER");
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_cancel_after_accept_keeps_items_available() {
    let pair = setup_pair().await;
    let exchange = create_exchange(&pair).await;
    let _: ExchangeView = pair
        .owner
        .post(
            &format!("/api/v1/exchanges/{}/accept", exchange.id),
            &json!({}),
        )
        .await
        .unwrap();

    let cancelled: ExchangeView = pair
        .requester
        .post(
            &format!("/api/v1/exchanges/{}/cancel", exchange.id),
            &json!({ "reason": "Ya no lo necesito" }),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let item: Value = pair
        .owner
        .get(&format!("/api/v1/items/{}", pair.requested_item))
        .await
        .unwrap();
    assert_eq!(item["status"], "available");
}
