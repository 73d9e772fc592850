//! 认证流程测试套件

use crate::helpers::*;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_register_then_fetch_profile() {
    let api = ApiClient::from_env();
    let (client, user) = api.register_user("perfil").await.unwrap();

    let profile: Value = client.get("/api/v1/users/profile").await.unwrap();
    assert_eq!(profile["id"], user.id.to_string());
    assert_eq!(profile["username"], user.username);
    assert_eq!(profile["rewardTier"], "Bronze");
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_duplicate_username_is_rejected() {
    let api = ApiClient::from_env();
    let (_, user) = api.register_user("dup").await.unwrap();

    let check: Value = api
        .post(
            "/api/v1/auth/check-username",
            &json!({ "username": user.username }),
        )
        .await
        .unwrap();
    assert_eq!(check["available"], false);
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_logout_revokes_session() {
    let api = ApiClient::from_env();
    let (client, _) = api.register_user("salida").await.unwrap();

    let _: Value = client
        .post("/api/v1/auth/logout", &json!({}))
        .await
        .unwrap();

    let failure = client
        .expect_failure::<Value>(Method::GET, "/api/v1/auth/me", None)
        .await
        .unwrap();
    assert_eq!(failure.status, StatusCode::UNAUTHORIZED);
    assert_eq!(failure.code, "SESSION_REVOKED");
}

#[tokio::test]
#[ignore = "需要运行服务"]
async fn test_refresh_rotates_tokens() {
    let api = ApiClient::from_env();
    let (_, user) = api.register_user("refresco").await.unwrap();

    let tokens: Value = api
        .post(
            "/api/v1/auth/refresh",
            &json!({ "refreshToken": user.refresh_token }),
        )
        .await
        .unwrap();
    assert!(tokens["accessToken"].as_str().is_some());
}
