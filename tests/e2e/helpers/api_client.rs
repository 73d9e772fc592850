//! REST API 客户端
//!
//! 封装对 greenloop-api 的 HTTP 调用，自动解开 `{"success", "data"}` 响应外壳。

use anyhow::{Result, anyhow};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

use super::unique_suffix;

pub const TEST_PASSWORD: &str = "Reciclar2024";

/// API 客户端
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// 失败响应
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("创建 HTTP 客户端失败");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// 从环境变量读取服务地址
    pub fn from_env() -> Self {
        let url = std::env::var("GREENLOOP_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        Self::new(&url)
    }

    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    // ========== 认证 ==========

    /// 注册新用户并返回已登录的客户端
    pub async fn register_user(&self, prefix: &str) -> Result<(Self, RegisteredUser)> {
        let suffix = unique_suffix();
        let username = format!("{}_{}", prefix, suffix);
        let body = json!({
            "email": format!("{}@example.com", username),
            "username": username,
            "password": TEST_PASSWORD,
            "confirmPassword": TEST_PASSWORD,
            "firstName": "Prueba",
            "lastName": prefix,
            "city": "Bogotá",
            "acceptTerms": true,
            "acceptPrivacy": true,
        });
        let auth: AuthPayload = self.post("/api/v1/auth/register", &body).await?;
        let client = self.with_token(auth.tokens.access_token.clone());
        Ok((
            client,
            RegisteredUser {
                id: auth.user.id,
                username: auth.user.username,
                refresh_token: auth.tokens.refresh_token,
            },
        ))
    }

    // ========== 物品 ==========

    pub async fn first_category(&self) -> Result<Uuid> {
        let categories: Vec<IdOnly> = self.get("/api/v1/categories").await?;
        categories
            .first()
            .map(|c| c.id)
            .ok_or_else(|| anyhow!("没有可用分类，请先初始化分类数据"))
    }

    pub async fn create_item(&self, category_id: Uuid, title: &str) -> Result<Uuid> {
        let body = json!({
            "categoryId": category_id,
            "title": title,
            "description": "Artículo en buen estado para intercambio",
            "condition": "good",
            "city": "Bogotá",
        });
        let item: IdOnly = self.post("/api/v1/items", &body).await?;
        Ok(item.id)
    }

    // ========== 通用请求 ==========

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, Value>(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, R: Serialize>(&self, path: &str, body: &R) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, R: Serialize>(&self, path: &str, body: &R) -> Result<T> {
        self.send(Method::PUT, path, Some(body)).await
    }

    /// 发送请求并返回失败详情，用于断言错误路径
    pub async fn expect_failure<R: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&R>,
    ) -> Result<ApiFailure> {
        let resp = self.request(method, path, body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Err(anyhow!("期望失败，实际返回 {}", status));
        }
        let envelope: Value = resp.json().await?;
        Ok(ApiFailure {
            status,
            code: envelope["code"].as_str().unwrap_or_default().to_string(),
            message: envelope["message"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn send<T: DeserializeOwned, R: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&R>,
    ) -> Result<T> {
        let resp = self.request(method, path, body).send().await?;
        self.handle_response(resp).await
    }

    fn request<R: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&R>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle_response<T: DeserializeOwned>(&self, resp: Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            let envelope: Envelope<T> = resp.json().await?;
            Ok(envelope.data)
        } else {
            let error_text = resp.text().await.unwrap_or_default();
            Err(anyhow!("API 错误 {}: {}", status, error_text))
        }
    }
}

// ========== 响应类型 ==========

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdOnly {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    user: UserPayload,
    tokens: TokensPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensPayload {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeView {
    pub id: Uuid,
    pub status: String,
    pub status_display: String,
    pub my_role: String,
}

#[derive(Debug, Deserialize)]
pub struct RewardSummaryView {
    pub points: i32,
    pub tier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPreviewView {
    pub computed: RewardSummaryView,
    pub in_sync: bool,
}
