//! 会话管理
//!
//! 每次登录或注册创建一条会话记录，只保存令牌的 SHA-256 摘要。
//! 用户会话与企业会话分表存储，结构相同。

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::jwt::{PrincipalKind, TokenPair};
use crate::error::Result;

/// 令牌摘要（十六进制）
pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 客户端 IP：优先 X-Forwarded-For 的第一个地址，其次 X-Real-IP
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|ip| ip.trim().to_string())
        })
}

fn tables(kind: PrincipalKind) -> (&'static str, &'static str) {
    match kind {
        PrincipalKind::User => ("user_sessions", "user_id"),
        PrincipalKind::Company => ("company_sessions", "company_id"),
    }
}

/// 从 User-Agent 推导设备名称
pub fn device_name(user_agent: Option<&str>) -> String {
    let Some(ua) = user_agent.map(str::to_ascii_lowercase) else {
        return "Dispositivo desconocido".to_string();
    };
    let os = if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        return "Dispositivo desconocido".to_string();
    };
    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("chrome") {
        "Chrome"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else {
        return os.to_string();
    };
    format!("{} en {}", browser, os)
}

/// 位置描述：城市与国家都缺失时为"Ubicación desconocida"
pub fn location_display(city: Option<&str>, country: Option<&str>) -> String {
    match (city, country) {
        (Some(city), Some(country)) => format!("{}, {}", city, country),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => "Ubicación desconocida".to_string(),
    }
}

/// 会话记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub is_active: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRow {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_revoked && self.expires_at > now
    }
}

/// 会话响应 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: Uuid,
    pub device_name: String,
    pub location: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_until_expiry_hours: i64,
    pub is_current: bool,
}

impl SessionDto {
    pub fn from_row(row: SessionRow, current: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            device_name: row
                .device_info
                .clone()
                .unwrap_or_else(|| device_name(row.user_agent.as_deref())),
            location: location_display(row.city.as_deref(), row.country.as_deref()),
            time_until_expiry_hours: (row.expires_at - now).num_hours().max(0),
            is_current: row.id == current,
            id: row.id,
            ip_address: row.ip_address,
            created_at: row.created_at,
            last_activity: row.last_activity,
            expires_at: row.expires_at,
        }
    }
}

/// 会话元数据
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// 会话仓储
pub struct SessionStore;

impl SessionStore {
    fn select(kind: PrincipalKind) -> String {
        let (table, owner) = tables(kind);
        format!(
            r#"
            SELECT id, {owner} AS owner_id, access_token_hash, refresh_token_hash, device_info, user_agent, ip_address,
                   country, city, is_active, is_revoked, created_at, last_activity, expires_at
            FROM {table}
            "#
        )
    }

    /// 预先分配会话 ID，签发令牌后再写入
    pub async fn create(
        tx: &mut PgConnection,
        kind: PrincipalKind,
        session_id: Uuid,
        owner_id: Uuid,
        tokens: &TokenPair,
        meta: &SessionMeta,
    ) -> Result<()> {
        let (table, owner) = tables(kind);
        let sql = format!(
            r#"
            INSERT INTO {table}
                (id, {owner}, access_token_hash, refresh_token_hash, device_info, user_agent,
                 ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        );
        sqlx::query(&sql)
            .bind(session_id)
            .bind(owner_id)
            .bind(token_hash(&tokens.access_token))
            .bind(token_hash(&tokens.refresh_token))
            .bind(device_name(meta.user_agent.as_deref()))
            .bind(&meta.user_agent)
            .bind(&meta.ip_address)
            .bind(tokens.refresh_expires_at)
            .execute(tx)
            .await?;
        Ok(())
    }

    pub async fn get(
        pool: &PgPool,
        kind: PrincipalKind,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>> {
        let sql = format!("{} WHERE id = $1", Self::select(kind));
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    /// 刷新时就地轮换两个令牌
    pub async fn rotate(
        pool: &PgPool,
        kind: PrincipalKind,
        session_id: Uuid,
        tokens: &TokenPair,
    ) -> Result<()> {
        let (table, _) = tables(kind);
        let sql = format!(
            r#"
            UPDATE {table}
            SET access_token_hash = $2, refresh_token_hash = $3, expires_at = $4, last_activity = NOW()
            WHERE id = $1
            "#
        );
        sqlx::query(&sql)
            .bind(session_id)
            .bind(token_hash(&tokens.access_token))
            .bind(token_hash(&tokens.refresh_token))
            .bind(tokens.refresh_expires_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn touch(pool: &PgPool, kind: PrincipalKind, session_id: Uuid) -> Result<()> {
        let (table, _) = tables(kind);
        let sql = format!("UPDATE {table} SET last_activity = NOW() WHERE id = $1");
        sqlx::query(&sql).bind(session_id).execute(pool).await?;
        Ok(())
    }

    /// 列出主体仍有效的会话
    pub async fn list_active(
        pool: &PgPool,
        kind: PrincipalKind,
        owner_id: Uuid,
    ) -> Result<Vec<SessionRow>> {
        let (_, owner) = tables(kind);
        let sql = format!(
            "{} WHERE {owner} = $1 AND is_active AND NOT is_revoked AND expires_at > NOW() ORDER BY last_activity DESC",
            Self::select(kind)
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(owner_id)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// 撤销一个会话，返回是否命中
    pub async fn revoke(
        pool: &PgPool,
        kind: PrincipalKind,
        owner_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool> {
        let (table, owner) = tables(kind);
        let sql = format!(
            r#"
            UPDATE {table}
            SET is_revoked = TRUE, is_active = FALSE, revoked_at = NOW()
            WHERE id = $1 AND {owner} = $2 AND NOT is_revoked
            "#
        );
        let result = sqlx::query(&sql)
            .bind(session_id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 撤销主体的全部会话
    pub async fn revoke_all(
        tx: &mut PgConnection,
        kind: PrincipalKind,
        owner_id: Uuid,
    ) -> Result<u64> {
        let (table, owner) = tables(kind);
        let sql = format!(
            r#"
            UPDATE {table}
            SET is_revoked = TRUE, is_active = FALSE, revoked_at = NOW()
            WHERE {owner} = $1 AND NOT is_revoked
            "#
        );
        let result = sqlx::query(&sql).bind(owner_id).execute(tx).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_hash_is_stable_hex() {
        let a = token_hash("abc");
        assert_eq!(a.len(), 64);
        assert_eq!(a, token_hash("abc"));
        assert_eq!(
            a,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_device_name() {
        let chrome_win = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
        assert_eq!(device_name(Some(chrome_win)), "Chrome en Windows");
        let safari_ios = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1";
        assert_eq!(device_name(Some(safari_ios)), "Safari en iOS");
        assert_eq!(device_name(Some("curl/8.0")), "Dispositivo desconocido");
        assert_eq!(device_name(None), "Dispositivo desconocido");
    }

    #[test]
    fn test_location_display() {
        assert_eq!(location_display(Some("Madrid"), Some("España")), "Madrid, España");
        assert_eq!(location_display(None, Some("España")), "España");
        assert_eq!(location_display(None, None), "Ubicación desconocida");
    }

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        let mut row = SessionRow {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            access_token_hash: String::new(),
            refresh_token_hash: String::new(),
            device_info: None,
            user_agent: None,
            ip_address: None,
            country: None,
            city: None,
            is_active: true,
            is_revoked: false,
            created_at: now,
            last_activity: now,
            expires_at: now + chrono::Duration::days(1),
        };
        assert!(row.is_valid(now));
        let dto = SessionDto::from_row(row.clone(), row.id, now);
        assert!(dto.is_current);
        assert_eq!(dto.time_until_expiry_hours, 24);
        row.is_revoked = true;
        assert!(!row.is_valid(now));
    }
}
