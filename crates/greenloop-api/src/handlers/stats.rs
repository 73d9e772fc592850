//! 平台统计 API 处理器
//!
//! 公开的影响力指标与平台运行指标，全部从业务表实时聚合。

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::{dto::ApiResponse, error::ApiError, state::AppState};

/// 每次完成交换估算避免的 CO2（kg），用于教育页面
const CO2_KG_PER_EXCHANGE_EDUCATION: f64 = 2.7;

/// 活跃社区的最少用户数
const MIN_COMMUNITY_USERS: i64 = 5;

/// 平台指标的统计窗口（天）
const METRICS_WINDOW_DAYS: i64 = 30;

/// 影响力指标卡片
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactStat {
    pub id: &'static str,
    pub title: &'static str,
    /// 展示值，如 "2.3M"、"850K"
    pub value: String,
    pub raw_value: f64,
    pub icon: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalStats {
    pub total_users: i64,
    pub total_items: i64,
    pub pending_exchanges: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationImpact {
    pub impact_stats: Vec<ImpactStat>,
    pub additional_stats: AdditionalStats,
}

/// 大数字缩写：百万保留一位小数，千取整
fn compact(value: f64, small_decimals: usize) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.0}K", value / 1_000.0)
    } else {
        format!("{:.*}", small_decimals, value)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(sqlx::FromRow)]
struct ImpactCounts {
    completed_exchanges: i64,
    educated_users: i64,
    active_communities: i64,
    total_users: i64,
    total_items: i64,
    pending_exchanges: i64,
}

/// 教育页面影响力统计
///
/// GET /api/v1/stats/education-impact
#[instrument(skip(state))]
pub async fn education_impact(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<EducationImpact>>, ApiError> {
    let counts = sqlx::query_as::<_, ImpactCounts>(
        r#"
        SELECT (SELECT COUNT(*) FROM exchanges WHERE status = 'completed') AS completed_exchanges,
               (SELECT COUNT(*) FROM (
                    SELECT requester_id FROM exchanges WHERE status = 'completed'
                    UNION
                    SELECT owner_id FROM exchanges WHERE status = 'completed'
               ) p) AS educated_users,
               (SELECT COUNT(*) FROM (
                    SELECT city FROM users
                    WHERE city IS NOT NULL AND city <> ''
                    GROUP BY city HAVING COUNT(*) >= $1
               ) c) AS active_communities,
               (SELECT COUNT(*) FROM users) AS total_users,
               (SELECT COUNT(*) FROM items WHERE is_active) AS total_items,
               (SELECT COUNT(*) FROM exchanges WHERE status = 'pending') AS pending_exchanges
        "#,
    )
    .bind(MIN_COMMUNITY_USERS)
    .fetch_one(&state.pool)
    .await?;

    let co2_tons = counts.completed_exchanges as f64 * CO2_KG_PER_EXCHANGE_EDUCATION / 1000.0;

    let impact_stats = vec![
        ImpactStat {
            id: "co2-saved",
            title: "Toneladas de CO₂ evitadas",
            value: compact(co2_tons, 1),
            raw_value: co2_tons,
            icon: "Leaf",
            color: "green",
        },
        ImpactStat {
            id: "objects-exchanged",
            title: "Objetos intercambiados",
            value: compact(counts.completed_exchanges as f64, 0),
            raw_value: counts.completed_exchanges as f64,
            icon: "Recycle",
            color: "blue",
        },
        ImpactStat {
            id: "users-educated",
            title: "Usuarios educados",
            value: compact(counts.educated_users as f64, 0),
            raw_value: counts.educated_users as f64,
            icon: "Users",
            color: "purple",
        },
        ImpactStat {
            id: "active-communities",
            title: "Comunidades activas",
            value: compact(counts.active_communities as f64, 0),
            raw_value: counts.active_communities as f64,
            icon: "Globe",
            color: "orange",
        },
    ];

    Ok(Json(ApiResponse::success(EducationImpact {
        impact_stats,
        additional_stats: AdditionalStats {
            total_users: counts.total_users,
            total_items: counts.total_items,
            pending_exchanges: counts.pending_exchanges,
            last_updated: Utc::now(),
        },
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub new_exchanges_30d: i64,
    pub new_users_30d: i64,
    pub new_items_30d: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHealth {
    pub exchange_success_rate: f64,
    pub total_exchanges: i64,
    pub completed_exchanges: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMetrics {
    pub daily_avg_exchanges: f64,
    pub daily_avg_users: f64,
    pub daily_avg_items: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetrics {
    pub recent_activity: RecentActivity,
    pub platform_health: PlatformHealth,
    pub growth_metrics: GrowthMetrics,
}

impl PlatformMetrics {
    fn build(recent: RecentActivity, total_exchanges: i64, completed_exchanges: i64) -> Self {
        let per_day = |n: i64| round1(n as f64 / METRICS_WINDOW_DAYS as f64);
        let success_rate = if total_exchanges > 0 {
            round1(completed_exchanges as f64 / total_exchanges as f64 * 100.0)
        } else {
            0.0
        };
        Self {
            growth_metrics: GrowthMetrics {
                daily_avg_exchanges: per_day(recent.new_exchanges_30d),
                daily_avg_users: per_day(recent.new_users_30d),
                daily_avg_items: per_day(recent.new_items_30d),
            },
            platform_health: PlatformHealth {
                exchange_success_rate: success_rate,
                total_exchanges,
                completed_exchanges,
            },
            recent_activity: recent,
        }
    }
}

/// 近 30 天平台运行指标
///
/// GET /api/v1/stats/platform-metrics
#[instrument(skip(state))]
pub async fn platform_metrics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PlatformMetrics>>, ApiError> {
    let recent = sqlx::query_as::<_, RecentActivity>(
        r#"
        SELECT (SELECT COUNT(*) FROM exchanges
                WHERE created_at >= NOW() - make_interval(days => $1)) AS new_exchanges_30d,
               (SELECT COUNT(*) FROM users
                WHERE created_at >= NOW() - make_interval(days => $1)) AS new_users_30d,
               (SELECT COUNT(*) FROM items
                WHERE is_active AND created_at >= NOW() - make_interval(days => $1)) AS new_items_30d
        "#,
    )
    .bind(METRICS_WINDOW_DAYS as i32)
    .fetch_one(&state.pool)
    .await?;

    let (total, completed): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'completed') FROM exchanges",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(PlatformMetrics::build(
        recent, total, completed,
    ))))
}
