//! 奖励目录与兑换 API 处理器
//!
//! 用户与企业令牌都可以兑换，积分主体由令牌类型决定。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use greenloop_core::models::{Reward, RewardEvent, RewardEventType};
use greenloop_core::service::RedemptionReceipt;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    state::AppState,
};

/// 当前可兑换的奖励（启用且在有效期内）
///
/// GET /api/v1/rewards
pub async fn catalog(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Reward>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.rewards.catalog().await?)))
}

/// GET /api/v1/rewards/{id}
pub async fn get_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Reward>>, ApiError> {
    Ok(Json(ApiResponse::success(
        state.rewards.get_reward(reward_id).await?,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    #[serde(alias = "reward_id")]
    pub reward_id: Uuid,
}

/// 兑换奖励
///
/// POST /api/v1/rewards/redeem
pub async fn redeem(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<ApiResponse<RedemptionReceipt>>, ApiError> {
    let (actor_type, actor_id) = claims.actor();
    let receipt = state.rewards.redeem(actor_type, actor_id, req.reward_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        receipt,
        "Recompensa canjeada exitosamente",
    )))
}

async fn page_of_events(
    state: &AppState,
    claims: &Claims,
    event_type: Option<RewardEventType>,
    pagination: PaginationParams,
) -> Result<PageResponse<RewardEvent>, ApiError> {
    let (actor_type, actor_id) = claims.actor();
    let (events, total) = state
        .rewards
        .events(
            actor_type,
            actor_id,
            event_type,
            pagination.limit(),
            pagination.offset(),
        )
        .await?;
    Ok(PageResponse::new(
        events,
        total,
        pagination.page(),
        pagination.limit(),
    ))
}

/// 自己的兑换记录
///
/// GET /api/v1/rewards/redemptions
pub async fn redemptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<RewardEvent>>>, ApiError> {
    let page = page_of_events(&state, &claims, Some(RewardEventType::Redeem), pagination).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(alias = "event_type")]
    pub event_type: Option<RewardEventType>,
}

/// 完整积分流水
///
/// GET /api/v1/rewards/events
pub async fn events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<EventFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<RewardEvent>>>, ApiError> {
    let page = page_of_events(&state, &claims, filter.event_type, pagination).await?;
    Ok(Json(ApiResponse::success(page)))
}
