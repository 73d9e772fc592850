//! 企业积分 API 处理器

use axum::{Extension, Json, extract::State};
use greenloop_core::models::ActorType;
use greenloop_core::service::{RecomputeResult, RewardPreview};

use crate::{auth::Claims, dto::ApiResponse, error::ApiError, state::AppState};

/// GET /api/v1/companies/me/rewards
pub async fn my_rewards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RewardPreview>>, ApiError> {
    let preview = state
        .rewards
        .preview(ActorType::Company, claims.company_id()?)
        .await?;
    Ok(Json(ApiResponse::success(preview)))
}

/// POST /api/v1/companies/me/rewards/recompute
pub async fn recompute_my_rewards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RecomputeResult>>, ApiError> {
    let result = state
        .rewards
        .recompute(ActorType::Company, claims.company_id()?)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        result,
        "Puntos recalculados",
    )))
}
