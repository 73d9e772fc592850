//! 路由配置模块
//!
//! 按认证要求把端点分为四组：公开、可选认证、需登录、管理员。
//! 同一路径的不同方法可以分属不同组，merge 时按方法合并。

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};

use crate::{
    handlers,
    middleware::{auth_middleware, optional_auth_middleware, require_admin},
    state::AppState,
};

/// 公开路由，无需认证
fn public_routes() -> Router<AppState> {
    Router::new()
        // 认证
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/check-username", post(handlers::auth::check_username))
        .route("/auth/check-email", post(handlers::auth::check_email))
        .route(
            "/company-auth/register",
            post(handlers::company_auth::register),
        )
        .route("/company-auth/login", post(handlers::company_auth::login))
        .route(
            "/company-auth/refresh",
            post(handlers::company_auth::refresh),
        )
        // 分类
        .route("/categories", get(handlers::category::list_categories))
        .route("/categories/{id}", get(handlers::category::get_category))
        // 物品
        .route("/items", get(handlers::item::list_items))
        // 用户公开信息
        .route("/users/search", get(handlers::user::search_users))
        .route("/users/{id}", get(handlers::user::get_public_profile))
        .route("/users/{id}/items", get(handlers::user::get_user_items))
        // 评分统计
        .route(
            "/ratings/stats/{user_id}",
            get(handlers::rating::user_rating_stats),
        )
        // 社区
        .route(
            "/community/stats",
            get(handlers::community::community_stats),
        )
        .route("/community/top-users", get(handlers::community::top_users))
        .route("/community/posts", get(handlers::community::list_posts))
        // 企业贡献
        .route(
            "/contributions",
            get(handlers::contribution::list_contributions),
        )
        .route(
            "/contributions/categories",
            get(handlers::contribution::list_categories),
        )
        .route(
            "/contributions/{id}",
            get(handlers::contribution::get_contribution),
        )
        // 奖励目录
        .route("/rewards", get(handlers::reward::catalog))
        .route("/rewards/{id}", get(handlers::reward::get_reward))
        // 统计
        .route(
            "/stats/education-impact",
            get(handlers::stats::education_impact),
        )
        .route(
            "/stats/platform-metrics",
            get(handlers::stats::platform_metrics),
        )
}

/// 可选认证路由：登录时返回与当前用户相关的附加信息
fn optional_auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/status", get(handlers::auth::status))
        .route("/items/{id}", get(handlers::item::get_item))
        .route_layer(middleware::from_fn_with_state(
            state,
            optional_auth_middleware,
        ))
}

/// 用户与企业令牌共用的登录路由
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // 会话
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route(
            "/auth/sessions/{id}",
            delete(handlers::auth::revoke_session),
        )
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route("/company-auth/me", get(handlers::company_auth::me))
        .route("/company-auth/logout", post(handlers::company_auth::logout))
        // 用户资料
        .route(
            "/users/profile",
            get(handlers::user::get_profile).put(handlers::user::update_profile),
        )
        .route("/users/avatar", post(handlers::user::upload_avatar))
        .route("/users/me/rewards", get(handlers::user::my_rewards))
        .route(
            "/users/me/rewards/recompute",
            post(handlers::user::recompute_my_rewards),
        )
        // 物品
        .route("/items", post(handlers::item::create_item))
        .route("/items/mine", get(handlers::item::my_items))
        .route(
            "/items/{id}",
            put(handlers::item::update_item).delete(handlers::item::delete_item),
        )
        .route(
            "/items/{id}/status",
            put(handlers::item::update_item_status),
        )
        .route(
            "/items/{id}/images",
            post(handlers::item::upload_item_image),
        )
        .route(
            "/items/{id}/images/{image_id}",
            delete(handlers::item::delete_item_image),
        )
        // 交换
        .route(
            "/exchanges",
            get(handlers::exchange::list_exchanges).post(handlers::exchange::create_exchange),
        )
        .route("/exchanges/stats/user", get(handlers::exchange::user_stats))
        .route(
            "/exchanges/suggestions/{item_id}",
            get(handlers::exchange::suggestions),
        )
        .route(
            "/exchanges/{id}",
            get(handlers::exchange::get_exchange).put(handlers::exchange::update_exchange_status),
        )
        .route(
            "/exchanges/{id}/timeline",
            get(handlers::exchange::get_timeline),
        )
        .route(
            "/exchanges/{id}/accept",
            post(handlers::exchange::accept_exchange),
        )
        .route(
            "/exchanges/{id}/reject",
            post(handlers::exchange::reject_exchange),
        )
        .route(
            "/exchanges/{id}/meeting",
            post(handlers::exchange::arrange_meeting),
        )
        .route(
            "/exchanges/{id}/confirm",
            post(handlers::exchange::confirm_meeting),
        )
        .route(
            "/exchanges/{id}/complete",
            post(handlers::exchange::complete_exchange),
        )
        .route(
            "/exchanges/{id}/cancel",
            post(handlers::exchange::cancel_exchange),
        )
        .route(
            "/exchanges/{id}/report",
            post(handlers::exchange::report_exchange),
        )
        // 私信
        .route(
            "/messages/conversations",
            get(handlers::message::list_conversations),
        )
        .route(
            "/messages/conversation/{user_id}",
            get(handlers::message::get_conversation),
        )
        .route("/messages/send", post(handlers::message::send_message))
        .route("/messages/mark-read", put(handlers::message::mark_read))
        .route("/messages/search", get(handlers::message::search_messages))
        .route("/messages/stats", get(handlers::message::message_stats))
        .route("/messages/{id}", delete(handlers::message::delete_message))
        // 通知
        .route(
            "/notifications",
            get(handlers::notification::list_notifications),
        )
        .route(
            "/notifications/mark-read",
            post(handlers::notification::mark_read),
        )
        .route(
            "/notifications/stats",
            get(handlers::notification::notification_stats),
        )
        .route(
            "/notifications/settings",
            get(handlers::notification::notification_settings),
        )
        .route(
            "/notifications/{id}",
            delete(handlers::notification::delete_notification),
        )
        // 评分
        .route(
            "/ratings",
            get(handlers::rating::list_ratings).post(handlers::rating::create_rating),
        )
        .route("/ratings/pending", get(handlers::rating::pending_ratings))
        .route("/ratings/{id}", put(handlers::rating::update_rating))
        // 社区
        .route("/community/posts", post(handlers::community::create_post))
        .route(
            "/community/posts/{id}/like",
            post(handlers::community::toggle_like),
        )
        // 企业
        .route("/companies/me/rewards", get(handlers::company::my_rewards))
        .route(
            "/companies/me/rewards/recompute",
            post(handlers::company::recompute_my_rewards),
        )
        .route(
            "/contributions",
            post(handlers::contribution::create_contribution),
        )
        .route(
            "/contributions/my",
            get(handlers::contribution::my_contributions),
        )
        .route(
            "/contributions/{id}",
            put(handlers::contribution::update_contribution)
                .delete(handlers::contribution::delete_contribution),
        )
        .route(
            "/contributions/{id}/interest",
            post(handlers::contribution::register_interest),
        )
        // 奖励兑换
        .route("/rewards/redeem", post(handlers::reward::redeem))
        .route("/rewards/redemptions", get(handlers::reward::redemptions))
        .route("/rewards/events", get(handlers::reward::events))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// 管理员路由
///
/// `require_admin` 依赖 `auth_middleware` 注入的 Claims，后添加的层先执行
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/categories", post(handlers::category::create_category))
        .route(
            "/categories/{id}",
            put(handlers::category::update_category).delete(handlers::category::delete_category),
        )
        .route("/admin/dashboard", get(handlers::admin::dashboard))
        .route("/admin/users", get(handlers::admin::list_users))
        .route(
            "/admin/users/{id}",
            get(handlers::admin::get_user)
                .patch(handlers::admin::update_user)
                .delete(handlers::admin::deactivate_user),
        )
        .route(
            "/admin/users/{id}/admin",
            patch(handlers::admin::update_admin_role),
        )
        .route("/admin/items", get(handlers::admin::list_items))
        .route(
            "/admin/items/{id}/status",
            patch(handlers::admin::update_item_status),
        )
        .route("/admin/rewards", post(handlers::admin::create_reward))
        .route("/admin/rewards/{id}", patch(handlers::admin::update_reward))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// 构建完整的 API 路由
///
/// 不含 `/api/v1` 前缀，由调用方挂载
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(public_routes())
        .merge(optional_auth_routes(state.clone()))
        .merge(protected_routes(state.clone()))
        .merge(admin_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenloop_shared::config::AppConfig;
    use sqlx::postgres::PgPoolOptions;

    fn test_state() -> AppState {
        let config = AppConfig::default();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        AppState::new(pool, config)
    }

    #[tokio::test]
    async fn test_routes_construction() {
        let state = test_state();
        let _public = public_routes();
        let _optional = optional_auth_routes(state.clone());
        let _protected = protected_routes(state.clone());
        let _admin = admin_routes(state.clone());
        let _api: Router = api_routes(state.clone()).with_state(state);
    }
}
