//! 中间件模块
//!
//! 提供认证、管理员权限检查和安全响应头中间件

mod auth;
mod permission;
mod security;

pub use auth::{auth_middleware, authenticate, bearer_token, optional_auth_middleware};
pub use permission::{AdminRole, admin_role, require_admin};
pub use security::security_headers;
