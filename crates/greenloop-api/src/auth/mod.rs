//! 认证模块
//!
//! 提供 JWT Token 生成与验证、密码处理和会话管理

mod jwt;
mod password;
pub mod session;

pub use jwt::{Claims, JwtManager, PrincipalKind, TokenPair, TokenType};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use session::{SessionDto, SessionMeta, SessionStore, client_ip};
