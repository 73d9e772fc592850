//! 密码处理
//!
//! 提供密码哈希、验证与强度校验

use bcrypt::{DEFAULT_COST, hash, verify};
use validator::ValidationError;

use crate::error::ApiError;

/// 对密码进行哈希处理
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    hash(password, DEFAULT_COST).map_err(|e| ApiError::Internal(format!("密码哈希失败: {}", e)))
}

/// 验证密码；存储的哈希损坏时视为不匹配
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored password hash could not be verified");
        false
    })
}

/// 密码强度：8–100 个字符，至少包含一个大写字母、一个小写字母和一个数字
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    let fail = |msg: &'static str| {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(msg.into());
        Err(err)
    };
    if !(8..=100).contains(&len) {
        return fail("La contraseña debe tener entre 8 y 100 caracteres");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return fail("La contraseña debe contener al menos una letra mayúscula");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return fail("La contraseña debe contener al menos una letra minúscula");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return fail("La contraseña debe contener al menos un número");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "Reciclar2024";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed));
        assert!(!verify_password("wrong_password", &hashed));
        assert!(!verify_password(password, "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_strength("Reciclar2024").is_ok());
        assert!(validate_password_strength("Ab1").is_err());
        assert!(validate_password_strength("reciclar2024").is_err());
        assert!(validate_password_strength("RECICLAR2024").is_err());
        assert!(validate_password_strength("Reciclarsiempre").is_err());
        assert!(validate_password_strength(&format!("Aa1{}", "x".repeat(98))).is_err());
    }
}
