//! 图片上传
//!
//! 校验 multipart 中的 `file` 字段并写入 `{uploads.dir}/{kind}/{uuid}.{ext}`，
//! 对外地址为 `/uploads/{kind}/{file}`。

use std::path::PathBuf;

use axum::extract::Multipart;
use greenloop_shared::config::UploadConfig;
use uuid::Uuid;

use crate::error::{ApiError, Result};

/// 上传目标目录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Avatars,
    Items,
}

impl UploadKind {
    fn dir(&self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::Items => "items",
        }
    }
}

/// 已保存的文件
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub url: String,
    pub original_filename: Option<String>,
    pub size: usize,
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

/// 校验类型与大小
pub fn validate_image(
    config: &UploadConfig,
    content_type: Option<&str>,
    size: usize,
) -> Result<()> {
    let allowed = content_type
        .is_some_and(|ct| config.allowed_image_types.iter().any(|a| a.eq_ignore_ascii_case(ct)));
    if !allowed {
        return Err(ApiError::bad_request("Solo se permiten archivos de imagen"));
    }
    if size > config.max_file_size_bytes {
        return Err(ApiError::bad_request(format!(
            "El archivo es demasiado grande. Máximo {}MB",
            config.max_file_size_mb()
        )));
    }
    Ok(())
}

/// 读取 multipart 的 `file` 字段并保存
pub async fn save_image(
    config: &UploadConfig,
    kind: UploadKind,
    multipart: &mut Multipart,
) -> Result<StoredFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Formulario inválido: {}", e.body_text())))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_ascii_lowercase);
        let original_filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Formulario inválido: {}", e.body_text())))?;

        validate_image(config, content_type.as_deref(), bytes.len())?;

        let file_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            extension_for(content_type.as_deref().unwrap_or_default())
        );
        let dir = PathBuf::from(&config.dir).join(kind.dir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ApiError::Internal(format!("创建上传目录失败: {}", e)))?;
        tokio::fs::write(dir.join(&file_name), &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("写入上传文件失败: {}", e)))?;

        tracing::info!(kind = kind.dir(), file = %file_name, size = bytes.len(), "Image uploaded");

        return Ok(StoredFile {
            url: format!("/uploads/{}/{}", kind.dir(), file_name),
            original_filename,
            size: bytes.len(),
        });
    }

    Err(ApiError::bad_request("No se ha enviado ningún archivo"))
}

/// 删除本地文件；文件不存在时忽略
pub async fn remove_file(config: &UploadConfig, url: &str) {
    let Some(relative) = url.strip_prefix("/uploads/") else {
        return;
    };
    if relative.contains("..") {
        return;
    }
    let path = PathBuf::from(&config.dir).join(relative);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(path = %path.display(), error = %e, "Upload cleanup skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image() {
        let config = UploadConfig::default();
        assert!(validate_image(&config, Some("image/png"), 1024).is_ok());
        assert!(validate_image(&config, Some("IMAGE/JPEG"), 1024).is_ok());

        let err = validate_image(&config, Some("application/pdf"), 10).unwrap_err();
        assert_eq!(err.to_string(), "Solo se permiten archivos de imagen");
        assert!(validate_image(&config, None, 10).is_err());

        let err = validate_image(&config, Some("image/png"), config.max_file_size_bytes + 1)
            .unwrap_err();
        assert_eq!(err.to_string(), "El archivo es demasiado grande. Máximo 5MB");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
    }
}
