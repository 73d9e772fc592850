//! 通用响应 DTO
//!
//! 所有 REST API 共用的响应包装

use serde::Serialize;
use uuid::Uuid;

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "Operación exitosa")
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// 无数据的成功响应
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// 创建成功响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// 批量更新响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedCount {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        let page: PageResponse<u8> = PageResponse::new(vec![], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let page: PageResponse<u8> = PageResponse::new(vec![], 40, 2, 20);
        assert_eq!(page.total_pages, 2);
        let page: PageResponse<u8> = PageResponse::new(vec![], 0, 1, 20);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::message("ok")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["code"], "SUCCESS");
        assert!(json["data"].is_null());

        let json = serde_json::to_value(ApiResponse::success(CreatedResponse {
            id: Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(json["data"]["id"], Uuid::nil().to_string());
    }
}
