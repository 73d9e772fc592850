//! 通用请求参数

use serde::Deserialize;

/// 分页参数
///
/// 同时接受 `pageSize` 与 `page_size`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size", alias = "page_size", alias = "limit")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    /// 计算数据库查询的 offset
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    /// 获取限制条数（最大100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }

    pub fn page(&self) -> i64 {
        self.page.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let p = PaginationParams {
            page: 3,
            page_size: 20,
        };
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);

        let p = PaginationParams {
            page: 0,
            page_size: 500,
        };
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 100);
        assert_eq!(p.page(), 1);
    }

    #[test]
    fn test_snake_case_alias() {
        let p: PaginationParams = serde_json::from_str(r#"{"page": 2, "page_size": 5}"#).unwrap();
        assert_eq!(p.limit(), 5);
        let p: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!((p.page, p.page_size), (1, 20));
    }
}
