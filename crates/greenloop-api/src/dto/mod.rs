//! DTO 模块
//!
//! 通用的响应包装与分页参数；各资源的请求体定义在对应 handler 中

pub mod request;
pub mod response;

pub use request::PaginationParams;
pub use response::{ApiResponse, CreatedResponse, PageResponse, UpdatedCount};
