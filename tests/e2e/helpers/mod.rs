//! 测试辅助工具

mod api_client;

pub use api_client::*;

/// 生成不冲突的用户名后缀
pub fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}
