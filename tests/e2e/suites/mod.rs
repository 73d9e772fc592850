//! 测试套件

pub mod auth;
pub mod exchange_flow;
pub mod rewards;
