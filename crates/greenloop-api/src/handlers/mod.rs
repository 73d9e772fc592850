//! HTTP 请求处理器模块
//!
//! 按资源分组的 REST API 端点实现

pub mod admin;
pub mod auth;
pub mod category;
pub mod community;
pub mod company;
pub mod company_auth;
pub mod contribution;
pub mod exchange;
pub mod item;
pub mod message;
pub mod notification;
pub mod rating;
pub mod reward;
pub mod stats;
pub mod user;
