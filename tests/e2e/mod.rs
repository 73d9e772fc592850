//! GreenLoop 端到端测试
//!
//! 针对运行中的 greenloop-api 发起真实 HTTP 请求，覆盖：
//! - 注册、登录与会话
//! - 物品发布与交换生命周期
//! - 积分奖励与兑换
//!
//! 运行前需启动服务与数据库，通过 `GREENLOOP_API_URL` 指定地址。

pub mod helpers;
pub mod suites;
