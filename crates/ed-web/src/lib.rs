//! # ED Web模块
//!
//! 急诊就诊引擎的HTTP接口：操作人上下文提取、角色校验、错误到状态码的映射和指标导出。

pub mod actor;
pub mod error;
pub mod handlers;
pub mod server;

pub use actor::ActorContext;
pub use error::ApiError;
pub use server::{AppState, WebServer};
