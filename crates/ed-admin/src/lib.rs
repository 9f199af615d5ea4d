//! # ED管理模块
//!
//! 配置加载、日志初始化和Prometheus指标

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::{DatabaseConfig, EdConfig, LogFormat, LoggingConfig, ServerConfig};
pub use logging::init_logging;
pub use metrics::EdMetrics;
