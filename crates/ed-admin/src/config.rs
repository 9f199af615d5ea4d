//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! 内置默认值、可选的TOML配置文件、`ED__` 前缀的环境变量（如 `ED__DATABASE__URL`）。

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use ed_core::WorkflowPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// 急诊系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 工作流策略
    #[serde(default)]
    pub workflow: WorkflowPolicy,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时（秒）
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 表达式
    pub level: String,
    /// 输出格式
    pub format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://ed:ed@localhost:5432/ed_visit".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl EdConfig {
    /// 加载配置，配置文件不存在时只使用默认值和环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Self::defaults()?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let config = Self::build(
            builder.add_source(Environment::with_prefix("ED").separator("__")),
        )?;

        info!(
            config_path = config_path.unwrap_or("<none>"),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// 以内置默认值为底的构建器
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = Config::try_from(&EdConfig::default())
            .context("Failed to serialize default configuration")?;
        Ok(Config::builder().add_source(defaults))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: EdConfig = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool, &str); 4] = [
            ("server.port", self.server.port != 0, "Server port cannot be 0"),
            ("database.url", !self.database.url.trim().is_empty(), "Database url cannot be empty"),
            (
                "database.max_connections",
                self.database.max_connections > 0,
                "Database max connections cannot be 0",
            ),
            (
                "database.min_connections",
                self.database.min_connections <= self.database.max_connections,
                "Database min connections exceed max connections",
            ),
        ];

        for (field, ok, message) in checks {
            if !ok {
                error!(field, "Configuration validation failed: {}", message);
                return Err(anyhow::anyhow!("{}: {}", field, message));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use ed_core::{CancelledOrderStock, GateScope};

    fn from_toml(toml: &str) -> Result<EdConfig> {
        let builder = EdConfig::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        EdConfig::build(builder)
    }

    #[test]
    fn test_defaults_apply_without_sources() {
        let config = from_toml("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.workflow, WorkflowPolicy::default());
    }

    #[test]
    fn test_file_overrides_selected_keys() {
        let config = from_toml(
            r#"
            [server]
            port = 9090

            [database]
            url = "postgres://triage@db/ed"
            connect_timeout_secs = 5

            [workflow]
            gate_scope = "folder"
            cancelled_order_stock = "revert"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.url, "postgres://triage@db/ed");
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.workflow.gate_scope, GateScope::Folder);
        assert_eq!(config.workflow.cancelled_order_stock, CancelledOrderStock::Revert);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(from_toml("[server]\nport = 0").is_err());
        assert!(from_toml("[database]\nurl = \"  \"").is_err());
        assert!(from_toml("[database]\nmin_connections = 20\nmax_connections = 5").is_err());
    }

    #[test]
    fn test_unknown_policy_value_is_rejected() {
        assert!(from_toml("[workflow]\ngate_scope = \"ward\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EdConfig::load(Some("/nonexistent/ed-visit.toml")).unwrap();
        assert!(config.server.port > 0);
    }
}
