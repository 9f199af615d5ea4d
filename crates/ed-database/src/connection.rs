//! 数据库连接管理

use ed_core::{EdError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// 连接池参数
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

/// 数据库连接池
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(&settings.url)
            .await
            .map_err(|e| EdError::Database(e.to_string()))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Database pool connected"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EdError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
