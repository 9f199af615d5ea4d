//! 急诊就诊服务主程序

use anyhow::Context;
use clap::Parser;
use ed_admin::{init_logging, EdConfig, EdMetrics};
use ed_database::{DatabasePool, DatabaseQueries, PgStore, PoolSettings};
use ed_web::{AppState, WebServer};
use ed_workflow::ClinicalEngine;
use std::net::SocketAddr;
use tracing::{error, info};

/// 服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "ed-server")]
#[command(about = "急诊就诊档案服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 服务器端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 启动前创建数据库表和索引
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = EdConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // 初始化日志
    init_logging(&config.logging)?;

    info!("启动急诊就诊服务...");

    let pool = DatabasePool::connect(&PoolSettings {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout: config.database.connect_timeout(),
    })
    .await
    .context("Failed to connect to database")?;

    if args.init_schema {
        DatabaseQueries::new(&pool)
            .create_tables()
            .await
            .context("Failed to create database schema")?;
    }

    let engine = ClinicalEngine::new(PgStore::new(pool.clone()), config.workflow);
    let policy = engine.policy();
    info!(
        gate_scope = ?policy.gate_scope,
        cancelled_order_stock = ?policy.cancelled_order_stock,
        "Workflow policy"
    );
    let state = AppState::new(engine, EdMetrics::new()?);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.host))?;

    let result = WebServer::new(addr, state).run().await;
    if let Err(e) = &result {
        error!("服务器运行失败: {}", e);
    }

    pool.close().await;
    result
}
