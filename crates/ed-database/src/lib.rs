//! # ED数据库模块
//!
//! 基于PostgreSQL的临床数据存储：连接池、建表语句、行模型以及 `ClinicalStore` 的事务实现。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::{DatabasePool, PoolSettings};
pub use models::*;
pub use queries::DatabaseQueries;
pub use store::{PgStore, PgTx};
