//! # ED Core
//!
//! 急诊就诊系统的核心模块，提供基础数据结构、错误定义、存储接口和通用工具。

pub mod error;
pub mod models;
pub mod policy;
pub mod store;
pub mod utils;

pub use error::{EdError, ErrorKind, Result};
pub use models::*;
pub use policy::{CancelledOrderStock, GateScope, WorkflowPolicy};
pub use store::{ClinicalStore, ClinicalTx};
