//! 可配置的工作流策略
//!
//! 两个悬而未决的设计问题以策略形式暴露，默认值保持原有行为。

use serde::{Deserialize, Serialize};

/// 诊断前置检查的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GateScope {
    /// 患者任意历史档案中存在即可
    #[default]
    Patient,
    /// 只认当前就诊档案中的记录
    Folder,
}

/// 档案关闭时被取消的医嘱是否回退库存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancelledOrderStock {
    #[default]
    Retain,
    Revert,
}

/// 工作流策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkflowPolicy {
    #[serde(default)]
    pub gate_scope: GateScope,
    #[serde(default)]
    pub cancelled_order_stock: CancelledOrderStock,
}
