//! 错误定义模块

use serde::Serialize;
use thiserror::Error;

use crate::models::{OrderStatus, Prerequisite};

/// 错误类别
///
/// 调用方只需要按类别区分错误，具体原因保存在错误消息里。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Blocked,
    InsufficientStock,
    Conflict,
    Invalid,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Blocked => "blocked",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Internal => "internal",
        }
    }
}

/// 急诊系统统一错误类型
#[derive(Error, Debug)]
pub enum EdError {
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("操作被阻止: {0}")]
    Blocked(String),

    #[error("患者 {patient_id} 已登记死亡，禁止继续写入")]
    PatientDeceased { patient_id: String },

    #[error("缺少前置记录: {0}")]
    MissingPrerequisite(Prerequisite),

    #[error("医嘱 #{order_id} 当前状态为 {status}，不可编辑")]
    NotEditable { order_id: i64, status: OrderStatus },

    #[error("医嘱 #{order_id} 已存在进行中的发药申请")]
    DuplicateDispense { order_id: i64 },

    #[error("医嘱 #{order_id} 关联药品 #{expected}，申请药品为 #{requested}")]
    MedicationMismatch {
        order_id: i64,
        expected: i64,
        requested: i64,
    },

    #[error("档案 #{folder_id} 的患者当前不在诊治中")]
    NotBeingSeen { folder_id: i64 },

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("库存不足: 药品 #{medication_id} 可用 {available}，申请 {requested}")]
    InsufficientStock {
        medication_id: i64,
        available: i32,
        requested: i32,
    },

    #[error("数据冲突: {0}")]
    Conflict(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl EdError {
    /// 错误所属类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            EdError::NotFound(_) => ErrorKind::NotFound,
            EdError::Blocked(_)
            | EdError::PatientDeceased { .. }
            | EdError::MissingPrerequisite(_)
            | EdError::NotEditable { .. }
            | EdError::DuplicateDispense { .. }
            | EdError::MedicationMismatch { .. }
            | EdError::NotBeingSeen { .. }
            | EdError::InvalidStateTransition { .. } => ErrorKind::Blocked,
            EdError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            EdError::Conflict(_) => ErrorKind::Conflict,
            EdError::Validation(_) => ErrorKind::Invalid,
            EdError::Config(_)
            | EdError::Database(_)
            | EdError::Serialization(_)
            | EdError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        EdError::NotFound(format!("{} {} not found", entity, id))
    }
}

/// 急诊系统统一结果类型
pub type Result<T> = std::result::Result<T, EdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_variants_share_kind() {
        let errors = vec![
            EdError::PatientDeceased { patient_id: "V123".into() },
            EdError::MissingPrerequisite(Prerequisite::PhysicalExam),
            EdError::NotEditable { order_id: 1, status: OrderStatus::Fulfilled },
            EdError::DuplicateDispense { order_id: 1 },
            EdError::NotBeingSeen { folder_id: 3 },
        ];

        for error in errors {
            assert_eq!(error.kind(), ErrorKind::Blocked, "{}", error);
        }
    }

    #[test]
    fn test_deceased_is_distinct_from_not_found() {
        let deceased = EdError::PatientDeceased { patient_id: "V1".into() };
        let missing = EdError::not_found("patient", "V1");

        assert_ne!(deceased.kind(), missing.kind());
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_messages_name_the_missing_prerequisite() {
        let error = EdError::MissingPrerequisite(Prerequisite::Motive);
        assert!(error.to_string().contains("motive"));
    }
}
