//! # 急诊就诊流程模块
//!
//! 就诊档案生命周期与跨模块一致性的核心逻辑：
//! - 档案解析：每次临床写入前沿用或新建就诊档案
//! - 子记录链接：每个档案每种记录至多一行
//! - 前置检查：诊断前必须已有就诊原因、体格检查和个人史
//! - 医嘱、发药申请、分诊三个状态机
//! - 档案关闭级联：关闭档案并取消待执行医嘱
//! - 库存台账：库存变动与流水

pub mod cascade;
pub mod dispense;
pub mod engine;
pub mod folder;
pub mod gate;
pub mod inventory;
pub mod memory_store;
pub mod orders;
pub mod records;
pub mod state_machine;
pub mod triage;

// 重新导出主要类型
pub use cascade::{ClosureReport, VisitClosureCascade};
pub use dispense::{DispenseInput, DispenseReceipt, DispenseRequestMachine};
pub use engine::{
    AuthorizedMedication, ClinicalEngine, ClinicalHistory, DiagnosisInput, DiagnosisOutcome,
    FolderHistory, TriageUpdate,
};
pub use folder::VisitFolderResolver;
pub use gate::PrerequisiteGate;
pub use inventory::{InventoryLedger, StockChange};
pub use memory_store::{MemoryStore, MemoryTx};
pub use orders::{MedicalOrderMachine, OrderOutcome};
pub use records::ChildRecordLinker;
pub use state_machine::{DispenseEvent, OrderEvent, StateMachine, TriageEvent};
pub use triage::{TriageInput, TriageStateMachine};
