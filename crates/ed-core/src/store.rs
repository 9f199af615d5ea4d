//! 存储接口
//!
//! 所有业务操作都在一个事务内完成：`ClinicalStore::begin` 打开事务，
//! 业务逻辑通过 `ClinicalTx` 的行级原语读写，最后 `commit` 一次提交。
//! 未提交即丢弃的事务视为回滚。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::*;

/// 临床数据存储
#[async_trait]
pub trait ClinicalStore: Send + Sync + 'static {
    type Tx: ClinicalTx;

    /// 开启事务
    async fn begin(&self) -> Result<Self::Tx>;

    /// 存储是否可用
    async fn ping(&self) -> Result<()>;
}

/// 事务内的行级操作
///
/// `lock_*` 方法在返回数据的同时持有行锁直到事务结束。
///
/// 加锁顺序固定为：患者（`lock_patient`）→ 发药申请 → 医嘱 / 分诊 → 药品。
/// 分诊行只能在持有患者锁之后加锁；需要先知道患者时用不加锁的 `get_*` 读取。
#[async_trait]
pub trait ClinicalTx: Send {
    /// 提交事务
    async fn commit(self) -> Result<()>;

    // ========== 患者目录 ==========

    async fn insert_patient(&mut self, patient: &NewPatient) -> Result<Patient>;

    async fn get_patient(&mut self, national_id: &str) -> Result<Option<Patient>>;

    // ========== 就诊档案 ==========

    /// 按患者串行化档案的查找与创建
    async fn lock_patient(&mut self, national_id: &str) -> Result<()>;

    /// 患者全部档案，最新的在前
    async fn folders_for_patient(&mut self, national_id: &str) -> Result<Vec<VisitFolder>>;

    async fn get_folder(&mut self, folder_id: i64) -> Result<Option<VisitFolder>>;

    async fn insert_folder(&mut self, folder: &NewVisitFolder) -> Result<VisitFolder>;

    async fn set_folder_status(&mut self, folder_id: i64, status: FolderStatus) -> Result<()>;

    // ========== 档案子记录 ==========

    async fn find_record(&mut self, folder_id: i64, kind: RecordKind) -> Result<Option<ChildRecord>>;

    async fn insert_record(&mut self, record: &NewChildRecord) -> Result<ChildRecord>;

    async fn update_record(&mut self, record_id: i64, fields: &RecordFields) -> Result<ChildRecord>;

    async fn record_exists(&mut self, scope: &RecordScope, kind: RecordKind) -> Result<bool>;

    async fn records_for_folder(&mut self, folder_id: i64) -> Result<Vec<ChildRecord>>;

    // ========== 医嘱 ==========

    async fn insert_order(&mut self, order: &NewMedicalOrder) -> Result<MedicalOrder>;

    async fn lock_order(&mut self, order_id: i64) -> Result<Option<MedicalOrder>>;

    async fn update_order_instructions(
        &mut self,
        order_id: i64,
        instructions: &OrderInstructions,
        medication_id: Option<i64>,
    ) -> Result<MedicalOrder>;

    async fn complete_order(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalOrder>;

    /// 把档案内全部 PENDING 医嘱置为 CANCELLED，返回受影响的医嘱
    async fn cancel_pending_orders(&mut self, folder_id: i64) -> Result<Vec<i64>>;

    async fn orders_for_folder(&mut self, folder_id: i64) -> Result<Vec<MedicalOrder>>;

    /// 全部 PENDING 医嘱，最早的在前
    async fn pending_orders(&mut self) -> Result<Vec<MedicalOrder>>;

    // ========== 发药申请 ==========

    async fn insert_dispense(&mut self, request: &NewDispenseRequest) -> Result<DispenseRequest>;

    async fn lock_dispense(&mut self, request_id: i64) -> Result<Option<DispenseRequest>>;

    async fn set_dispense_status(
        &mut self,
        request_id: i64,
        status: DispenseStatus,
    ) -> Result<DispenseRequest>;

    async fn dispenses_for_order(&mut self, order_id: i64) -> Result<Vec<DispenseRequest>>;

    /// PENDING 与 READY 的申请，最早的在前；不含医嘱已取消或未执行的申请
    async fn open_dispenses(&mut self) -> Result<Vec<DispenseRequest>>;

    // ========== 药品与库存 ==========

    async fn insert_medication(&mut self, medication: &NewMedication) -> Result<Medication>;

    async fn get_medication(&mut self, medication_id: i64) -> Result<Option<Medication>>;

    async fn lock_medication(&mut self, medication_id: i64) -> Result<Option<Medication>>;

    async fn find_batch(
        &mut self,
        name: &str,
        concentration: Option<&str>,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Option<Medication>>;

    /// 调整可用数量，返回调整后的值
    async fn adjust_stock(&mut self, medication_id: i64, delta: i32) -> Result<i32>;

    /// 按名称或有效成分模糊查找，`None` 返回全部
    async fn search_medications(&mut self, term: Option<&str>) -> Result<Vec<Medication>>;

    async fn append_movement(&mut self, movement: &NewInventoryMovement) -> Result<InventoryMovement>;

    async fn movements_for(&mut self, medication_id: i64) -> Result<Vec<InventoryMovement>>;

    // ========== 分诊 ==========

    async fn insert_triage(&mut self, triage: &NewTriage) -> Result<Triage>;

    async fn get_triage(&mut self, triage_id: i64) -> Result<Option<Triage>>;

    async fn lock_triage(&mut self, triage_id: i64) -> Result<Option<Triage>>;

    async fn update_triage(
        &mut self,
        triage_id: i64,
        state: TriageState,
        attended_by: Option<&str>,
        location: Option<TriageLocation>,
    ) -> Result<Triage>;

    /// 档案内的分诊记录，最早的在前
    async fn triages_for_folder(&mut self, folder_id: i64) -> Result<Vec<Triage>>;

    async fn latest_triage_for_patient(&mut self, national_id: &str) -> Result<Option<Triage>>;

    /// 指定状态的分诊记录，最早的在前
    async fn triages_in_states(&mut self, states: &[TriageState]) -> Result<Vec<Triage>>;
}
