//! PostgreSQL 存储实现
//!
//! 每个业务事务对应一个数据库事务。档案解析用按患者的事务级咨询锁串行化，
//! 医嘱、药品、发药申请、分诊行使用 `SELECT ... FOR UPDATE`。
//! 咨询锁总是先于行锁获取，否则与档案关闭级联会形成死锁。

use crate::connection::DatabasePool;
use crate::models::*;
use crate::queries::{UQ_ACTIVE_DISPENSE, UQ_MEDICATION_BATCH, UQ_ONE_OPEN_FOLDER};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ed_core::models::*;
use ed_core::{ClinicalStore, ClinicalTx, EdError, Result};
use sqlx::{Postgres, Transaction};

/// 把 sqlx 错误映射为统一错误；唯一性冲突按约束名区分
fn db_error(err: sqlx::Error) -> EdError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return match db_err.constraint() {
                Some(UQ_ONE_OPEN_FOLDER) => {
                    EdError::Blocked("patient already has an open visit folder".to_string())
                }
                Some(UQ_ACTIVE_DISPENSE) => {
                    EdError::Blocked("order already has an active dispense request".to_string())
                }
                Some(UQ_MEDICATION_BATCH) => {
                    EdError::Conflict("medication batch already registered".to_string())
                }
                Some(other) => EdError::Conflict(format!("unique constraint {} violated", other)),
                None => EdError::Conflict(db_err.message().to_string()),
            };
        }
    }
    EdError::Database(err.to_string())
}

/// 子串匹配模式；搜索词里的通配符按字面匹配
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// PostgreSQL 存储
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClinicalStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self.pool.pool().begin().await.map_err(db_error)?;
        Ok(PgTx { tx })
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

/// PostgreSQL 事务；未提交即丢弃时回滚
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ClinicalTx for PgTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_error)
    }

    // ========== 患者目录 ==========

    async fn insert_patient(&mut self, patient: &NewPatient) -> Result<Patient> {
        let row = sqlx::query_as::<_, DbPatient>(
            r#"
            INSERT INTO patients (national_id, full_name, birth_date, phone, address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&patient.national_id)
        .bind(&patient.full_name)
        .bind(patient.birth_date)
        .bind(&patient.phone)
        .bind(&patient.address)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.into())
    }

    async fn get_patient(&mut self, national_id: &str) -> Result<Option<Patient>> {
        let row = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE national_id = $1")
            .bind(national_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        Ok(row.map(Patient::from))
    }

    // ========== 就诊档案 ==========

    async fn lock_patient(&mut self, national_id: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(national_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn folders_for_patient(&mut self, national_id: &str) -> Result<Vec<VisitFolder>> {
        let rows = sqlx::query_as::<_, DbVisitFolder>(
            "SELECT * FROM visit_folders WHERE patient_id = $1 ORDER BY id DESC",
        )
        .bind(national_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    async fn get_folder(&mut self, folder_id: i64) -> Result<Option<VisitFolder>> {
        let row = sqlx::query_as::<_, DbVisitFolder>("SELECT * FROM visit_folders WHERE id = $1")
            .bind(folder_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        row.map(VisitFolder::try_from).transpose()
    }

    async fn insert_folder(&mut self, folder: &NewVisitFolder) -> Result<VisitFolder> {
        let row = sqlx::query_as::<_, DbVisitFolder>(
            r#"
            INSERT INTO visit_folders (patient_id, status, created_by, created_by_name)
            VALUES ($1, 'OPEN', $2, $3)
            RETURNING *
            "#,
        )
        .bind(&folder.patient_id)
        .bind(&folder.created_by)
        .bind(&folder.created_by_name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn set_folder_status(&mut self, folder_id: i64, status: FolderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE visit_folders SET status = $2 WHERE id = $1")
            .bind(folder_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(EdError::not_found("folder", folder_id));
        }
        Ok(())
    }

    // ========== 档案子记录 ==========

    async fn find_record(&mut self, folder_id: i64, kind: RecordKind) -> Result<Option<ChildRecord>> {
        let row = sqlx::query_as::<_, DbClinicalRecord>(
            "SELECT * FROM clinical_records WHERE folder_id = $1 AND kind = $2 FOR UPDATE",
        )
        .bind(folder_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(ChildRecord::try_from).transpose()
    }

    async fn insert_record(&mut self, record: &NewChildRecord) -> Result<ChildRecord> {
        let row = sqlx::query_as::<_, DbClinicalRecord>(
            r#"
            INSERT INTO clinical_records (folder_id, patient_id, kind, fields)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(record.folder_id)
        .bind(&record.patient_id)
        .bind(record.fields.kind().as_str())
        .bind(record.fields.to_value()?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn update_record(&mut self, record_id: i64, fields: &RecordFields) -> Result<ChildRecord> {
        let row = sqlx::query_as::<_, DbClinicalRecord>(
            r#"
            UPDATE clinical_records SET fields = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(record_id)
        .bind(fields.to_value()?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("record", record_id))?;

        row.try_into()
    }

    async fn record_exists(&mut self, scope: &RecordScope, kind: RecordKind) -> Result<bool> {
        let query = match scope {
            RecordScope::Patient(national_id) => sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM clinical_records WHERE patient_id = $1 AND kind = $2)",
            )
            .bind(national_id.clone()),
            RecordScope::Folder(folder_id) => sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM clinical_records WHERE folder_id = $1 AND kind = $2)",
            )
            .bind(*folder_id),
        };

        query
            .bind(kind.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn records_for_folder(&mut self, folder_id: i64) -> Result<Vec<ChildRecord>> {
        let rows = sqlx::query_as::<_, DbClinicalRecord>(
            "SELECT * FROM clinical_records WHERE folder_id = $1 ORDER BY id",
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    // ========== 医嘱 ==========

    async fn insert_order(&mut self, order: &NewMedicalOrder) -> Result<MedicalOrder> {
        let instructions = &order.instructions;
        let row = sqlx::query_as::<_, DbMedicalOrder>(
            r#"
            INSERT INTO medical_orders (
                folder_id, patient_id, immediate_indications, suggested_treatments,
                medication_requirement, complementary_exams, course_of_action,
                medication_id, status, ordered_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9)
            RETURNING *
            "#,
        )
        .bind(order.folder_id)
        .bind(&order.patient_id)
        .bind(&instructions.immediate_indications)
        .bind(&instructions.suggested_treatments)
        .bind(&instructions.medication_requirement)
        .bind(&instructions.complementary_exams)
        .bind(&instructions.course_of_action)
        .bind(order.medication_id)
        .bind(&order.ordered_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn lock_order(&mut self, order_id: i64) -> Result<Option<MedicalOrder>> {
        let row = sqlx::query_as::<_, DbMedicalOrder>(
            "SELECT * FROM medical_orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(MedicalOrder::try_from).transpose()
    }

    async fn update_order_instructions(
        &mut self,
        order_id: i64,
        instructions: &OrderInstructions,
        medication_id: Option<i64>,
    ) -> Result<MedicalOrder> {
        let row = sqlx::query_as::<_, DbMedicalOrder>(
            r#"
            UPDATE medical_orders SET
                immediate_indications = $2,
                suggested_treatments = $3,
                medication_requirement = $4,
                complementary_exams = $5,
                course_of_action = $6,
                medication_id = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(&instructions.immediate_indications)
        .bind(&instructions.suggested_treatments)
        .bind(&instructions.medication_requirement)
        .bind(&instructions.complementary_exams)
        .bind(&instructions.course_of_action)
        .bind(medication_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("order", order_id))?;

        row.try_into()
    }

    async fn complete_order(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalOrder> {
        let row = sqlx::query_as::<_, DbMedicalOrder>(
            r#"
            UPDATE medical_orders SET status = $2, completion_notes = $3, completed_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(notes)
        .bind(completed_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("order", order_id))?;

        row.try_into()
    }

    async fn cancel_pending_orders(&mut self, folder_id: i64) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE medical_orders SET status = 'CANCELLED'
            WHERE folder_id = $1 AND status = 'PENDING'
            RETURNING id
            "#,
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        ids.sort_unstable();
        Ok(ids)
    }

    async fn orders_for_folder(&mut self, folder_id: i64) -> Result<Vec<MedicalOrder>> {
        let rows = sqlx::query_as::<_, DbMedicalOrder>(
            "SELECT * FROM medical_orders WHERE folder_id = $1 ORDER BY id",
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    async fn pending_orders(&mut self) -> Result<Vec<MedicalOrder>> {
        let rows = sqlx::query_as::<_, DbMedicalOrder>(
            "SELECT * FROM medical_orders WHERE status = 'PENDING' ORDER BY ordered_at, id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    // ========== 发药申请 ==========

    async fn insert_dispense(&mut self, request: &NewDispenseRequest) -> Result<DispenseRequest> {
        let row = sqlx::query_as::<_, DbDispenseRequest>(
            r#"
            INSERT INTO dispense_requests (order_id, medication_id, quantity, requested_by, status)
            VALUES ($1, $2, $3, $4, 'PENDING')
            RETURNING *
            "#,
        )
        .bind(request.order_id)
        .bind(request.medication_id)
        .bind(request.quantity)
        .bind(&request.requested_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn lock_dispense(&mut self, request_id: i64) -> Result<Option<DispenseRequest>> {
        let row = sqlx::query_as::<_, DbDispenseRequest>(
            "SELECT * FROM dispense_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(DispenseRequest::try_from).transpose()
    }

    async fn set_dispense_status(
        &mut self,
        request_id: i64,
        status: DispenseStatus,
    ) -> Result<DispenseRequest> {
        let row = sqlx::query_as::<_, DbDispenseRequest>(
            "UPDATE dispense_requests SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(request_id)
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("dispense request", request_id))?;

        row.try_into()
    }

    async fn dispenses_for_order(&mut self, order_id: i64) -> Result<Vec<DispenseRequest>> {
        let rows = sqlx::query_as::<_, DbDispenseRequest>(
            "SELECT * FROM dispense_requests WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    async fn open_dispenses(&mut self) -> Result<Vec<DispenseRequest>> {
        let rows = sqlx::query_as::<_, DbDispenseRequest>(
            r#"
            SELECT d.* FROM dispense_requests d
            JOIN medical_orders o ON o.id = d.order_id
            WHERE d.status IN ('PENDING', 'READY')
              AND o.status NOT IN ('CANCELLED', 'NOT_PERFORMED')
            ORDER BY d.requested_at, d.id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    // ========== 药品与库存 ==========

    async fn insert_medication(&mut self, medication: &NewMedication) -> Result<Medication> {
        let row = sqlx::query_as::<_, DbMedication>(
            r#"
            INSERT INTO medications (
                name, active_ingredient, concentration, presentation,
                available_quantity, minimum_stock, expiry_date
            )
            VALUES ($1, $2, $3, $4, 0, $5, $6)
            RETURNING id, name, active_ingredient, concentration, presentation,
                      available_quantity, minimum_stock, expiry_date
            "#,
        )
        .bind(&medication.name)
        .bind(&medication.active_ingredient)
        .bind(&medication.concentration)
        .bind(&medication.presentation)
        .bind(medication.minimum_stock)
        .bind(medication.expiry_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.into())
    }

    async fn get_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        let row = sqlx::query_as::<_, DbMedication>(
            r#"
            SELECT id, name, active_ingredient, concentration, presentation,
                   available_quantity, minimum_stock, expiry_date
            FROM medications WHERE id = $1
            "#,
        )
        .bind(medication_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(Medication::from))
    }

    async fn lock_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        let row = sqlx::query_as::<_, DbMedication>(
            r#"
            SELECT id, name, active_ingredient, concentration, presentation,
                   available_quantity, minimum_stock, expiry_date
            FROM medications WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(medication_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(Medication::from))
    }

    async fn find_batch(
        &mut self,
        name: &str,
        concentration: Option<&str>,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Option<Medication>> {
        let row = sqlx::query_as::<_, DbMedication>(
            r#"
            SELECT id, name, active_ingredient, concentration, presentation,
                   available_quantity, minimum_stock, expiry_date
            FROM medications
            WHERE name = $1
              AND concentration IS NOT DISTINCT FROM $2
              AND expiry_date IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(name)
        .bind(concentration)
        .bind(expiry_date)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(Medication::from))
    }

    async fn adjust_stock(&mut self, medication_id: i64, delta: i32) -> Result<i32> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE medications SET available_quantity = available_quantity + $2
            WHERE id = $1
            RETURNING available_quantity
            "#,
        )
        .bind(medication_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("medication", medication_id))
    }

    async fn search_medications(&mut self, term: Option<&str>) -> Result<Vec<Medication>> {
        let pattern = term.map(like_pattern);
        let rows = sqlx::query_as::<_, DbMedication>(
            r#"
            SELECT id, name, active_ingredient, concentration, presentation,
                   available_quantity, minimum_stock, expiry_date
            FROM medications
            WHERE $1::text IS NULL
               OR name ILIKE $1 ESCAPE '\'
               OR active_ingredient ILIKE $1 ESCAPE '\'
            ORDER BY name, id
            "#,
        )
        .bind(pattern)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Medication::from).collect())
    }

    async fn append_movement(&mut self, movement: &NewInventoryMovement) -> Result<InventoryMovement> {
        let row = sqlx::query_as::<_, DbInventoryMovement>(
            r#"
            INSERT INTO inventory_movements (medication_id, direction, quantity, reason, actor_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(movement.medication_id)
        .bind(movement.direction.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(&movement.actor_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn movements_for(&mut self, medication_id: i64) -> Result<Vec<InventoryMovement>> {
        let rows = sqlx::query_as::<_, DbInventoryMovement>(
            "SELECT * FROM inventory_movements WHERE medication_id = $1 ORDER BY id",
        )
        .bind(medication_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    // ========== 分诊 ==========

    async fn insert_triage(&mut self, triage: &NewTriage) -> Result<Triage> {
        let row = sqlx::query_as::<_, DbTriage>(
            r#"
            INSERT INTO triages (
                folder_id, patient_id, color, location, admission_reason, vital_signs, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'WAITING')
            RETURNING *
            "#,
        )
        .bind(triage.folder_id)
        .bind(&triage.patient_id)
        .bind(triage.color.as_str())
        .bind(triage.location.as_str())
        .bind(&triage.admission_reason)
        .bind(&triage.vital_signs)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.try_into()
    }

    async fn get_triage(&mut self, triage_id: i64) -> Result<Option<Triage>> {
        let row = sqlx::query_as::<_, DbTriage>("SELECT * FROM triages WHERE id = $1")
            .bind(triage_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        row.map(Triage::try_from).transpose()
    }

    async fn lock_triage(&mut self, triage_id: i64) -> Result<Option<Triage>> {
        let row = sqlx::query_as::<_, DbTriage>("SELECT * FROM triages WHERE id = $1 FOR UPDATE")
            .bind(triage_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        row.map(Triage::try_from).transpose()
    }

    async fn update_triage(
        &mut self,
        triage_id: i64,
        state: TriageState,
        attended_by: Option<&str>,
        location: Option<TriageLocation>,
    ) -> Result<Triage> {
        let row = sqlx::query_as::<_, DbTriage>(
            r#"
            UPDATE triages SET
                state = $2,
                attended_by = COALESCE($3, attended_by),
                location = COALESCE($4, location),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(triage_id)
        .bind(state.as_str())
        .bind(attended_by)
        .bind(location.map(|l| l.as_str()))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| EdError::not_found("triage", triage_id))?;

        row.try_into()
    }

    async fn triages_for_folder(&mut self, folder_id: i64) -> Result<Vec<Triage>> {
        let rows = sqlx::query_as::<_, DbTriage>(
            "SELECT * FROM triages WHERE folder_id = $1 ORDER BY id",
        )
        .bind(folder_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }

    async fn latest_triage_for_patient(&mut self, national_id: &str) -> Result<Option<Triage>> {
        let row = sqlx::query_as::<_, DbTriage>(
            "SELECT * FROM triages WHERE patient_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(national_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(Triage::try_from).transpose()
    }

    async fn triages_in_states(&mut self, states: &[TriageState]) -> Result<Vec<Triage>> {
        let states: Vec<&str> = states.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, DbTriage>(
            "SELECT * FROM triages WHERE state = ANY($1) ORDER BY created_at, id",
        )
        .bind(states)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        convert_all(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed_core::ErrorKind;

    #[test]
    fn test_non_database_errors_are_internal() {
        let err = db_error(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, EdError::Database(_)));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("keto"), "%keto%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[test]
    fn test_pool_timeout_is_internal() {
        let err = db_error(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
