//! 临床引擎
//!
//! 对外的唯一入口。每个操作打开一个事务，调用各组件，成功后提交一次；
//! 任何一步失败时事务被丢弃，之前的写入全部回滚。

use crate::{
    cascade::{ClosureReport, VisitClosureCascade},
    dispense::{DispenseInput, DispenseReceipt, DispenseRequestMachine},
    folder::VisitFolderResolver,
    gate::PrerequisiteGate,
    inventory::{InventoryLedger, StockChange},
    orders::{MedicalOrderMachine, OrderOutcome},
    records::ChildRecordLinker,
    triage::{TriageInput, TriageStateMachine},
};
use ed_core::{
    utils, Actor, ChildRecord, ClinicalStore, ClinicalTx, Diagnosis, DispenseRequest,
    DispenseStatus, EdError, InventoryMovement, Medication, MedicalOrder, NewMedication, NewPatient,
    OrderInstructions, OrderStatus, Patient, RecordFields, Result, Triage, TriageLocation,
    TriageState, VisitFolder, VisitOutcome, WorkflowPolicy,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ========== 输入与输出 ==========

/// 诊断写入参数：诊断文本和同时开具的医嘱
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosisInput {
    #[serde(default)]
    pub diagnosis: Diagnosis,
    #[serde(default)]
    pub instructions: OrderInstructions,
    pub medication_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisOutcome {
    pub folder_id: i64,
    pub diagnosis: ChildRecord,
    pub order: Option<MedicalOrder>,
    pub closure: Option<ClosureReport>,
}

/// 分诊转换结果；进入终态时附带档案关闭报告
#[derive(Debug, Clone, Serialize)]
pub struct TriageUpdate {
    pub triage: Triage,
    pub closure: Option<ClosureReport>,
}

/// 护士可发放的药品：患者最近一条关联药品的待执行医嘱
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizedMedication {
    pub order: MedicalOrder,
    pub medication: Medication,
}

/// 单次就诊的扁平视图
#[derive(Debug, Clone, Serialize)]
pub struct FolderHistory {
    pub folder: VisitFolder,
    pub records: Vec<ChildRecord>,
    pub orders: Vec<MedicalOrder>,
    pub dispenses: Vec<DispenseRequest>,
    pub triages: Vec<Triage>,
}

/// 患者病历
#[derive(Debug, Clone, Serialize)]
pub struct ClinicalHistory {
    pub patient: Patient,
    pub folders: Vec<FolderHistory>,
}

// ========== 引擎 ==========

/// 临床引擎
#[derive(Debug)]
pub struct ClinicalEngine<S: ClinicalStore> {
    store: S,
    policy: WorkflowPolicy,
    resolver: VisitFolderResolver,
    linker: ChildRecordLinker,
    gate: PrerequisiteGate,
    orders: MedicalOrderMachine,
    dispense: DispenseRequestMachine,
    ledger: InventoryLedger,
    triage: TriageStateMachine,
    cascade: VisitClosureCascade,
}

impl<S: ClinicalStore> ClinicalEngine<S> {
    pub fn new(store: S, policy: WorkflowPolicy) -> Self {
        Self {
            store,
            policy,
            resolver: VisitFolderResolver::new(),
            linker: ChildRecordLinker::new(),
            gate: PrerequisiteGate::new(policy.gate_scope),
            orders: MedicalOrderMachine::new(),
            dispense: DispenseRequestMachine::new(),
            ledger: InventoryLedger::new(),
            triage: TriageStateMachine::new(),
            cascade: VisitClosureCascade::new(policy.cancelled_order_stock),
        }
    }

    pub fn policy(&self) -> WorkflowPolicy {
        self.policy
    }

    /// 存储连通性检查
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    // ---------- 患者 ----------

    pub async fn register_patient(&self, patient: NewPatient) -> Result<Patient> {
        if utils::non_blank(Some(patient.national_id.as_str())).is_none()
            || utils::non_blank(Some(patient.full_name.as_str())).is_none()
        {
            return Err(EdError::Validation(
                "national id and full name are required".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let created = tx.insert_patient(&patient).await?;
        tx.commit().await?;

        info!(patient_id = %created.national_id, "Registered patient");
        Ok(created)
    }

    pub async fn patient(&self, patient_id: &str) -> Result<Patient> {
        let mut tx = self.store.begin().await?;
        let patient = tx
            .get_patient(patient_id)
            .await?
            .ok_or_else(|| EdError::not_found("patient", patient_id))?;
        tx.commit().await?;
        Ok(patient)
    }

    // ---------- 档案与子记录 ----------

    /// 找到或创建患者当前的就诊档案
    pub async fn resolve_folder(&self, patient_id: &str, actor: &Actor) -> Result<VisitFolder> {
        let mut tx = self.store.begin().await?;
        let folder = self.resolver.resolve(&mut tx, patient_id, actor).await?;
        tx.commit().await?;
        Ok(folder)
    }

    /// 写入一种子记录；诊断走 `record_diagnosis` 以经过前置检查
    pub async fn record_clinical(
        &self,
        patient_id: &str,
        fields: RecordFields,
        actor: &Actor,
    ) -> Result<ChildRecord> {
        if let RecordFields::Diagnosis(diagnosis) = fields {
            let input = DiagnosisInput {
                diagnosis,
                ..Default::default()
            };
            return Ok(self.record_diagnosis(patient_id, input, actor).await?.diagnosis);
        }

        let mut tx = self.store.begin().await?;
        let folder = self.resolver.resolve(&mut tx, patient_id, actor).await?;
        let record = self.linker.upsert(&mut tx, &folder, fields).await?;
        tx.commit().await?;

        info!(
            patient_id,
            folder_id = folder.id,
            kind = %record.kind,
            actor = %actor.id,
            "Recorded clinical data"
        );
        Ok(record)
    }

    /// 写入诊断
    ///
    /// 前置检查通过后写诊断记录；有医嘱内容时生成 PENDING 医嘱；
    /// 处置意见提到出院（"alta"）时在同一事务内关闭档案。
    pub async fn record_diagnosis(
        &self,
        patient_id: &str,
        input: DiagnosisInput,
        actor: &Actor,
    ) -> Result<DiagnosisOutcome> {
        let mut tx = self.store.begin().await?;
        let folder = self.resolver.resolve(&mut tx, patient_id, actor).await?;
        self.gate
            .check_diagnosis_allowed(&mut tx, patient_id, folder.id)
            .await?;

        let diagnosis = self
            .linker
            .upsert(&mut tx, &folder, RecordFields::Diagnosis(input.diagnosis))
            .await?;
        let order = self
            .orders
            .create_from_diagnosis(&mut tx, &folder, &input.instructions, input.medication_id, actor)
            .await?;

        let discharge = input
            .instructions
            .course_of_action
            .as_deref()
            .map_or(false, utils::mentions_discharge);
        let closure = if discharge {
            let report = self
                .cascade
                .close(&mut tx, &self.ledger, folder.id, VisitOutcome::Discharged, actor)
                .await?;
            Some(report)
        } else {
            None
        };

        tx.commit().await?;

        info!(
            patient_id,
            folder_id = folder.id,
            order_id = order.as_ref().map(|o| o.id),
            discharged = closure.is_some(),
            "Recorded diagnosis"
        );
        Ok(DiagnosisOutcome {
            folder_id: folder.id,
            diagnosis,
            order,
            closure,
        })
    }

    /// 直接关闭档案
    pub async fn close_visit(
        &self,
        folder_id: i64,
        outcome: VisitOutcome,
        actor: &Actor,
    ) -> Result<ClosureReport> {
        let mut tx = self.store.begin().await?;
        let report = self
            .cascade
            .close(&mut tx, &self.ledger, folder_id, outcome, actor)
            .await?;
        tx.commit().await?;
        Ok(report)
    }

    // ---------- 医嘱 ----------

    pub async fn edit_order(
        &self,
        order_id: i64,
        patch: OrderInstructions,
        medication_id: Option<i64>,
    ) -> Result<MedicalOrder> {
        let mut tx = self.store.begin().await?;
        let order = self.orders.edit(&mut tx, order_id, patch, medication_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    pub async fn record_order_outcome(
        &self,
        order_id: i64,
        target: OrderStatus,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<OrderOutcome> {
        let notes = utils::non_blank(notes);
        let mut tx = self.store.begin().await?;
        let outcome = self
            .orders
            .record_outcome(&mut tx, &self.ledger, order_id, target, notes, actor)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// 护士待执行队列，最早的在前
    pub async fn pending_orders(&self) -> Result<Vec<MedicalOrder>> {
        let mut tx = self.store.begin().await?;
        let orders = tx.pending_orders().await?;
        tx.commit().await?;
        Ok(orders)
    }

    pub async fn authorized_medication(
        &self,
        patient_id: &str,
    ) -> Result<Option<AuthorizedMedication>> {
        let mut tx = self.store.begin().await?;
        let latest = tx
            .pending_orders()
            .await?
            .into_iter()
            .filter(|order| order.patient_id == patient_id)
            .filter_map(|order| order.medication_id.map(|id| (order, id)))
            .last();

        let authorized = match latest {
            Some((order, medication_id)) => tx
                .get_medication(medication_id)
                .await?
                .map(|medication| AuthorizedMedication { order, medication }),
            None => None,
        };
        tx.commit().await?;
        Ok(authorized)
    }

    // ---------- 发药 ----------

    pub async fn request_dispense(
        &self,
        input: &DispenseInput,
        actor: &Actor,
    ) -> Result<DispenseReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt = self
            .dispense
            .create(&mut tx, &self.ledger, input, actor)
            .await?;
        tx.commit().await?;
        Ok(receipt)
    }

    pub async fn advance_dispense(
        &self,
        request_id: i64,
        target: DispenseStatus,
    ) -> Result<DispenseRequest> {
        let mut tx = self.store.begin().await?;
        let request = self.dispense.advance(&mut tx, request_id, target).await?;
        tx.commit().await?;
        Ok(request)
    }

    /// 药房队列
    pub async fn open_dispenses(&self) -> Result<Vec<DispenseRequest>> {
        let mut tx = self.store.begin().await?;
        let requests = tx.open_dispenses().await?;
        tx.commit().await?;
        Ok(requests)
    }

    // ---------- 库存 ----------

    pub async fn register_medication(&self, medication: NewMedication) -> Result<Medication> {
        let mut tx = self.store.begin().await?;
        let created = self.ledger.register(&mut tx, &medication).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn stock_in(
        &self,
        medication_id: i64,
        quantity: i32,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<StockChange> {
        let reason = utils::non_blank(reason).unwrap_or("stock entry");
        let mut tx = self.store.begin().await?;
        let change = self
            .ledger
            .receive(&mut tx, medication_id, quantity, reason, Some(&actor.id))
            .await?;
        tx.commit().await?;
        Ok(change)
    }

    pub async fn stock_out(
        &self,
        medication_id: i64,
        quantity: i32,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<StockChange> {
        let reason = utils::non_blank(reason).unwrap_or("stock exit");
        let mut tx = self.store.begin().await?;
        let change = self
            .ledger
            .withdraw(&mut tx, medication_id, quantity, reason, Some(&actor.id))
            .await?;
        tx.commit().await?;
        Ok(change)
    }

    pub async fn search_medications(&self, term: Option<&str>) -> Result<Vec<Medication>> {
        let term = utils::non_blank(term);
        debug!(term, "Searching medications");
        let mut tx = self.store.begin().await?;
        let found = tx.search_medications(term).await?;
        tx.commit().await?;
        Ok(found)
    }

    pub async fn low_stock(&self) -> Result<Vec<Medication>> {
        let mut tx = self.store.begin().await?;
        let found = self.ledger.low_stock(&mut tx).await?;
        tx.commit().await?;
        Ok(found)
    }

    pub async fn movements(&self, medication_id: i64) -> Result<Vec<InventoryMovement>> {
        let mut tx = self.store.begin().await?;
        let movements = self.ledger.movements(&mut tx, medication_id).await?;
        tx.commit().await?;
        Ok(movements)
    }

    // ---------- 分诊 ----------

    /// 分诊登记同样经过档案解析，已死亡患者无法再次分诊
    pub async fn register_triage(
        &self,
        patient_id: &str,
        input: &TriageInput,
        actor: &Actor,
    ) -> Result<Triage> {
        let mut tx = self.store.begin().await?;
        let folder = self.resolver.resolve(&mut tx, patient_id, actor).await?;
        let triage = self.triage.register(&mut tx, &folder, input).await?;
        tx.commit().await?;
        Ok(triage)
    }

    pub async fn attend_triage(
        &self,
        triage_id: i64,
        location: Option<TriageLocation>,
        actor: &Actor,
    ) -> Result<TriageUpdate> {
        self.set_triage_state(triage_id, TriageState::BeingSeen, location, actor)
            .await
    }

    pub async fn finalize_triage(
        &self,
        triage_id: i64,
        outcome: VisitOutcome,
        actor: &Actor,
    ) -> Result<TriageUpdate> {
        let mut tx = self.store.begin().await?;
        let triage = self.triage.finalize(&mut tx, triage_id, outcome, actor).await?;
        let update = self.close_for_triage(&mut tx, triage, actor).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// 通用状态设置，与 attend / finalize 共用同一张转换表
    pub async fn set_triage_state(
        &self,
        triage_id: i64,
        state: TriageState,
        location: Option<TriageLocation>,
        actor: &Actor,
    ) -> Result<TriageUpdate> {
        let mut tx = self.store.begin().await?;
        let triage = self
            .triage
            .transition(&mut tx, triage_id, state, location, actor)
            .await?;
        let update = self.close_for_triage(&mut tx, triage, actor).await?;
        tx.commit().await?;
        Ok(update)
    }

    async fn close_for_triage(
        &self,
        tx: &mut S::Tx,
        triage: Triage,
        actor: &Actor,
    ) -> Result<TriageUpdate> {
        let closure = match triage.state.outcome() {
            Some(outcome) => Some(
                self.cascade
                    .close(tx, &self.ledger, triage.folder_id, outcome, actor)
                    .await?,
            ),
            None => None,
        };
        Ok(TriageUpdate { triage, closure })
    }

    /// 候诊与诊治中的分诊
    pub async fn active_triages(&self) -> Result<Vec<Triage>> {
        self.triages_in(&[TriageState::Waiting, TriageState::BeingSeen])
            .await
    }

    /// 等待专科医生结案的转诊
    pub async fn transferred_triages(&self) -> Result<Vec<Triage>> {
        self.triages_in(&[TriageState::Transferred]).await
    }

    async fn triages_in(&self, states: &[TriageState]) -> Result<Vec<Triage>> {
        let mut tx = self.store.begin().await?;
        let triages = tx.triages_in_states(states).await?;
        tx.commit().await?;
        Ok(triages)
    }

    pub async fn latest_triage(&self, patient_id: &str) -> Result<Option<Triage>> {
        let mut tx = self.store.begin().await?;
        let triage = tx.latest_triage_for_patient(patient_id).await?;
        tx.commit().await?;
        Ok(triage)
    }

    // ---------- 病历 ----------

    /// 患者全部就诊的扁平视图，最新的档案在前
    pub async fn history(&self, patient_id: &str) -> Result<ClinicalHistory> {
        let mut tx = self.store.begin().await?;
        let patient = tx
            .get_patient(patient_id)
            .await?
            .ok_or_else(|| EdError::not_found("patient", patient_id))?;

        let mut folders = Vec::new();
        for folder in tx.folders_for_patient(patient_id).await? {
            let records = tx.records_for_folder(folder.id).await?;
            let orders = tx.orders_for_folder(folder.id).await?;
            let mut dispenses = Vec::new();
            for order in &orders {
                dispenses.extend(tx.dispenses_for_order(order.id).await?);
            }
            let triages = tx.triages_for_folder(folder.id).await?;
            folders.push(FolderHistory {
                folder,
                records,
                orders,
                dispenses,
                triages,
            });
        }
        tx.commit().await?;

        Ok(ClinicalHistory { patient, folders })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use ed_core::{
        CancelledOrderStock, ErrorKind, FolderStatus, GateScope, MotiveOfVisit, MovementDirection,
        PersonalHistory, PhysicalExam, Prerequisite, RecordKind, Role, TriageColor,
    };
    use std::sync::Arc;

    fn doctor() -> Actor {
        Actor::new("u-1", "Dra. Rivas", Role::Resident)
    }

    fn nurse() -> Actor {
        Actor::new("u-2", "Lcda. Pérez", Role::Nurse)
    }

    fn engine() -> ClinicalEngine<MemoryStore> {
        ClinicalEngine::new(MemoryStore::new(), WorkflowPolicy::default())
    }

    async fn with_patient(engine: &ClinicalEngine<MemoryStore>, id: &str) {
        engine
            .register_patient(NewPatient {
                national_id: id.into(),
                full_name: "Ana Pérez".into(),
                birth_date: None,
                phone: None,
                address: None,
            })
            .await
            .unwrap();
    }

    async fn prerequisites(engine: &ClinicalEngine<MemoryStore>, id: &str) {
        for fields in [
            RecordFields::Motive(MotiveOfVisit { reason: Some("cefalea".into()) }),
            RecordFields::PhysicalExam(PhysicalExam {
                area: Some("Neurológico".into()),
                findings: Some("sin déficit".into()),
            }),
            RecordFields::PersonalHistory(PersonalHistory {
                category: Some("HTA".into()),
                detail: Some("en tratamiento".into()),
            }),
        ] {
            engine.record_clinical(id, fields, &doctor()).await.unwrap();
        }
    }

    async fn medication(engine: &ClinicalEngine<MemoryStore>, stock: i32) -> Medication {
        let med = engine
            .register_medication(NewMedication {
                name: "Ketoprofeno".into(),
                active_ingredient: Some("ketoprofeno".into()),
                concentration: Some("100mg".into()),
                presentation: Some("ampolla".into()),
                minimum_stock: 2,
                expiry_date: None,
            })
            .await
            .unwrap();
        engine.stock_in(med.id, stock, Some("compra"), &nurse()).await.unwrap();
        med
    }

    fn instructions(course: &str) -> OrderInstructions {
        OrderInstructions {
            medication_requirement: Some("ketoprofeno 100mg EV".into()),
            course_of_action: Some(course.into()),
            ..Default::default()
        }
    }

    async fn seen_triage(engine: &ClinicalEngine<MemoryStore>, id: &str) -> Triage {
        let triage = engine
            .register_triage(
                id,
                &TriageInput {
                    color: TriageColor::Orange,
                    location: TriageLocation::Corridor2,
                    admission_reason: Some("cefalea intensa".into()),
                    vital_signs: Some("TA 150/90".into()),
                },
                &nurse(),
            )
            .await
            .unwrap();
        engine
            .attend_triage(triage.id, None, &doctor())
            .await
            .unwrap()
            .triage
    }

    #[tokio::test]
    async fn test_diagnosis_blocked_until_prerequisites() {
        let engine = engine();
        with_patient(&engine, "V123").await;

        let err = engine
            .record_diagnosis("V123", DiagnosisInput::default(), &doctor())
            .await
            .unwrap_err();
        assert!(matches!(err, EdError::MissingPrerequisite(Prerequisite::Motive)));

        // 被拒绝的事务不会留下空档案
        assert!(engine.history("V123").await.unwrap().folders.is_empty());
    }

    #[tokio::test]
    async fn test_records_share_one_folder() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;

        let outcome = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    diagnosis: Diagnosis {
                        definitive_diagnosis: Some("migraña".into()),
                    },
                    instructions: instructions("observación"),
                    medication_id: None,
                },
                &doctor(),
            )
            .await
            .unwrap();

        let history = engine.history("V123").await.unwrap();
        assert_eq!(history.folders.len(), 1);
        assert_eq!(history.folders[0].folder.id, outcome.folder_id);
        assert_eq!(history.folders[0].records.len(), 4);
        assert!(outcome.order.is_some());
        assert!(outcome.closure.is_none());
    }

    #[tokio::test]
    async fn test_diagnosis_with_alta_closes_visit() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let triage = seen_triage(&engine, "V123").await;

        let outcome = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("ALTA médica con control ambulatorio"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap();

        let closure = outcome.closure.unwrap();
        assert_eq!(closure.outcome, VisitOutcome::Discharged);
        assert_eq!(closure.cancelled_orders, vec![outcome.order.unwrap().id]);
        assert_eq!(closure.closed_triages, vec![triage.id]);

        let history = engine.history("V123").await.unwrap();
        assert_eq!(history.folders[0].folder.status, FolderStatus::Discharged);

        // 下一次写入开启新的就诊
        let record = engine
            .record_clinical(
                "V123",
                RecordFields::Motive(MotiveOfVisit { reason: Some("control".into()) }),
                &doctor(),
            )
            .await
            .unwrap();
        assert_ne!(record.folder_id, outcome.folder_id);
    }

    #[tokio::test]
    async fn test_diagnosis_via_generic_record_path_is_gated() {
        let engine = engine();
        with_patient(&engine, "V123").await;

        let err = engine
            .record_clinical("V123", RecordFields::Diagnosis(Diagnosis::default()), &doctor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_deceased_patient_blocks_writes() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        let triage = seen_triage(&engine, "V123").await;

        engine
            .finalize_triage(triage.id, VisitOutcome::Deceased, &doctor())
            .await
            .unwrap();

        let err = engine
            .record_clinical(
                "V123",
                RecordFields::Motive(MotiveOfVisit::default()),
                &doctor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdError::PatientDeceased { .. }));
    }

    #[tokio::test]
    async fn test_example_scenario() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let m1 = medication(&engine, 10).await;
        let triage = seen_triage(&engine, "V123").await;

        let o1 = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    medication_id: Some(m1.id),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();

        let receipt = engine
            .request_dispense(
                &DispenseInput { order_id: o1.id, medication_id: m1.id, quantity: 4 },
                &nurse(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.stock.medication.available_quantity, 6);
        assert_eq!(receipt.request.status, DispenseStatus::Pending);

        let outcome = engine
            .record_order_outcome(o1.id, OrderStatus::NotPerformed, Some("paciente rechaza"), &nurse())
            .await
            .unwrap();
        assert_eq!(outcome.reversals.len(), 1);

        let movements = engine.movements(m1.id).await.unwrap();
        let directions: Vec<_> = movements.iter().map(|m| m.direction).collect();
        assert_eq!(
            directions,
            vec![MovementDirection::In, MovementDirection::Out, MovementDirection::In]
        );
        assert_eq!(engine.search_medications(None).await.unwrap()[0].available_quantity, 10);

        let update = engine
            .finalize_triage(triage.id, VisitOutcome::Discharged, &doctor())
            .await
            .unwrap();
        let closure = update.closure.unwrap();
        assert!(closure.cancelled_orders.is_empty());

        let history = engine.history("V123").await.unwrap();
        let folder = &history.folders[0];
        assert_eq!(folder.folder.status, FolderStatus::Discharged);
        assert_eq!(folder.orders[0].status, OrderStatus::NotPerformed);
        assert_eq!(folder.dispenses[0].status, DispenseStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_dispense_is_blocked_and_stock_unchanged() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();
        let input = DispenseInput { order_id: order.id, medication_id: med.id, quantity: 3 };

        engine.request_dispense(&input, &nurse()).await.unwrap();
        let err = engine.request_dispense(&input, &nurse()).await.unwrap_err();

        assert!(matches!(err, EdError::DuplicateDispense { .. }));
        assert_eq!(engine.low_stock().await.unwrap().len(), 0);
        assert_eq!(engine.movements(med.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dispense_requires_patient_being_seen() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();

        let err = engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id, quantity: 1 },
                &nurse(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdError::NotBeingSeen { .. }));
    }

    #[tokio::test]
    async fn test_dispense_checks_stock_and_medication() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 2).await;
        seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    medication_id: Some(med.id),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();

        let err = engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id + 100, quantity: 1 },
                &nurse(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdError::MedicationMismatch { .. }));

        let err = engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id, quantity: 5 },
                &nurse(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert!(engine.open_dispenses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispense_status_flow() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();
        let request = engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id, quantity: 1 },
                &nurse(),
            )
            .await
            .unwrap()
            .request;

        let ready = engine.advance_dispense(request.id, DispenseStatus::Ready).await.unwrap();
        assert_eq!(ready.status, DispenseStatus::Ready);
        assert_eq!(engine.open_dispenses().await.unwrap().len(), 1);

        engine
            .advance_dispense(request.id, DispenseStatus::Delivered)
            .await
            .unwrap();
        assert!(engine.open_dispenses().await.unwrap().is_empty());
        assert!(engine
            .advance_dispense(request.id, DispenseStatus::Ready)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_revert_policy_restores_stock_on_cascade() {
        let engine = ClinicalEngine::new(
            MemoryStore::new(),
            WorkflowPolicy {
                gate_scope: GateScope::Folder,
                cancelled_order_stock: CancelledOrderStock::Revert,
            },
        );
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        let triage = seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();
        engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id, quantity: 4 },
                &nurse(),
            )
            .await
            .unwrap();

        let closure = engine
            .set_triage_state(triage.id, TriageState::Transferred, None, &doctor())
            .await
            .unwrap()
            .closure
            .unwrap();

        assert_eq!(closure.cancelled_orders, vec![order.id]);
        assert_eq!(closure.reversals.len(), 1);
        assert_eq!(engine.search_medications(Some("keto")).await.unwrap()[0].available_quantity, 10);
        assert_eq!(engine.transferred_triages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transferred_triage_can_be_finalized() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        let triage = seen_triage(&engine, "V123").await;

        engine
            .set_triage_state(triage.id, TriageState::Transferred, None, &doctor())
            .await
            .unwrap();
        let update = engine
            .finalize_triage(triage.id, VisitOutcome::Discharged, &doctor())
            .await
            .unwrap();

        let closure = update.closure.unwrap();
        assert_eq!(closure.previous_status, FolderStatus::Transferred);
        assert!(engine.transferred_triages().await.unwrap().is_empty());
        assert!(engine.active_triages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_edit_and_authorized_medication() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 5).await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();
        assert!(engine.authorized_medication("V123").await.unwrap().is_none());

        engine
            .edit_order(order.id, OrderInstructions::default(), Some(med.id))
            .await
            .unwrap();
        let authorized = engine.authorized_medication("V123").await.unwrap().unwrap();
        assert_eq!(authorized.order.id, order.id);
        assert_eq!(authorized.medication.id, med.id);
        assert_eq!(engine.pending_orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_open_one_folder() {
        let engine = Arc::new(engine());
        with_patient(&engine, "V123").await;

        let mut handles = Vec::new();
        for kind in [RecordKind::Motive, RecordKind::PhysicalExam, RecordKind::Habits, RecordKind::FamilyHistory] {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let fields = RecordFields::from_value(kind, serde_json::json!({})).unwrap();
                engine.record_clinical("V123", fields, &doctor()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = engine.history("V123").await.unwrap();
        let open = history
            .folders
            .iter()
            .filter(|f| f.folder.status == FolderStatus::Open)
            .count();
        assert_eq!(history.folders.len(), 1);
        assert_eq!(open, 1);
        assert_eq!(history.folders[0].records.len(), 4);
    }

    #[tokio::test]
    async fn test_racing_dispenses_only_one_succeeds() {
        let engine = Arc::new(engine());
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = Arc::clone(&engine);
            let input = DispenseInput { order_id: order.id, medication_id: med.id, quantity: 2 };
            handles.push(tokio::spawn(async move {
                engine.request_dispense(&input, &nurse()).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(err, EdError::DuplicateDispense { .. })),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(engine.search_medications(None).await.unwrap()[0].available_quantity, 8);
    }

    #[tokio::test]
    async fn test_death_after_transfer_blocks_newer_folder() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        let triage = seen_triage(&engine, "V123").await;

        engine
            .set_triage_state(triage.id, TriageState::Transferred, None, &doctor())
            .await
            .unwrap();
        let record = engine
            .record_clinical(
                "V123",
                RecordFields::Motive(MotiveOfVisit { reason: Some("control".into()) }),
                &doctor(),
            )
            .await
            .unwrap();
        assert_ne!(record.folder_id, triage.folder_id);

        engine
            .finalize_triage(triage.id, VisitOutcome::Deceased, &doctor())
            .await
            .unwrap();

        let err = engine
            .record_clinical(
                "V123",
                RecordFields::Motive(MotiveOfVisit::default()),
                &doctor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdError::PatientDeceased { .. }));
        let err = engine
            .register_triage(
                "V123",
                &TriageInput {
                    color: TriageColor::Red,
                    location: TriageLocation::Chairs,
                    admission_reason: None,
                    vital_signs: None,
                },
                &nurse(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_dispense_for_not_performed_order_cannot_advance() {
        let engine = engine();
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let med = medication(&engine, 10).await;
        seen_triage(&engine, "V123").await;
        let order = engine
            .record_diagnosis(
                "V123",
                DiagnosisInput {
                    instructions: instructions("observación"),
                    ..Default::default()
                },
                &doctor(),
            )
            .await
            .unwrap()
            .order
            .unwrap();
        let request = engine
            .request_dispense(
                &DispenseInput { order_id: order.id, medication_id: med.id, quantity: 3 },
                &nurse(),
            )
            .await
            .unwrap()
            .request;

        engine
            .record_order_outcome(order.id, OrderStatus::NotPerformed, None, &nurse())
            .await
            .unwrap();

        assert!(engine.open_dispenses().await.unwrap().is_empty());
        let err = engine
            .advance_dispense(request.id, DispenseStatus::Delivered)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);
        assert_eq!(engine.search_medications(None).await.unwrap()[0].available_quantity, 10);
    }

    #[tokio::test]
    async fn test_finalize_racing_discharge_diagnosis() {
        let engine = Arc::new(engine());
        with_patient(&engine, "V123").await;
        prerequisites(&engine, "V123").await;
        let triage = seen_triage(&engine, "V123").await;

        let finalize = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .finalize_triage(triage.id, VisitOutcome::Discharged, &doctor())
                    .await
                    .map(|_| ())
            })
        };
        let diagnosis = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let input = DiagnosisInput {
                    instructions: instructions("alta a domicilio"),
                    ..Default::default()
                };
                engine
                    .record_diagnosis("V123", input, &doctor())
                    .await
                    .map(|_| ())
            })
        };

        // 后到的一方只可能因分诊已结束被拒绝
        for handle in [finalize, diagnosis] {
            if let Err(err) = handle.await.unwrap() {
                assert_eq!(err.kind(), ErrorKind::Blocked);
            }
        }

        let history = engine.history("V123").await.unwrap();
        assert!(history
            .folders
            .iter()
            .all(|f| f.folder.status != FolderStatus::Open));
        let latest = engine.latest_triage("V123").await.unwrap().unwrap();
        assert_eq!(latest.state, TriageState::Discharged);
    }

    #[tokio::test]
    async fn test_racing_closures_report_committed_status() {
        let engine = Arc::new(engine());
        with_patient(&engine, "V123").await;
        let folder_id = engine
            .record_clinical(
                "V123",
                RecordFields::Motive(MotiveOfVisit { reason: Some("disnea".into()) }),
                &doctor(),
            )
            .await
            .unwrap()
            .folder_id;

        let mut handles = Vec::new();
        for outcome in [VisitOutcome::Transferred, VisitOutcome::Discharged] {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.close_visit(folder_id, outcome, &doctor()).await
            }));
        }
        let mut reports = Vec::new();
        for handle in handles {
            reports.push(handle.await.unwrap().unwrap());
        }

        let (first, second) = if reports[0].previous_status == FolderStatus::Open {
            (&reports[0], &reports[1])
        } else {
            (&reports[1], &reports[0])
        };
        assert_eq!(first.previous_status, FolderStatus::Open);
        assert_eq!(second.previous_status, first.outcome.folder_status());
    }
}
