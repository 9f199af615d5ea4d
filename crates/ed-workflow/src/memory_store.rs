//! 内存存储
//!
//! 整个状态由一把异步互斥锁保护，事务在快照上读写，提交时整体写回，
//! 因此所有事务天然串行化。用于测试与演示。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ed_core::{
    ChildRecord, ClinicalStore, ClinicalTx, DispenseRequest, DispenseStatus, EdError, FolderStatus,
    InventoryMovement, Medication, MedicalOrder, NewChildRecord, NewDispenseRequest,
    NewInventoryMovement, NewMedicalOrder, NewMedication, NewPatient, NewTriage, NewVisitFolder,
    OrderInstructions, OrderStatus, Patient, RecordFields, RecordKind, RecordScope, Result, Triage,
    TriageLocation, TriageState, VisitFolder,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    patients: HashMap<String, Patient>,
    folders: BTreeMap<i64, VisitFolder>,
    records: BTreeMap<i64, ChildRecord>,
    orders: BTreeMap<i64, MedicalOrder>,
    dispenses: BTreeMap<i64, DispenseRequest>,
    medications: BTreeMap<i64, Medication>,
    movements: Vec<InventoryMovement>,
    triages: BTreeMap<i64, Triage>,
    sequence: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// 内存存储
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClinicalStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            lock_trail: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// 内存事务
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    lock_trail: Vec<&'static str>,
}

impl MemoryTx {
    /// 本事务依次请求过的锁
    #[cfg(test)]
    pub(crate) fn lock_trail(&self) -> &[&'static str] {
        &self.lock_trail
    }

    fn order_mut(&mut self, order_id: i64) -> Result<&mut MedicalOrder> {
        self.working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| EdError::not_found("order", order_id))
    }
}

#[async_trait]
impl ClinicalTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        let MemoryTx {
            mut guard,
            working,
            lock_trail,
        } = self;
        debug!(locks = ?lock_trail, "Committed memory transaction");
        *guard = working;
        Ok(())
    }

    async fn insert_patient(&mut self, patient: &NewPatient) -> Result<Patient> {
        if self.working.patients.contains_key(&patient.national_id) {
            return Err(EdError::Conflict(format!(
                "patient {} already registered",
                patient.national_id
            )));
        }

        let created = Patient {
            national_id: patient.national_id.clone(),
            full_name: patient.full_name.clone(),
            birth_date: patient.birth_date,
            phone: patient.phone.clone(),
            address: patient.address.clone(),
            created_at: Utc::now(),
        };
        self.working
            .patients
            .insert(created.national_id.clone(), created.clone());
        Ok(created)
    }

    async fn get_patient(&mut self, national_id: &str) -> Result<Option<Patient>> {
        Ok(self.working.patients.get(national_id).cloned())
    }

    async fn lock_patient(&mut self, _national_id: &str) -> Result<()> {
        // 整个事务已持有全局锁
        self.lock_trail.push("patient");
        Ok(())
    }

    async fn folders_for_patient(&mut self, national_id: &str) -> Result<Vec<VisitFolder>> {
        Ok(self
            .working
            .folders
            .values()
            .rev()
            .filter(|folder| folder.patient_id == national_id)
            .cloned()
            .collect())
    }

    async fn get_folder(&mut self, folder_id: i64) -> Result<Option<VisitFolder>> {
        Ok(self.working.folders.get(&folder_id).cloned())
    }

    async fn insert_folder(&mut self, folder: &NewVisitFolder) -> Result<VisitFolder> {
        let has_open = self
            .working
            .folders
            .values()
            .any(|f| f.patient_id == folder.patient_id && f.status == FolderStatus::Open);
        if has_open {
            return Err(EdError::Blocked(format!(
                "patient {} already has an open folder",
                folder.patient_id
            )));
        }

        let created = VisitFolder {
            id: self.working.next_id(),
            patient_id: folder.patient_id.clone(),
            created_at: Utc::now(),
            status: FolderStatus::Open,
            created_by: folder.created_by.clone(),
            created_by_name: folder.created_by_name.clone(),
        };
        self.working.folders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_folder_status(&mut self, folder_id: i64, status: FolderStatus) -> Result<()> {
        let folder = self
            .working
            .folders
            .get_mut(&folder_id)
            .ok_or_else(|| EdError::not_found("folder", folder_id))?;
        folder.status = status;
        Ok(())
    }

    async fn find_record(&mut self, folder_id: i64, kind: RecordKind) -> Result<Option<ChildRecord>> {
        Ok(self
            .working
            .records
            .values()
            .find(|record| record.folder_id == folder_id && record.kind == kind)
            .cloned())
    }

    async fn insert_record(&mut self, record: &NewChildRecord) -> Result<ChildRecord> {
        let kind = record.fields.kind();
        if self.find_record(record.folder_id, kind).await?.is_some() {
            return Err(EdError::Conflict(format!(
                "folder {} already has a {} record",
                record.folder_id, kind
            )));
        }

        let now = Utc::now();
        let created = ChildRecord {
            id: self.working.next_id(),
            kind,
            folder_id: record.folder_id,
            patient_id: record.patient_id.clone(),
            fields: record.fields.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.records.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_record(&mut self, record_id: i64, fields: &RecordFields) -> Result<ChildRecord> {
        let record = self
            .working
            .records
            .get_mut(&record_id)
            .ok_or_else(|| EdError::not_found("record", record_id))?;
        record.fields = fields.clone();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn record_exists(&mut self, scope: &RecordScope, kind: RecordKind) -> Result<bool> {
        Ok(self.working.records.values().any(|record| {
            record.kind == kind
                && match scope {
                    RecordScope::Patient(national_id) => &record.patient_id == national_id,
                    RecordScope::Folder(folder_id) => record.folder_id == *folder_id,
                }
        }))
    }

    async fn records_for_folder(&mut self, folder_id: i64) -> Result<Vec<ChildRecord>> {
        Ok(self
            .working
            .records
            .values()
            .filter(|record| record.folder_id == folder_id)
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: &NewMedicalOrder) -> Result<MedicalOrder> {
        let created = MedicalOrder {
            id: self.working.next_id(),
            folder_id: order.folder_id,
            patient_id: order.patient_id.clone(),
            instructions: order.instructions.clone(),
            medication_id: order.medication_id,
            status: OrderStatus::Pending,
            ordered_by: order.ordered_by.clone(),
            ordered_at: Utc::now(),
            completed_at: None,
            completion_notes: None,
        };
        self.working.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_order(&mut self, order_id: i64) -> Result<Option<MedicalOrder>> {
        self.lock_trail.push("order");
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order_instructions(
        &mut self,
        order_id: i64,
        instructions: &OrderInstructions,
        medication_id: Option<i64>,
    ) -> Result<MedicalOrder> {
        let order = self.order_mut(order_id)?;
        order.instructions = instructions.clone();
        order.medication_id = medication_id;
        Ok(order.clone())
    }

    async fn complete_order(
        &mut self,
        order_id: i64,
        status: OrderStatus,
        notes: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<MedicalOrder> {
        let order = self.order_mut(order_id)?;
        order.status = status;
        order.completion_notes = notes.map(str::to_string);
        order.completed_at = Some(completed_at);
        Ok(order.clone())
    }

    async fn cancel_pending_orders(&mut self, folder_id: i64) -> Result<Vec<i64>> {
        let mut cancelled = Vec::new();
        for order in self.working.orders.values_mut() {
            if order.folder_id == folder_id && order.status == OrderStatus::Pending {
                order.status = OrderStatus::Cancelled;
                cancelled.push(order.id);
            }
        }
        Ok(cancelled)
    }

    async fn orders_for_folder(&mut self, folder_id: i64) -> Result<Vec<MedicalOrder>> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|order| order.folder_id == folder_id)
            .cloned()
            .collect())
    }

    async fn pending_orders(&mut self) -> Result<Vec<MedicalOrder>> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending)
            .cloned()
            .collect())
    }

    async fn insert_dispense(&mut self, request: &NewDispenseRequest) -> Result<DispenseRequest> {
        let created = DispenseRequest {
            id: self.working.next_id(),
            order_id: request.order_id,
            medication_id: request.medication_id,
            quantity: request.quantity,
            requested_by: request.requested_by.clone(),
            status: DispenseStatus::Pending,
            requested_at: Utc::now(),
        };
        self.working.dispenses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_dispense(&mut self, request_id: i64) -> Result<Option<DispenseRequest>> {
        self.lock_trail.push("dispense");
        Ok(self.working.dispenses.get(&request_id).cloned())
    }

    async fn set_dispense_status(
        &mut self,
        request_id: i64,
        status: DispenseStatus,
    ) -> Result<DispenseRequest> {
        let request = self
            .working
            .dispenses
            .get_mut(&request_id)
            .ok_or_else(|| EdError::not_found("dispense request", request_id))?;
        request.status = status;
        Ok(request.clone())
    }

    async fn dispenses_for_order(&mut self, order_id: i64) -> Result<Vec<DispenseRequest>> {
        Ok(self
            .working
            .dispenses
            .values()
            .filter(|request| request.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn open_dispenses(&mut self) -> Result<Vec<DispenseRequest>> {
        Ok(self
            .working
            .dispenses
            .values()
            .filter(|request| request.status.is_active())
            .filter(|request| {
                self.working
                    .orders
                    .get(&request.order_id)
                    .map_or(true, |order| !order.status.stops_dispensing())
            })
            .cloned()
            .collect())
    }

    async fn insert_medication(&mut self, medication: &NewMedication) -> Result<Medication> {
        let duplicate = self
            .find_batch(
                &medication.name,
                medication.concentration.as_deref(),
                medication.expiry_date,
            )
            .await?;
        if duplicate.is_some() {
            return Err(EdError::Conflict(format!(
                "medication batch {} already registered",
                medication.name
            )));
        }

        let created = Medication {
            id: self.working.next_id(),
            name: medication.name.clone(),
            active_ingredient: medication.active_ingredient.clone(),
            concentration: medication.concentration.clone(),
            presentation: medication.presentation.clone(),
            available_quantity: 0,
            minimum_stock: medication.minimum_stock,
            expiry_date: medication.expiry_date,
        };
        self.working.medications.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        Ok(self.working.medications.get(&medication_id).cloned())
    }

    async fn lock_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        self.lock_trail.push("medication");
        Ok(self.working.medications.get(&medication_id).cloned())
    }

    async fn find_batch(
        &mut self,
        name: &str,
        concentration: Option<&str>,
        expiry_date: Option<NaiveDate>,
    ) -> Result<Option<Medication>> {
        Ok(self
            .working
            .medications
            .values()
            .find(|m| {
                m.name == name
                    && m.concentration.as_deref() == concentration
                    && m.expiry_date == expiry_date
            })
            .cloned())
    }

    async fn adjust_stock(&mut self, medication_id: i64, delta: i32) -> Result<i32> {
        let medication = self
            .working
            .medications
            .get_mut(&medication_id)
            .ok_or_else(|| EdError::not_found("medication", medication_id))?;
        medication.available_quantity += delta;
        Ok(medication.available_quantity)
    }

    async fn search_medications(&mut self, term: Option<&str>) -> Result<Vec<Medication>> {
        let term = term.map(str::to_lowercase);
        let mut found: Vec<Medication> = self
            .working
            .medications
            .values()
            .filter(|m| match &term {
                Some(term) => {
                    m.name.to_lowercase().contains(term)
                        || m
                            .active_ingredient
                            .as_deref()
                            .map_or(false, |ingredient| ingredient.to_lowercase().contains(term))
                }
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn append_movement(&mut self, movement: &NewInventoryMovement) -> Result<InventoryMovement> {
        let created = InventoryMovement {
            id: self.working.next_id(),
            medication_id: movement.medication_id,
            direction: movement.direction,
            quantity: movement.quantity,
            reason: movement.reason.clone(),
            actor_id: movement.actor_id.clone(),
            moved_at: Utc::now(),
        };
        self.working.movements.push(created.clone());
        Ok(created)
    }

    async fn movements_for(&mut self, medication_id: i64) -> Result<Vec<InventoryMovement>> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|movement| movement.medication_id == medication_id)
            .cloned()
            .collect())
    }

    async fn insert_triage(&mut self, triage: &NewTriage) -> Result<Triage> {
        let now = Utc::now();
        let created = Triage {
            id: self.working.next_id(),
            folder_id: triage.folder_id,
            patient_id: triage.patient_id.clone(),
            color: triage.color,
            location: triage.location,
            admission_reason: triage.admission_reason.clone(),
            vital_signs: triage.vital_signs.clone(),
            attended_by: None,
            state: TriageState::Waiting,
            created_at: now,
            updated_at: now,
        };
        self.working.triages.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_triage(&mut self, triage_id: i64) -> Result<Option<Triage>> {
        Ok(self.working.triages.get(&triage_id).cloned())
    }

    async fn lock_triage(&mut self, triage_id: i64) -> Result<Option<Triage>> {
        self.lock_trail.push("triage");
        Ok(self.working.triages.get(&triage_id).cloned())
    }

    async fn update_triage(
        &mut self,
        triage_id: i64,
        state: TriageState,
        attended_by: Option<&str>,
        location: Option<TriageLocation>,
    ) -> Result<Triage> {
        let triage = self
            .working
            .triages
            .get_mut(&triage_id)
            .ok_or_else(|| EdError::not_found("triage", triage_id))?;
        triage.state = state;
        if let Some(attended_by) = attended_by {
            triage.attended_by = Some(attended_by.to_string());
        }
        if let Some(location) = location {
            triage.location = location;
        }
        triage.updated_at = Utc::now();
        Ok(triage.clone())
    }

    async fn triages_for_folder(&mut self, folder_id: i64) -> Result<Vec<Triage>> {
        Ok(self
            .working
            .triages
            .values()
            .filter(|triage| triage.folder_id == folder_id)
            .cloned()
            .collect())
    }

    async fn latest_triage_for_patient(&mut self, national_id: &str) -> Result<Option<Triage>> {
        Ok(self
            .working
            .triages
            .values()
            .rev()
            .find(|triage| triage.patient_id == national_id)
            .cloned())
    }

    async fn triages_in_states(&mut self, states: &[TriageState]) -> Result<Vec<Triage>> {
        Ok(self
            .working
            .triages
            .values()
            .filter(|triage| states.contains(&triage.state))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_patient(id: &str) -> NewPatient {
        NewPatient {
            national_id: id.into(),
            full_name: "Paciente Prueba".into(),
            birth_date: None,
            phone: None,
            address: None,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_patient(&new_patient("V1")).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_patient("V1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_patient(&new_patient("V1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_patient("V1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_open_folder_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = NewVisitFolder {
            patient_id: "V1".into(),
            created_by: None,
            created_by_name: None,
        };

        tx.insert_folder(&folder).await.unwrap();
        let err = tx.insert_folder(&folder).await.unwrap_err();
        assert_eq!(err.kind(), ed_core::ErrorKind::Blocked);
    }
}
