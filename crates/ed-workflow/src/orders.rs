//! 医嘱状态机
//!
//! 医嘱随诊断写入生成，状态为 PENDING 时可编辑；护士或药房记录执行结果，
//! 未执行时退回该医嘱已发出的全部药品。

use crate::inventory::InventoryLedger;
use crate::state_machine::{OrderEvent, StateMachine};
use chrono::Utc;
use ed_core::{
    Actor, ClinicalTx, EdError, InventoryMovement, MedicalOrder, NewMedicalOrder, OrderInstructions,
    OrderStatus, Result, VisitFolder,
};
use serde::Serialize;
use tracing::info;

/// 执行结果记录后的医嘱与退库流水
#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    pub order: MedicalOrder,
    pub reversals: Vec<InventoryMovement>,
}

/// 医嘱状态机
#[derive(Debug)]
pub struct MedicalOrderMachine {
    machine: StateMachine<OrderStatus, OrderEvent>,
}

impl MedicalOrderMachine {
    pub fn new() -> Self {
        Self {
            machine: StateMachine::orders(),
        }
    }

    /// 诊断写入时生成医嘱；内容全空则不生成
    pub async fn create_from_diagnosis<T: ClinicalTx>(
        &self,
        tx: &mut T,
        folder: &VisitFolder,
        instructions: &OrderInstructions,
        medication_id: Option<i64>,
        actor: &Actor,
    ) -> Result<Option<MedicalOrder>> {
        if instructions.is_empty() {
            return Ok(None);
        }
        if let Some(medication_id) = medication_id {
            if tx.get_medication(medication_id).await?.is_none() {
                return Err(EdError::not_found("medication", medication_id));
            }
        }

        let order = tx
            .insert_order(&NewMedicalOrder {
                folder_id: folder.id,
                patient_id: folder.patient_id.clone(),
                instructions: instructions.clone(),
                medication_id,
                ordered_by: Some(actor.id.clone()),
            })
            .await?;

        info!(order_id = order.id, folder_id = folder.id, "Created medical order");
        Ok(Some(order))
    }

    /// 医生修改医嘱内容，仅限 PENDING
    pub async fn edit<T: ClinicalTx>(
        &self,
        tx: &mut T,
        order_id: i64,
        patch: OrderInstructions,
        medication_id: Option<i64>,
    ) -> Result<MedicalOrder> {
        let order = lock(tx, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(EdError::NotEditable {
                order_id,
                status: order.status,
            });
        }
        if let Some(medication_id) = medication_id {
            if tx.get_medication(medication_id).await?.is_none() {
                return Err(EdError::not_found("medication", medication_id));
            }
        }

        let mut instructions = order.instructions;
        instructions.apply(patch);
        let medication_id = medication_id.or(order.medication_id);

        info!(order_id, "Edited medical order");
        tx.update_order_instructions(order_id, &instructions, medication_id)
            .await
    }

    /// 记录执行结果：FULFILLED 或 NOT_PERFORMED
    pub async fn record_outcome<T: ClinicalTx>(
        &self,
        tx: &mut T,
        ledger: &InventoryLedger,
        order_id: i64,
        target: OrderStatus,
        notes: Option<&str>,
        actor: &Actor,
    ) -> Result<OrderOutcome> {
        let event = OrderEvent::toward(target)?;
        let order = lock(tx, order_id).await?;
        let next = self.machine.transition(order.status, event)?;

        let order = tx.complete_order(order_id, next, notes, Utc::now()).await?;

        let reversals = if next == OrderStatus::NotPerformed {
            ledger.revert_dispenses(tx, order_id, Some(&actor.id)).await?
        } else {
            Vec::new()
        };

        info!(
            order_id,
            status = %next,
            reversals = reversals.len(),
            actor = %actor.id,
            "Recorded order outcome"
        );
        Ok(OrderOutcome { order, reversals })
    }
}

impl Default for MedicalOrderMachine {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn lock<T: ClinicalTx>(tx: &mut T, order_id: i64) -> Result<MedicalOrder> {
    tx.lock_order(order_id)
        .await?
        .ok_or_else(|| EdError::not_found("order", order_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use ed_core::{ClinicalStore, FolderStatus, NewVisitFolder, Role};

    fn doctor() -> Actor {
        Actor::new("u-1", "Dr. Salas", Role::Resident)
    }

    async fn folder(tx: &mut <MemoryStore as ClinicalStore>::Tx) -> VisitFolder {
        tx.insert_folder(&NewVisitFolder {
            patient_id: "V123".into(),
            created_by: None,
            created_by_name: None,
        })
        .await
        .unwrap()
    }

    fn instructions(text: &str) -> OrderInstructions {
        OrderInstructions {
            immediate_indications: Some(text.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_instructions_create_no_order() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = folder(&mut tx).await;

        let order = MedicalOrderMachine::new()
            .create_from_diagnosis(&mut tx, &folder, &OrderInstructions::default(), None, &doctor())
            .await
            .unwrap();
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn test_edit_merges_pending_order() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = folder(&mut tx).await;
        let orders = MedicalOrderMachine::new();
        let order = orders
            .create_from_diagnosis(&mut tx, &folder, &instructions("hidratación"), None, &doctor())
            .await
            .unwrap()
            .unwrap();

        let edited = orders
            .edit(
                &mut tx,
                order.id,
                OrderInstructions {
                    complementary_exams: Some("hematología completa".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(edited.instructions.immediate_indications.as_deref(), Some("hidratación"));
        assert_eq!(
            edited.instructions.complementary_exams.as_deref(),
            Some("hematología completa")
        );
    }

    #[tokio::test]
    async fn test_terminal_order_is_not_editable() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = folder(&mut tx).await;
        let orders = MedicalOrderMachine::new();
        let ledger = InventoryLedger::new();
        let order = orders
            .create_from_diagnosis(&mut tx, &folder, &instructions("reposo"), None, &doctor())
            .await
            .unwrap()
            .unwrap();

        orders
            .record_outcome(&mut tx, &ledger, order.id, OrderStatus::Fulfilled, Some("cumplido"), &doctor())
            .await
            .unwrap();

        let err = orders
            .edit(&mut tx, order.id, instructions("cambio"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EdError::NotEditable { status: OrderStatus::Fulfilled, .. }
        ));
    }

    #[tokio::test]
    async fn test_outcome_sets_notes_and_timestamp() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = folder(&mut tx).await;
        let orders = MedicalOrderMachine::new();
        let order = orders
            .create_from_diagnosis(&mut tx, &folder, &instructions("nebulizar"), None, &doctor())
            .await
            .unwrap()
            .unwrap();

        let outcome = orders
            .record_outcome(
                &mut tx,
                &InventoryLedger::new(),
                order.id,
                OrderStatus::Fulfilled,
                Some("nebulizado a las 10:00"),
                &doctor(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.order.status, OrderStatus::Fulfilled);
        assert!(outcome.order.completed_at.is_some());
        assert_eq!(outcome.order.completion_notes.as_deref(), Some("nebulizado a las 10:00"));
        assert!(outcome.reversals.is_empty());

        let again = orders
            .record_outcome(&mut tx, &InventoryLedger::new(), order.id, OrderStatus::NotPerformed, None, &doctor())
            .await;
        assert!(again.is_err());
        assert_eq!(
            tx.get_folder(folder.id).await.unwrap().unwrap().status,
            FolderStatus::Open
        );
    }
}
