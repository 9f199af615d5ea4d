//! 档案关闭级联
//!
//! 关闭档案时在同一事务内：取消全部 PENDING 医嘱、按策略退回已发药品、
//! 写入档案结局，并把仍在流转中的分诊记录一并结束。

use crate::inventory::InventoryLedger;
use ed_core::{
    Actor, CancelledOrderStock, ClinicalTx, EdError, FolderStatus, InventoryMovement, Result,
    VisitOutcome,
};
use serde::Serialize;
use tracing::{info, warn};

/// 级联结果
#[derive(Debug, Clone, Serialize)]
pub struct ClosureReport {
    pub folder_id: i64,
    pub previous_status: FolderStatus,
    pub outcome: VisitOutcome,
    pub cancelled_orders: Vec<i64>,
    pub reversals: Vec<InventoryMovement>,
    pub closed_triages: Vec<i64>,
}

/// 档案关闭级联
#[derive(Debug, Default)]
pub struct VisitClosureCascade {
    stock_policy: CancelledOrderStock,
}

impl VisitClosureCascade {
    pub fn new(stock_policy: CancelledOrderStock) -> Self {
        Self { stock_policy }
    }

    pub async fn close<T: ClinicalTx>(
        &self,
        tx: &mut T,
        ledger: &InventoryLedger,
        folder_id: i64,
        outcome: VisitOutcome,
        actor: &Actor,
    ) -> Result<ClosureReport> {
        let patient_id = tx
            .get_folder(folder_id)
            .await?
            .ok_or_else(|| EdError::not_found("folder", folder_id))?
            .patient_id;
        tx.lock_patient(&patient_id).await?;
        // 加锁前读到的状态可能已被其他事务改写
        let folder = tx
            .get_folder(folder_id)
            .await?
            .ok_or_else(|| EdError::not_found("folder", folder_id))?;

        let cancelled_orders = tx.cancel_pending_orders(folder_id).await?;

        let mut reversals = Vec::new();
        if self.stock_policy == CancelledOrderStock::Revert {
            for order_id in &cancelled_orders {
                let movements = ledger
                    .revert_dispenses(tx, *order_id, Some(&actor.id))
                    .await?;
                reversals.extend(movements);
            }
        }

        tx.set_folder_status(folder_id, outcome.folder_status()).await?;

        let mut closed_triages = Vec::new();
        for triage in tx.triages_for_folder(folder_id).await? {
            if !triage.state.is_terminal() {
                tx.update_triage(triage.id, outcome.triage_state(), None, None)
                    .await?;
                closed_triages.push(triage.id);
            }
        }

        if !cancelled_orders.is_empty() {
            warn!(
                folder_id,
                cancelled = cancelled_orders.len(),
                "Cancelled pending orders on visit closure"
            );
        }
        info!(
            folder_id,
            patient_id = %folder.patient_id,
            from = %folder.status,
            outcome = outcome.as_str(),
            actor = %actor.id,
            "Visit folder closed"
        );

        Ok(ClosureReport {
            folder_id,
            previous_status: folder.status,
            outcome,
            cancelled_orders,
            reversals,
            closed_triages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use ed_core::{
        ClinicalStore, MedicalOrder, NewMedicalOrder, NewVisitFolder, OrderInstructions,
        OrderStatus, Role,
    };

    fn doctor() -> Actor {
        Actor::new("u-1", "Dr. Salas", Role::Specialist)
    }

    async fn order(tx: &mut <MemoryStore as ClinicalStore>::Tx, folder_id: i64) -> MedicalOrder {
        tx.insert_order(&NewMedicalOrder {
            folder_id,
            patient_id: "V123".into(),
            instructions: OrderInstructions {
                suggested_treatments: Some("analgesia".into()),
                ..Default::default()
            },
            medication_id: None,
            ordered_by: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_close_cancels_only_pending_orders() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = tx
            .insert_folder(&NewVisitFolder {
                patient_id: "V123".into(),
                created_by: None,
                created_by_name: None,
            })
            .await
            .unwrap();

        let pending: Vec<i64> = vec![
            order(&mut tx, folder.id).await.id,
            order(&mut tx, folder.id).await.id,
            order(&mut tx, folder.id).await.id,
        ];
        let done = order(&mut tx, folder.id).await;
        tx.complete_order(done.id, OrderStatus::Fulfilled, None, chrono::Utc::now())
            .await
            .unwrap();

        let report = VisitClosureCascade::default()
            .close(&mut tx, &InventoryLedger::new(), folder.id, VisitOutcome::Discharged, &doctor())
            .await
            .unwrap();

        assert_eq!(report.cancelled_orders, pending);
        assert!(report.reversals.is_empty());
        assert_eq!(
            tx.get_folder(folder.id).await.unwrap().unwrap().status,
            FolderStatus::Discharged
        );
        for order in tx.orders_for_folder(folder.id).await.unwrap() {
            let expected = if order.id == done.id {
                OrderStatus::Fulfilled
            } else {
                OrderStatus::Cancelled
            };
            assert_eq!(order.status, expected);
        }
    }

    #[tokio::test]
    async fn test_previous_status_read_under_patient_lock() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let folder = tx
            .insert_folder(&NewVisitFolder {
                patient_id: "V123".into(),
                created_by: None,
                created_by_name: None,
            })
            .await
            .unwrap();
        tx.set_folder_status(folder.id, FolderStatus::Transferred).await.unwrap();

        let report = VisitClosureCascade::default()
            .close(&mut tx, &InventoryLedger::new(), folder.id, VisitOutcome::Discharged, &doctor())
            .await
            .unwrap();

        assert_eq!(report.previous_status, FolderStatus::Transferred);
        assert_eq!(tx.lock_trail().first(), Some(&"patient"));
    }

    #[tokio::test]
    async fn test_unknown_folder() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = VisitClosureCascade::default()
            .close(&mut tx, &InventoryLedger::new(), 42, VisitOutcome::Deceased, &doctor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ed_core::ErrorKind::NotFound);
    }
}
