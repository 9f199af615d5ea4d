//! 发药申请状态机
//!
//! 创建申请、扣减库存、追加出库流水在同一事务内完成。

use crate::inventory::{InventoryLedger, StockChange};
use crate::orders;
use crate::state_machine::{DispenseEvent, StateMachine};
use ed_core::{
    Actor, ClinicalTx, DispenseRequest, DispenseStatus, EdError, NewDispenseRequest, OrderStatus,
    Result, TriageState,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 发药申请参数
#[derive(Debug, Clone, Deserialize)]
pub struct DispenseInput {
    pub order_id: i64,
    pub medication_id: i64,
    pub quantity: i32,
}

/// 创建结果
#[derive(Debug, Clone, Serialize)]
pub struct DispenseReceipt {
    pub request: DispenseRequest,
    pub stock: StockChange,
}

/// 发药申请状态机
#[derive(Debug)]
pub struct DispenseRequestMachine {
    machine: StateMachine<DispenseStatus, DispenseEvent>,
}

impl DispenseRequestMachine {
    pub fn new() -> Self {
        Self {
            machine: StateMachine::dispenses(),
        }
    }

    /// 创建发药申请
    ///
    /// 依次检查：医嘱为 PENDING、药品与医嘱一致、患者正在诊治、没有进行中的申请、库存足够。
    pub async fn create<T: ClinicalTx>(
        &self,
        tx: &mut T,
        ledger: &InventoryLedger,
        input: &DispenseInput,
        actor: &Actor,
    ) -> Result<DispenseReceipt> {
        if input.quantity <= 0 {
            return Err(EdError::Validation(format!(
                "quantity must be positive, got {}",
                input.quantity
            )));
        }

        let order = orders::lock(tx, input.order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(EdError::Blocked(format!(
                "order #{} is {}, medication can only be dispensed for pending orders",
                order.id, order.status
            )));
        }
        if let Some(expected) = order.medication_id {
            if expected != input.medication_id {
                return Err(EdError::MedicationMismatch {
                    order_id: order.id,
                    expected,
                    requested: input.medication_id,
                });
            }
        }

        let triages = tx.triages_for_folder(order.folder_id).await?;
        let being_seen = triages
            .last()
            .map_or(false, |triage| triage.state == TriageState::BeingSeen);
        if !being_seen {
            return Err(EdError::NotBeingSeen {
                folder_id: order.folder_id,
            });
        }

        let existing = tx.dispenses_for_order(order.id).await?;
        if existing.iter().any(|request| request.status.is_active()) {
            warn!(order_id = order.id, "Duplicate dispense request rejected");
            return Err(EdError::DuplicateDispense { order_id: order.id });
        }

        let reason = format!("dispense for order #{}", order.id);
        let stock = ledger
            .withdraw(tx, input.medication_id, input.quantity, &reason, Some(&actor.id))
            .await?;

        let request = tx
            .insert_dispense(&NewDispenseRequest {
                order_id: order.id,
                medication_id: input.medication_id,
                quantity: input.quantity,
                requested_by: actor.id.clone(),
            })
            .await?;

        info!(
            request_id = request.id,
            order_id = order.id,
            medication_id = input.medication_id,
            quantity = input.quantity,
            "Created dispense request"
        );
        Ok(DispenseReceipt { request, stock })
    }

    /// 推进申请状态，不影响库存
    ///
    /// 所属医嘱已取消或未执行时拒绝。
    pub async fn advance<T: ClinicalTx>(
        &self,
        tx: &mut T,
        request_id: i64,
        target: DispenseStatus,
    ) -> Result<DispenseRequest> {
        let event = DispenseEvent::toward(target)?;
        let request = tx
            .lock_dispense(request_id)
            .await?
            .ok_or_else(|| EdError::not_found("dispense request", request_id))?;
        let order = orders::lock(tx, request.order_id).await?;
        if order.status.stops_dispensing() {
            warn!(request_id, order_id = order.id, status = %order.status, "Dispense advance rejected");
            return Err(EdError::Blocked(format!(
                "order #{} is {}, its dispense request can no longer be advanced",
                order.id, order.status
            )));
        }
        let next = self.machine.transition(request.status, event)?;

        info!(request_id, status = %next, "Advanced dispense request");
        tx.set_dispense_status(request_id, next).await
    }
}

impl Default for DispenseRequestMachine {
    fn default() -> Self {
        Self::new()
    }
}
