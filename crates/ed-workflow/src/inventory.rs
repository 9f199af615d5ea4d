//! 库存台账
//!
//! 药品可用数量的所有变动都经过这里，并同时追加一条流水。

use ed_core::{
    ClinicalTx, EdError, InventoryMovement, Medication, MovementDirection, NewInventoryMovement,
    NewMedication, Result,
};
use serde::Serialize;
use tracing::{info, warn};

/// 一次库存变动的结果
#[derive(Debug, Clone, Serialize)]
pub struct StockChange {
    pub medication: Medication,
    pub movement: InventoryMovement,
}

/// 库存台账
#[derive(Debug, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// 登记新批次，初始库存为 0
    pub async fn register<T: ClinicalTx>(
        &self,
        tx: &mut T,
        medication: &NewMedication,
    ) -> Result<Medication> {
        if medication.name.trim().is_empty() {
            return Err(EdError::Validation("medication name is required".to_string()));
        }
        if medication.minimum_stock < 0 {
            return Err(EdError::Validation("minimum stock cannot be negative".to_string()));
        }

        let existing = tx
            .find_batch(
                &medication.name,
                medication.concentration.as_deref(),
                medication.expiry_date,
            )
            .await?;
        if let Some(existing) = existing {
            return Err(EdError::Conflict(format!(
                "batch already registered as medication #{}, add stock to it instead",
                existing.id
            )));
        }

        let created = tx.insert_medication(medication).await?;
        info!(medication_id = created.id, name = %created.name, "Registered medication batch");
        Ok(created)
    }

    /// 入库
    pub async fn receive<T: ClinicalTx>(
        &self,
        tx: &mut T,
        medication_id: i64,
        quantity: i32,
        reason: &str,
        actor_id: Option<&str>,
    ) -> Result<StockChange> {
        ensure_positive(quantity)?;
        let mut medication = lock(tx, medication_id).await?;

        medication.available_quantity = tx.adjust_stock(medication_id, quantity).await?;
        let movement = tx
            .append_movement(&NewInventoryMovement {
                medication_id,
                direction: MovementDirection::In,
                quantity,
                reason: reason.to_string(),
                actor_id: actor_id.map(str::to_string),
            })
            .await?;

        info!(
            medication_id,
            quantity,
            available = medication.available_quantity,
            reason,
            "Stock entry"
        );
        Ok(StockChange { medication, movement })
    }

    /// 出库，数量超过可用库存时拒绝
    pub async fn withdraw<T: ClinicalTx>(
        &self,
        tx: &mut T,
        medication_id: i64,
        quantity: i32,
        reason: &str,
        actor_id: Option<&str>,
    ) -> Result<StockChange> {
        ensure_positive(quantity)?;
        let mut medication = lock(tx, medication_id).await?;

        if quantity > medication.available_quantity {
            warn!(
                medication_id,
                available = medication.available_quantity,
                requested = quantity,
                "Insufficient stock"
            );
            return Err(EdError::InsufficientStock {
                medication_id,
                available: medication.available_quantity,
                requested: quantity,
            });
        }

        medication.available_quantity = tx.adjust_stock(medication_id, -quantity).await?;
        let movement = tx
            .append_movement(&NewInventoryMovement {
                medication_id,
                direction: MovementDirection::Out,
                quantity,
                reason: reason.to_string(),
                actor_id: actor_id.map(str::to_string),
            })
            .await?;

        info!(
            medication_id,
            quantity,
            available = medication.available_quantity,
            reason,
            "Stock exit"
        );
        Ok(StockChange { medication, movement })
    }

    /// 退回医嘱下全部发药申请的数量，每笔申请一条入库流水
    pub async fn revert_dispenses<T: ClinicalTx>(
        &self,
        tx: &mut T,
        order_id: i64,
        actor_id: Option<&str>,
    ) -> Result<Vec<InventoryMovement>> {
        let reason = format!("reversal: order #{} cancelled", order_id);
        let mut movements = Vec::new();

        for request in tx.dispenses_for_order(order_id).await? {
            let change = self
                .receive(tx, request.medication_id, request.quantity, &reason, actor_id)
                .await?;
            movements.push(change.movement);
        }
        Ok(movements)
    }

    pub async fn low_stock<T: ClinicalTx>(&self, tx: &mut T) -> Result<Vec<Medication>> {
        let all = tx.search_medications(None).await?;
        Ok(all.into_iter().filter(Medication::is_low_stock).collect())
    }

    /// 药品流水，药品不存在时报 NotFound
    pub async fn movements<T: ClinicalTx>(
        &self,
        tx: &mut T,
        medication_id: i64,
    ) -> Result<Vec<InventoryMovement>> {
        if tx.get_medication(medication_id).await?.is_none() {
            return Err(EdError::not_found("medication", medication_id));
        }
        tx.movements_for(medication_id).await
    }
}

fn ensure_positive(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(EdError::Validation(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

async fn lock<T: ClinicalTx>(tx: &mut T, medication_id: i64) -> Result<Medication> {
    tx.lock_medication(medication_id)
        .await?
        .ok_or_else(|| EdError::not_found("medication", medication_id))
}
