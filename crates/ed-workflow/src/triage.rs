//! 分诊状态机
//!
//! 等候 → 诊治中 → 终态（出院 / 死亡 / 转诊）。进入终态时由引擎触发档案关闭。

use crate::state_machine::{StateMachine, TriageEvent};
use ed_core::{
    Actor, ClinicalTx, EdError, NewTriage, Result, Triage, TriageColor, TriageLocation,
    TriageState, VisitFolder, VisitOutcome,
};
use serde::Deserialize;
use tracing::info;

/// 分诊登记参数
#[derive(Debug, Clone, Deserialize)]
pub struct TriageInput {
    pub color: TriageColor,
    pub location: TriageLocation,
    pub admission_reason: Option<String>,
    pub vital_signs: Option<String>,
}

/// 分诊状态机
#[derive(Debug)]
pub struct TriageStateMachine {
    machine: StateMachine<TriageState, TriageEvent>,
}

impl TriageStateMachine {
    pub fn new() -> Self {
        Self {
            machine: StateMachine::triage(),
        }
    }

    pub async fn register<T: ClinicalTx>(
        &self,
        tx: &mut T,
        folder: &VisitFolder,
        input: &TriageInput,
    ) -> Result<Triage> {
        let triage = tx
            .insert_triage(&NewTriage {
                folder_id: folder.id,
                patient_id: folder.patient_id.clone(),
                color: input.color,
                location: input.location,
                admission_reason: input.admission_reason.clone(),
                vital_signs: input.vital_signs.clone(),
            })
            .await?;

        info!(triage_id = triage.id, folder_id = folder.id, color = %triage.color, "Registered triage");
        Ok(triage)
    }

    /// 唯一的状态转换入口
    ///
    /// 进入 BEING_SEEN 时记录接诊人和可选的新区域。返回更新后的记录。
    pub async fn transition<T: ClinicalTx>(
        &self,
        tx: &mut T,
        triage_id: i64,
        target: TriageState,
        location: Option<TriageLocation>,
        actor: &Actor,
    ) -> Result<Triage> {
        let patient_id = tx
            .get_triage(triage_id)
            .await?
            .ok_or_else(|| EdError::not_found("triage", triage_id))?
            .patient_id;
        // 终态会触发档案关闭，先取患者锁再锁分诊行
        tx.lock_patient(&patient_id).await?;
        let triage = tx
            .lock_triage(triage_id)
            .await?
            .ok_or_else(|| EdError::not_found("triage", triage_id))?;

        let event = TriageEvent::toward(target).ok_or_else(|| EdError::InvalidStateTransition {
            from: triage.state.to_string(),
            event: format!("set {}", target),
        })?;
        let next = self.machine.transition(triage.state, event)?;

        let attended_by = match event {
            TriageEvent::Attend => Some(actor.display_name.as_str()),
            _ => None,
        };
        let updated = tx
            .update_triage(triage_id, next, attended_by, location)
            .await?;

        info!(triage_id, from = %triage.state, to = %next, actor = %actor.id, "Triage transition");
        Ok(updated)
    }

    pub async fn attend<T: ClinicalTx>(
        &self,
        tx: &mut T,
        triage_id: i64,
        location: Option<TriageLocation>,
        actor: &Actor,
    ) -> Result<Triage> {
        self.transition(tx, triage_id, TriageState::BeingSeen, location, actor)
            .await
    }

    /// 结案只接受出院或死亡
    pub async fn finalize<T: ClinicalTx>(
        &self,
        tx: &mut T,
        triage_id: i64,
        outcome: VisitOutcome,
        actor: &Actor,
    ) -> Result<Triage> {
        if outcome == VisitOutcome::Transferred {
            return Err(EdError::Validation(
                "a triage can only be finalized as DISCHARGED or DECEASED".to_string(),
            ));
        }
        self.transition(tx, triage_id, outcome.triage_state(), None, actor)
            .await
    }
}

impl Default for TriageStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
