//! 诊断前置检查

use ed_core::{ClinicalTx, EdError, GateScope, Prerequisite, RecordScope, Result};
use tracing::warn;

/// 前置检查：就诊原因、体格检查、个人史都存在才允许写诊断
#[derive(Debug, Default)]
pub struct PrerequisiteGate {
    scope: GateScope,
}

impl PrerequisiteGate {
    pub fn new(scope: GateScope) -> Self {
        Self { scope }
    }

    /// 按固定顺序返回第一项缺失的前置记录
    pub async fn first_missing<T: ClinicalTx>(
        &self,
        tx: &mut T,
        patient_id: &str,
        folder_id: i64,
    ) -> Result<Option<Prerequisite>> {
        let scope = match self.scope {
            GateScope::Patient => RecordScope::Patient(patient_id.to_string()),
            GateScope::Folder => RecordScope::Folder(folder_id),
        };

        for prerequisite in Prerequisite::CHECK_ORDER {
            if !tx.record_exists(&scope, prerequisite.record_kind()).await? {
                return Ok(Some(prerequisite));
            }
        }
        Ok(None)
    }

    pub async fn check_diagnosis_allowed<T: ClinicalTx>(
        &self,
        tx: &mut T,
        patient_id: &str,
        folder_id: i64,
    ) -> Result<()> {
        match self.first_missing(tx, patient_id, folder_id).await? {
            Some(missing) => {
                warn!(patient_id, folder_id, missing = %missing, "Diagnosis blocked");
                Err(EdError::MissingPrerequisite(missing))
            }
            None => Ok(()),
        }
    }
}
