//! 就诊档案解析
//!
//! 每次临床写入前决定沿用患者当前打开的档案还是新建一个。
//! 只看档案状态，不按日期划分就诊。

use ed_core::{Actor, ClinicalTx, EdError, FolderStatus, NewVisitFolder, Result, VisitFolder};
use tracing::{debug, info, warn};

/// 档案解析器
#[derive(Debug, Default)]
pub struct VisitFolderResolver;

impl VisitFolderResolver {
    pub fn new() -> Self {
        Self
    }

    /// 找到或创建患者的打开档案
    ///
    /// 同一患者的查找与创建在事务内串行化；任一档案为 DECEASED 时拒绝写入。
    pub async fn resolve<T: ClinicalTx>(
        &self,
        tx: &mut T,
        patient_id: &str,
        actor: &Actor,
    ) -> Result<VisitFolder> {
        if tx.get_patient(patient_id).await?.is_none() {
            return Err(EdError::not_found("patient", patient_id));
        }

        tx.lock_patient(patient_id).await?;
        let folders = tx.folders_for_patient(patient_id).await?;

        // 转诊后新开的档案可能排在死亡档案之前
        if let Some(deceased) = folders.iter().find(|f| f.status == FolderStatus::Deceased) {
            warn!(patient_id, folder_id = deceased.id, "Rejected write for deceased patient");
            return Err(EdError::PatientDeceased {
                patient_id: patient_id.to_string(),
            });
        }

        if let Some(open) = folders.into_iter().find(|f| f.status == FolderStatus::Open) {
            debug!(patient_id, folder_id = open.id, "Reusing open folder");
            return Ok(open);
        }

        let folder = tx
            .insert_folder(&NewVisitFolder {
                patient_id: patient_id.to_string(),
                created_by: Some(actor.id.clone()),
                created_by_name: Some(actor.display_name.clone()),
            })
            .await?;

        info!(patient_id, folder_id = folder.id, actor = %actor.id, "Opened new visit folder");
        Ok(folder)
    }
}
