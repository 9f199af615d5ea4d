//! 档案子记录
//!
//! 每个档案每种记录至多一行：已存在则按补丁合并，不存在则插入。

use ed_core::{ChildRecord, ClinicalTx, NewChildRecord, RecordFields, Result, VisitFolder};
use tracing::debug;

/// 子记录链接器
#[derive(Debug, Default)]
pub struct ChildRecordLinker;

impl ChildRecordLinker {
    pub fn new() -> Self {
        Self
    }

    /// 按 `(类型, 档案)` 写入记录，省略的字段保持原值
    pub async fn upsert<T: ClinicalTx>(
        &self,
        tx: &mut T,
        folder: &VisitFolder,
        fields: RecordFields,
    ) -> Result<ChildRecord> {
        let kind = fields.kind();

        match tx.find_record(folder.id, kind).await? {
            Some(existing) => {
                let mut merged = existing.fields;
                merged.apply(fields)?;
                debug!(folder_id = folder.id, record_id = existing.id, kind = %kind, "Updating record");
                tx.update_record(existing.id, &merged).await
            }
            None => {
                debug!(folder_id = folder.id, kind = %kind, "Inserting record");
                tx.insert_record(&NewChildRecord {
                    folder_id: folder.id,
                    patient_id: folder.patient_id.clone(),
                    fields,
                })
                .await
            }
        }
    }
}
