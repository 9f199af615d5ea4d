//! 数据库模型
//!
//! 表行模型使用 `FromRow`，状态列存为字符串，转换为领域类型时校验取值。

use chrono::{DateTime, NaiveDate, Utc};
use ed_core::models::*;
use ed_core::{EdError, Result};
use sqlx::FromRow;

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub national_id: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(row: DbPatient) -> Self {
        Patient {
            national_id: row.national_id,
            full_name: row.full_name,
            birth_date: row.birth_date,
            phone: row.phone,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

/// 数据库就诊档案表
#[derive(Debug, FromRow)]
pub struct DbVisitFolder {
    pub id: i64,
    pub patient_id: String,
    pub status: String, // 存储为字符串，转换为FolderStatus枚举
    pub created_by: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbVisitFolder> for VisitFolder {
    type Error = EdError;

    fn try_from(row: DbVisitFolder) -> Result<Self> {
        Ok(VisitFolder {
            id: row.id,
            patient_id: row.patient_id,
            created_at: row.created_at,
            status: row.status.parse()?,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
        })
    }
}

/// 数据库子记录表，临床字段存为 JSONB
#[derive(Debug, FromRow)]
pub struct DbClinicalRecord {
    pub id: i64,
    pub folder_id: i64,
    pub patient_id: String,
    pub kind: String,
    pub fields: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbClinicalRecord> for ChildRecord {
    type Error = EdError;

    fn try_from(row: DbClinicalRecord) -> Result<Self> {
        let kind: RecordKind = row.kind.parse()?;
        Ok(ChildRecord {
            id: row.id,
            kind,
            folder_id: row.folder_id,
            patient_id: row.patient_id,
            fields: RecordFields::from_value(kind, row.fields)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 数据库医嘱表
#[derive(Debug, FromRow)]
pub struct DbMedicalOrder {
    pub id: i64,
    pub folder_id: i64,
    pub patient_id: String,
    pub immediate_indications: Option<String>,
    pub suggested_treatments: Option<String>,
    pub medication_requirement: Option<String>,
    pub complementary_exams: Option<String>,
    pub course_of_action: Option<String>,
    pub medication_id: Option<i64>,
    pub status: String,
    pub ordered_by: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
}

impl TryFrom<DbMedicalOrder> for MedicalOrder {
    type Error = EdError;

    fn try_from(row: DbMedicalOrder) -> Result<Self> {
        Ok(MedicalOrder {
            id: row.id,
            folder_id: row.folder_id,
            patient_id: row.patient_id,
            instructions: OrderInstructions {
                immediate_indications: row.immediate_indications,
                suggested_treatments: row.suggested_treatments,
                medication_requirement: row.medication_requirement,
                complementary_exams: row.complementary_exams,
                course_of_action: row.course_of_action,
            },
            medication_id: row.medication_id,
            status: row.status.parse()?,
            ordered_by: row.ordered_by,
            ordered_at: row.ordered_at,
            completed_at: row.completed_at,
            completion_notes: row.completion_notes,
        })
    }
}

/// 数据库发药申请表
#[derive(Debug, FromRow)]
pub struct DbDispenseRequest {
    pub id: i64,
    pub order_id: i64,
    pub medication_id: i64,
    pub quantity: i32,
    pub requested_by: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
}

impl TryFrom<DbDispenseRequest> for DispenseRequest {
    type Error = EdError;

    fn try_from(row: DbDispenseRequest) -> Result<Self> {
        Ok(DispenseRequest {
            id: row.id,
            order_id: row.order_id,
            medication_id: row.medication_id,
            quantity: row.quantity,
            requested_by: row.requested_by,
            status: row.status.parse()?,
            requested_at: row.requested_at,
        })
    }
}

/// 数据库药品表
#[derive(Debug, FromRow)]
pub struct DbMedication {
    pub id: i64,
    pub name: String,
    pub active_ingredient: Option<String>,
    pub concentration: Option<String>,
    pub presentation: Option<String>,
    pub available_quantity: i32,
    pub minimum_stock: i32,
    pub expiry_date: Option<NaiveDate>,
}

impl From<DbMedication> for Medication {
    fn from(row: DbMedication) -> Self {
        Medication {
            id: row.id,
            name: row.name,
            active_ingredient: row.active_ingredient,
            concentration: row.concentration,
            presentation: row.presentation,
            available_quantity: row.available_quantity,
            minimum_stock: row.minimum_stock,
            expiry_date: row.expiry_date,
        }
    }
}

/// 数据库库存流水表
#[derive(Debug, FromRow)]
pub struct DbInventoryMovement {
    pub id: i64,
    pub medication_id: i64,
    pub direction: String,
    pub quantity: i32,
    pub reason: String,
    pub actor_id: Option<String>,
    pub moved_at: DateTime<Utc>,
}

impl TryFrom<DbInventoryMovement> for InventoryMovement {
    type Error = EdError;

    fn try_from(row: DbInventoryMovement) -> Result<Self> {
        Ok(InventoryMovement {
            id: row.id,
            medication_id: row.medication_id,
            direction: row.direction.parse()?,
            quantity: row.quantity,
            reason: row.reason,
            actor_id: row.actor_id,
            moved_at: row.moved_at,
        })
    }
}

/// 数据库分诊表
#[derive(Debug, FromRow)]
pub struct DbTriage {
    pub id: i64,
    pub folder_id: i64,
    pub patient_id: String,
    pub color: String,
    pub location: String,
    pub admission_reason: Option<String>,
    pub vital_signs: Option<String>,
    pub attended_by: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTriage> for Triage {
    type Error = EdError;

    fn try_from(row: DbTriage) -> Result<Self> {
        Ok(Triage {
            id: row.id,
            folder_id: row.folder_id,
            patient_id: row.patient_id,
            color: row.color.parse()?,
            location: row.location.parse()?,
            admission_reason: row.admission_reason,
            vital_signs: row.vital_signs,
            attended_by: row.attended_by,
            state: row.state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 批量转换查询结果
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EdError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder_row(status: &str) -> DbVisitFolder {
        DbVisitFolder {
            id: 7,
            patient_id: "V123".into(),
            status: status.into(),
            created_by: Some("res-01".into()),
            created_by_name: Some("Dra. Rivas".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_folder_row_conversion() {
        let folder = VisitFolder::try_from(folder_row("DECEASED")).unwrap();
        assert_eq!(folder.status, FolderStatus::Deceased);
        assert_eq!(folder.created_by_name.as_deref(), Some("Dra. Rivas"));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(VisitFolder::try_from(folder_row("CERRADA")).is_err());
    }

    #[test]
    fn test_record_row_parses_fields_by_kind() {
        let row = DbClinicalRecord {
            id: 1,
            folder_id: 7,
            patient_id: "V123".into(),
            kind: "HABITS".into(),
            fields: serde_json::json!({ "coffee": "2 tazas/día", "tobacco": null }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let record = ChildRecord::try_from(row).unwrap();
        assert_eq!(record.kind, RecordKind::Habits);
        match record.fields {
            RecordFields::Habits(habits) => {
                assert_eq!(habits.coffee.as_deref(), Some("2 tazas/día"));
                assert_eq!(habits.tobacco, None);
            }
            other => panic!("unexpected fields: {:?}", other),
        }
    }

    #[test]
    fn test_convert_all_stops_on_bad_row() {
        let rows = vec![folder_row("OPEN"), folder_row("???")];
        let converted: Result<Vec<VisitFolder>> = convert_all(rows);
        assert!(converted.is_err());
    }
}
