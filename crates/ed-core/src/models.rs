//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EdError, Result};

/// 生成带 `as_str` 与 `FromStr` 的字符串枚举，数据库与接口使用同一套取值
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = EdError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(EdError::Validation(format!(
                        "invalid {} value: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// 全部字段可选的临床文本结构，`apply` 只覆盖补丁中出现的字段
macro_rules! patchable {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(#[serde(default)] pub $field: Option<$ty>),+
        }

        impl $name {
            pub fn apply(&mut self, patch: $name) {
                $(
                    if patch.$field.is_some() {
                        self.$field = patch.$field;
                    }
                )+
            }
        }
    };
}

// ========== 患者与操作人 ==========

/// 患者基本信息（由患者目录维护，这里只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub national_id: String, // 身份证号（全局唯一）
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// 按给定日期计算年龄
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.birth_date.and_then(|birth| today.years_since(birth))
    }
}

/// 新患者插入模型
#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub national_id: String,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

str_enum!(
    /// 用户角色
    Role {
        Admin => "ADMIN",
        Resident => "RESIDENT",
        Nurse => "NURSE",
        Pharmacy => "PHARMACY",
        Specialist => "SPECIALIST",
    }
);

/// 当前操作人，由身份服务签发，显式传入每个操作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}

// ========== 就诊档案 ==========

str_enum!(
    /// 就诊档案状态
    FolderStatus {
        Open => "OPEN",
        Discharged => "DISCHARGED",
        Deceased => "DECEASED",
        Transferred => "TRANSFERRED",
    }
);

impl FolderStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, FolderStatus::Open)
    }
}

/// 就诊结局，关闭档案时使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitOutcome {
    Discharged,
    Deceased,
    Transferred,
}

impl VisitOutcome {
    pub fn folder_status(&self) -> FolderStatus {
        match self {
            VisitOutcome::Discharged => FolderStatus::Discharged,
            VisitOutcome::Deceased => FolderStatus::Deceased,
            VisitOutcome::Transferred => FolderStatus::Transferred,
        }
    }

    pub fn triage_state(&self) -> TriageState {
        match self {
            VisitOutcome::Discharged => TriageState::Discharged,
            VisitOutcome::Deceased => TriageState::Deceased,
            VisitOutcome::Transferred => TriageState::Transferred,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.folder_status().as_str()
    }
}

/// 就诊档案：一次急诊就诊的聚合记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitFolder {
    pub id: i64,
    pub patient_id: String,
    pub created_at: DateTime<Utc>,
    pub status: FolderStatus,
    pub created_by: Option<String>,
    pub created_by_name: Option<String>, // 创建时的姓名快照
}

/// 新档案插入模型
#[derive(Debug, Clone)]
pub struct NewVisitFolder {
    pub patient_id: String,
    pub created_by: Option<String>,
    pub created_by_name: Option<String>,
}

// ========== 档案子记录 ==========

str_enum!(
    /// 子记录类型，每个档案每种类型至多一行
    RecordKind {
        Motive => "MOTIVE",
        PhysicalExam => "PHYSICAL_EXAM",
        FunctionalExam => "FUNCTIONAL_EXAM",
        PersonalHistory => "PERSONAL_HISTORY",
        FamilyHistory => "FAMILY_HISTORY",
        Habits => "HABITS",
        Diagnosis => "DIAGNOSIS",
    }
);

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        RecordKind::Motive,
        RecordKind::PhysicalExam,
        RecordKind::FunctionalExam,
        RecordKind::PersonalHistory,
        RecordKind::FamilyHistory,
        RecordKind::Habits,
        RecordKind::Diagnosis,
    ];

    /// URL 路径中的写法
    pub fn slug(&self) -> &'static str {
        match self {
            RecordKind::Motive => "motive",
            RecordKind::PhysicalExam => "physical-exam",
            RecordKind::FunctionalExam => "functional-exam",
            RecordKind::PersonalHistory => "personal-history",
            RecordKind::FamilyHistory => "family-history",
            RecordKind::Habits => "habits",
            RecordKind::Diagnosis => "diagnosis",
        }
    }

    pub fn from_slug(slug: &str) -> Option<RecordKind> {
        RecordKind::ALL.into_iter().find(|kind| kind.slug() == slug)
    }
}

patchable!(
    /// 就诊原因
    MotiveOfVisit { reason: String }
);

patchable!(
    /// 体格检查
    PhysicalExam { area: String, findings: String }
);

patchable!(
    /// 功能检查（按系统）
    FunctionalExam { system: String, findings: String }
);

patchable!(
    /// 个人史
    PersonalHistory { category: String, detail: String }
);

patchable!(
    /// 家族史
    FamilyHistory {
        relative: String,
        vital_status: String,
        age: i32,
        pathologies: String,
    }
);

patchable!(
    /// 心理生物习惯
    Habits {
        coffee: String,
        tobacco: String,
        alcohol: String,
        illicit_drugs: String,
        occupation: String,
        sleep: String,
        housing: String,
    }
);

patchable!(
    /// 诊断
    Diagnosis { definitive_diagnosis: String }
);

/// 子记录字段，按类型区分
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordFields {
    Motive(MotiveOfVisit),
    PhysicalExam(PhysicalExam),
    FunctionalExam(FunctionalExam),
    PersonalHistory(PersonalHistory),
    FamilyHistory(FamilyHistory),
    Habits(Habits),
    Diagnosis(Diagnosis),
}

impl RecordFields {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordFields::Motive(_) => RecordKind::Motive,
            RecordFields::PhysicalExam(_) => RecordKind::PhysicalExam,
            RecordFields::FunctionalExam(_) => RecordKind::FunctionalExam,
            RecordFields::PersonalHistory(_) => RecordKind::PersonalHistory,
            RecordFields::FamilyHistory(_) => RecordKind::FamilyHistory,
            RecordFields::Habits(_) => RecordKind::Habits,
            RecordFields::Diagnosis(_) => RecordKind::Diagnosis,
        }
    }

    /// 按类型解析 JSON 字段
    pub fn from_value(kind: RecordKind, value: serde_json::Value) -> Result<Self> {
        let fields = match kind {
            RecordKind::Motive => RecordFields::Motive(serde_json::from_value(value)?),
            RecordKind::PhysicalExam => RecordFields::PhysicalExam(serde_json::from_value(value)?),
            RecordKind::FunctionalExam => RecordFields::FunctionalExam(serde_json::from_value(value)?),
            RecordKind::PersonalHistory => RecordFields::PersonalHistory(serde_json::from_value(value)?),
            RecordKind::FamilyHistory => RecordFields::FamilyHistory(serde_json::from_value(value)?),
            RecordKind::Habits => RecordFields::Habits(serde_json::from_value(value)?),
            RecordKind::Diagnosis => RecordFields::Diagnosis(serde_json::from_value(value)?),
        };
        Ok(fields)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// 合并补丁；类型不一致时拒绝
    pub fn apply(&mut self, patch: RecordFields) -> Result<()> {
        match (self, patch) {
            (RecordFields::Motive(current), RecordFields::Motive(patch)) => current.apply(patch),
            (RecordFields::PhysicalExam(current), RecordFields::PhysicalExam(patch)) => current.apply(patch),
            (RecordFields::FunctionalExam(current), RecordFields::FunctionalExam(patch)) => current.apply(patch),
            (RecordFields::PersonalHistory(current), RecordFields::PersonalHistory(patch)) => current.apply(patch),
            (RecordFields::FamilyHistory(current), RecordFields::FamilyHistory(patch)) => current.apply(patch),
            (RecordFields::Habits(current), RecordFields::Habits(patch)) => current.apply(patch),
            (RecordFields::Diagnosis(current), RecordFields::Diagnosis(patch)) => current.apply(patch),
            (current, patch) => {
                return Err(EdError::Validation(format!(
                    "cannot apply {} fields to a {} record",
                    patch.kind(),
                    current.kind()
                )))
            }
        }
        Ok(())
    }
}

/// 档案子记录
#[derive(Debug, Clone, Serialize)]
pub struct ChildRecord {
    pub id: i64,
    pub kind: RecordKind,
    pub folder_id: i64,
    pub patient_id: String,
    pub fields: RecordFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新子记录插入模型
#[derive(Debug, Clone)]
pub struct NewChildRecord {
    pub folder_id: i64,
    pub patient_id: String,
    pub fields: RecordFields,
}

/// 诊断前必须存在的记录，按检查顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    Motive,
    PhysicalExam,
    PersonalHistory,
}

impl Prerequisite {
    pub const CHECK_ORDER: [Prerequisite; 3] = [
        Prerequisite::Motive,
        Prerequisite::PhysicalExam,
        Prerequisite::PersonalHistory,
    ];

    pub fn record_kind(&self) -> RecordKind {
        match self {
            Prerequisite::Motive => RecordKind::Motive,
            Prerequisite::PhysicalExam => RecordKind::PhysicalExam,
            Prerequisite::PersonalHistory => RecordKind::PersonalHistory,
        }
    }
}

impl std::fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Prerequisite::Motive => "motive of visit",
            Prerequisite::PhysicalExam => "physical exam",
            Prerequisite::PersonalHistory => "personal history",
        };
        f.write_str(name)
    }
}

/// 前置检查的范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScope {
    Patient(String),
    Folder(i64),
}

// ========== 医嘱 ==========

str_enum!(
    /// 医嘱状态
    OrderStatus {
        Pending => "PENDING",
        Fulfilled => "FULFILLED",
        Cancelled => "CANCELLED",
        NotPerformed => "NOT_PERFORMED",
    }
);

impl OrderStatus {
    /// 医嘱已取消或未执行，其发药申请不再推进
    pub fn stops_dispensing(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::NotPerformed)
    }
}

patchable!(
    /// 医生填写的医嘱内容
    OrderInstructions {
        immediate_indications: String,
        suggested_treatments: String,
        medication_requirement: String,
        complementary_exams: String,
        course_of_action: String,
    }
);

impl OrderInstructions {
    /// 所有字段均为空或空白
    pub fn is_empty(&self) -> bool {
        [
            &self.immediate_indications,
            &self.suggested_treatments,
            &self.medication_requirement,
            &self.complementary_exams,
            &self.course_of_action,
        ]
        .iter()
        .all(|field| field.as_deref().map_or(true, |text| text.trim().is_empty()))
    }
}

/// 医嘱
#[derive(Debug, Clone, Serialize)]
pub struct MedicalOrder {
    pub id: i64,
    pub folder_id: i64,
    pub patient_id: String,
    #[serde(flatten)]
    pub instructions: OrderInstructions,
    pub medication_id: Option<i64>,
    pub status: OrderStatus,
    pub ordered_by: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
}

/// 新医嘱插入模型
#[derive(Debug, Clone)]
pub struct NewMedicalOrder {
    pub folder_id: i64,
    pub patient_id: String,
    pub instructions: OrderInstructions,
    pub medication_id: Option<i64>,
    pub ordered_by: Option<String>,
}

// ========== 发药申请 ==========

str_enum!(
    /// 发药申请状态
    DispenseStatus {
        Pending => "PENDING",
        Ready => "READY",
        Delivered => "DELIVERED",
    }
);

impl DispenseStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DispenseStatus::Pending | DispenseStatus::Ready)
    }
}

/// 发药申请
#[derive(Debug, Clone, Serialize)]
pub struct DispenseRequest {
    pub id: i64,
    pub order_id: i64,
    pub medication_id: i64,
    pub quantity: i32,
    pub requested_by: String,
    pub status: DispenseStatus,
    pub requested_at: DateTime<Utc>,
}

/// 新发药申请插入模型
#[derive(Debug, Clone)]
pub struct NewDispenseRequest {
    pub order_id: i64,
    pub medication_id: i64,
    pub quantity: i32,
    pub requested_by: String,
}

// ========== 药品与库存 ==========

/// 药品目录条目（名称 + 浓度 + 有效期构成批次）
#[derive(Debug, Clone, Serialize)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub active_ingredient: Option<String>,
    pub concentration: Option<String>,
    pub presentation: Option<String>,
    pub available_quantity: i32,
    pub minimum_stock: i32,
    pub expiry_date: Option<NaiveDate>,
}

impl Medication {
    pub fn is_low_stock(&self) -> bool {
        self.available_quantity <= self.minimum_stock
    }
}

/// 新药品插入模型
#[derive(Debug, Clone, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub active_ingredient: Option<String>,
    pub concentration: Option<String>,
    pub presentation: Option<String>,
    #[serde(default = "default_minimum_stock")]
    pub minimum_stock: i32,
    pub expiry_date: Option<NaiveDate>,
}

fn default_minimum_stock() -> i32 {
    10
}

str_enum!(
    /// 库存流水方向
    MovementDirection {
        In => "IN",
        Out => "OUT",
    }
);

/// 库存流水（只追加）
#[derive(Debug, Clone, Serialize)]
pub struct InventoryMovement {
    pub id: i64,
    pub medication_id: i64,
    pub direction: MovementDirection,
    pub quantity: i32,
    pub reason: String,
    pub actor_id: Option<String>,
    pub moved_at: DateTime<Utc>,
}

/// 新流水插入模型
#[derive(Debug, Clone)]
pub struct NewInventoryMovement {
    pub medication_id: i64,
    pub direction: MovementDirection,
    pub quantity: i32,
    pub reason: String,
    pub actor_id: Option<String>,
}

// ========== 分诊 ==========

str_enum!(
    /// 分诊流转状态
    TriageState {
        Waiting => "WAITING",
        BeingSeen => "BEING_SEEN",
        Discharged => "DISCHARGED",
        Deceased => "DECEASED",
        Transferred => "TRANSFERRED",
    }
);

impl TriageState {
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// 终态对应的就诊结局
    pub fn outcome(&self) -> Option<VisitOutcome> {
        match self {
            TriageState::Discharged => Some(VisitOutcome::Discharged),
            TriageState::Deceased => Some(VisitOutcome::Deceased),
            TriageState::Transferred => Some(VisitOutcome::Transferred),
            TriageState::Waiting | TriageState::BeingSeen => None,
        }
    }
}

str_enum!(
    /// 分诊颜色（紧急程度）
    TriageColor {
        Red => "RED",
        Orange => "ORANGE",
        Yellow => "YELLOW",
        Green => "GREEN",
        Blue => "BLUE",
    }
);

str_enum!(
    /// 急诊区域
    TriageLocation {
        Corridor1 => "CORRIDOR_1",
        Corridor2 => "CORRIDOR_2",
        MinorTheatre => "MINOR_THEATRE",
        TraumaShock => "TRAUMA_SHOCK",
        Chairs => "CHAIRS",
        Libanes => "LIBANES",
        Usav => "USAV",
    }
);

/// 分诊记录
#[derive(Debug, Clone, Serialize)]
pub struct Triage {
    pub id: i64,
    pub folder_id: i64,
    pub patient_id: String,
    pub color: TriageColor,
    pub location: TriageLocation,
    pub admission_reason: Option<String>,
    pub vital_signs: Option<String>,
    pub attended_by: Option<String>,
    pub state: TriageState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新分诊插入模型
#[derive(Debug, Clone)]
pub struct NewTriage {
    pub folder_id: i64,
    pub patient_id: String,
    pub color: TriageColor,
    pub location: TriageLocation,
    pub admission_reason: Option<String>,
    pub vital_signs: Option<String>,
}
