//! 数据库结构

use crate::connection::DatabasePool;
use ed_core::{EdError, Result};

/// 各表的建表语句，按外键依赖排序
const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS patients (
        national_id VARCHAR(32) PRIMARY KEY,
        full_name VARCHAR(255) NOT NULL,
        birth_date DATE,
        phone VARCHAR(64),
        address TEXT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS visit_folders (
        id BIGSERIAL PRIMARY KEY,
        patient_id VARCHAR(32) NOT NULL REFERENCES patients(national_id),
        status VARCHAR(16) NOT NULL DEFAULT 'OPEN',
        created_by VARCHAR(64),
        created_by_name VARCHAR(255),
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clinical_records (
        id BIGSERIAL PRIMARY KEY,
        folder_id BIGINT NOT NULL REFERENCES visit_folders(id),
        patient_id VARCHAR(32) NOT NULL REFERENCES patients(national_id),
        kind VARCHAR(32) NOT NULL,
        fields JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_clinical_records_folder_kind UNIQUE (folder_id, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS medications (
        id BIGSERIAL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        active_ingredient VARCHAR(255),
        concentration VARCHAR(64),
        presentation VARCHAR(64),
        available_quantity INTEGER NOT NULL DEFAULT 0 CHECK (available_quantity >= 0),
        minimum_stock INTEGER NOT NULL DEFAULT 10,
        expiry_date DATE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS medical_orders (
        id BIGSERIAL PRIMARY KEY,
        folder_id BIGINT NOT NULL REFERENCES visit_folders(id),
        patient_id VARCHAR(32) NOT NULL REFERENCES patients(national_id),
        immediate_indications TEXT,
        suggested_treatments TEXT,
        medication_requirement TEXT,
        complementary_exams TEXT,
        course_of_action TEXT,
        medication_id BIGINT REFERENCES medications(id),
        status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
        ordered_by VARCHAR(64),
        ordered_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMP WITH TIME ZONE,
        completion_notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dispense_requests (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES medical_orders(id),
        medication_id BIGINT NOT NULL REFERENCES medications(id),
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        requested_by VARCHAR(64) NOT NULL,
        status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
        requested_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_movements (
        id BIGSERIAL PRIMARY KEY,
        medication_id BIGINT NOT NULL REFERENCES medications(id),
        direction VARCHAR(8) NOT NULL CHECK (direction IN ('IN', 'OUT')),
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        reason TEXT NOT NULL,
        actor_id VARCHAR(64),
        moved_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS triages (
        id BIGSERIAL PRIMARY KEY,
        folder_id BIGINT NOT NULL REFERENCES visit_folders(id),
        patient_id VARCHAR(32) NOT NULL REFERENCES patients(national_id),
        color VARCHAR(16) NOT NULL,
        location VARCHAR(32) NOT NULL,
        admission_reason TEXT,
        vital_signs TEXT,
        attended_by VARCHAR(255),
        state VARCHAR(16) NOT NULL DEFAULT 'WAITING',
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
];

/// 唯一约束名，用于把唯一性冲突映射为业务错误
pub const UQ_ONE_OPEN_FOLDER: &str = "uq_visit_folders_one_open";
pub const UQ_MEDICATION_BATCH: &str = "uq_medications_batch";
pub const UQ_ACTIVE_DISPENSE: &str = "uq_dispense_requests_active";

const INDEXES: &[&str] = &[
    // 每个患者至多一个 OPEN 档案
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_visit_folders_one_open ON visit_folders(patient_id) WHERE status = 'OPEN'",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_medications_batch ON medications(name, COALESCE(concentration, ''), COALESCE(expiry_date, DATE 'infinity'))",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_dispense_requests_active ON dispense_requests(order_id) WHERE status IN ('PENDING', 'READY')",
    "CREATE INDEX IF NOT EXISTS idx_visit_folders_patient_id ON visit_folders(patient_id)",
    "CREATE INDEX IF NOT EXISTS idx_clinical_records_patient_kind ON clinical_records(patient_id, kind)",
    "CREATE INDEX IF NOT EXISTS idx_medical_orders_folder_id ON medical_orders(folder_id)",
    "CREATE INDEX IF NOT EXISTS idx_medical_orders_status ON medical_orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_dispense_requests_order_id ON dispense_requests(order_id)",
    "CREATE INDEX IF NOT EXISTS idx_dispense_requests_status ON dispense_requests(status)",
    "CREATE INDEX IF NOT EXISTS idx_inventory_movements_medication_id ON inventory_movements(medication_id)",
    "CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(name)",
    "CREATE INDEX IF NOT EXISTS idx_triages_folder_id ON triages(folder_id)",
    "CREATE INDEX IF NOT EXISTS idx_triages_state ON triages(state)",
];

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        for table_sql in TABLES {
            sqlx::query(table_sql)
                .execute(pool)
                .await
                .map_err(|e| EdError::Database(e.to_string()))?;
        }

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        for index_sql in INDEXES {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| EdError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }
}
