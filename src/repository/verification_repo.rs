// ==========================================
// 损耗根因推理引擎 - 核实记录数据仓储
// ==========================================
// 红线: append-only,无 UPDATE/DELETE 接口
// 约束: 每个事件至多一条核实记录 (唯一索引)
// ==========================================

use crate::domain::types::RootCauseDimension;
use crate::domain::verification::VerificationRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

// ==========================================
// VerificationRepository - 核实记录仓储
// ==========================================
pub struct VerificationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl VerificationRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_table()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS verification_record (
                verification_id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                verified_root_cause TEXT NOT NULL,
                action_taken TEXT NOT NULL,
                verified_by TEXT NOT NULL,
                verified_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_verification_event
              ON verification_record(event_id);

            CREATE INDEX IF NOT EXISTS idx_verification_tenant
              ON verification_record(tenant_id, verified_at);
            "#,
        )?;
        Ok(())
    }

    /// 追加核实记录
    pub fn append(&self, record: &VerificationRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO verification_record (
                verification_id, event_id, tenant_id,
                verified_root_cause, action_taken, verified_by, verified_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.verification_id,
                record.event_id,
                record.tenant_id,
                record.verified_root_cause.as_str(),
                record.action_taken,
                record.verified_by,
                record.verified_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 查询事件的核实记录
    pub fn find_by_event(&self, event_id: &str) -> RepositoryResult<Option<VerificationRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT verification_id, event_id, tenant_id,
                   verified_root_cause, action_taken, verified_by, verified_at
            FROM verification_record
            WHERE event_id = ?1
            "#,
        )?;

        let result = stmt.query_row(params![event_id], map_record_row);
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询租户的全部核实记录 (标定审计)
    pub fn find_by_tenant(&self, tenant_id: &str) -> RepositoryResult<Vec<VerificationRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT verification_id, event_id, tenant_id,
                   verified_root_cause, action_taken, verified_by, verified_at
            FROM verification_record
            WHERE tenant_id = ?1
            ORDER BY verified_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![tenant_id], map_record_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(records)
    }
}

fn map_record_row(row: &rusqlite::Row<'_>) -> SqliteResult<VerificationRecord> {
    let cause_raw: String = row.get(3)?;
    let verified_raw: String = row.get(6)?;
    Ok(VerificationRecord {
        verification_id: row.get(0)?,
        event_id: row.get(1)?,
        tenant_id: row.get(2)?,
        verified_root_cause: RootCauseDimension::from_str(&cause_raw)
            .unwrap_or(RootCauseDimension::Unknown),
        action_taken: row.get(4)?,
        verified_by: row.get(5)?,
        verified_at: DateTime::parse_from_rfc3339(&verified_raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}
