// ==========================================
// 损耗根因推理引擎 - 证据数据仓储
// ==========================================
// 职责: 管理 waste_evidence 表 (分析批次审计轨迹)
// 用途: 驾驶舱五步推理面板的证据回放数据源
// 红线: 不含业务逻辑,只负责数据访问
// ==========================================

use crate::domain::evidence::EvidenceRecord;
use crate::domain::types::EvidenceKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// EvidenceRepository - 证据仓储
// ==========================================
pub struct EvidenceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EvidenceRepository {
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
            CREATE TABLE IF NOT EXISTS waste_evidence (
                evidence_id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                strength REAL NOT NULL,
                ref_id TEXT,
                summary TEXT NOT NULL,
                payload TEXT NOT NULL,
                collected_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_waste_evidence_analysis
              ON waste_evidence(analysis_id);

            CREATE INDEX IF NOT EXISTS idx_waste_evidence_event
              ON waste_evidence(event_id, collected_at);
            "#,
        )?;
        Ok(())
    }

    /// 批量写入一次分析产出的证据 (事务化)
    pub fn insert_batch(
        &self,
        analysis_id: &str,
        event_id: &str,
        records: &[EvidenceRecord],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for record in records {
            let payload_json = serde_json::to_string(&record.payload)
                .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;
            tx.execute(
                r#"
                INSERT INTO waste_evidence (
                    evidence_id, analysis_id, event_id, kind,
                    strength, ref_id, summary, payload, collected_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    analysis_id,
                    event_id,
                    record.kind.as_str(),
                    record.strength,
                    record.ref_id,
                    record.summary,
                    payload_json,
                    record.collected_at.to_rfc3339(),
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 查询一次分析批次的全部证据
    pub fn find_by_analysis(&self, analysis_id: &str) -> RepositoryResult<Vec<EvidenceRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT kind, strength, ref_id, summary, payload, collected_at
            FROM waste_evidence
            WHERE analysis_id = ?1
            ORDER BY kind ASC, collected_at ASC
            "#,
        )?;

        let records = stmt
            .query_map(params![analysis_id], |row| {
                let kind_raw: String = row.get(0)?;
                let payload_raw: String = row.get(4)?;
                let collected_raw: String = row.get(5)?;
                Ok((
                    kind_raw,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    payload_raw,
                    collected_raw,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut out = Vec::with_capacity(records.len());
        for (kind_raw, strength, ref_id, summary, payload_raw, collected_raw) in records {
            let kind = EvidenceKind::from_str(&kind_raw).ok_or_else(|| {
                RepositoryError::ValidationError(format!("未知证据维度: {}", kind_raw))
            })?;
            let payload = serde_json::from_str(&payload_raw)
                .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;
            out.push(EvidenceRecord {
                kind,
                strength,
                ref_id,
                summary,
                payload,
                collected_at: chrono::DateTime::parse_from_rfc3339(&collected_raw)
                    .map(|t| t.with_timezone(&chrono::Utc))
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH),
            });
        }
        Ok(out)
    }
}
