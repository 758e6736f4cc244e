// ==========================================
// 损耗根因推理引擎 - 标定权重数据仓储
// ==========================================
// 红线: 单写者 - 仅校准环 (CalibrationLoop) 调用写接口
// 生命周期: 租户首次核实时惰性创建,评分器每次分析只读
// ==========================================

use crate::domain::calibration::CalibrationWeights;
use crate::domain::types::RootCauseDimension;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// CalibrationRepository - 标定权重仓储
// ==========================================
pub struct CalibrationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CalibrationRepository {
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
            CREATE TABLE IF NOT EXISTS calibration_weights (
                tenant_id TEXT NOT NULL,
                dimension TEXT NOT NULL,
                weight REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, dimension)
            );
            "#,
        )?;
        Ok(())
    }

    /// 读取租户权重表 (无记录返回 None)
    pub fn load(&self, tenant_id: &str) -> RepositoryResult<Option<CalibrationWeights>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT dimension, weight FROM calibration_weights WHERE tenant_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut weights = BTreeMap::new();
        for (dim_raw, weight) in rows {
            if let Some(dim) = RootCauseDimension::from_str(&dim_raw) {
                weights.insert(dim, weight);
            } else {
                tracing::warn!(tenant_id, dimension = %dim_raw, "忽略未知维度的标定权重");
            }
        }
        Ok(Some(CalibrationWeights {
            tenant_id: tenant_id.to_string(),
            weights,
        }))
    }

    /// 读取租户权重表,无记录时返回统一默认值 (不落库,惰性创建由首次核实触发)
    pub fn load_or_default(
        &self,
        tenant_id: &str,
        default_weight: f64,
    ) -> RepositoryResult<CalibrationWeights> {
        Ok(self
            .load(tenant_id)?
            .unwrap_or_else(|| CalibrationWeights::uniform(tenant_id, default_weight)))
    }

    /// 整表覆写租户权重 (事务化 upsert,仅校准环调用)
    pub fn save(&self, weights: &CalibrationWeights) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for (dim, weight) in &weights.weights {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO calibration_weights (tenant_id, dimension, weight, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![weights.tenant_id, dim.as_str(), weight, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_default_then_persist() {
        let conn = Connection::open_in_memory().unwrap();
        let repo = CalibrationRepository::from_connection(Arc::new(Mutex::new(conn))).unwrap();

        // 未核实过的租户: 不落库,返回统一默认
        assert!(repo.load("T001").unwrap().is_none());
        let defaults = repo.load_or_default("T001", 0.5).unwrap();
        assert!((defaults.weight_for(RootCauseDimension::StaffError, 0.5) - 0.5).abs() < 1e-9);

        // 首次核实后落库
        let mut weights = defaults;
        weights.weights.insert(RootCauseDimension::StaffError, 0.52);
        repo.save(&weights).unwrap();

        let loaded = repo.load("T001").unwrap().unwrap();
        assert!((loaded.weight_for(RootCauseDimension::StaffError, 0.5) - 0.52).abs() < 1e-9);
        // 其他租户互不影响
        assert!(repo.load("T002").unwrap().is_none());
    }
}
