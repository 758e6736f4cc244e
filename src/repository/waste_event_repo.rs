// ==========================================
// 损耗根因推理引擎 - 损耗事件数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 状态变更一律 CAS (WHERE status = 期望值),拒绝陈旧写入
// ==========================================

use crate::domain::types::{RootCauseDimension, WasteEventStatus, WasteEventType};
use crate::domain::waste_event::{IngredientLossSummary, RootCauseStatRow, WasteEvent};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult, Row};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// WasteEventRepository - 损耗事件仓储
// ==========================================
/// 损耗事件仓储
/// 职责: 管理 waste_event 表的 CRUD 与状态 CAS
/// 红线: 不含业务逻辑,只负责数据访问
pub struct WasteEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WasteEventRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_table()?;
        Ok(repo)
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 确保 waste_event 表存在
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS waste_event (
                event_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                store_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                ingredient_id TEXT NOT NULL,
                dish_id TEXT,
                quantity REAL NOT NULL,
                unit TEXT NOT NULL,
                theoretical_qty REAL,
                occurred_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reported_by TEXT,
                assigned_staff_id TEXT,
                root_cause TEXT,
                confidence REAL,
                dimension_scores TEXT,
                top_causes TEXT,
                analysis_id TEXT,
                analyzed_at TEXT,
                action_taken TEXT,
                notes TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_waste_event_store
              ON waste_event(store_id, occurred_at);

            CREATE INDEX IF NOT EXISTS idx_waste_event_status
              ON waste_event(status);
            "#,
        )?;
        Ok(())
    }

    /// 插入新事件
    pub fn insert(&self, event: &WasteEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO waste_event (
                event_id, tenant_id, store_id, event_type,
                ingredient_id, dish_id, quantity, unit, theoretical_qty,
                occurred_at, created_at, reported_by, assigned_staff_id,
                root_cause, confidence, dimension_scores, top_causes,
                analysis_id, analyzed_at, action_taken, notes,
                status, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
            )
            "#,
            params![
                event.event_id,
                event.tenant_id,
                event.store_id,
                event.event_type.as_str(),
                event.ingredient_id,
                event.dish_id,
                event.quantity,
                event.unit,
                event.theoretical_qty,
                event.occurred_at.to_rfc3339(),
                event.created_at.to_rfc3339(),
                event.reported_by,
                event.assigned_staff_id,
                event.root_cause.map(|d| d.as_str()),
                event.confidence,
                event
                    .dimension_scores
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| RepositoryError::ValidationError(e.to_string()))?,
                Option::<String>::None,
                event.analysis_id,
                event.analyzed_at.map(|t| t.to_rfc3339()),
                event.action_taken,
                event.notes,
                event.status.as_str(),
                event.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按事件 ID 查询
    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<WasteEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM waste_event WHERE event_id = ?1",
            SELECT_COLUMNS
        ))?;

        let result = stmt.query_row(params![event_id], map_event_row);
        match result {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取当前生命周期状态
    pub fn find_status(&self, event_id: &str) -> RepositoryResult<Option<WasteEventStatus>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT status FROM waste_event WHERE event_id = ?1",
            params![event_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(s) => Ok(WasteEventStatus::from_str(&s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 状态 CAS 变更
    ///
    /// # 参数
    /// - event_id: 事件 ID
    /// - expected: 期望的当前状态（乐观并发控制）
    /// - to: 目标状态
    ///
    /// # 返回
    /// - Ok(()): 变更成功
    /// - Err(StatusConflict): 当前状态与期望不符（携带实际状态）
    /// - Err(NotFound): 事件不存在
    pub fn transition_status(
        &self,
        event_id: &str,
        expected: WasteEventStatus,
        to: WasteEventStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE waste_event SET status = ?1, updated_at = ?2
             WHERE event_id = ?3 AND status = ?4",
            params![to.as_str(), Utc::now().to_rfc3339(), event_id, expected.as_str()],
        )?;

        if rows == 1 {
            return Ok(());
        }

        // CAS 失败: 读实际状态以给出可解释的冲突信息
        let actual = conn
            .query_row(
                "SELECT status FROM waste_event WHERE event_id = ?1",
                params![event_id],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "WasteEvent".to_string(),
                    id: event_id.to_string(),
                },
                other => other.into(),
            })?;

        Err(RepositoryError::StatusConflict {
            event_id: event_id.to_string(),
            expected: expected.as_str().to_string(),
            actual,
        })
    }

    /// 写入分析结论 (CAS: analyzing → analyzed)
    ///
    /// # 说明
    /// - 结论与状态变更同一条 UPDATE,保证原子性
    /// - root_cause 与 confidence 同时写入 (同生同灭红线)
    /// - assigned_staff_id 仅在评分器给出归因时覆写
    #[allow(clippy::too_many_arguments)]
    pub fn write_analysis_outcome(
        &self,
        event_id: &str,
        analysis_id: &str,
        root_cause: RootCauseDimension,
        confidence: f64,
        dimension_scores: &BTreeMap<String, f64>,
        top_causes_json: &str,
        assigned_staff_id: Option<&str>,
    ) -> RepositoryResult<()> {
        let scores_json = serde_json::to_string(dimension_scores)
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        // 作用域内释放连接锁,失败分支还需回读实际状态
        let rows = {
            let conn = self.get_conn()?;
            conn.execute(
                r#"
                UPDATE waste_event SET
                    root_cause = ?1,
                    confidence = ?2,
                    dimension_scores = ?3,
                    top_causes = ?4,
                    analysis_id = ?5,
                    analyzed_at = ?6,
                    assigned_staff_id = COALESCE(?7, assigned_staff_id),
                    status = 'analyzed',
                    updated_at = ?6
                WHERE event_id = ?8 AND status = 'analyzing'
                "#,
                params![
                    root_cause.as_str(),
                    confidence,
                    scores_json,
                    top_causes_json,
                    analysis_id,
                    now,
                    assigned_staff_id,
                    event_id,
                ],
            )?
        };

        if rows == 1 {
            Ok(())
        } else {
            let actual = self.find_status(event_id)?.map(|s| s.as_str().to_string());
            match actual {
                Some(actual) => Err(RepositoryError::StatusConflict {
                    event_id: event_id.to_string(),
                    expected: WasteEventStatus::Analyzing.as_str().to_string(),
                    actual,
                }),
                None => Err(RepositoryError::NotFound {
                    entity: "WasteEvent".to_string(),
                    id: event_id.to_string(),
                }),
            }
        }
    }

    /// 更新处置措施 (核实/关闭时填写)
    pub fn update_disposition(
        &self,
        event_id: &str,
        action_taken: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE waste_event SET action_taken = COALESCE(?1, action_taken), updated_at = ?2
             WHERE event_id = ?3",
            params![action_taken, Utc::now().to_rfc3339(), event_id],
        )?;
        if rows == 1 {
            Ok(())
        } else {
            Err(RepositoryError::NotFound {
                entity: "WasteEvent".to_string(),
                id: event_id.to_string(),
            })
        }
    }

    /// 按门店查询事件列表 (可选状态/类型/天数过滤)
    ///
    /// # 参数
    /// - store_id: 门店 ID
    /// - status: 状态过滤 (可选)
    /// - event_type: 事件类型过滤 (可选)
    /// - days: 最近 N 天 (可选,按 occurred_at 过滤)
    pub fn list_by_store(
        &self,
        store_id: &str,
        status: Option<WasteEventStatus>,
        event_type: Option<WasteEventType>,
        days: Option<i64>,
    ) -> RepositoryResult<Vec<WasteEvent>> {
        let mut sql = format!(
            "SELECT {} FROM waste_event WHERE store_id = ?",
            SELECT_COLUMNS
        );
        let mut bindings: Vec<String> = vec![store_id.to_string()];

        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(event_type) = event_type {
            sql.push_str(" AND event_type = ?");
            bindings.push(event_type.as_str().to_string());
        }
        if let Some(days) = days {
            sql.push_str(" AND occurred_at >= ?");
            bindings.push((Utc::now() - Duration::days(days)).to_rfc3339());
        }
        sql.push_str(" ORDER BY occurred_at DESC");

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(bindings.iter()), map_event_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// 按门店与时间区间查询事件 (回溯推理数据源)
    pub fn find_by_store_in_range(
        &self,
        store_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<WasteEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM waste_event
             WHERE store_id = ?1 AND occurred_at >= ?2 AND occurred_at <= ?3
             ORDER BY occurred_at ASC",
            SELECT_COLUMNS
        ))?;
        let events = stmt
            .query_map(
                params![store_id, range_start.to_rfc3339(), range_end.to_rfc3339()],
                map_event_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(events)
    }

    /// 按食材聚合损耗量 (驾驶舱汇总视图)
    pub fn summary_by_ingredient(
        &self,
        store_id: &str,
        days: i64,
    ) -> RepositoryResult<Vec<IngredientLossSummary>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT ingredient_id, unit, SUM(quantity), COUNT(*)
            FROM waste_event
            WHERE store_id = ?1 AND occurred_at >= ?2
            GROUP BY ingredient_id, unit
            ORDER BY SUM(quantity) DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![store_id, cutoff], |row| {
                Ok(IngredientLossSummary {
                    ingredient_id: row.get(0)?,
                    unit: row.get(1)?,
                    total_quantity: row.get(2)?,
                    event_count: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 按根因维度统计数量与平均置信度 (驾驶舱可视化)
    pub fn root_cause_stats(
        &self,
        store_id: &str,
        days: i64,
    ) -> RepositoryResult<Vec<RootCauseStatRow>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT root_cause, COUNT(*), AVG(confidence)
            FROM waste_event
            WHERE store_id = ?1 AND occurred_at >= ?2 AND root_cause IS NOT NULL
            GROUP BY root_cause
            ORDER BY COUNT(*) DESC, root_cause ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![store_id, cutoff], |row| {
                let raw: String = row.get(0)?;
                Ok(RootCauseStatRow {
                    dimension: RootCauseDimension::from_str(&raw)
                        .unwrap_or(RootCauseDimension::Unknown),
                    event_count: row.get(1)?,
                    avg_confidence: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

// ==========================================
// 行映射辅助
// ==========================================

const SELECT_COLUMNS: &str = "event_id, tenant_id, store_id, event_type, \
    ingredient_id, dish_id, quantity, unit, theoretical_qty, \
    occurred_at, created_at, reported_by, assigned_staff_id, \
    root_cause, confidence, dimension_scores, \
    analysis_id, analyzed_at, action_taken, notes, status, updated_at";

/// 解析 RFC3339 时间戳 (解析失败回退 UNIX 纪元,不中断查询)
fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn map_event_row(row: &Row<'_>) -> SqliteResult<WasteEvent> {
    let event_type_raw: String = row.get(3)?;
    let root_cause_raw: Option<String> = row.get(13)?;
    let scores_raw: Option<String> = row.get(15)?;
    let status_raw: String = row.get(20)?;

    Ok(WasteEvent {
        event_id: row.get(0)?,
        tenant_id: row.get(1)?,
        store_id: row.get(2)?,
        event_type: WasteEventType::from_str(&event_type_raw),
        ingredient_id: row.get(4)?,
        dish_id: row.get(5)?,
        quantity: row.get(6)?,
        unit: row.get(7)?,
        theoretical_qty: row.get(8)?,
        occurred_at: parse_ts(&row.get::<_, String>(9)?),
        created_at: parse_ts(&row.get::<_, String>(10)?),
        reported_by: row.get(11)?,
        assigned_staff_id: row.get(12)?,
        root_cause: root_cause_raw.as_deref().and_then(RootCauseDimension::from_str),
        confidence: row.get(14)?,
        dimension_scores: scores_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        analysis_id: row.get(16)?,
        analyzed_at: row.get::<_, Option<String>>(17)?.map(|raw| parse_ts(&raw)),
        action_taken: row.get(18)?,
        notes: row.get(19)?,
        status: WasteEventStatus::from_str(&status_raw).unwrap_or(WasteEventStatus::Pending),
        updated_at: parse_ts(&row.get::<_, String>(21)?),
    })
}

impl WasteEventRepository {
    /// 读取事件最近一次排名结论 (核实时用于定位"排在核实维度之前"的维度)
    pub fn find_top_causes(
        &self,
        event_id: &str,
    ) -> RepositoryResult<Option<Vec<crate::domain::evidence::RootCauseScore>>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT top_causes FROM waste_event WHERE event_id = ?1",
            params![event_id],
            |row| row.get::<_, Option<String>>(0),
        );
        let json = match result {
            Ok(json) => json,
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(json.and_then(|raw| serde_json::from_str(&raw).ok()))
    }
}
