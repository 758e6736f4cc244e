// ==========================================
// 损耗根因推理引擎 - 协作方数据源 SQLite 适配器
// ==========================================
// 职责: 为四个外部端口提供本地 SQLite 参考实现
// 说明: 生产部署可替换为真实服务客户端;端口定义见 collector::sources
// 红线: 适配器只做查询,不做业务判断
// ==========================================

use crate::collector::sources::{
    BatchRecord, BomSource, InventoryCountSource, InventorySnapshot, ShiftEntry,
    ShiftRosterSource, SupplierBatchSource,
};
use crate::collector::{CollectorError, CollectorResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// 解析 RFC3339 时间戳 (适配器内部统一)
fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> CollectorError {
    CollectorError::SourceUnavailable(format!("锁获取失败: {}", e))
}

fn sql_err(e: rusqlite::Error) -> CollectorError {
    CollectorError::SourceUnavailable(e.to_string())
}

/// 确保协作方参考数据表存在
///
/// 表集合: inventory_count / recipe_bom / dish_sale /
///         staff_shift / staff_incident_stat / supplier_batch
pub fn ensure_source_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS inventory_count (
            count_id TEXT PRIMARY KEY,
            store_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL,
            counted_qty REAL NOT NULL,
            expected_qty REAL NOT NULL,
            counted_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_inventory_count_lookup
          ON inventory_count(store_id, ingredient_id, counted_at);

        CREATE TABLE IF NOT EXISTS recipe_bom (
            dish_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL,
            usage_per_dish REAL NOT NULL,
            PRIMARY KEY (dish_id, ingredient_id)
        );

        CREATE TABLE IF NOT EXISTS dish_sale (
            sale_id TEXT PRIMARY KEY,
            store_id TEXT NOT NULL,
            dish_id TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            sold_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_dish_sale_lookup
          ON dish_sale(store_id, dish_id, sold_at);

        CREATE TABLE IF NOT EXISTS staff_shift (
            shift_id TEXT PRIMARY KEY,
            store_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            station TEXT,
            clock_in TEXT NOT NULL,
            clock_out TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_staff_shift_lookup
          ON staff_shift(store_id, clock_in, clock_out);

        CREATE TABLE IF NOT EXISTS staff_incident_stat (
            staff_id TEXT PRIMARY KEY,
            incident_rate REAL NOT NULL,
            sample_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS supplier_batch (
            batch_id TEXT PRIMARY KEY,
            store_id TEXT NOT NULL,
            ingredient_id TEXT NOT NULL,
            supplier_id TEXT NOT NULL,
            delivered_at TEXT NOT NULL,
            rejected INTEGER NOT NULL DEFAULT 0,
            late_delivery INTEGER NOT NULL DEFAULT 0,
            temperature_excursion INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_supplier_batch_lookup
          ON supplier_batch(store_id, ingredient_id, delivered_at);
        "#,
    )
}

// ==========================================
// SqliteInventoryCountSource - 库存盘点适配器
// ==========================================
pub struct SqliteInventoryCountSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteInventoryCountSource {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl InventoryCountSource for SqliteInventoryCountSource {
    async fn nearest_snapshot(
        &self,
        store_id: &str,
        ingredient_id: &str,
        around: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<Option<InventorySnapshot>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let result = conn.query_row(
            r#"
            SELECT counted_qty, expected_qty, counted_at
            FROM inventory_count
            WHERE store_id = ?1 AND ingredient_id = ?2
              AND counted_at >= ?3 AND counted_at <= ?4
            ORDER BY ABS(julianday(counted_at) - julianday(?5)) ASC
            LIMIT 1
            "#,
            params![
                store_id,
                ingredient_id,
                window_start.to_rfc3339(),
                window_end.to_rfc3339(),
                around.to_rfc3339(),
            ],
            |row| {
                Ok(InventorySnapshot {
                    counted_qty: row.get(0)?,
                    expected_qty: row.get(1)?,
                    counted_at: parse_ts(&row.get::<_, String>(2)?),
                })
            },
        );
        match result {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }
}

// ==========================================
// SqliteBomSource - 配方/销量适配器
// ==========================================
pub struct SqliteBomSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBomSource {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl BomSource for SqliteBomSource {
    async fn usage_per_dish(
        &self,
        dish_id: &str,
        ingredient_id: &str,
    ) -> CollectorResult<Option<f64>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let result = conn.query_row(
            "SELECT usage_per_dish FROM recipe_bom WHERE dish_id = ?1 AND ingredient_id = ?2",
            params![dish_id, ingredient_id],
            |row| row.get::<_, f64>(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }

    async fn dishes_sold(
        &self,
        store_id: &str,
        dish_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<i64> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.query_row(
            r#"
            SELECT COALESCE(SUM(quantity), 0)
            FROM dish_sale
            WHERE store_id = ?1 AND dish_id = ?2
              AND sold_at >= ?3 AND sold_at <= ?4
            "#,
            params![store_id, dish_id, window_start.to_rfc3339(), window_end.to_rfc3339()],
            |row| row.get::<_, i64>(0),
        )
        .map_err(sql_err)
    }
}

// ==========================================
// SqliteShiftRosterSource - 排班适配器
// ==========================================
pub struct SqliteShiftRosterSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteShiftRosterSource {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ShiftRosterSource for SqliteShiftRosterSource {
    async fn staff_on_shift(
        &self,
        store_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<Vec<ShiftEntry>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT staff_id, station, clock_in, clock_out
                FROM staff_shift
                WHERE store_id = ?1 AND clock_in <= ?2 AND clock_out >= ?3
                ORDER BY staff_id ASC
                "#,
            )
            .map_err(sql_err)?;

        let entries = stmt
            .query_map(
                params![store_id, window_end.to_rfc3339(), window_start.to_rfc3339()],
                |row| {
                    Ok(ShiftEntry {
                        staff_id: row.get(0)?,
                        station: row.get(1)?,
                        clock_in: parse_ts(&row.get::<_, String>(2)?),
                        clock_out: parse_ts(&row.get::<_, String>(3)?),
                    })
                },
            )
            .map_err(sql_err)?
            .collect::<SqliteResult<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(entries)
    }

    async fn incident_rate(&self, staff_id: &str) -> CollectorResult<Option<f64>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let result = conn.query_row(
            "SELECT incident_rate FROM staff_incident_stat WHERE staff_id = ?1",
            params![staff_id],
            |row| row.get::<_, f64>(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }
}

// ==========================================
// SqliteSupplierBatchSource - 供应商批次适配器
// ==========================================
pub struct SqliteSupplierBatchSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSupplierBatchSource {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SupplierBatchSource for SqliteSupplierBatchSource {
    async fn recent_batches(
        &self,
        store_id: &str,
        ingredient_id: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> CollectorResult<Vec<BatchRecord>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT batch_id, supplier_id, delivered_at,
                       rejected, late_delivery, temperature_excursion
                FROM supplier_batch
                WHERE store_id = ?1 AND ingredient_id = ?2 AND delivered_at <= ?3
                ORDER BY delivered_at DESC
                LIMIT ?4
                "#,
            )
            .map_err(sql_err)?;

        let batches = stmt
            .query_map(
                params![store_id, ingredient_id, before.to_rfc3339(), limit as i64],
                |row| {
                    Ok(BatchRecord {
                        batch_id: row.get(0)?,
                        supplier_id: row.get(1)?,
                        delivered_at: parse_ts(&row.get::<_, String>(2)?),
                        rejected: row.get::<_, i64>(3)? != 0,
                        late_delivery: row.get::<_, i64>(4)? != 0,
                        temperature_excursion: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .map_err(sql_err)?
            .collect::<SqliteResult<Vec<_>>>()
            .map_err(sql_err)?;
        Ok(batches)
    }
}
