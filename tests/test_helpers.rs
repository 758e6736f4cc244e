// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、数据源种子等功能
// 说明: 各测试二进制按需取用,未用到的种子函数不告警
// ==========================================
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
///
/// # 说明
/// schema 由各仓储/AppState 自建 (CREATE TABLE IF NOT EXISTS)
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();
    Ok((temp_file, db_path))
}

/// 打开种子数据连接 (与引擎共享同一数据库文件)
pub fn open_seed_conn(db_path: &str) -> Connection {
    waste_rca_engine::db::open_sqlite_connection(db_path).unwrap()
}

// ==========================================
// 数据源种子
// ==========================================

/// 写入库存盘点快照
pub fn seed_inventory_count(
    conn: &Connection,
    store_id: &str,
    ingredient_id: &str,
    counted_qty: f64,
    expected_qty: f64,
    counted_at: DateTime<Utc>,
) {
    conn.execute(
        "INSERT INTO inventory_count (count_id, store_id, ingredient_id, counted_qty, expected_qty, counted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            uuid::Uuid::new_v4().to_string(),
            store_id,
            ingredient_id,
            counted_qty,
            expected_qty,
            counted_at.to_rfc3339()
        ],
    )
    .unwrap();
}

/// 写入配方用量
pub fn seed_recipe(conn: &Connection, dish_id: &str, ingredient_id: &str, usage_per_dish: f64) {
    conn.execute(
        "INSERT OR REPLACE INTO recipe_bom (dish_id, ingredient_id, usage_per_dish)
         VALUES (?1, ?2, ?3)",
        params![dish_id, ingredient_id, usage_per_dish],
    )
    .unwrap();
}

/// 写入菜品销量
pub fn seed_dish_sale(
    conn: &Connection,
    store_id: &str,
    dish_id: &str,
    quantity: i64,
    sold_at: DateTime<Utc>,
) {
    conn.execute(
        "INSERT INTO dish_sale (sale_id, store_id, dish_id, quantity, sold_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            store_id,
            dish_id,
            quantity,
            sold_at.to_rfc3339()
        ],
    )
    .unwrap();
}

/// 写入排班记录
pub fn seed_shift(
    conn: &Connection,
    store_id: &str,
    staff_id: &str,
    clock_in: DateTime<Utc>,
    clock_out: DateTime<Utc>,
) {
    conn.execute(
        "INSERT INTO staff_shift (shift_id, store_id, staff_id, station, clock_in, clock_out)
         VALUES (?1, ?2, ?3, '后厨', ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            store_id,
            staff_id,
            clock_in.to_rfc3339(),
            clock_out.to_rfc3339()
        ],
    )
    .unwrap();
}

/// 写入员工历史损耗事件率
pub fn seed_incident_rate(conn: &Connection, staff_id: &str, rate: f64) {
    conn.execute(
        "INSERT OR REPLACE INTO staff_incident_stat (staff_id, incident_rate, sample_count)
         VALUES (?1, ?2, 20)",
        params![staff_id, rate],
    )
    .unwrap();
}

/// 写入供应商批次
#[allow(clippy::too_many_arguments)]
pub fn seed_supplier_batch(
    conn: &Connection,
    batch_id: &str,
    store_id: &str,
    ingredient_id: &str,
    delivered_at: DateTime<Utc>,
    rejected: bool,
    late_delivery: bool,
    temperature_excursion: bool,
) {
    conn.execute(
        "INSERT INTO supplier_batch
           (batch_id, store_id, ingredient_id, supplier_id, delivered_at,
            rejected, late_delivery, temperature_excursion)
         VALUES (?1, ?2, ?3, 'SUP-1', ?4, ?5, ?6, ?7)",
        params![
            batch_id,
            store_id,
            ingredient_id,
            delivered_at.to_rfc3339(),
            rejected as i64,
            late_delivery as i64,
            temperature_excursion as i64
        ],
    )
    .unwrap();
}
