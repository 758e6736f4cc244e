// ==========================================
// 损耗根因推理引擎 - 配置管理器
// ==========================================
// 职责: 推理参数加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 红线: 所有参数有代码级默认值,缺库缺键不阻断推理
// ==========================================

use crate::db::configure_sqlite_connection;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 默认参数 (可被 config_kv 覆写)
// ==========================================

/// 采集器超时（毫秒）
pub const DEFAULT_COLLECTOR_TIMEOUT_MS: u64 = 3_000;
/// 证据时间窗口 - 事件前（分钟）
pub const DEFAULT_WINDOW_BEFORE_MINUTES: i64 = 120;
/// 证据时间窗口 - 事件后（分钟）
pub const DEFAULT_WINDOW_AFTER_MINUTES: i64 = 60;
/// 偏差饱和阈值（≥30% 偏差 → strength 1.0）
pub const DEFAULT_VARIANCE_SATURATION: f64 = 0.30;
/// 单人在岗基线强度
pub const DEFAULT_STAFF_PRESENCE_BASELINE: f64 = 0.6;
/// 自动派发培训的置信度门槛
pub const DEFAULT_AUTO_ACTION_THRESHOLD: f64 = 0.6;
/// 标定权重单次调整步长
pub const DEFAULT_CALIBRATION_STEP: f64 = 0.02;
/// 标定权重下限
pub const DEFAULT_WEIGHT_MIN: f64 = 0.1;
/// 标定权重上限
pub const DEFAULT_WEIGHT_MAX: f64 = 1.0;
/// 维度默认权重（租户首次核实前的统一初值）
pub const DEFAULT_DIMENSION_WEIGHT: f64 = 0.5;

// ==========================================
// EngineConfig - 推理参数快照
// ==========================================
// 用途: 一次分析过程中参数不变 (读一次,贯穿整个 pass)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub collector_timeout_ms: u64,
    pub window_before_minutes: i64,
    pub window_after_minutes: i64,
    pub variance_saturation: f64,
    pub staff_presence_baseline: f64,
    pub auto_action_threshold: f64,
    pub calibration_step: f64,
    pub weight_min: f64,
    pub weight_max: f64,
    pub default_dimension_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collector_timeout_ms: DEFAULT_COLLECTOR_TIMEOUT_MS,
            window_before_minutes: DEFAULT_WINDOW_BEFORE_MINUTES,
            window_after_minutes: DEFAULT_WINDOW_AFTER_MINUTES,
            variance_saturation: DEFAULT_VARIANCE_SATURATION,
            staff_presence_baseline: DEFAULT_STAFF_PRESENCE_BASELINE,
            auto_action_threshold: DEFAULT_AUTO_ACTION_THRESHOLD,
            calibration_step: DEFAULT_CALIBRATION_STEP,
            weight_min: DEFAULT_WEIGHT_MIN,
            weight_max: DEFAULT_WEIGHT_MAX,
            default_dimension_weight: DEFAULT_DIMENSION_WEIGHT,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            configure_sqlite_connection(&conn_guard)?;
        }
        let manager = Self { conn };
        manager.ensure_table()?;
        Ok(manager)
    }

    /// 确保 config_kv 表存在
    fn ensure_table(&self) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_kv (
                scope_id TEXT NOT NULL DEFAULT 'global',
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (scope_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入配置值（scope_id='global'，INSERT OR REPLACE）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_f64_or(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key = key, raw = %raw, "配置值解析失败,回退默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key = key, raw = %raw, "配置值解析失败,回退默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 加载推理参数快照
    ///
    /// # 返回
    /// - Ok(EngineConfig): 全部参数（缺键回退默认值）
    pub fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        Ok(EngineConfig {
            collector_timeout_ms: self
                .get_i64_or("rca/collector_timeout_ms", DEFAULT_COLLECTOR_TIMEOUT_MS as i64)?
                .max(1) as u64,
            window_before_minutes: self
                .get_i64_or("rca/window_before_minutes", DEFAULT_WINDOW_BEFORE_MINUTES)?,
            window_after_minutes: self
                .get_i64_or("rca/window_after_minutes", DEFAULT_WINDOW_AFTER_MINUTES)?,
            variance_saturation: self
                .get_f64_or("rca/variance_saturation", DEFAULT_VARIANCE_SATURATION)?,
            staff_presence_baseline: self
                .get_f64_or("rca/staff_presence_baseline", DEFAULT_STAFF_PRESENCE_BASELINE)?,
            auto_action_threshold: self
                .get_f64_or("rca/auto_action_threshold", DEFAULT_AUTO_ACTION_THRESHOLD)?,
            calibration_step: self.get_f64_or("rca/calibration_step", DEFAULT_CALIBRATION_STEP)?,
            weight_min: self.get_f64_or("rca/weight_min", DEFAULT_WEIGHT_MIN)?,
            weight_max: self.get_f64_or("rca/weight_max", DEFAULT_WEIGHT_MAX)?,
            default_dimension_weight: self
                .get_f64_or("rca/default_dimension_weight", DEFAULT_DIMENSION_WEIGHT)?,
        })
    }
}
