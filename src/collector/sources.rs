// ==========================================
// 损耗根因推理引擎 - 外部数据源端口
// ==========================================
// 职责: 定义四个协作方服务的查询契约 (依赖倒置)
// 说明: 采集层定义 trait,仓储层提供 SQLite 参考适配器,
//       测试注入模拟 Absent/超时的替身
// ==========================================

use crate::collector::CollectorResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 数据结构
// ==========================================

/// 库存盘点快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub counted_qty: f64,
    /// 期望结存 (进销存滚动推算值)
    pub expected_qty: f64,
    pub counted_at: DateTime<Utc>,
}

/// 排班条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftEntry {
    pub staff_id: String,
    pub station: Option<String>,
    pub clock_in: DateTime<Utc>,
    pub clock_out: DateTime<Utc>,
}

/// 供应商批次记录 (含独立质量标记)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub supplier_id: String,
    pub delivered_at: DateTime<Utc>,
    pub rejected: bool,
    pub late_delivery: bool,
    pub temperature_excursion: bool,
}

// ==========================================
// 端口 Trait
// ==========================================

/// 库存盘点服务端口
#[async_trait]
pub trait InventoryCountSource: Send + Sync {
    /// 查询时间窗口内距 around 最近的盘点快照
    async fn nearest_snapshot(
        &self,
        store_id: &str,
        ingredient_id: &str,
        around: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<Option<InventorySnapshot>>;
}

/// 配方/BOM 服务端口
#[async_trait]
pub trait BomSource: Send + Sync {
    /// 菜品单位食材用量 (无配方返回 None)
    async fn usage_per_dish(
        &self,
        dish_id: &str,
        ingredient_id: &str,
    ) -> CollectorResult<Option<f64>>;

    /// 时间窗口内菜品销量
    async fn dishes_sold(
        &self,
        store_id: &str,
        dish_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<i64>;
}

/// 排班服务端口
#[async_trait]
pub trait ShiftRosterSource: Send + Sync {
    /// 时间窗口内在岗人员 (排班与窗口有交集即算在岗)
    async fn staff_on_shift(
        &self,
        store_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<Vec<ShiftEntry>>;

    /// 员工历史损耗事件率 [0,1] (无统计返回 None)
    async fn incident_rate(&self, staff_id: &str) -> CollectorResult<Option<f64>>;
}

/// 供应商批次/质量服务端口
#[async_trait]
pub trait SupplierBatchSource: Send + Sync {
    /// 事件发生前最近送达的若干批次
    async fn recent_batches(
        &self,
        store_id: &str,
        ingredient_id: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> CollectorResult<Vec<BatchRecord>>;
}
