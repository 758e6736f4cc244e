// ==========================================
// 损耗根因推理引擎 - 损耗事件领域模型
// ==========================================
// 红线: variance_qty/variance_pct 为派生字段,只计算不落库
// 红线: root_cause 与 confidence 同生同灭 (同为空或同有值)
// 对齐: waste_event 表
// ==========================================

use crate::domain::types::{RootCauseDimension, WasteEventStatus, WasteEventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ==========================================
// WasteEvent - 损耗事件
// ==========================================
// 用途: POS/库存子系统上报写入,推理引擎更新分析结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteEvent {
    // ===== 主键与归属 =====
    pub event_id: String,  // 事件唯一标识 (UUID)
    pub tenant_id: String, // 租户标识 (标定权重按租户隔离)
    pub store_id: String,  // 门店标识

    // ===== 分类 =====
    pub event_type: WasteEventType,

    // ===== 数量维度 =====
    pub ingredient_id: String,        // 涉损食材
    pub dish_id: Option<String>,      // 关联菜品 (BOM 比对用,可空)
    pub quantity: f64,                // 上报损耗量
    pub unit: String,                 // 计量单位
    pub theoretical_qty: Option<f64>, // BOM 理论消耗量 (可空)

    // ===== 时间 =====
    pub occurred_at: DateTime<Utc>, // 损耗发生时间
    pub created_at: DateTime<Utc>,  // 上报时间

    // ===== 归责 =====
    pub reported_by: Option<String>,       // 上报人
    pub assigned_staff_id: Option<String>, // 候选责任人 (可由评分器回填)

    // ===== 推理结论 (分析前为空) =====
    pub root_cause: Option<RootCauseDimension>, // 首位根因
    pub confidence: Option<f64>,                // 置信度 [0,1]
    /// 维度得分 (BTreeMap 保证序列化顺序稳定)
    pub dimension_scores: Option<BTreeMap<String, f64>>,
    pub analysis_id: Option<String>,           // 最近一次分析批次
    pub analyzed_at: Option<DateTime<Utc>>,    // 最近一次分析完成时间

    // ===== 处置 =====
    pub action_taken: Option<String>, // 处置措施 (核实/关闭时填写)
    pub notes: Option<String>,

    // ===== 生命周期 =====
    pub status: WasteEventStatus,
    pub updated_at: DateTime<Utc>,
}

impl WasteEvent {
    /// 创建新上报事件 (初始 pending)
    pub fn new(
        tenant_id: impl Into<String>,
        store_id: impl Into<String>,
        event_type: WasteEventType,
        ingredient_id: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            store_id: store_id.into(),
            event_type,
            ingredient_id: ingredient_id.into(),
            dish_id: None,
            quantity,
            unit: unit.into(),
            theoretical_qty: None,
            occurred_at,
            created_at: now,
            reported_by: None,
            assigned_staff_id: None,
            root_cause: None,
            confidence: None,
            dimension_scores: None,
            analysis_id: None,
            analyzed_at: None,
            action_taken: None,
            notes: None,
            status: WasteEventStatus::Pending,
            updated_at: now,
        }
    }

    /// 偏差量 = 上报量 - 理论量 (理论量缺失时无定义)
    pub fn variance_qty(&self) -> Option<f64> {
        self.theoretical_qty.map(|t| self.quantity - t)
    }

    /// 相对偏差 = 偏差量 / 理论量
    ///
    /// 理论量缺失或为 0 时无定义 (返回 None,不得以 0 兜底)
    pub fn variance_pct(&self) -> Option<f64> {
        match self.theoretical_qty {
            Some(t) if t.abs() > f64::EPSILON => Some((self.quantity - t) / t),
            _ => None,
        }
    }

    /// 结论一致性校验: root_cause 与 confidence 必须同为空或同有值
    pub fn conclusion_is_consistent(&self) -> bool {
        self.root_cause.is_some() == self.confidence.is_some()
    }
}

// ==========================================
// 聚合查询行 (驾驶舱可视化数据源)
// ==========================================

/// 按食材聚合的损耗汇总行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientLossSummary {
    pub ingredient_id: String,
    pub unit: String,
    pub total_quantity: f64,
    pub event_count: i64,
}

/// 按根因维度聚合的统计行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseStatRow {
    pub dimension: RootCauseDimension,
    pub event_count: i64,
    pub avg_confidence: f64,
}
