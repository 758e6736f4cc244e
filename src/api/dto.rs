// ==========================================
// 损耗根因推理引擎 - API 数据传输对象
// ==========================================
// 职责: 前端契约结构,与领域实体解耦
// 约定: 派生字段 (variance) 在视图构造时计算,不落库
// ==========================================

use crate::domain::evidence::{EvidenceRecord, RootCauseScore};
use crate::domain::types::{RootCauseDimension, WasteEventStatus, WasteEventType};
use crate::domain::waste_event::WasteEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// WasteEventView - 事件视图
// ==========================================
/// 损耗事件视图 (列表与详情共用)
///
/// 在实体之上附加派生偏差字段,前端不自行计算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteEventView {
    pub event_id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub event_type: WasteEventType,
    pub ingredient_id: String,
    pub dish_id: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub theoretical_qty: Option<f64>,
    /// 派生: quantity - theoretical_qty
    pub variance_qty: Option<f64>,
    /// 派生: variance_qty / theoretical_qty (理论量缺失或为 0 时为空)
    pub variance_pct: Option<f64>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reported_by: Option<String>,
    pub assigned_staff_id: Option<String>,
    pub root_cause: Option<RootCauseDimension>,
    pub confidence: Option<f64>,
    pub dimension_scores: Option<BTreeMap<String, f64>>,
    pub analysis_id: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub action_taken: Option<String>,
    pub notes: Option<String>,
    pub status: WasteEventStatus,
}

impl From<WasteEvent> for WasteEventView {
    fn from(event: WasteEvent) -> Self {
        let variance_qty = event.variance_qty();
        let variance_pct = event.variance_pct();
        Self {
            event_id: event.event_id,
            tenant_id: event.tenant_id,
            store_id: event.store_id,
            event_type: event.event_type,
            ingredient_id: event.ingredient_id,
            dish_id: event.dish_id,
            quantity: event.quantity,
            unit: event.unit,
            theoretical_qty: event.theoretical_qty,
            variance_qty,
            variance_pct,
            occurred_at: event.occurred_at,
            created_at: event.created_at,
            reported_by: event.reported_by,
            assigned_staff_id: event.assigned_staff_id,
            root_cause: event.root_cause,
            confidence: event.confidence,
            dimension_scores: event.dimension_scores,
            analysis_id: event.analysis_id,
            analyzed_at: event.analyzed_at,
            action_taken: event.action_taken,
            notes: event.notes,
            status: event.status,
        }
    }
}

// ==========================================
// 事件上报请求 (POS/库存子系统入口)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitWasteEventRequest {
    pub tenant_id: String,
    pub store_id: String,
    pub event_type: String,
    pub ingredient_id: String,
    pub dish_id: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub theoretical_qty: Option<f64>,
    pub occurred_at: DateTime<Utc>,
    pub reported_by: Option<String>,
    pub notes: Option<String>,
}

// ==========================================
// 核实请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyWasteEventRequest {
    pub verified_root_cause: String,
    pub action_taken: String,
    pub verified_by: String,
}

// ==========================================
// WasteReasoningReport - 回溯推理报告
// ==========================================
/// 五步推理控制台的产出 (无状态批量变体,不绑定单一事件)
///
/// step1..step4 为四类原始证据集合,top3 为聚合排名结论
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteReasoningReport {
    pub tenant_id: String,
    pub store_id: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    /// 区间内参与推理的事件数
    pub event_count: usize,
    /// 步骤1: 库存盘点差异证据
    pub step1_inventory_variance: Vec<EvidenceRecord>,
    /// 步骤2: BOM 偏差证据
    pub step2_bom_deviation: Vec<EvidenceRecord>,
    /// 步骤3: 时间窗口人员证据
    pub step3_time_window_staff: Vec<EvidenceRecord>,
    /// 步骤4: 供应商批次证据
    pub step4_supplier_batch: Vec<EvidenceRecord>,
    /// 步骤5: 聚合排名
    pub top3_root_causes: Vec<RootCauseScore>,
    pub root_cause: RootCauseDimension,
    pub confidence: f64,
    pub reason: String,
    pub generated_at: DateTime<Utc>,
}
