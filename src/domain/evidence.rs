// ==========================================
// 损耗根因推理引擎 - 证据领域模型
// ==========================================
// 红线: Absent (无数据) 与 strength=0 (有数据无异常) 严格区分
// 红线: 所有证据必须输出 reason (可解释性)
// ==========================================

use crate::domain::types::{EvidenceKind, RootCauseDimension};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// EvidencePayload - 维度专属载荷
// ==========================================
// 序列化为 tagged JSON,落库到 waste_evidence.payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidencePayload {
    /// 库存盘点差异: 最近盘点快照 vs 期望结存
    InventoryVariance {
        expected_qty: f64,
        counted_qty: f64,
        variance_ratio: f64,
        counted_at: DateTime<Utc>,
    },
    /// BOM 偏差: 上报量 vs 单位用量 × 窗口内销量
    BomDeviation {
        theoretical_qty: f64,
        actual_qty: f64,
        variance_pct: f64,
        dishes_sold: i64,
    },
    /// 时间窗口在岗人员 (每名候选人一条记录)
    StaffWindow {
        staff_id: String,
        station: Option<String>,
        on_duty_count: usize,
        incident_rate: f64,
        sole_on_shift: bool,
    },
    /// 供应商批次质量标记
    SupplierBatch {
        batch_id: String,
        supplier_id: String,
        rejected: bool,
        late_delivery: bool,
        temperature_excursion: bool,
        delivered_at: DateTime<Utc>,
    },
}

// ==========================================
// EvidenceRecord - 单条归一化证据
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub kind: EvidenceKind,
    /// 异常指征强度 [0,1],0 表示有数据但无异常
    pub strength: f64,
    /// 归责引用 (员工号/批次号等),用于结论归因
    pub ref_id: Option<String>,
    /// 人类可读说明
    pub summary: String,
    pub payload: EvidencePayload,
    pub collected_at: DateTime<Utc>,
}

impl EvidenceRecord {
    /// 构造时强制 strength 进入 [0,1]
    pub fn new(
        kind: EvidenceKind,
        strength: f64,
        ref_id: Option<String>,
        summary: impl Into<String>,
        payload: EvidencePayload,
    ) -> Self {
        Self {
            kind,
            strength: strength.clamp(0.0, 1.0),
            ref_id,
            summary: summary.into(),
            payload,
            collected_at: Utc::now(),
        }
    }
}

// ==========================================
// EvidenceOutcome - 采集器产出
// ==========================================
// Absent 表示数据源不可达/无覆盖,不参与评分的分子与分母
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EvidenceOutcome {
    Found(Vec<EvidenceRecord>),
    Absent,
}

impl EvidenceOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, EvidenceOutcome::Absent)
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        match self {
            EvidenceOutcome::Found(records) => records,
            EvidenceOutcome::Absent => &[],
        }
    }

    /// 非空记录列表,否则视为 Absent (空 Found 不应出现,防御性归一)
    pub fn normalized(self) -> EvidenceOutcome {
        match self {
            EvidenceOutcome::Found(records) if records.is_empty() => EvidenceOutcome::Absent,
            other => other,
        }
    }
}

// ==========================================
// RootCauseScore - 单维度评分结论
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseScore {
    pub dimension: RootCauseDimension,
    /// 加权平均得分 [0,1]
    pub score: f64,
    /// 贡献的非 Absent 证据条数 (排名第一级平局规则)
    pub evidence_count: usize,
    /// 评分依据说明
    pub reason: String,
    /// 归因: 最强人员证据的员工号
    pub staff_id: Option<String>,
    pub ingredient_id: Option<String>,
}
