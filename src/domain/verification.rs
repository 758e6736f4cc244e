// ==========================================
// 损耗根因推理引擎 - 核实记录领域模型
// ==========================================
// 红线: 核实记录一经写入不可变更 (append-only)
// 对齐: verification_record 表
// ==========================================

use crate::domain::types::RootCauseDimension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 人工核实记录
///
/// 写入后追加到标定存储,驱动权重校准
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub verification_id: String,
    pub event_id: String,
    pub tenant_id: String,
    pub verified_root_cause: RootCauseDimension,
    pub action_taken: String,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(
        event_id: impl Into<String>,
        tenant_id: impl Into<String>,
        verified_root_cause: RootCauseDimension,
        action_taken: impl Into<String>,
        verified_by: impl Into<String>,
    ) -> Self {
        Self {
            verification_id: Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            tenant_id: tenant_id.into(),
            verified_root_cause,
            action_taken: action_taken.into(),
            verified_by: verified_by.into(),
            verified_at: Utc::now(),
        }
    }
}
