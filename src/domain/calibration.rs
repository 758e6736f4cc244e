// ==========================================
// 损耗根因推理引擎 - 标定权重领域模型
// ==========================================
// 红线: 单写者纪律 - 仅校准环更新,评分器只读
// 生命周期: 首次核实时按租户惰性创建
// ==========================================

use crate::domain::types::RootCauseDimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 租户级标定权重表 (维度 → 权重 ∈ (0,1])
///
/// 评分公式中 weight(tenant, d) 的数据来源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationWeights {
    pub tenant_id: String,
    /// BTreeMap 保证遍历顺序稳定 (评分可复现)
    pub weights: BTreeMap<RootCauseDimension, f64>,
}

impl CalibrationWeights {
    /// 按统一默认值初始化 (惰性创建路径)
    pub fn uniform(tenant_id: impl Into<String>, default_weight: f64) -> Self {
        let mut weights = BTreeMap::new();
        for dim in RootCauseDimension::RANKABLE {
            weights.insert(dim, default_weight);
        }
        Self {
            tenant_id: tenant_id.into(),
            weights,
        }
    }

    /// 查询维度权重,缺失维度回退默认值
    pub fn weight_for(&self, dimension: RootCauseDimension, default_weight: f64) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(default_weight)
    }
}
