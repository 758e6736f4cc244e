// ==========================================
// 损耗根因推理引擎 - 根因评分器
// ==========================================
// 评分公式: score(d) = Σ weight(tenant,d) × strength(e) / 非Absent贡献条数
// 红线: Absent 不进分子也不进分母 (缺数据降低置信度,不压低得分)
// 红线: 证据维度 → 根因维度为穷尽匹配的静态映射,新增维度编译期强制补全
// ==========================================

use crate::domain::calibration::CalibrationWeights;
use crate::domain::evidence::{EvidenceOutcome, EvidenceRecord, RootCauseScore};
use crate::domain::types::{EvidenceKind, RootCauseDimension};

// ==========================================
// 静态映射表: 证据维度 → 贡献的根因维度
// ==========================================
// - 库存差异: 流程偏差为主,人员失误为辅 (账实不符多出自流程或操作)
// - BOM 偏差: 人员失误 / 流程偏差 / 设备故障 (超耗三种常见来源)
// - 窗口人员: 仅人员失误
// - 供应商批次: 供应链与食材质量
pub fn contributing_dimensions(kind: EvidenceKind) -> &'static [RootCauseDimension] {
    match kind {
        EvidenceKind::InventoryVariance => {
            &[RootCauseDimension::ProcessDeviation, RootCauseDimension::StaffError]
        }
        EvidenceKind::BomDeviation => &[
            RootCauseDimension::StaffError,
            RootCauseDimension::ProcessDeviation,
            RootCauseDimension::EquipmentFault,
        ],
        EvidenceKind::TimeWindowStaff => &[RootCauseDimension::StaffError],
        EvidenceKind::SupplierBatch => {
            &[RootCauseDimension::SupplyChain, RootCauseDimension::FoodQuality]
        }
    }
}

// ==========================================
// RootCauseScorer - 根因评分器
// ==========================================
pub struct RootCauseScorer {
    // 无状态引擎,权重由调用方注入 (单写者纪律: 评分器只读标定权重)
}

impl RootCauseScorer {
    pub fn new() -> Self {
        Self {}
    }

    /// 对一次采集的四维证据产出各根因维度得分
    ///
    /// # 参数
    /// - outcomes: 四个采集器的产出 (维度标签 + 结果)
    /// - weights: 租户标定权重 (只读)
    /// - default_weight: 权重表缺失维度时的回退值
    /// - ingredient_id: 归因透传
    ///
    /// # 返回
    /// 有定义的维度得分列表 (全 Absent 的维度被排除);
    /// 列表为空即"证据不足",由排名引擎产出 unknown 终态结论
    pub fn score_dimensions(
        &self,
        outcomes: &[(EvidenceKind, EvidenceOutcome)],
        weights: &CalibrationWeights,
        default_weight: f64,
        ingredient_id: Option<&str>,
    ) -> Vec<RootCauseScore> {
        let mut scores = Vec::new();

        // 固定遍历顺序,保证同样证据必得同样结论 (幂等重分析)
        for dimension in RootCauseDimension::RANKABLE {
            let contributing: Vec<&EvidenceRecord> = outcomes
                .iter()
                .filter(|(kind, outcome)| {
                    !outcome.is_absent() && contributing_dimensions(*kind).contains(&dimension)
                })
                .flat_map(|(_, outcome)| outcome.records())
                .collect();

            if contributing.is_empty() {
                // 全部来源 Absent → 该维度无定义,不参与排名
                continue;
            }

            let weight = weights.weight_for(dimension, default_weight);
            let count = contributing.len();
            let score = contributing.iter().map(|e| weight * e.strength).sum::<f64>()
                / count as f64;

            let reason = build_reason(dimension, weight, &contributing);
            let staff_id = strongest_staff_ref(&contributing);

            scores.push(RootCauseScore {
                dimension,
                score: score.clamp(0.0, 1.0),
                evidence_count: count,
                reason,
                staff_id,
                ingredient_id: ingredient_id.map(str::to_string),
            });
        }

        scores
    }
}

impl Default for RootCauseScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// 评分依据说明 (可解释性红线)
fn build_reason(
    dimension: RootCauseDimension,
    weight: f64,
    contributing: &[&EvidenceRecord],
) -> String {
    let mut parts: Vec<String> = Vec::new();
    for kind in EvidenceKind::ALL {
        let count = contributing.iter().filter(|e| e.kind == kind).count();
        if count > 0 {
            parts.push(format!("{}×{}", kind, count));
        }
    }
    format!(
        "{} 得分依据 {} 条证据 ({}),标定权重 {:.2}",
        dimension,
        contributing.len(),
        parts.join(", "),
        weight
    )
}

/// 人员归因: 取最强人员证据的 ref_id
fn strongest_staff_ref(contributing: &[&EvidenceRecord]) -> Option<String> {
    contributing
        .iter()
        .filter(|e| e.kind == EvidenceKind::TimeWindowStaff)
        .max_by(|a, b| a.strength.total_cmp(&b.strength))
        .and_then(|e| e.ref_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evidence::EvidencePayload;
    use chrono::Utc;

    fn staff_record(staff_id: &str, strength: f64) -> EvidenceRecord {
        EvidenceRecord::new(
            EvidenceKind::TimeWindowStaff,
            strength,
            Some(staff_id.to_string()),
            "在岗人员",
            EvidencePayload::StaffWindow {
                staff_id: staff_id.to_string(),
                station: None,
                on_duty_count: 2,
                incident_rate: strength,
                sole_on_shift: false,
            },
        )
    }

    fn supplier_record(strength: f64) -> EvidenceRecord {
        EvidenceRecord::new(
            EvidenceKind::SupplierBatch,
            strength,
            Some("BATCH-1".to_string()),
            "批次标记",
            EvidencePayload::SupplierBatch {
                batch_id: "BATCH-1".to_string(),
                supplier_id: "SUP-1".to_string(),
                rejected: strength > 0.0,
                late_delivery: false,
                temperature_excursion: false,
                delivered_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_mapping_is_exhaustive_over_kinds() {
        for kind in EvidenceKind::ALL {
            assert!(!contributing_dimensions(kind).is_empty());
        }
    }

    #[test]
    fn test_absent_excluded_from_numerator_and_denominator() {
        let scorer = RootCauseScorer::new();
        let weights = CalibrationWeights::uniform("T001", 0.5);

        // 仅人员证据有数据: staff_error = 0.5 × 0.8 / 1 = 0.4
        let outcomes = vec![
            (EvidenceKind::InventoryVariance, EvidenceOutcome::Absent),
            (EvidenceKind::BomDeviation, EvidenceOutcome::Absent),
            (
                EvidenceKind::TimeWindowStaff,
                EvidenceOutcome::Found(vec![staff_record("STF-01", 0.8)]),
            ),
            (EvidenceKind::SupplierBatch, EvidenceOutcome::Absent),
        ];

        let scores = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].dimension, RootCauseDimension::StaffError);
        assert!((scores[0].score - 0.4).abs() < 1e-9);
        assert_eq!(scores[0].evidence_count, 1);
        // Absent 的维度不得出现
        assert!(!scores.iter().any(|s| s.dimension == RootCauseDimension::SupplyChain));
    }

    #[test]
    fn test_multiple_staff_records_averaged() {
        let scorer = RootCauseScorer::new();
        let weights = CalibrationWeights::uniform("T001", 0.5);

        let outcomes = vec![(
            EvidenceKind::TimeWindowStaff,
            EvidenceOutcome::Found(vec![
                staff_record("STF-01", 0.2),
                staff_record("STF-02", 0.6),
            ]),
        )];

        let scores = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        assert_eq!(scores.len(), 1);
        // (0.5×0.2 + 0.5×0.6) / 2 = 0.2
        assert!((scores[0].score - 0.2).abs() < 1e-9);
        assert_eq!(scores[0].evidence_count, 2);
        // 归因取最强人员证据
        assert_eq!(scores[0].staff_id.as_deref(), Some("STF-02"));
    }

    #[test]
    fn test_supplier_contributes_two_dimensions() {
        let scorer = RootCauseScorer::new();
        let weights = CalibrationWeights::uniform("T001", 0.5);

        let outcomes = vec![(
            EvidenceKind::SupplierBatch,
            EvidenceOutcome::Found(vec![supplier_record(0.5)]),
        )];

        let scores = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        let dims: Vec<_> = scores.iter().map(|s| s.dimension).collect();
        assert!(dims.contains(&RootCauseDimension::SupplyChain));
        assert!(dims.contains(&RootCauseDimension::FoodQuality));
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_all_absent_yields_empty() {
        let scorer = RootCauseScorer::new();
        let weights = CalibrationWeights::uniform("T001", 0.5);
        let outcomes: Vec<(EvidenceKind, EvidenceOutcome)> = EvidenceKind::ALL
            .iter()
            .map(|k| (*k, EvidenceOutcome::Absent))
            .collect();

        let scores = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        assert!(scores.is_empty());
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = RootCauseScorer::new();
        let weights = CalibrationWeights::uniform("T001", 0.5);
        let outcomes = vec![
            (
                EvidenceKind::TimeWindowStaff,
                EvidenceOutcome::Found(vec![staff_record("STF-01", 0.3)]),
            ),
            (
                EvidenceKind::SupplierBatch,
                EvidenceOutcome::Found(vec![supplier_record(0.5)]),
            ),
        ];

        let first = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        let second = scorer.score_dimensions(&outcomes, &weights, 0.5, Some("ING-1"));
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.dimension, b.dimension);
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }
}
