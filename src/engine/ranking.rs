// ==========================================
// 损耗根因推理引擎 - 排名与置信度引擎
// ==========================================
// 排序: 得分降序;平局 (1) 非Absent贡献条数多者优先 (2) 维度名字典序
// 置信度: score(#1) / Σ score(全部有定义维度),截断到 [0,1]
// 特例: 仅一个维度有定义时,置信度 = 该维度原始得分 (单一弱信号不得报满分)
// ==========================================

use crate::domain::evidence::RootCauseScore;
use crate::domain::types::RootCauseDimension;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 排名结论 (一次分析的最终产出)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedConclusion {
    /// 前三位候选根因 (不足三个时按实际数量)
    pub top3: Vec<RootCauseScore>,
    /// 首位根因 (证据不足时为 unknown)
    pub root_cause: RootCauseDimension,
    /// 首位根因置信度 [0,1]
    pub confidence: f64,
    /// 置信度达到门槛时置位,触发培训派发
    pub auto_dispatch: bool,
    /// 结论说明
    pub reason: String,
    /// 人员归因 (来自首位根因的证据)
    pub staff_id: Option<String>,
}

impl RankedConclusion {
    /// 证据不足终态结论 (有效结果,非错误)
    fn insufficient_evidence() -> Self {
        Self {
            top3: Vec::new(),
            root_cause: RootCauseDimension::Unknown,
            confidence: 0.0,
            auto_dispatch: false,
            reason: "所有证据源均无数据,证据不足,无法给出可信根因".to_string(),
            staff_id: None,
        }
    }
}

// ==========================================
// RankingEngine - 排名与置信度引擎
// ==========================================
pub struct RankingEngine {
    // 无状态引擎,门槛由调用方按配置注入
}

impl RankingEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// 对维度得分排序并产出结论
    ///
    /// # 参数
    /// - scores: 有定义的维度得分 (评分器产出,可为空)
    /// - auto_action_threshold: 自动派发培训的置信度门槛
    pub fn rank(
        &self,
        mut scores: Vec<RootCauseScore>,
        auto_action_threshold: f64,
    ) -> RankedConclusion {
        if scores.is_empty() {
            return RankedConclusion::insufficient_evidence();
        }

        scores.sort_by(compare_scores);

        let total: f64 = scores.iter().map(|s| s.score).sum();
        let top = &scores[0];

        // 单一维度有定义: 置信度取原始得分,不做归一 (归一会虚报 1.0)
        let confidence = if scores.len() == 1 {
            top.score.clamp(0.0, 1.0)
        } else if total > f64::EPSILON {
            (top.score / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let reason = format!(
            "首位根因 {} (得分 {:.3},{} 条证据),共 {} 个维度参与排名",
            top.dimension,
            top.score,
            top.evidence_count,
            scores.len()
        );

        let root_cause = top.dimension;
        let staff_id = top.staff_id.clone();
        let auto_dispatch = confidence >= auto_action_threshold;

        let mut top3 = scores;
        top3.truncate(3);

        RankedConclusion {
            top3,
            root_cause,
            confidence,
            auto_dispatch,
            reason,
            staff_id,
        }
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 排序规则: 得分降序 → 证据条数降序 → 维度名字典序
fn compare_scores(a: &RootCauseScore, b: &RootCauseScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.evidence_count.cmp(&a.evidence_count))
        .then_with(|| a.dimension.as_str().cmp(b.dimension.as_str()))
}
