// ==========================================
// 损耗根因推理引擎 - 库存差异采集器
// ==========================================
// 依据: 距事件最近的盘点快照 vs 期望结存
// 规则: strength 随偏差比例线性增长,达到饱和阈值封顶 1.0
// ==========================================

use crate::collector::sources::InventoryCountSource;
use crate::collector::{CollectContext, CollectorResult, EvidenceCollector};
use crate::domain::evidence::{EvidenceOutcome, EvidencePayload, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use async_trait::async_trait;
use std::sync::Arc;

// ==========================================
// InventoryVarianceCollector - 库存差异采集器
// ==========================================
pub struct InventoryVarianceCollector {
    source: Arc<dyn InventoryCountSource>,
    /// 偏差饱和阈值 (如 0.30: 偏差 ≥30% → strength 1.0)
    saturation: f64,
}

impl InventoryVarianceCollector {
    pub fn new(source: Arc<dyn InventoryCountSource>, saturation: f64) -> Self {
        Self { source, saturation }
    }
}

#[async_trait]
impl EvidenceCollector for InventoryVarianceCollector {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::InventoryVariance
    }

    async fn collect(&self, ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
        ctx.check_cancelled()?;

        let snapshot = self
            .source
            .nearest_snapshot(
                &ctx.store_id,
                &ctx.ingredient_id,
                ctx.occurred_at,
                ctx.window_start(),
                ctx.window_end(),
            )
            .await?;

        ctx.check_cancelled()?;

        let snapshot = match snapshot {
            Some(s) => s,
            None => {
                tracing::debug!(
                    event_id = %ctx.event_id,
                    ingredient_id = %ctx.ingredient_id,
                    "窗口内无盘点快照,库存差异证据 Absent"
                );
                return Ok(EvidenceOutcome::Absent);
            }
        };

        // 期望结存接近 0 时相对偏差无定义,按 Absent 处理
        if snapshot.expected_qty.abs() < f64::EPSILON {
            return Ok(EvidenceOutcome::Absent);
        }

        let variance_ratio = (snapshot.counted_qty - snapshot.expected_qty) / snapshot.expected_qty;
        let strength = saturated_strength(variance_ratio, self.saturation);

        let summary = format!(
            "盘点 {:.2} vs 期望 {:.2},偏差 {:.1}%",
            snapshot.counted_qty,
            snapshot.expected_qty,
            variance_ratio * 100.0
        );

        Ok(EvidenceOutcome::Found(vec![EvidenceRecord::new(
            EvidenceKind::InventoryVariance,
            strength,
            None,
            summary,
            EvidencePayload::InventoryVariance {
                expected_qty: snapshot.expected_qty,
                counted_qty: snapshot.counted_qty,
                variance_ratio,
                counted_at: snapshot.counted_at,
            },
        )]))
    }
}

/// 偏差比例 → 强度: |ratio| / saturation,封顶 1.0
pub(crate) fn saturated_strength(ratio: f64, saturation: f64) -> f64 {
    if saturation <= f64::EPSILON {
        return 1.0;
    }
    (ratio.abs() / saturation).min(1.0)
}
