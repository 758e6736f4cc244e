// ==========================================
// 损耗根因推理引擎 - 供应商批次采集器
// ==========================================
// 依据: 事件发生前最近送达批次的独立质量标记
// 规则: 质量退回 0.5 + 温度异常 0.3 + 延迟送达 0.2,封顶 1.0
// 规则: 有批次但无标记 → strength 0 (有数据无异常,非 Absent)
// ==========================================

use crate::collector::sources::{BatchRecord, SupplierBatchSource};
use crate::collector::{CollectContext, CollectorResult, EvidenceCollector};
use crate::domain::evidence::{EvidenceOutcome, EvidencePayload, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use async_trait::async_trait;
use std::sync::Arc;

/// 质量退回标记权重
const FLAG_WEIGHT_REJECTED: f64 = 0.5;
/// 温度异常标记权重
const FLAG_WEIGHT_TEMPERATURE: f64 = 0.3;
/// 延迟送达标记权重
const FLAG_WEIGHT_LATE: f64 = 0.2;
/// 回溯批次数量
const RECENT_BATCH_LIMIT: usize = 3;

// ==========================================
// SupplierBatchCollector - 供应商批次采集器
// ==========================================
pub struct SupplierBatchCollector {
    source: Arc<dyn SupplierBatchSource>,
}

impl SupplierBatchCollector {
    pub fn new(source: Arc<dyn SupplierBatchSource>) -> Self {
        Self { source }
    }

    fn batch_strength(batch: &BatchRecord) -> f64 {
        let mut strength = 0.0;
        if batch.rejected {
            strength += FLAG_WEIGHT_REJECTED;
        }
        if batch.temperature_excursion {
            strength += FLAG_WEIGHT_TEMPERATURE;
        }
        if batch.late_delivery {
            strength += FLAG_WEIGHT_LATE;
        }
        strength.min(1.0)
    }

    fn flag_summary(batch: &BatchRecord) -> String {
        let mut flags = Vec::new();
        if batch.rejected {
            flags.push("质量退回");
        }
        if batch.temperature_excursion {
            flags.push("温度异常");
        }
        if batch.late_delivery {
            flags.push("延迟送达");
        }
        if flags.is_empty() {
            format!("批次 {} 无质量标记", batch.batch_id)
        } else {
            format!("批次 {} 标记: {}", batch.batch_id, flags.join("/"))
        }
    }
}

#[async_trait]
impl EvidenceCollector for SupplierBatchCollector {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::SupplierBatch
    }

    async fn collect(&self, ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
        ctx.check_cancelled()?;

        let batches = self
            .source
            .recent_batches(
                &ctx.store_id,
                &ctx.ingredient_id,
                ctx.occurred_at,
                RECENT_BATCH_LIMIT,
            )
            .await?;

        ctx.check_cancelled()?;

        if batches.is_empty() {
            tracing::debug!(
                event_id = %ctx.event_id,
                ingredient_id = %ctx.ingredient_id,
                "事件前无送达批次,供应商证据 Absent"
            );
            return Ok(EvidenceOutcome::Absent);
        }

        let records = batches
            .into_iter()
            .map(|batch| {
                let strength = Self::batch_strength(&batch);
                EvidenceRecord::new(
                    EvidenceKind::SupplierBatch,
                    strength,
                    Some(batch.batch_id.clone()),
                    Self::flag_summary(&batch),
                    EvidencePayload::SupplierBatch {
                        batch_id: batch.batch_id,
                        supplier_id: batch.supplier_id,
                        rejected: batch.rejected,
                        late_delivery: batch.late_delivery,
                        temperature_excursion: batch.temperature_excursion,
                        delivered_at: batch.delivered_at,
                    },
                )
            })
            .collect();

        Ok(EvidenceOutcome::Found(records))
    }
}
