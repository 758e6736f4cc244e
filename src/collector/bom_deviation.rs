// ==========================================
// 损耗根因推理引擎 - BOM 偏差采集器
// ==========================================
// 依据: 事件上报量 vs 配方单位用量 × 窗口内菜品销量
// 规则: strength 随 |variance_pct| 线性增长,饱和封顶 (与库存差异同规则)
// 回退: 配方/销量不可得时,退用事件自带的理论量
// ==========================================

use crate::collector::inventory_variance::saturated_strength;
use crate::collector::sources::BomSource;
use crate::collector::{CollectContext, CollectorResult, EvidenceCollector};
use crate::domain::evidence::{EvidenceOutcome, EvidencePayload, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use async_trait::async_trait;
use std::sync::Arc;

// ==========================================
// BomDeviationCollector - BOM 偏差采集器
// ==========================================
pub struct BomDeviationCollector {
    source: Arc<dyn BomSource>,
    saturation: f64,
}

/// 事件侧数量信息 (编排器从 WasteEvent 填充)
#[derive(Debug, Clone)]
pub struct BomEventInput {
    pub quantity: f64,
    /// 事件自带的 BOM 理论量 (回退数据源)
    pub theoretical_qty: Option<f64>,
}

impl BomDeviationCollector {
    pub fn new(source: Arc<dyn BomSource>, saturation: f64) -> Self {
        Self { source, saturation }
    }

    /// 从配方与销量推算理论消耗;不可得时退用事件自带理论量
    async fn resolve_theoretical(
        &self,
        ctx: &CollectContext,
        input: &BomEventInput,
    ) -> CollectorResult<Option<(f64, i64)>> {
        if let Some(dish_id) = &ctx.dish_id {
            if let Some(per_dish) = self.source.usage_per_dish(dish_id, &ctx.ingredient_id).await? {
                let sold = self
                    .source
                    .dishes_sold(&ctx.store_id, dish_id, ctx.window_start(), ctx.window_end())
                    .await?;
                if sold > 0 {
                    return Ok(Some((per_dish * sold as f64, sold)));
                }
            }
        }
        Ok(input.theoretical_qty.map(|t| (t, 0)))
    }
}

// 编排器持有事件数量信息;采集 trait 的上下文不携带,
// 因此 BOM 采集器以闭包态构造 (每次分析一个实例)
pub struct BoundBomDeviationCollector {
    inner: BomDeviationCollector,
    input: BomEventInput,
}

impl BomDeviationCollector {
    /// 绑定事件数量信息,产出可直接执行的采集器
    pub fn bind(self, input: BomEventInput) -> BoundBomDeviationCollector {
        BoundBomDeviationCollector { inner: self, input }
    }
}

#[async_trait]
impl EvidenceCollector for BoundBomDeviationCollector {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::BomDeviation
    }

    async fn collect(&self, ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
        ctx.check_cancelled()?;

        let resolved = self.inner.resolve_theoretical(ctx, &self.input).await?;
        ctx.check_cancelled()?;

        let (theoretical_qty, dishes_sold) = match resolved {
            Some(pair) => pair,
            None => {
                tracing::debug!(
                    event_id = %ctx.event_id,
                    "无配方/销量且事件未携带理论量,BOM 偏差证据 Absent"
                );
                return Ok(EvidenceOutcome::Absent);
            }
        };

        // 理论量为 0 时 variance_pct 无定义
        if theoretical_qty.abs() < f64::EPSILON {
            return Ok(EvidenceOutcome::Absent);
        }

        let variance_pct = (self.input.quantity - theoretical_qty) / theoretical_qty;
        let strength = saturated_strength(variance_pct, self.inner.saturation);

        let summary = format!(
            "上报 {:.2} vs 理论 {:.2},偏差 {:.1}%",
            self.input.quantity,
            theoretical_qty,
            variance_pct * 100.0
        );

        Ok(EvidenceOutcome::Found(vec![EvidenceRecord::new(
            EvidenceKind::BomDeviation,
            strength,
            None,
            summary,
            EvidencePayload::BomDeviation {
                theoretical_qty,
                actual_qty: self.input.quantity,
                variance_pct,
                dishes_sold,
            },
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::AtomicBool;

    struct FixedBom {
        per_dish: Option<f64>,
        sold: i64,
    }

    #[async_trait]
    impl BomSource for FixedBom {
        async fn usage_per_dish(
            &self,
            _dish_id: &str,
            _ingredient_id: &str,
        ) -> CollectorResult<Option<f64>> {
            Ok(self.per_dish)
        }

        async fn dishes_sold(
            &self,
            _store_id: &str,
            _dish_id: &str,
            _window_start: DateTime<Utc>,
            _window_end: DateTime<Utc>,
        ) -> CollectorResult<i64> {
            Ok(self.sold)
        }
    }

    fn ctx(dish_id: Option<&str>) -> CollectContext {
        CollectContext::new(
            "E001",
            "T001",
            "S001",
            "ING-1",
            dish_id.map(|s| s.to_string()),
            Utc::now(),
            120,
            60,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_variance_20_pct_saturation_30_pct() {
        // 12kg vs 10kg → 20% 偏差 / 30% 饱和 → 强度 ≈ 0.667
        let source = Arc::new(FixedBom { per_dish: Some(0.5), sold: 20 });
        let collector =
            BomDeviationCollector::new(source, 0.30).bind(BomEventInput {
                quantity: 12.0,
                theoretical_qty: None,
            });
        let outcome = collector.collect(&ctx(Some("DISH-1"))).await.unwrap();
        let records = outcome.records();
        assert_eq!(records.len(), 1);
        assert!((records[0].strength - 0.2 / 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_falls_back_to_event_theoretical_qty() {
        let source = Arc::new(FixedBom { per_dish: None, sold: 0 });
        let collector =
            BomDeviationCollector::new(source, 0.30).bind(BomEventInput {
                quantity: 12.0,
                theoretical_qty: Some(10.0),
            });
        let outcome = collector.collect(&ctx(None)).await.unwrap();
        assert!((outcome.records()[0].strength - 0.2 / 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_bom_data_is_absent() {
        let source = Arc::new(FixedBom { per_dish: None, sold: 0 });
        let collector =
            BomDeviationCollector::new(source, 0.30).bind(BomEventInput {
                quantity: 12.0,
                theoretical_qty: None,
            });
        let outcome = collector.collect(&ctx(Some("DISH-1"))).await.unwrap();
        assert!(outcome.is_absent());
    }
}
