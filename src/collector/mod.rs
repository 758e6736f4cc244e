// ==========================================
// 损耗根因推理引擎 - 证据采集层
// ==========================================
// 职责: 四个独立采集器,各查询一个外部数据源
// 红线: 采集器彼此不阻塞,各自限时,超时/失败降级为 Absent
// 红线: 采集器必须观察取消标志,及时停止
// ==========================================

pub mod bom_deviation;
pub mod inventory_variance;
pub mod sources;
pub mod staff_window;
pub mod supplier_batch;

use crate::domain::evidence::EvidenceOutcome;
use crate::domain::types::EvidenceKind;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// 重导出采集器实现
pub use bom_deviation::BomDeviationCollector;
pub use inventory_variance::InventoryVarianceCollector;
pub use staff_window::StaffWindowCollector;
pub use supplier_batch::SupplierBatchCollector;

// ==========================================
// CollectorError - 采集层错误
// ==========================================
// EvidenceUnavailable 语义: 数据源不可达 → 上层降级为 Absent,
// 不作为中断整次分析的致命错误
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("数据源不可用: {0}")]
    SourceUnavailable(String),

    #[error("采集已取消")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CollectorResult<T> = Result<T, CollectorError>;

// ==========================================
// CollectContext - 采集上下文
// ==========================================
/// 一次证据采集的输入,由编排器构造并分发给四个采集器
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub event_id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub ingredient_id: String,
    pub dish_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub window_before_minutes: i64,
    pub window_after_minutes: i64,
    /// 取消标志 (事件被外部关闭时置位)
    cancelled: Arc<AtomicBool>,
}

impl CollectContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: impl Into<String>,
        tenant_id: impl Into<String>,
        store_id: impl Into<String>,
        ingredient_id: impl Into<String>,
        dish_id: Option<String>,
        occurred_at: DateTime<Utc>,
        window_before_minutes: i64,
        window_after_minutes: i64,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            tenant_id: tenant_id.into(),
            store_id: store_id.into(),
            ingredient_id: ingredient_id.into(),
            dish_id,
            occurred_at,
            window_before_minutes,
            window_after_minutes,
            cancelled,
        }
    }

    /// 证据时间窗口起点
    pub fn window_start(&self) -> DateTime<Utc> {
        self.occurred_at - Duration::minutes(self.window_before_minutes)
    }

    /// 证据时间窗口终点
    pub fn window_end(&self) -> DateTime<Utc> {
        self.occurred_at + Duration::minutes(self.window_after_minutes)
    }

    /// 是否已被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 取消检查点: 采集器在查询前后调用
    pub fn check_cancelled(&self) -> CollectorResult<()> {
        if self.is_cancelled() {
            Err(CollectorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ==========================================
// EvidenceCollector Trait
// ==========================================
/// 证据采集器统一契约
///
/// 实现者: InventoryVarianceCollector / BomDeviationCollector /
///         StaffWindowCollector / SupplierBatchCollector
/// 评分器只依赖本 trait,测试可注入模拟 Absent/超时的替身
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    /// 本采集器产出的证据维度
    fn kind(&self) -> EvidenceKind;

    /// 采集证据
    ///
    /// # 返回
    /// - Ok(Found(records)): 有数据 (strength=0 表示有数据但无异常)
    /// - Ok(Absent): 数据源无覆盖 (与 strength=0 严格区分)
    /// - Err(SourceUnavailable): 数据源不可达 (上层降级为 Absent)
    /// - Err(Cancelled): 观察到取消标志
    async fn collect(&self, ctx: &CollectContext) -> CollectorResult<EvidenceOutcome>;
}

// ==========================================
// 限时采集
// ==========================================

/// 带超时的单采集器执行,所有失败路径降级为 Absent
///
/// # 降级规则
/// - 超时 → Absent (warn)
/// - SourceUnavailable → Absent (warn)
/// - Cancelled → Absent (debug,由编排器统一处理取消)
pub async fn collect_with_timeout(
    collector: Arc<dyn EvidenceCollector>,
    ctx: CollectContext,
    timeout_ms: u64,
) -> EvidenceOutcome {
    let kind = collector.kind();
    let task = tokio::spawn(async move { collector.collect(&ctx).await });

    match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(Ok(outcome))) => outcome.normalized(),
        Ok(Ok(Err(CollectorError::Cancelled))) => {
            tracing::debug!(kind = %kind, "采集被取消,按 Absent 处理");
            EvidenceOutcome::Absent
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(kind = %kind, error = %e, "证据采集失败,降级为 Absent");
            EvidenceOutcome::Absent
        }
        Ok(Err(join_err)) => {
            tracing::warn!(kind = %kind, error = %join_err, "采集任务异常退出,降级为 Absent");
            EvidenceOutcome::Absent
        }
        Err(_elapsed) => {
            tracing::warn!(kind = %kind, timeout_ms, "证据采集超时,降级为 Absent");
            EvidenceOutcome::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evidence::{EvidencePayload, EvidenceRecord};

    struct SlowCollector;

    #[async_trait]
    impl EvidenceCollector for SlowCollector {
        fn kind(&self) -> EvidenceKind {
            EvidenceKind::InventoryVariance
        }

        async fn collect(&self, _ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(EvidenceOutcome::Found(vec![EvidenceRecord::new(
                EvidenceKind::InventoryVariance,
                0.5,
                None,
                "慢数据源",
                EvidencePayload::InventoryVariance {
                    expected_qty: 10.0,
                    counted_qty: 8.0,
                    variance_ratio: -0.2,
                    counted_at: Utc::now(),
                },
            )]))
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl EvidenceCollector for FailingCollector {
        fn kind(&self) -> EvidenceKind {
            EvidenceKind::SupplierBatch
        }

        async fn collect(&self, _ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
            Err(CollectorError::SourceUnavailable("连接拒绝".to_string()))
        }
    }

    fn test_ctx() -> CollectContext {
        CollectContext::new(
            "E001",
            "T001",
            "S001",
            "ING-1",
            None,
            Utc::now(),
            120,
            60,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_absent() {
        let outcome = collect_with_timeout(Arc::new(SlowCollector), test_ctx(), 20).await;
        assert!(outcome.is_absent());
    }

    #[tokio::test]
    async fn test_source_failure_degrades_to_absent() {
        let outcome = collect_with_timeout(Arc::new(FailingCollector), test_ctx(), 1_000).await;
        assert!(outcome.is_absent());
    }

    #[tokio::test]
    async fn test_fast_collector_returns_records() {
        let outcome = collect_with_timeout(Arc::new(SlowCollector), test_ctx(), 1_000).await;
        assert_eq!(outcome.records().len(), 1);
    }

    #[test]
    fn test_window_bounds() {
        let ctx = test_ctx();
        assert_eq!(ctx.window_end() - ctx.window_start(), Duration::minutes(180));
    }
}
