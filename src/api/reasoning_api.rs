// ==========================================
// 损耗根因推理引擎 - 回溯推理 API
// ==========================================
// 对应契约: POST /ontology/reasoning/waste
// 职责: 无状态五步推理 - 对区间内事件重放四路采集,聚合排名
// 说明: 与单事件分析共用采集器/评分器/排名引擎,
//       不触碰事件生命周期,不写任何状态
// ==========================================

use crate::api::dto::WasteReasoningReport;
use crate::api::error::{ApiError, ApiResult};
use crate::collector::bom_deviation::BomEventInput;
use crate::collector::sources::{
    BomSource, InventoryCountSource, ShiftRosterSource, SupplierBatchSource,
};
use crate::collector::{
    collect_with_timeout, BomDeviationCollector, CollectContext, InventoryVarianceCollector,
    StaffWindowCollector, SupplierBatchCollector,
};
use crate::config::ConfigManager;
use crate::domain::evidence::{EvidenceOutcome, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use crate::domain::waste_event::WasteEvent;
use crate::engine::ranking::RankingEngine;
use crate::engine::scorer::RootCauseScorer;
use crate::repository::calibration_repo::CalibrationRepository;
use crate::repository::waste_event_repo::WasteEventRepository;
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

// ==========================================
// ReasoningApi - 回溯推理 API
// ==========================================
pub struct ReasoningApi {
    event_repo: Arc<WasteEventRepository>,
    calibration_repo: Arc<CalibrationRepository>,
    config_manager: Arc<ConfigManager>,

    inventory_source: Arc<dyn InventoryCountSource>,
    bom_source: Arc<dyn BomSource>,
    roster_source: Arc<dyn ShiftRosterSource>,
    batch_source: Arc<dyn SupplierBatchSource>,

    scorer: RootCauseScorer,
    ranking: RankingEngine,
}

impl ReasoningApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_repo: Arc<WasteEventRepository>,
        calibration_repo: Arc<CalibrationRepository>,
        config_manager: Arc<ConfigManager>,
        inventory_source: Arc<dyn InventoryCountSource>,
        bom_source: Arc<dyn BomSource>,
        roster_source: Arc<dyn ShiftRosterSource>,
        batch_source: Arc<dyn SupplierBatchSource>,
    ) -> Self {
        Self {
            event_repo,
            calibration_repo,
            config_manager,
            inventory_source,
            bom_source,
            roster_source,
            batch_source,
            scorer: RootCauseScorer::new(),
            ranking: RankingEngine::new(),
        }
    }

    /// 执行门店区间回溯推理
    ///
    /// # 参数
    /// - tenant_id / store_id: 推理范围
    /// - date_start / date_end: 闭区间日期
    ///
    /// # 返回
    /// 五步推理报告: 四类原始证据集合 + 聚合 top3 根因
    pub async fn run_waste_reasoning(
        &self,
        tenant_id: &str,
        store_id: &str,
        date_start: NaiveDate,
        date_end: NaiveDate,
    ) -> ApiResult<WasteReasoningReport> {
        if tenant_id.trim().is_empty() || store_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("租户与门店不能为空".to_string()));
        }
        if date_start > date_end {
            return Err(ApiError::InvalidInput("起始日期不得晚于结束日期".to_string()));
        }

        let config = self
            .config_manager
            .load_engine_config()
            .map_err(|e| ApiError::InternalError(format!("加载推理参数失败: {}", e)))?;

        let range_start = Utc
            .from_utc_datetime(&date_start.and_hms_opt(0, 0, 0).unwrap_or_default());
        let range_end = Utc
            .from_utc_datetime(&date_end.and_hms_opt(23, 59, 59).unwrap_or_default());

        let events: Vec<WasteEvent> = self
            .event_repo
            .find_by_store_in_range(store_id, range_start, range_end)?
            .into_iter()
            .filter(|e| e.tenant_id == tenant_id)
            .collect();

        info!(
            tenant_id,
            store_id,
            %date_start,
            %date_end,
            event_count = events.len(),
            "开始回溯推理"
        );

        // ==========================================
        // 步骤1-4: 对区间内事件并发重放四路采集
        // ==========================================
        let collected = futures::future::join_all(
            events.iter().map(|event| self.collect_for_event(event, &config)),
        )
        .await;

        let mut step1 = Vec::new();
        let mut step2 = Vec::new();
        let mut step3 = Vec::new();
        let mut step4 = Vec::new();
        let mut all_outcomes: Vec<(EvidenceKind, EvidenceOutcome)> = Vec::new();

        for outcomes in collected {
            for (kind, outcome) in outcomes {
                match kind {
                    EvidenceKind::InventoryVariance => {
                        step1.extend(outcome.records().iter().cloned())
                    }
                    EvidenceKind::BomDeviation => step2.extend(outcome.records().iter().cloned()),
                    EvidenceKind::TimeWindowStaff => {
                        step3.extend(outcome.records().iter().cloned())
                    }
                    EvidenceKind::SupplierBatch => step4.extend(outcome.records().iter().cloned()),
                }
                all_outcomes.push((kind, outcome));
            }
        }

        debug!(
            step1 = step1.len(),
            step2 = step2.len(),
            step3 = step3.len(),
            step4 = step4.len(),
            "证据重放完成"
        );

        // ==========================================
        // 步骤5: 聚合评分与排名 (与单事件分析同一公式)
        // ==========================================
        let weights = self
            .calibration_repo
            .load_or_default(tenant_id, config.default_dimension_weight)?;
        let scores = self.scorer.score_dimensions(
            &all_outcomes,
            &weights,
            config.default_dimension_weight,
            None,
        );
        let conclusion = self.ranking.rank(scores, config.auto_action_threshold);

        Ok(WasteReasoningReport {
            tenant_id: tenant_id.to_string(),
            store_id: store_id.to_string(),
            date_start,
            date_end,
            event_count: events.len(),
            step1_inventory_variance: step1,
            step2_bom_deviation: step2,
            step3_time_window_staff: step3,
            step4_supplier_batch: step4,
            top3_root_causes: conclusion.top3,
            root_cause: conclusion.root_cause,
            confidence: conclusion.confidence,
            reason: conclusion.reason,
            generated_at: Utc::now(),
        })
    }

    /// 对单个事件执行四路限时采集 (不触碰生命周期)
    async fn collect_for_event(
        &self,
        event: &WasteEvent,
        config: &crate::config::EngineConfig,
    ) -> Vec<(EvidenceKind, EvidenceOutcome)> {
        let ctx = CollectContext::new(
            event.event_id.clone(),
            event.tenant_id.clone(),
            event.store_id.clone(),
            event.ingredient_id.clone(),
            event.dish_id.clone(),
            event.occurred_at,
            config.window_before_minutes,
            config.window_after_minutes,
            Arc::new(AtomicBool::new(false)),
        );
        let timeout_ms = config.collector_timeout_ms;

        let inventory = collect_with_timeout(
            Arc::new(InventoryVarianceCollector::new(
                self.inventory_source.clone(),
                config.variance_saturation,
            )),
            ctx.clone(),
            timeout_ms,
        );
        let bom = collect_with_timeout(
            Arc::new(
                BomDeviationCollector::new(self.bom_source.clone(), config.variance_saturation)
                    .bind(BomEventInput {
                        quantity: event.quantity,
                        theoretical_qty: event.theoretical_qty,
                    }),
            ),
            ctx.clone(),
            timeout_ms,
        );
        let staff = collect_with_timeout(
            Arc::new(StaffWindowCollector::new(
                self.roster_source.clone(),
                config.staff_presence_baseline,
            )),
            ctx.clone(),
            timeout_ms,
        );
        let supplier = collect_with_timeout(
            Arc::new(SupplierBatchCollector::new(self.batch_source.clone())),
            ctx.clone(),
            timeout_ms,
        );

        let (inventory, bom, staff, supplier) = tokio::join!(inventory, bom, staff, supplier);

        vec![
            (EvidenceKind::InventoryVariance, inventory),
            (EvidenceKind::BomDeviation, bom),
            (EvidenceKind::TimeWindowStaff, staff),
            (EvidenceKind::SupplierBatch, supplier),
        ]
    }
}
