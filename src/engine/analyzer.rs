// ==========================================
// 损耗根因推理引擎 - 分析编排器
// ==========================================
// 用途: 协调单个事件的完整分析流程
// 流程: 单飞准入 → 四路并发采集 (各自限时) → 评分 → 排名 → 落库 → 派发
// 红线: 四个采集器互不阻塞,合并等待 = 各超时的最大值而非总和
// 红线: 任何退出路径都释放单飞锁;取消时不提交任何部分评分
// ==========================================

use crate::collector::bom_deviation::BomEventInput;
use crate::collector::sources::{
    BomSource, InventoryCountSource, ShiftRosterSource, SupplierBatchSource,
};
use crate::collector::{
    collect_with_timeout, BomDeviationCollector, CollectContext, InventoryVarianceCollector,
    StaffWindowCollector, SupplierBatchCollector,
};
use crate::config::{ConfigManager, EngineConfig};
use crate::domain::evidence::{EvidenceOutcome, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use crate::domain::waste_event::WasteEvent;
use crate::engine::calibration::CalibrationLoop;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{OptionalTrainingDispatcher, TrainingDispatchRequest};
use crate::engine::ranking::{RankedConclusion, RankingEngine};
use crate::engine::scorer::RootCauseScorer;
use crate::engine::state_machine::WasteEventStateMachine;
use crate::repository::calibration_repo::CalibrationRepository;
use crate::repository::error::RepositoryError;
use crate::repository::evidence_repo::EvidenceRepository;
use crate::repository::waste_event_repo::WasteEventRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ==========================================
// AnalysisOrchestrator - 分析编排器
// ==========================================
pub struct AnalysisOrchestrator {
    event_repo: Arc<WasteEventRepository>,
    evidence_repo: Arc<EvidenceRepository>,
    calibration_repo: Arc<CalibrationRepository>,
    config_manager: Arc<ConfigManager>,
    state_machine: Arc<WasteEventStateMachine>,

    // 四个外部数据源端口
    inventory_source: Arc<dyn InventoryCountSource>,
    bom_source: Arc<dyn BomSource>,
    roster_source: Arc<dyn ShiftRosterSource>,
    batch_source: Arc<dyn SupplierBatchSource>,

    scorer: RootCauseScorer,
    ranking: RankingEngine,
    dispatcher: OptionalTrainingDispatcher,
}

impl AnalysisOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_repo: Arc<WasteEventRepository>,
        evidence_repo: Arc<EvidenceRepository>,
        calibration_repo: Arc<CalibrationRepository>,
        config_manager: Arc<ConfigManager>,
        state_machine: Arc<WasteEventStateMachine>,
        inventory_source: Arc<dyn InventoryCountSource>,
        bom_source: Arc<dyn BomSource>,
        roster_source: Arc<dyn ShiftRosterSource>,
        batch_source: Arc<dyn SupplierBatchSource>,
        dispatcher: OptionalTrainingDispatcher,
    ) -> Self {
        Self {
            event_repo,
            evidence_repo,
            calibration_repo,
            config_manager,
            state_machine,
            inventory_source,
            bom_source,
            roster_source,
            batch_source,
            scorer: RootCauseScorer::new(),
            ranking: RankingEngine::new(),
            dispatcher,
        }
    }

    /// 执行单个事件的完整分析
    ///
    /// # 返回
    /// - Ok(WasteEvent): 更新后的事件 (status=analyzed,结论已写入)
    /// - Err(ConcurrentAnalysisInProgress): busy,调用方可重试
    /// - Err(AnalysisCancelled): 事件被外部关闭,未提交任何结论
    /// - Err(InvalidTransition): 当前状态不允许分析
    pub async fn analyze(&self, event_id: &str) -> EngineResult<WasteEvent> {
        let config = self
            .config_manager
            .load_engine_config()
            .map_err(|e| EngineError::Other(anyhow::anyhow!("加载推理参数失败: {}", e)))?;

        // 单飞准入 (permit 在本函数所有退出路径上 RAII 释放)
        let (permit, prior) = self.state_machine.begin_analysis(event_id)?;

        let event = self
            .event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| EngineError::EventNotFound { event_id: event_id.to_string() })?;

        info!(
            event_id,
            store_id = %event.store_id,
            ingredient_id = %event.ingredient_id,
            "开始根因分析"
        );

        let ctx = CollectContext::new(
            event.event_id.clone(),
            event.tenant_id.clone(),
            event.store_id.clone(),
            event.ingredient_id.clone(),
            event.dish_id.clone(),
            event.occurred_at,
            config.window_before_minutes,
            config.window_after_minutes,
            permit.cancel_flag(),
        );

        // ==========================================
        // 步骤1-4: 四路并发采集 (各自限时,部分失败隔离)
        // ==========================================
        let outcomes = self.collect_evidence(&event, &ctx, &config).await;

        for (kind, outcome) in &outcomes {
            debug!(
                event_id,
                kind = %kind,
                absent = outcome.is_absent(),
                records = outcome.records().len(),
                "证据采集完成"
            );
        }

        // 取消检查: 事件在采集期间被外部关闭 → 不提交任何部分评分
        if permit.is_cancelled() {
            info!(event_id, "分析在途中被取消,放弃结论");
            self.state_machine.rollback_analysis(event_id, prior);
            return Err(EngineError::AnalysisCancelled { event_id: event_id.to_string() });
        }

        // ==========================================
        // 步骤5: 评分 → 排名 → 落库
        // ==========================================
        match self.score_and_persist(&event, &outcomes, &config) {
            Ok(conclusion) => {
                // 置信度达标 → 发出培训派发请求 (失败只记日志,不影响结论)
                if conclusion.auto_dispatch {
                    let request = TrainingDispatchRequest::new(
                        event.event_id.clone(),
                        event.tenant_id.clone(),
                        event.store_id.clone(),
                        conclusion.root_cause,
                        conclusion.confidence,
                        conclusion.staff_id.clone(),
                        conclusion.reason.clone(),
                    );
                    if let Err(e) = self.dispatcher.dispatch(request) {
                        error!(event_id, error = %e, "培训派发请求失败");
                    }
                }

                info!(
                    event_id,
                    root_cause = %conclusion.root_cause,
                    confidence = conclusion.confidence,
                    auto_dispatch = conclusion.auto_dispatch,
                    "根因分析完成"
                );

                self.event_repo
                    .find_by_id(event_id)?
                    .ok_or_else(|| EngineError::EventNotFound { event_id: event_id.to_string() })
            }
            // 落库 CAS 失败 = 事件在评分期间被竞合关闭,按取消处理
            Err(EngineError::Repository(RepositoryError::StatusConflict { actual, .. })) => {
                debug!(event_id, actual = %actual, "落库时状态已被竞合操作变更,放弃结论");
                Err(EngineError::AnalysisCancelled { event_id: event_id.to_string() })
            }
            Err(e) => {
                warn!(event_id, error = %e, "分析失败,回滚到进入前状态");
                self.state_machine.rollback_analysis(event_id, prior);
                Err(e)
            }
        }
    }

    /// 四路并发采集
    ///
    /// 合并等待时长 = 四个采集器各自超时的最大值 (并行执行,非串行求和)
    async fn collect_evidence(
        &self,
        event: &WasteEvent,
        ctx: &CollectContext,
        config: &EngineConfig,
    ) -> Vec<(EvidenceKind, EvidenceOutcome)> {
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

    /// 评分 → 排名 → 证据与结论落库 (同步段)
    fn score_and_persist(
        &self,
        event: &WasteEvent,
        outcomes: &[(EvidenceKind, EvidenceOutcome)],
        config: &EngineConfig,
    ) -> EngineResult<RankedConclusion> {
        // 标定权重只读;核实与评分间允许最终一致
        let weights = self
            .calibration_repo
            .load_or_default(&event.tenant_id, config.default_dimension_weight)?;

        let scores = self.scorer.score_dimensions(
            outcomes,
            &weights,
            config.default_dimension_weight,
            Some(&event.ingredient_id),
        );
        // 全部有定义维度的得分都对外可见 (低置信度时前端展示原始得分)
        let dimension_scores: BTreeMap<String, f64> = scores
            .iter()
            .map(|s| (s.dimension.as_str().to_string(), s.score))
            .collect();
        let conclusion = self.ranking.rank(scores, config.auto_action_threshold);

        let analysis_id = Uuid::new_v4().to_string();

        // 证据审计轨迹 (五步推理面板回放数据源)
        let all_records: Vec<EvidenceRecord> = outcomes
            .iter()
            .flat_map(|(_, outcome)| outcome.records().iter().cloned())
            .collect();
        self.evidence_repo
            .insert_batch(&analysis_id, &event.event_id, &all_records)?;
        let top_causes_json = serde_json::to_string(&conclusion.top3)
            .map_err(|e| EngineError::Other(anyhow::anyhow!("结论序列化失败: {}", e)))?;

        // 结论落库 + analyzing → analyzed 同条 UPDATE (CAS)
        self.event_repo.write_analysis_outcome(
            &event.event_id,
            &analysis_id,
            conclusion.root_cause,
            conclusion.confidence,
            &dimension_scores,
            &top_causes_json,
            conclusion.staff_id.as_deref(),
        )?;

        Ok(conclusion)
    }

    /// 核实前查询事件曾排在某维度之前的维度 (校准环输入)
    pub fn ranked_above(
        &self,
        event_id: &str,
        verified: crate::domain::types::RootCauseDimension,
    ) -> EngineResult<Vec<crate::domain::types::RootCauseDimension>> {
        let top_causes = self.event_repo.find_top_causes(event_id)?.unwrap_or_default();
        let mut above = Vec::new();
        for score in top_causes {
            if score.dimension == verified {
                break;
            }
            above.push(score.dimension);
        }
        Ok(above)
    }
}

/// 校准环装配 (与评分共用同一份参数快照,避免步长/夹界漂移)
pub fn build_calibration_loop(
    calibration_repo: Arc<CalibrationRepository>,
    config: &EngineConfig,
) -> CalibrationLoop {
    CalibrationLoop::new(
        calibration_repo,
        config.calibration_step,
        config.weight_min,
        config.weight_max,
        config.default_dimension_weight,
    )
}
