// ==========================================
// 损耗根因推理引擎 - 损耗事件 API
// ==========================================
// 职责: 封装事件全生命周期操作,供外部 REST 壳层调用
// 对应契约:
//   GET  /waste-events/store/{storeId}            → list_store_events
//   GET  /waste-events/{eventId}                  → get_event
//   POST /waste-events/{eventId}/analyze          → analyze_event
//   POST /waste-events/{eventId}/verify           → verify_event
//   POST /waste-events/{eventId}/close            → close_event
//   GET  /waste-events/store/{storeId}/summary    → get_store_summary
//   GET  /waste-events/store/{storeId}/root-causes → get_root_cause_stats
// ==========================================

use crate::api::dto::{SubmitWasteEventRequest, VerifyWasteEventRequest, WasteEventView};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::evidence::EvidenceRecord;
use crate::domain::types::{RootCauseDimension, WasteEventStatus, WasteEventType};
use crate::domain::verification::VerificationRecord;
use crate::domain::waste_event::{IngredientLossSummary, RootCauseStatRow, WasteEvent};
use crate::engine::analyzer::AnalysisOrchestrator;
use crate::engine::calibration::CalibrationLoop;
use crate::engine::state_machine::WasteEventStateMachine;
use crate::repository::evidence_repo::EvidenceRepository;
use crate::repository::verification_repo::VerificationRepository;
use crate::repository::waste_event_repo::WasteEventRepository;
use std::sync::Arc;
use tracing::{info, warn};

// ==========================================
// WasteEventApi - 损耗事件 API
// ==========================================
pub struct WasteEventApi {
    event_repo: Arc<WasteEventRepository>,
    evidence_repo: Arc<EvidenceRepository>,
    verification_repo: Arc<VerificationRepository>,
    state_machine: Arc<WasteEventStateMachine>,
    orchestrator: Arc<AnalysisOrchestrator>,
    calibration_loop: Arc<CalibrationLoop>,
}

impl WasteEventApi {
    pub fn new(
        event_repo: Arc<WasteEventRepository>,
        evidence_repo: Arc<EvidenceRepository>,
        verification_repo: Arc<VerificationRepository>,
        state_machine: Arc<WasteEventStateMachine>,
        orchestrator: Arc<AnalysisOrchestrator>,
        calibration_loop: Arc<CalibrationLoop>,
    ) -> Self {
        Self {
            event_repo,
            evidence_repo,
            verification_repo,
            state_machine,
            orchestrator,
            calibration_loop,
        }
    }

    // ==========================================
    // 事件上报 (POS/库存子系统入口)
    // ==========================================

    /// 受理外部上报的损耗事件,落库为 pending
    pub fn submit_event(&self, request: SubmitWasteEventRequest) -> ApiResult<WasteEventView> {
        if request.tenant_id.trim().is_empty() || request.store_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("租户与门店不能为空".to_string()));
        }
        if request.ingredient_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("食材不能为空".to_string()));
        }
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(ApiError::InvalidInput("损耗量必须为正数".to_string()));
        }

        let mut event = WasteEvent::new(
            request.tenant_id,
            request.store_id,
            WasteEventType::from_str(&request.event_type),
            request.ingredient_id,
            request.quantity,
            request.unit,
            request.occurred_at,
        );
        event.dish_id = request.dish_id;
        event.theoretical_qty = request.theoretical_qty;
        event.reported_by = request.reported_by;
        event.notes = request.notes;

        self.event_repo.insert(&event)?;
        info!(event_id = %event.event_id, store_id = %event.store_id, "损耗事件已受理");
        Ok(event.into())
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 按门店查询事件列表
    ///
    /// # 参数
    /// - status / event_type: 字符串过滤条件 (契约层形态),非法值报 InvalidInput
    /// - days: 最近 N 天
    pub fn list_store_events(
        &self,
        store_id: &str,
        status: Option<&str>,
        event_type: Option<&str>,
        days: Option<i64>,
    ) -> ApiResult<Vec<WasteEventView>> {
        if store_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("门店ID不能为空".to_string()));
        }

        let status = status
            .map(|s| {
                WasteEventStatus::from_str(s)
                    .ok_or_else(|| ApiError::InvalidInput(format!("未知状态: {}", s)))
            })
            .transpose()?;

        let event_type = event_type
            .map(|s| {
                let parsed = WasteEventType::from_str(s);
                if parsed == WasteEventType::Unknown && s.to_lowercase() != "unknown" {
                    Err(ApiError::InvalidInput(format!("未知事件类型: {}", s)))
                } else {
                    Ok(parsed)
                }
            })
            .transpose()?;

        let events = self.event_repo.list_by_store(store_id, status, event_type, days)?;
        Ok(events.into_iter().map(WasteEventView::from).collect())
    }

    /// 查询单个事件 (携带最近一次分析结论)
    pub fn get_event(&self, event_id: &str) -> ApiResult<WasteEventView> {
        let event = self
            .event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| ApiError::NotFound(format!("WasteEvent(id={})不存在", event_id)))?;
        Ok(event.into())
    }

    /// 查询事件最近一次分析的证据明细 (驾驶舱下钻)
    pub fn get_event_evidence(&self, event_id: &str) -> ApiResult<Vec<EvidenceRecord>> {
        let event = self
            .event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| ApiError::NotFound(format!("WasteEvent(id={})不存在", event_id)))?;
        match event.analysis_id {
            Some(analysis_id) => Ok(self.evidence_repo.find_by_analysis(&analysis_id)?),
            None => Ok(Vec::new()),
        }
    }

    // ==========================================
    // 生命周期操作
    // ==========================================

    /// 触发根因分析 (pending|analyzed → analyzing → analyzed)
    ///
    /// # 返回
    /// - Ok: 更新后的事件视图
    /// - Err(ConcurrentAnalysisInProgress): busy,调用方稍后重试
    pub async fn analyze_event(&self, event_id: &str) -> ApiResult<WasteEventView> {
        let event = self.orchestrator.analyze(event_id).await?;
        Ok(event.into())
    }

    /// 人工核实 (analyzed → verified),并驱动标定权重校准
    pub fn verify_event(
        &self,
        event_id: &str,
        request: VerifyWasteEventRequest,
    ) -> ApiResult<WasteEventView> {
        let verified = RootCauseDimension::from_str(&request.verified_root_cause)
            .filter(|d| *d != RootCauseDimension::Unknown)
            .ok_or_else(|| {
                ApiError::InvalidInput(format!(
                    "无效的核实根因: {}",
                    request.verified_root_cause
                ))
            })?;
        if request.verified_by.trim().is_empty() {
            return Err(ApiError::InvalidInput("核实人不能为空".to_string()));
        }

        let event = self
            .event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| ApiError::NotFound(format!("WasteEvent(id={})不存在", event_id)))?;

        // 在转换前取出引擎曾排在核实维度之前的维度 (校准降权对象)
        let ranked_above = self.orchestrator.ranked_above(event_id, verified)?;

        // CAS: analyzed → verified;非 analyzed 状态报 InvalidTransition,无部分变更
        self.state_machine.mark_verified(event_id)?;

        let record = VerificationRecord::new(
            event_id,
            event.tenant_id.clone(),
            verified,
            request.action_taken.clone(),
            request.verified_by,
        );
        self.verification_repo.append(&record)?;
        self.event_repo.update_disposition(event_id, Some(&request.action_taken))?;

        // 校准: 同租户核实被串行化,冲突在环内消化,不上抛调用方
        if let Err(e) =
            self.calibration_loop
                .apply_verification(&event.tenant_id, verified, &ranked_above)
        {
            warn!(event_id, error = %e, "标定权重校准失败 (核实已生效)");
        }

        self.get_event(event_id)
    }

    /// 关闭事件 (任意非 closed → closed,幂等)
    pub fn close_event(
        &self,
        event_id: &str,
        action_taken: Option<&str>,
    ) -> ApiResult<WasteEventView> {
        self.state_machine.close(event_id)?;
        if action_taken.is_some() {
            self.event_repo.update_disposition(event_id, action_taken)?;
        }
        self.get_event(event_id)
    }

    // ==========================================
    // 聚合查询 (驾驶舱可视化)
    // ==========================================

    /// 按食材聚合损耗量
    pub fn get_store_summary(
        &self,
        store_id: &str,
        days: i64,
    ) -> ApiResult<Vec<IngredientLossSummary>> {
        if store_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("门店ID不能为空".to_string()));
        }
        Ok(self.event_repo.summary_by_ingredient(store_id, days)?)
    }

    /// 按根因维度统计数量与平均置信度
    pub fn get_root_cause_stats(
        &self,
        store_id: &str,
        days: i64,
    ) -> ApiResult<Vec<RootCauseStatRow>> {
        if store_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("门店ID不能为空".to_string()));
        }
        Ok(self.event_repo.root_cause_stats(store_id, days)?)
    }
}
