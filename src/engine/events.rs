// ==========================================
// 损耗根因推理引擎 - 培训派发端口
// ==========================================
// 职责: 定义培训派发 trait,实现依赖倒置
// 说明: 引擎层定义 trait,派发服务(外部协作方)实现适配器
// 红线: 引擎只发出派发请求,不实现派发;派发失败不影响分析结论
// ==========================================

use crate::domain::types::RootCauseDimension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

// ==========================================
// 培训派发请求
// ==========================================

/// 培训派发请求
///
/// 分析结论置信度达到门槛时由排名引擎触发
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDispatchRequest {
    /// 请求 ID
    pub request_id: String,
    /// 事件 ID
    pub event_id: String,
    /// 租户
    pub tenant_id: String,
    /// 门店
    pub store_id: String,
    /// 结论根因
    pub root_cause: RootCauseDimension,
    /// 结论置信度
    pub confidence: f64,
    /// 人员归因 (有则培训指向个人,无则指向门店)
    pub staff_id: Option<String>,
    /// 结论说明
    pub reason: String,
    /// 结论时间
    pub concluded_at: DateTime<Utc>,
}

impl TrainingDispatchRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: impl Into<String>,
        tenant_id: impl Into<String>,
        store_id: impl Into<String>,
        root_cause: RootCauseDimension,
        confidence: f64,
        staff_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            event_id: event_id.into(),
            tenant_id: tenant_id.into(),
            store_id: store_id.into(),
            root_cause,
            confidence,
            staff_id,
            reason: reason.into(),
            concluded_at: Utc::now(),
        }
    }
}

// ==========================================
// 培训派发 Trait
// ==========================================

/// 培训派发者 Trait
///
/// 引擎层定义,派发服务实现
/// 通过 trait 实现依赖倒置,引擎不依赖派发服务的具体形态
pub trait TrainingDispatcher: Send + Sync {
    /// 发出派发请求
    ///
    /// # 返回
    /// - `Ok(dispatch_id)`: 派发单 ID（如果支持）或空字符串
    /// - `Err`: 派发失败 (调用方记日志,不回滚分析结论)
    fn dispatch(
        &self,
        request: TrainingDispatchRequest,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作派发者
///
/// 用于不需要派发的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpTrainingDispatcher;

impl TrainingDispatcher for NoOpTrainingDispatcher {
    fn dispatch(
        &self,
        request: TrainingDispatchRequest,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpTrainingDispatcher: 跳过培训派发 - event_id={}, root_cause={}",
            request.event_id,
            request.root_cause
        );
        Ok(String::new())
    }
}

/// 可选的派发者包装
///
/// 简化 Option<Arc<dyn TrainingDispatcher>> 的使用
pub struct OptionalTrainingDispatcher {
    inner: Option<Arc<dyn TrainingDispatcher>>,
}

impl OptionalTrainingDispatcher {
    /// 创建带派发者的实例
    pub fn with_dispatcher(dispatcher: Arc<dyn TrainingDispatcher>) -> Self {
        Self { inner: Some(dispatcher) }
    }

    /// 创建空实例（不派发）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发出派发请求（如果配置了派发者）
    pub fn dispatch(
        &self,
        request: TrainingDispatchRequest,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(dispatcher) => dispatcher.dispatch(request),
            None => {
                tracing::debug!(
                    "OptionalTrainingDispatcher: 未配置派发者,跳过 - event_id={}",
                    request.event_id
                );
                Ok(String::new())
            }
        }
    }

    /// 检查是否配置了派发者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalTrainingDispatcher {
    fn default() -> Self {
        Self::none()
    }
}
