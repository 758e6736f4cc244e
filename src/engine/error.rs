// ==========================================
// 损耗根因推理引擎 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 并发拒绝 (busy) 与非法转换必须可区分,便于调用方重试决策
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 同一事件已有分析在途,调用方稍后重试 (非致命)
    #[error("事件 {event_id} 正在分析中")]
    ConcurrentAnalysisInProgress { event_id: String },

    /// 生命周期规则拒绝的转换,无任何部分状态变更
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: String, to: String },

    /// 分析在途中被取消 (事件被外部关闭),未提交任何部分评分
    #[error("事件 {event_id} 的分析已取消")]
    AnalysisCancelled { event_id: String },

    #[error("事件未找到: {event_id}")]
    EventNotFound { event_id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
