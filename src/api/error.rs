// ==========================================
// 损耗根因推理引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型,转换下层错误为用户友好的错误消息
// 约定: busy (分析在途) 与非法转换可区分,前端据此决定重试或提示
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因（可解释性）
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: String, to: String },

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 同一事件已有分析在途,调用方应稍后重试 (HTTP 语义: 409/busy)
    #[error("事件 {0} 正在分析中,请稍后重试")]
    ConcurrentAnalysisInProgress(String),

    /// 分析被外部关闭操作取消,无结论产出
    #[error("事件 {0} 的分析已取消")]
    AnalysisCancelled(String),

    /// 乐观并发冲突 (状态在读写之间被他方变更)
    #[error("状态冲突: {0}")]
    StateConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将仓储层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::StatusConflict { event_id, expected, actual } => {
                ApiError::StateConflict(format!(
                    "事件 {} 状态已变更 (期望 {},实际 {})",
                    event_id, expected, actual
                ))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseConnectionError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConcurrentAnalysisInProgress { event_id } => {
                ApiError::ConcurrentAnalysisInProgress(event_id)
            }
            EngineError::InvalidTransition { from, to } => ApiError::InvalidTransition { from, to },
            EngineError::AnalysisCancelled { event_id } => ApiError::AnalysisCancelled(event_id),
            EngineError::EventNotFound { event_id } => {
                ApiError::NotFound(format!("WasteEvent(id={})不存在", event_id))
            }
            EngineError::Repository(e) => e.into(),
            EngineError::Other(e) => ApiError::Other(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
