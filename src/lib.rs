// ==========================================
// 餐饮门店损耗事件根因推理引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + Tokio
// 系统定位: 决策支持系统 (人工最终核实权)
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 证据采集层 - 外部数据源
pub mod collector;

// 引擎层 - 推理规则
pub mod engine;

// 配置层 - 推理参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 依赖装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EvidenceKind, RootCauseDimension, WasteEventStatus, WasteEventType};

// 领域实体
pub use domain::{
    CalibrationWeights, EvidenceOutcome, EvidencePayload, EvidenceRecord, RootCauseScore,
    VerificationRecord, WasteEvent,
};

// 引擎
pub use engine::{
    AnalysisLockArena, AnalysisOrchestrator, CalibrationLoop, RankedConclusion, RankingEngine,
    RootCauseScorer, TrainingDispatcher, WasteEventStateMachine,
};

// API
pub use api::{ReasoningApi, WasteEventApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "餐饮损耗根因推理引擎";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

// ==========================================
// 预编译检查
// ==========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
