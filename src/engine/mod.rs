// ==========================================
// 损耗根因推理引擎 - 引擎层
// ==========================================
// 职责: 实现推理业务规则,不拼 SQL
// 红线: Engine 不拼 SQL, 所有评分与结论必须输出 reason
// ==========================================

pub mod analyzer;
pub mod calibration;
pub mod error;
pub mod events;
pub mod ranking;
pub mod scorer;
pub mod single_flight;
pub mod state_machine;

// 重导出核心引擎
pub use analyzer::{build_calibration_loop, AnalysisOrchestrator};
pub use calibration::CalibrationLoop;
pub use error::{EngineError, EngineResult};
pub use events::{
    NoOpTrainingDispatcher, OptionalTrainingDispatcher, TrainingDispatchRequest,
    TrainingDispatcher,
};
pub use ranking::{RankedConclusion, RankingEngine};
pub use scorer::{contributing_dimensions, RootCauseScorer};
pub use single_flight::{AnalysisLockArena, AnalysisPermit};
pub use state_machine::{can_transition, WasteEventStateMachine};
