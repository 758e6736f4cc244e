// ==========================================
// 损耗根因推理引擎 - 领域层
// ==========================================
// 职责: 实体与类型定义,无 I/O
// ==========================================

pub mod calibration;
pub mod evidence;
pub mod types;
pub mod verification;
pub mod waste_event;

// 重导出核心类型
pub use calibration::CalibrationWeights;
pub use evidence::{EvidenceOutcome, EvidencePayload, EvidenceRecord, RootCauseScore};
pub use types::{EvidenceKind, RootCauseDimension, WasteEventStatus, WasteEventType};
pub use verification::VerificationRecord;
pub use waste_event::{IngredientLossSummary, RootCauseStatRow, WasteEvent};
