// ==========================================
// 损耗根因推理引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod calibration_repo;
pub mod error;
pub mod evidence_repo;
pub mod source_repo;
pub mod verification_repo;
pub mod waste_event_repo;

// 重导出核心仓储
pub use calibration_repo::CalibrationRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use evidence_repo::EvidenceRepository;
pub use source_repo::{
    ensure_source_tables, SqliteBomSource, SqliteInventoryCountSource, SqliteShiftRosterSource,
    SqliteSupplierBatchSource,
};
pub use verification_repo::VerificationRepository;
pub use waste_event_repo::WasteEventRepository;
