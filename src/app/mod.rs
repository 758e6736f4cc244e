// ==========================================
// 损耗根因推理引擎 - 应用层
// ==========================================
// 职责: 依赖装配与应用级共享状态
// ==========================================

pub mod state;

pub use state::{get_default_db_path, AppState};
