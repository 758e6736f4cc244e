// ==========================================
// 损耗根因推理引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 所有仓储共享同一 SQLite 连接 (统一 PRAGMA/busy_timeout)
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ReasoningApi, WasteEventApi};
use crate::collector::sources::{
    BomSource, InventoryCountSource, ShiftRosterSource, SupplierBatchSource,
};
use crate::config::ConfigManager;
use crate::db::{ensure_schema_version, open_sqlite_connection, read_schema_version,
    CURRENT_SCHEMA_VERSION};
use crate::engine::analyzer::build_calibration_loop;
use crate::engine::{
    AnalysisLockArena, AnalysisOrchestrator, OptionalTrainingDispatcher, TrainingDispatcher,
    WasteEventStateMachine,
};
use crate::repository::{
    ensure_source_tables, CalibrationRepository, EvidenceRepository, SqliteBomSource,
    SqliteInventoryCountSource, SqliteShiftRosterSource, SqliteSupplierBatchSource,
    VerificationRepository, WasteEventRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 损耗事件 API
    pub waste_event_api: Arc<WasteEventApi>,

    /// 回溯推理 API
    pub reasoning_api: Arc<ReasoningApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 事件仓储 (运维工具直达)
    pub event_repo: Arc<WasteEventRepository>,
}

impl AppState {
    /// 创建新的AppState实例 (无培训派发者)
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_dispatcher(db_path, None)
    }

    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - dispatcher: 培训派发服务适配器 (可选)
    pub fn with_dispatcher(
        db_path: String,
        dispatcher: Option<Arc<dyn TrainingDispatcher>>,
    ) -> Result<Self, String> {
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("打开数据库失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // schema 自建 + 版本登记/告警
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            ensure_schema_version(&guard).map_err(|e| format!("schema 版本登记失败: {}", e))?;
            ensure_source_tables(&guard).map_err(|e| format!("数据源表初始化失败: {}", e))?;
            match read_schema_version(&guard) {
                Ok(Some(v)) if v != CURRENT_SCHEMA_VERSION => {
                    tracing::warn!(
                        found = v,
                        expected = CURRENT_SCHEMA_VERSION,
                        "schema 版本不一致,请检查数据库"
                    );
                }
                _ => {}
            }
        }

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("配置管理器初始化失败: {}", e))?,
        );

        // ===== 仓储 =====
        let event_repo = Arc::new(
            WasteEventRepository::from_connection(conn.clone())
                .map_err(|e| format!("事件仓储初始化失败: {}", e))?,
        );
        let evidence_repo = Arc::new(
            EvidenceRepository::from_connection(conn.clone())
                .map_err(|e| format!("证据仓储初始化失败: {}", e))?,
        );
        let verification_repo = Arc::new(
            VerificationRepository::from_connection(conn.clone())
                .map_err(|e| format!("核实仓储初始化失败: {}", e))?,
        );
        let calibration_repo = Arc::new(
            CalibrationRepository::from_connection(conn.clone())
                .map_err(|e| format!("标定仓储初始化失败: {}", e))?,
        );

        // ===== 外部数据源 (SQLite 参考适配器) =====
        let inventory_source: Arc<dyn InventoryCountSource> =
            Arc::new(SqliteInventoryCountSource::from_connection(conn.clone()));
        let bom_source: Arc<dyn BomSource> =
            Arc::new(SqliteBomSource::from_connection(conn.clone()));
        let roster_source: Arc<dyn ShiftRosterSource> =
            Arc::new(SqliteShiftRosterSource::from_connection(conn.clone()));
        let batch_source: Arc<dyn SupplierBatchSource> =
            Arc::new(SqliteSupplierBatchSource::from_connection(conn.clone()));

        // ===== 引擎 =====
        let arena = AnalysisLockArena::new();
        let state_machine = Arc::new(WasteEventStateMachine::new(event_repo.clone(), arena));

        let engine_config = config_manager
            .load_engine_config()
            .map_err(|e| format!("加载推理参数失败: {}", e))?;
        let calibration_loop =
            Arc::new(build_calibration_loop(calibration_repo.clone(), &engine_config));

        let dispatcher = match dispatcher {
            Some(d) => OptionalTrainingDispatcher::with_dispatcher(d),
            None => OptionalTrainingDispatcher::none(),
        };

        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            event_repo.clone(),
            evidence_repo.clone(),
            calibration_repo.clone(),
            config_manager.clone(),
            state_machine.clone(),
            inventory_source.clone(),
            bom_source.clone(),
            roster_source.clone(),
            batch_source.clone(),
            dispatcher,
        ));

        // ===== API =====
        let waste_event_api = Arc::new(WasteEventApi::new(
            event_repo.clone(),
            evidence_repo,
            verification_repo,
            state_machine,
            orchestrator,
            calibration_loop,
        ));

        let reasoning_api = Arc::new(ReasoningApi::new(
            event_repo.clone(),
            calibration_repo,
            config_manager.clone(),
            inventory_source,
            bom_source,
            roster_source,
            batch_source,
        ));

        Ok(Self {
            db_path,
            waste_event_api,
            reasoning_api,
            config_manager,
            event_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先使用系统数据目录,不可用时回退当前目录
pub fn get_default_db_path() -> String {
    let dir = dirs::data_local_dir()
        .map(|d| d.join("waste-rca-engine"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(error = %e, "创建数据目录失败,回退当前目录");
        return "waste_rca.db".to_string();
    }

    dir.join("waste_rca.db").to_string_lossy().to_string()
}
