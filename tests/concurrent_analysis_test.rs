// ==========================================
// 并发控制测试
// ==========================================
// 覆盖: 单飞互斥 (busy 信号) / 在途取消 / 锁的保证释放
// 手法: 注入慢数据源替身,制造可控的分析在途窗口
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use waste_rca_engine::collector::sources::{
    BatchRecord, BomSource, InventoryCountSource, InventorySnapshot, ShiftEntry,
    ShiftRosterSource, SupplierBatchSource,
};
use waste_rca_engine::collector::CollectorResult;
use waste_rca_engine::config::ConfigManager;
use waste_rca_engine::domain::types::{WasteEventStatus, WasteEventType};
use waste_rca_engine::domain::waste_event::WasteEvent;
use waste_rca_engine::engine::{
    AnalysisLockArena, AnalysisOrchestrator, EngineError, OptionalTrainingDispatcher,
    WasteEventStateMachine,
};
use waste_rca_engine::repository::{
    CalibrationRepository, EvidenceRepository, WasteEventRepository,
};

use crate::test_helpers::create_test_db;

// ==========================================
// 慢数据源替身
// ==========================================

/// 排班源: 固定延迟后返回单人当班
struct SlowRoster {
    delay_ms: u64,
}

#[async_trait]
impl ShiftRosterSource for SlowRoster {
    async fn staff_on_shift(
        &self,
        _store_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CollectorResult<Vec<ShiftEntry>> {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        Ok(vec![ShiftEntry {
            staff_id: "STF-01".to_string(),
            station: Some("后厨".to_string()),
            clock_in: window_start,
            clock_out: window_end,
        }])
    }

    async fn incident_rate(&self, _staff_id: &str) -> CollectorResult<Option<f64>> {
        Ok(Some(0.3))
    }
}

/// 其余数据源: 快速返回无覆盖
struct EmptyInventory;

#[async_trait]
impl InventoryCountSource for EmptyInventory {
    async fn nearest_snapshot(
        &self,
        _store_id: &str,
        _ingredient_id: &str,
        _around: DateTime<Utc>,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> CollectorResult<Option<InventorySnapshot>> {
        Ok(None)
    }
}

struct EmptyBom;

#[async_trait]
impl BomSource for EmptyBom {
    async fn usage_per_dish(
        &self,
        _dish_id: &str,
        _ingredient_id: &str,
    ) -> CollectorResult<Option<f64>> {
        Ok(None)
    }

    async fn dishes_sold(
        &self,
        _store_id: &str,
        _dish_id: &str,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> CollectorResult<i64> {
        Ok(0)
    }
}

struct EmptyBatches;

#[async_trait]
impl SupplierBatchSource for EmptyBatches {
    async fn recent_batches(
        &self,
        _store_id: &str,
        _ingredient_id: &str,
        _before: DateTime<Utc>,
        _limit: usize,
    ) -> CollectorResult<Vec<BatchRecord>> {
        Ok(vec![])
    }
}

// ==========================================
// 装配: 慢引擎测试环境
// ==========================================

struct SlowEngineEnv {
    orchestrator: Arc<AnalysisOrchestrator>,
    state_machine: Arc<WasteEventStateMachine>,
    event_repo: Arc<WasteEventRepository>,
    event_id: String,
}

fn setup_slow_engine(db_path: &str, roster_delay_ms: u64) -> SlowEngineEnv {
    let conn = waste_rca_engine::db::open_sqlite_connection(db_path).unwrap();
    let conn = Arc::new(Mutex::new(conn));

    let event_repo = Arc::new(WasteEventRepository::from_connection(conn.clone()).unwrap());
    let evidence_repo = Arc::new(EvidenceRepository::from_connection(conn.clone()).unwrap());
    let calibration_repo = Arc::new(CalibrationRepository::from_connection(conn.clone()).unwrap());
    let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());

    let arena = AnalysisLockArena::new();
    let state_machine = Arc::new(WasteEventStateMachine::new(event_repo.clone(), arena));

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        event_repo.clone(),
        evidence_repo,
        calibration_repo,
        config_manager,
        state_machine.clone(),
        Arc::new(EmptyInventory),
        Arc::new(EmptyBom),
        Arc::new(SlowRoster { delay_ms: roster_delay_ms }),
        Arc::new(EmptyBatches),
        OptionalTrainingDispatcher::none(),
    ));

    let event = WasteEvent::new(
        "T001",
        "S001",
        WasteEventType::CookingLoss,
        "ING-BEEF",
        5.0,
        "kg",
        Utc::now() - Duration::hours(1),
    );
    event_repo.insert(&event).unwrap();

    SlowEngineEnv {
        orchestrator,
        state_machine,
        event_repo,
        event_id: event.event_id,
    }
}

// ==========================================
// 测试1: 同事件并发分析,恰好一个在途
// ==========================================

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_analyze_exactly_one_pass() {
    let (_temp, db_path) = create_test_db().unwrap();
    let env = setup_slow_engine(&db_path, 200);

    let a = {
        let orchestrator = env.orchestrator.clone();
        let event_id = env.event_id.clone();
        tokio::spawn(async move { orchestrator.analyze(&event_id).await })
    };
    // 保证 a 先进入在途窗口
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let b = {
        let orchestrator = env.orchestrator.clone();
        let event_id = env.event_id.clone();
        tokio::spawn(async move { orchestrator.analyze(&event_id).await })
    };

    let result_a = a.await.unwrap();
    let result_b = b.await.unwrap();

    let ok_count = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    let busy_count = [&result_a, &result_b]
        .iter()
        .filter(|r| matches!(r, Err(EngineError::ConcurrentAnalysisInProgress { .. })))
        .count();

    assert_eq!(ok_count, 1, "恰好一个分析通过");
    assert_eq!(busy_count, 1, "另一个收到 busy 信号");

    // busy 是可重试信号: 第一轮完成后重新分析成功 (analyzed → analyzing)
    let retried = env.orchestrator.analyze(&env.event_id).await.unwrap();
    assert_eq!(retried.status, WasteEventStatus::Analyzed);
}

// ==========================================
// 测试2: 在途取消,不提交部分评分
// ==========================================

#[tokio::test(flavor = "multi_thread")]
async fn test_close_cancels_in_flight_analysis() {
    let (_temp, db_path) = create_test_db().unwrap();
    let env = setup_slow_engine(&db_path, 300);

    let analyze = {
        let orchestrator = env.orchestrator.clone();
        let event_id = env.event_id.clone();
        tokio::spawn(async move { orchestrator.analyze(&event_id).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    // 竞合操作: 外部关闭事件
    let closed = env.state_machine.close(&env.event_id).unwrap();
    assert_eq!(closed, WasteEventStatus::Closed);

    let result = analyze.await.unwrap();
    assert!(
        matches!(result, Err(EngineError::AnalysisCancelled { .. })),
        "在途分析观察到取消并放弃结论"
    );

    // 事件停在 closed,无部分评分落库
    let event = env.event_repo.find_by_id(&env.event_id).unwrap().unwrap();
    assert_eq!(event.status, WasteEventStatus::Closed);
    assert!(event.root_cause.is_none());
    assert!(event.confidence.is_none());
    assert!(event.conclusion_is_consistent());
}

// ==========================================
// 测试3: 取消后锁已释放,事件可再次操作
// ==========================================

#[tokio::test(flavor = "multi_thread")]
async fn test_lock_released_after_cancellation() {
    let (_temp, db_path) = create_test_db().unwrap();
    let env = setup_slow_engine(&db_path, 200);

    let analyze = {
        let orchestrator = env.orchestrator.clone();
        let event_id = env.event_id.clone();
        tokio::spawn(async move { orchestrator.analyze(&event_id).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    env.state_machine.close(&env.event_id).unwrap();
    let _ = analyze.await.unwrap();

    // 锁必须已释放 (closed 状态下重分析被状态机拒绝,而非 busy)
    assert!(!env.state_machine.arena().is_in_flight(&env.event_id));
    let err = env.orchestrator.analyze(&env.event_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));

    // 幂等关闭仍然成立
    assert_eq!(env.state_machine.close(&env.event_id).unwrap(), WasteEventStatus::Closed);
}
