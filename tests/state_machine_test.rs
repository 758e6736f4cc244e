// ==========================================
// 生命周期状态机 API 级测试
// ==========================================
// 覆盖: 核实前置条件 / 幂等关闭 / 核实记录不可变 / 非法输入
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use chrono::{Duration, Utc};
use waste_rca_engine::api::dto::{SubmitWasteEventRequest, VerifyWasteEventRequest};
use waste_rca_engine::api::ApiError;
use waste_rca_engine::app::AppState;
use waste_rca_engine::domain::types::WasteEventStatus;

use crate::test_helpers::*;

fn submit_request() -> SubmitWasteEventRequest {
    SubmitWasteEventRequest {
        tenant_id: "T001".to_string(),
        store_id: "S001".to_string(),
        event_type: "spoilage".to_string(),
        ingredient_id: "ING-FISH".to_string(),
        dish_id: None,
        quantity: 3.0,
        unit: "kg".to_string(),
        theoretical_qty: Some(2.5),
        occurred_at: Utc::now() - Duration::hours(2),
        reported_by: None,
        notes: None,
    }
}

fn verify_request(cause: &str) -> VerifyWasteEventRequest {
    VerifyWasteEventRequest {
        verified_root_cause: cause.to_string(),
        action_taken: "安排复训并调整流程".to_string(),
        verified_by: "area_manager".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_on_pending_is_invalid_transition() {
    let (_temp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.waste_event_api.clone();

    let event = api.submit_event(submit_request()).unwrap();

    let err = api.verify_event(&event.event_id, verify_request("staff_error")).unwrap_err();
    match err {
        ApiError::InvalidTransition { from, to } => {
            assert_eq!(from, "pending");
            assert_eq!(to, "verified");
        }
        other => panic!("期望 InvalidTransition, 实际: {other:?}"),
    }

    // 拒绝后无部分状态变更
    let reloaded = api.get_event(&event.event_id).unwrap();
    assert_eq!(reloaded.status, WasteEventStatus::Pending);
    assert!(reloaded.action_taken.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_flow_and_immutability() {
    let (_temp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.waste_event_api.clone();

    let event = api.submit_event(submit_request()).unwrap();
    api.analyze_event(&event.event_id).await.unwrap();

    let verified = api
        .verify_event(&event.event_id, verify_request("process_deviation"))
        .unwrap();
    assert_eq!(verified.status, WasteEventStatus::Verified);
    assert_eq!(verified.action_taken.as_deref(), Some("安排复训并调整流程"));

    // 已核实事件再核实 → InvalidTransition (核实记录不可变更)
    let err = api.verify_event(&event.event_id, verify_request("staff_error")).unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));

    // 已核实事件可以关闭
    let closed = api.close_event(&event.event_id, None).unwrap();
    assert_eq!(closed.status, WasteEventStatus::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_rejects_invalid_dimension() {
    let (_temp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.waste_event_api.clone();

    let event = api.submit_event(submit_request()).unwrap();
    api.analyze_event(&event.event_id).await.unwrap();

    // 未知维度与 unknown 本身都不可作为核实结论
    for bad in ["外星人", "unknown", ""] {
        let err = api.verify_event(&event.event_id, verify_request(bad)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)), "核实根因 {bad:?} 应被拒绝");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_is_idempotent_from_any_state() {
    let (_temp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.waste_event_api.clone();

    // pending → closed (跳过核实)
    let a = api.submit_event(submit_request()).unwrap();
    let closed = api.close_event(&a.event_id, Some("直接报废")).unwrap();
    assert_eq!(closed.status, WasteEventStatus::Closed);
    assert_eq!(closed.action_taken.as_deref(), Some("直接报废"));

    // closed → closed: 幂等无操作,不是错误
    let again = api.close_event(&a.event_id, None).unwrap();
    assert_eq!(again.status, WasteEventStatus::Closed);

    // analyzed → closed
    let b = api.submit_event(submit_request()).unwrap();
    api.analyze_event(&b.event_id).await.unwrap();
    assert_eq!(
        api.close_event(&b.event_id, None).unwrap().status,
        WasteEventStatus::Closed
    );

    // closed 之后分析被拒绝
    let err = api.analyze_event(&b.event_id).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidTransition { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_filters_and_status_visibility() {
    let (_temp, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.waste_event_api.clone();

    let a = api.submit_event(submit_request()).unwrap();
    let _b = api.submit_event(submit_request()).unwrap();
    api.analyze_event(&a.event_id).await.unwrap();

    let pending = api.list_store_events("S001", Some("pending"), None, Some(7)).unwrap();
    assert_eq!(pending.len(), 1);
    // "尚无结论" 与 "已分析" 可区分: pending 事件结论字段为空
    assert!(pending[0].root_cause.is_none());
    assert!(pending[0].confidence.is_none());

    let analyzed = api.list_store_events("S001", Some("analyzed"), None, None).unwrap();
    assert_eq!(analyzed.len(), 1);
    assert!(analyzed[0].confidence.is_some());

    // 非法过滤条件报 InvalidInput
    assert!(matches!(
        api.list_store_events("S001", Some("破损状态"), None, None),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        api.list_store_events("S001", None, Some("不存在类型"), None),
        Err(ApiError::InvalidInput(_))
    ));
}
