// ==========================================
// 损耗根因推理引擎 - 事件生命周期状态机
// ==========================================
// 状态: pending → analyzing → analyzed → verified → closed
// 附加边: analyzed → analyzing (重新分析), 任意非 closed → closed
// 红线: 每次转换临写前读当前状态 (CAS),陈旧写入一律拒绝
// 红线: close 对已关闭事件是幂等无操作,不是错误
// ==========================================

use crate::domain::types::WasteEventStatus;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::single_flight::{AnalysisLockArena, AnalysisPermit};
use crate::repository::error::RepositoryError;
use crate::repository::waste_event_repo::WasteEventRepository;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 生命周期转换规则 (纯函数,穷尽匹配)
pub fn can_transition(from: WasteEventStatus, to: WasteEventStatus) -> bool {
    use WasteEventStatus::*;
    match (from, to) {
        (Pending, Analyzing) => true,
        (Analyzed, Analyzing) => true, // 重新分析 (新证据到达)
        (Analyzing, Analyzed) => true,
        (Analyzed, Verified) => true,
        // 任意非 closed → closed (跳过核实直接关闭)
        (Pending, Closed) | (Analyzing, Closed) | (Analyzed, Closed) | (Verified, Closed) => true,
        _ => false,
    }
}

// ==========================================
// WasteEventStateMachine - 生命周期状态机
// ==========================================
pub struct WasteEventStateMachine {
    repo: Arc<WasteEventRepository>,
    arena: AnalysisLockArena,
}

impl WasteEventStateMachine {
    pub fn new(repo: Arc<WasteEventRepository>, arena: AnalysisLockArena) -> Self {
        Self { repo, arena }
    }

    pub fn arena(&self) -> &AnalysisLockArena {
        &self.arena
    }

    /// 进入分析态 (单飞 + CAS 双重防护)
    ///
    /// # 返回
    /// - Ok((permit, prior)): 许可 + 进入前状态 (取消回滚用)
    /// - Err(ConcurrentAnalysisInProgress): 已有分析在途 (busy,可重试)
    /// - Err(InvalidTransition): verified/closed 状态不可分析
    pub fn begin_analysis(
        &self,
        event_id: &str,
    ) -> EngineResult<(AnalysisPermit, WasteEventStatus)> {
        // 第一重: 进程内单飞锁
        let permit = self.arena.try_acquire(event_id).ok_or_else(|| {
            EngineError::ConcurrentAnalysisInProgress { event_id: event_id.to_string() }
        })?;

        let prior = self
            .repo
            .find_status(event_id)?
            .ok_or_else(|| EngineError::EventNotFound { event_id: event_id.to_string() })?;

        match prior {
            WasteEventStatus::Pending | WasteEventStatus::Analyzed => {}
            // 持久态已是 analyzing (如跨实例部署下他方在途)
            WasteEventStatus::Analyzing => {
                return Err(EngineError::ConcurrentAnalysisInProgress {
                    event_id: event_id.to_string(),
                });
            }
            other => {
                return Err(EngineError::InvalidTransition {
                    from: other.as_str().to_string(),
                    to: WasteEventStatus::Analyzing.as_str().to_string(),
                });
            }
        }

        // 第二重: 持久态 CAS (读后写之间他方抢先则拒绝)
        match self.repo.transition_status(event_id, prior, WasteEventStatus::Analyzing) {
            Ok(()) => {
                info!(event_id, prior = %prior, "事件进入分析态");
                Ok((permit, prior))
            }
            Err(RepositoryError::StatusConflict { actual, .. }) => {
                if actual == WasteEventStatus::Analyzing.as_str() {
                    Err(EngineError::ConcurrentAnalysisInProgress {
                        event_id: event_id.to_string(),
                    })
                } else {
                    Err(EngineError::InvalidTransition {
                        from: actual,
                        to: WasteEventStatus::Analyzing.as_str().to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 取消/失败回滚: analyzing → 进入前状态
    ///
    /// 竞合关闭已把事件置为 closed 时,回滚 CAS 失败是预期情况,只记日志
    pub fn rollback_analysis(&self, event_id: &str, prior: WasteEventStatus) {
        match self
            .repo
            .transition_status(event_id, WasteEventStatus::Analyzing, prior)
        {
            Ok(()) => debug!(event_id, prior = %prior, "分析回滚,恢复进入前状态"),
            Err(RepositoryError::StatusConflict { actual, .. }) => {
                debug!(event_id, actual = %actual, "回滚时状态已被竞合操作变更,保持现状")
            }
            Err(e) => warn!(event_id, error = %e, "分析回滚失败"),
        }
    }

    /// 核实转换: analyzed → verified (CAS)
    pub fn mark_verified(&self, event_id: &str) -> EngineResult<()> {
        match self.repo.transition_status(
            event_id,
            WasteEventStatus::Analyzed,
            WasteEventStatus::Verified,
        ) {
            Ok(()) => {
                info!(event_id, "事件已人工核实");
                Ok(())
            }
            Err(RepositoryError::StatusConflict { actual, .. }) => {
                Err(EngineError::InvalidTransition {
                    from: actual,
                    to: WasteEventStatus::Verified.as_str().to_string(),
                })
            }
            Err(RepositoryError::NotFound { id, .. }) => {
                Err(EngineError::EventNotFound { event_id: id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 关闭事件 (任意非 closed → closed,幂等)
    ///
    /// 分析在途时先置取消标志,采集器观察后停止,不提交部分评分
    pub fn close(&self, event_id: &str) -> EngineResult<WasteEventStatus> {
        // CAS 竞合下至多重读一次 (关闭对任意非终态总是合法)
        for _attempt in 0..2 {
            let current = self
                .repo
                .find_status(event_id)?
                .ok_or_else(|| EngineError::EventNotFound { event_id: event_id.to_string() })?;

            if current == WasteEventStatus::Closed {
                debug!(event_id, "事件已关闭,幂等无操作");
                return Ok(WasteEventStatus::Closed);
            }

            if current == WasteEventStatus::Analyzing {
                // 通知在途分析停止
                self.arena.cancel(event_id);
            }

            match self
                .repo
                .transition_status(event_id, current, WasteEventStatus::Closed)
            {
                Ok(()) => {
                    info!(event_id, from = %current, "事件已关闭");
                    return Ok(WasteEventStatus::Closed);
                }
                Err(RepositoryError::StatusConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::Other(anyhow::anyhow!(
            "关闭事件 {} 时状态持续竞合",
            event_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WasteEventType;
    use crate::domain::waste_event::WasteEvent;
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (WasteEventStateMachine, Arc<WasteEventRepository>, String) {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let repo = Arc::new(WasteEventRepository::from_connection(conn).unwrap());
        let event = WasteEvent::new(
            "T001",
            "S001",
            WasteEventType::CookingLoss,
            "ING-1",
            5.0,
            "kg",
            Utc::now(),
        );
        repo.insert(&event).unwrap();
        let machine = WasteEventStateMachine::new(repo.clone(), AnalysisLockArena::new());
        (machine, repo, event.event_id)
    }

    #[test]
    fn test_transition_table() {
        use WasteEventStatus::*;
        assert!(can_transition(Pending, Analyzing));
        assert!(can_transition(Analyzed, Analyzing));
        assert!(can_transition(Analyzing, Analyzed));
        assert!(can_transition(Analyzed, Verified));
        assert!(can_transition(Pending, Closed));
        assert!(can_transition(Analyzed, Closed));
        assert!(can_transition(Verified, Closed));

        assert!(!can_transition(Pending, Verified));
        assert!(!can_transition(Pending, Analyzed));
        assert!(!can_transition(Verified, Analyzing));
        assert!(!can_transition(Closed, Analyzing));
        assert!(!can_transition(Closed, Closed)); // 幂等由 close() 处理,不是合法"转换"
    }

    #[test]
    fn test_begin_analysis_single_flight() {
        let (machine, _repo, event_id) = setup();

        let (permit, prior) = machine.begin_analysis(&event_id).unwrap();
        assert_eq!(prior, WasteEventStatus::Pending);

        let err = machine.begin_analysis(&event_id).unwrap_err();
        assert!(matches!(err, EngineError::ConcurrentAnalysisInProgress { .. }));

        drop(permit);
        // 锁已释放,但持久态仍是 analyzing → 仍然 busy (跨实例语义)
        let err = machine.begin_analysis(&event_id).unwrap_err();
        assert!(matches!(err, EngineError::ConcurrentAnalysisInProgress { .. }));
    }

    #[test]
    fn test_verify_requires_analyzed() {
        let (machine, _repo, event_id) = setup();

        let err = machine.mark_verified(&event_id).unwrap_err();
        match err {
            EngineError::InvalidTransition { from, to } => {
                assert_eq!(from, "pending");
                assert_eq!(to, "verified");
            }
            other => panic!("期望 InvalidTransition, 实际: {other:?}"),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let (machine, _repo, event_id) = setup();

        assert_eq!(machine.close(&event_id).unwrap(), WasteEventStatus::Closed);
        // 再次关闭: 幂等无操作
        assert_eq!(machine.close(&event_id).unwrap(), WasteEventStatus::Closed);
    }

    #[test]
    fn test_close_cancels_in_flight_analysis() {
        let (machine, _repo, event_id) = setup();

        let (permit, _prior) = machine.begin_analysis(&event_id).unwrap();
        assert!(!permit.is_cancelled());

        machine.close(&event_id).unwrap();
        assert!(permit.is_cancelled());
    }

    #[test]
    fn test_reanalysis_from_analyzed() {
        let (machine, repo, event_id) = setup();

        {
            let (_permit, _prior) = machine.begin_analysis(&event_id).unwrap();
            repo.transition_status(&event_id, WasteEventStatus::Analyzing, WasteEventStatus::Analyzed)
                .unwrap();
        }

        // analyzed → analyzing 重新分析
        let (_permit, prior) = machine.begin_analysis(&event_id).unwrap();
        assert_eq!(prior, WasteEventStatus::Analyzed);
    }
}
