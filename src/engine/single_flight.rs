// ==========================================
// 损耗根因推理引擎 - 单飞锁竞技场
// ==========================================
// 红线: 按事件 ID 细粒度互斥,不用全局锁 (无关事件互不串行)
// 红线: 许可采用 RAII 释放,任何退出路径 (含 panic 展开) 都不遗留锁
// ==========================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ==========================================
// AnalysisLockArena - 分析锁竞技场
// ==========================================
/// 按事件 ID 的轻量锁集合
///
/// 表项存在 = 分析在途;表项携带取消标志,
/// 外部关闭事件时置位,采集器在检查点观察后停止
#[derive(Clone, Default)]
pub struct AnalysisLockArena {
    inner: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl AnalysisLockArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取事件的分析许可
    ///
    /// # 返回
    /// - Some(permit): 获取成功,持有期间该事件拒绝并发分析
    /// - None: 已有分析在途 (busy,调用方返回 ConcurrentAnalysisInProgress)
    pub fn try_acquire(&self, event_id: &str) -> Option<AnalysisPermit> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(event_id) {
            return None;
        }
        let cancel_flag = Arc::new(AtomicBool::new(false));
        map.insert(event_id.to_string(), cancel_flag.clone());
        Some(AnalysisPermit {
            arena: self.inner.clone(),
            event_id: event_id.to_string(),
            cancel_flag,
        })
    }

    /// 对在途分析置取消标志
    ///
    /// # 返回
    /// - true: 存在在途分析且已置位
    /// - false: 无在途分析 (无操作)
    pub fn cancel(&self, event_id: &str) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(event_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// 事件是否有分析在途
    pub fn is_in_flight(&self, event_id: &str) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.contains_key(event_id)
    }
}

// ==========================================
// AnalysisPermit - 分析许可 (RAII)
// ==========================================
#[derive(Debug)]
pub struct AnalysisPermit {
    arena: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    event_id: String,
    cancel_flag: Arc<AtomicBool>,
}

impl AnalysisPermit {
    /// 取消标志 (传入采集上下文)
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// 本次分析是否已被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }
}

impl Drop for AnalysisPermit {
    fn drop(&mut self) {
        let mut map = self.arena.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&self.event_id);
    }
}
