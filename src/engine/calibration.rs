// ==========================================
// 损耗根因推理引擎 - 核实校准环
// ==========================================
// 职责: 将人工核实结论回灌到标定权重
// 规则: 核实维度 +step,被引擎排在其前的维度 -step,其余不动
// 规则: 步长小且有界,权重夹在 [weight_min, weight_max],避免单次噪声震荡
// 红线: 本环是 calibration_weights 的唯一写者;
//       按租户桶串行化写入,同租户竞合不上抛 (CalibrationWriteConflict 内部消化)
// ==========================================

use crate::domain::calibration::CalibrationWeights;
use crate::domain::types::RootCauseDimension;
use crate::repository::calibration_repo::CalibrationRepository;
use crate::repository::error::RepositoryResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ==========================================
// CalibrationLoop - 核实校准环
// ==========================================
pub struct CalibrationLoop {
    repo: Arc<CalibrationRepository>,
    /// 租户级写锁桶 (跨租户核实互不争用)
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    step: f64,
    weight_min: f64,
    weight_max: f64,
    default_weight: f64,
}

impl CalibrationLoop {
    pub fn new(
        repo: Arc<CalibrationRepository>,
        step: f64,
        weight_min: f64,
        weight_max: f64,
        default_weight: f64,
    ) -> Self {
        Self {
            repo,
            tenant_locks: Mutex::new(HashMap::new()),
            step,
            weight_min,
            weight_max,
            default_weight,
        }
    }

    /// 取租户写锁桶 (惰性创建)
    fn tenant_bucket(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(tenant_id.to_string()).or_default().clone()
    }

    /// 应用一次人工核实结论
    ///
    /// # 参数
    /// - tenant_id: 租户
    /// - verified: 人工核实的根因维度
    /// - ranked_above: 引擎曾排在核实维度之前的维度 (权重下调对象)
    ///
    /// # 返回
    /// 调整后的权重表
    pub fn apply_verification(
        &self,
        tenant_id: &str,
        verified: RootCauseDimension,
        ranked_above: &[RootCauseDimension],
    ) -> RepositoryResult<CalibrationWeights> {
        if verified == RootCauseDimension::Unknown {
            // unknown 不是可标定的维度,跳过调整
            debug!(tenant_id, "核实结论为 unknown,跳过权重校准");
            return self.repo.load_or_default(tenant_id, self.default_weight);
        }

        let bucket = self.tenant_bucket(tenant_id);
        let _guard = bucket.lock().unwrap_or_else(|e| e.into_inner());

        // 读-改-写在租户桶锁内完成,同租户并发核实被串行化
        let mut weights = self.repo.load_or_default(tenant_id, self.default_weight)?;

        let current = weights.weight_for(verified, self.default_weight);
        let raised = (current + self.step).min(self.weight_max);
        weights.weights.insert(verified, raised);

        for &dim in ranked_above {
            if dim == verified || dim == RootCauseDimension::Unknown {
                continue;
            }
            let current = weights.weight_for(dim, self.default_weight);
            let lowered = (current - self.step).max(self.weight_min);
            weights.weights.insert(dim, lowered);
        }

        self.repo.save(&weights)?;

        info!(
            tenant_id,
            verified = %verified,
            demoted = ranked_above.len(),
            "标定权重已按核实结论调整"
        );
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> CalibrationLoop {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let repo = Arc::new(CalibrationRepository::from_connection(conn).unwrap());
        CalibrationLoop::new(repo, 0.02, 0.1, 1.0, 0.5)
    }

    #[test]
    fn test_verified_raised_ranked_above_lowered() {
        let looped = setup();

        // 引擎曾把 supply_chain 排在 staff_error 之前,人工核实为 staff_error
        let weights = looped
            .apply_verification(
                "T001",
                RootCauseDimension::StaffError,
                &[RootCauseDimension::SupplyChain],
            )
            .unwrap();

        assert!((weights.weight_for(RootCauseDimension::StaffError, 0.5) - 0.52).abs() < 1e-9);
        assert!((weights.weight_for(RootCauseDimension::SupplyChain, 0.5) - 0.48).abs() < 1e-9);
        // 未涉及的维度不动
        assert!((weights.weight_for(RootCauseDimension::FoodQuality, 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weights_clamped_to_bounds() {
        let looped = setup();

        // 反复核实同一维度,权重必须停在上限;被降维度停在下限
        for _ in 0..60 {
            looped
                .apply_verification(
                    "T001",
                    RootCauseDimension::StaffError,
                    &[RootCauseDimension::SupplyChain],
                )
                .unwrap();
        }

        let weights = looped.repo.load("T001").unwrap().unwrap();
        assert!((weights.weight_for(RootCauseDimension::StaffError, 0.5) - 1.0).abs() < 1e-9);
        assert!((weights.weight_for(RootCauseDimension::SupplyChain, 0.5) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_verification_skips_adjustment() {
        let looped = setup();
        looped
            .apply_verification("T001", RootCauseDimension::Unknown, &[])
            .unwrap();
        // 未发生首次写入
        assert!(looped.repo.load("T001").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_same_tenant_serialized() {
        use std::thread;

        let looped = Arc::new(setup());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let looped = looped.clone();
            handles.push(thread::spawn(move || {
                looped
                    .apply_verification("T001", RootCauseDimension::StaffError, &[])
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // 10 次核实全部生效: 0.5 + 10×0.02 = 0.7 (无丢失更新)
        let weights = looped.repo.load("T001").unwrap().unwrap();
        assert!((weights.weight_for(RootCauseDimension::StaffError, 0.5) - 0.7).abs() < 1e-9);
    }
}
