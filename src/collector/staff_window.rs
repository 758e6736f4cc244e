// ==========================================
// 损耗根因推理引擎 - 时间窗口人员采集器
// ==========================================
// 规则: 多人当班 → 每名候选人一条记录,strength = 历史损耗事件率
// 规则: 单人当班 → ref_id 唯一归责,strength = 基线 + 事件率 × (1 - 基线)
//       (在基线之上随历史率单调上升,有界 [基线, 1.0])
// ==========================================

use crate::collector::sources::ShiftRosterSource;
use crate::collector::{CollectContext, CollectorResult, EvidenceCollector};
use crate::domain::evidence::{EvidenceOutcome, EvidencePayload, EvidenceRecord};
use crate::domain::types::EvidenceKind;
use async_trait::async_trait;
use std::sync::Arc;

// ==========================================
// StaffWindowCollector - 时间窗口人员采集器
// ==========================================
pub struct StaffWindowCollector {
    source: Arc<dyn ShiftRosterSource>,
    /// 单人在岗基线强度 (默认 0.6)
    presence_baseline: f64,
}

impl StaffWindowCollector {
    pub fn new(source: Arc<dyn ShiftRosterSource>, presence_baseline: f64) -> Self {
        Self { source, presence_baseline }
    }

    /// 单人归责强度: baseline + rate × (1 - baseline)
    fn sole_strength(&self, incident_rate: f64) -> f64 {
        let b = self.presence_baseline.clamp(0.0, 1.0);
        b + incident_rate.clamp(0.0, 1.0) * (1.0 - b)
    }
}

#[async_trait]
impl EvidenceCollector for StaffWindowCollector {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::TimeWindowStaff
    }

    async fn collect(&self, ctx: &CollectContext) -> CollectorResult<EvidenceOutcome> {
        ctx.check_cancelled()?;

        let shifts = self
            .source
            .staff_on_shift(&ctx.store_id, ctx.window_start(), ctx.window_end())
            .await?;

        ctx.check_cancelled()?;

        if shifts.is_empty() {
            tracing::debug!(
                event_id = %ctx.event_id,
                store_id = %ctx.store_id,
                "窗口内无在岗人员记录,人员证据 Absent"
            );
            return Ok(EvidenceOutcome::Absent);
        }

        let on_duty_count = shifts.len();
        let sole = on_duty_count == 1;
        let mut records = Vec::with_capacity(on_duty_count);

        for shift in shifts {
            ctx.check_cancelled()?;
            let rate = self
                .source
                .incident_rate(&shift.staff_id)
                .await?
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);

            let strength = if sole { self.sole_strength(rate) } else { rate };
            let summary = if sole {
                format!("窗口内唯一在岗人员 {},历史事件率 {:.2}", shift.staff_id, rate)
            } else {
                format!(
                    "窗口内在岗人员 {} (共 {} 人),历史事件率 {:.2}",
                    shift.staff_id, on_duty_count, rate
                )
            };

            records.push(EvidenceRecord::new(
                EvidenceKind::TimeWindowStaff,
                strength,
                Some(shift.staff_id.clone()),
                summary,
                EvidencePayload::StaffWindow {
                    staff_id: shift.staff_id,
                    station: shift.station,
                    on_duty_count,
                    incident_rate: rate,
                    sole_on_shift: sole,
                },
            ));
        }

        Ok(EvidenceOutcome::Found(records))
    }
}
