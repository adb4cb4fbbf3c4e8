//! Read-only rollups: daily statistics, overdue sweep, active alerts and the system health signal.

use crate::assessment::AssessmentStatus;
use crate::config::TriageConfig;
use crate::queue::{mean, minutes, QueueEntry, QueueStatus, TimeWindow};
use crate::store::{queue_key, StoreState};
use crate::Shared;
use crate::error::TriageResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use triage_types::TriageLevel;
use triage_uuid::RecordId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelCount {
    pub level: TriageLevel,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: AssessmentStatus,
    pub count: usize,
}

/// Assessments that arrived on one UTC day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub department_id: Option<RecordId>,
    pub total_assessments: usize,
    pub by_level: Vec<LevelCount>,
    pub by_status: Vec<StatusCount>,
    /// Mean enqueue-to-call time over entries that have been called.
    pub average_wait_minutes: Option<f64>,
    /// Mean triage duration over completed assessments.
    pub average_assessment_minutes: Option<f64>,
    pub immediate_attention_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverdueEntry {
    pub entry: QueueEntry,
    pub wait_minutes: i64,
    pub threshold_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveAlert {
    pub entry: QueueEntry,
    pub wait_minutes: i64,
    pub overdue: bool,
    pub requires_immediate_attention: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SystemHealth {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub critical_waiting: usize,
    pub total_waiting: usize,
    pub average_wait_minutes: Option<f64>,
    pub active_alerts: usize,
    /// One line per breached threshold; empty when healthy.
    pub issues: Vec<String>,
}

#[derive(Clone)]
pub struct StatisticsAggregator {
    shared: Shared,
}

fn waiting_entries<'a>(
    state: &'a StoreState,
    department_id: Option<RecordId>,
) -> impl Iterator<Item = &'a QueueEntry> {
    state
        .queue_entries()
        .filter(|e| e.status == QueueStatus::Waiting)
        .filter(move |e| department_id.map_or(true, |d| e.department_id == d))
}

impl StatisticsAggregator {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    pub fn daily_stats(
        &self,
        date: NaiveDate,
        department_id: Option<RecordId>,
    ) -> TriageResult<DailyStats> {
        let window = TimeWindow::day(date);
        let now = self.shared.clock.now();

        let stats = self.shared.store.read(|state| {
            let assessments: Vec<_> = state
                .assessments()
                .filter(|a| window.contains(a.arrival_time))
                .filter(|a| department_id.map_or(true, |d| a.department_id == d))
                .collect();

            let by_level = TriageLevel::ALL
                .iter()
                .map(|&level| LevelCount {
                    level,
                    count: assessments.iter().filter(|a| a.level == level).count(),
                })
                .collect();
            let by_status = AssessmentStatus::ALL
                .iter()
                .map(|&status| StatusCount {
                    status,
                    count: assessments.iter().filter(|a| a.status == status).count(),
                })
                .collect();

            let average_wait_minutes = mean(
                assessments
                    .iter()
                    .filter_map(|a| state.queue_entry_for(&a.id))
                    .filter(|e| e.called_time.is_some())
                    .map(|e| minutes(e.wait(now))),
            );
            let average_assessment_minutes =
                mean(assessments.iter().filter_map(|a| a.duration()).map(minutes));

            DailyStats {
                date,
                department_id,
                total_assessments: assessments.len(),
                by_level,
                by_status,
                average_wait_minutes,
                average_assessment_minutes,
                immediate_attention_count: assessments
                    .iter()
                    .filter(|a| a.evaluation.requires_immediate_attention)
                    .count(),
            }
        })?;

        tracing::debug!(
            "daily stats for {}: {} assessments",
            date,
            stats.total_assessments
        );
        Ok(stats)
    }

    /// Waiting entries past their level's threshold, most urgent first. Only reads.
    pub fn scan_overdue(&self, department_id: Option<RecordId>) -> TriageResult<Vec<OverdueEntry>> {
        let now = self.shared.clock.now();
        let cfg = &self.shared.cfg;

        let mut overdue = self.shared.store.read(|state| {
            waiting_entries(state, department_id)
                .filter(|e| e.is_overdue(cfg.overdue_threshold(e.level), now))
                .map(|e| OverdueEntry {
                    entry: e.clone(),
                    wait_minutes: e.wait(now).num_minutes(),
                    threshold_minutes: cfg.overdue_minutes(e.level),
                })
                .collect::<Vec<_>>()
        })?;
        overdue.sort_by_key(|o| queue_key(&o.entry));

        tracing::debug!("{} overdue queue entries", overdue.len());
        Ok(overdue)
    }

    /// Waiting entries that are overdue or flagged for immediate attention.
    pub fn active_alerts(&self) -> TriageResult<Vec<ActiveAlert>> {
        let now = self.shared.clock.now();
        let cfg = &self.shared.cfg;

        self.shared.store.read(|state| alerts_in(state, cfg, now))
    }

    /// Health verdict; every figure comes from the same snapshot.
    pub fn system_health(&self) -> TriageResult<SystemHealth> {
        let now = self.shared.clock.now();
        let cfg = &self.shared.cfg;
        let limits = cfg.health().clone();

        let (critical_waiting, total_waiting, average_wait_minutes, active_alerts) =
            self.shared.store.read(|state| {
                let waiting: Vec<_> = waiting_entries(state, None).collect();
                (
                    waiting.iter().filter(|e| e.level.is_critical()).count(),
                    waiting.len(),
                    mean(waiting.iter().map(|e| minutes(e.wait(now)))),
                    alerts_in(state, cfg, now).len(),
                )
            })?;

        let mut issues = Vec::new();
        if critical_waiting > limits.max_critical_waiting {
            issues.push(format!(
                "{critical_waiting} critical patients waiting (limit {})",
                limits.max_critical_waiting
            ));
        }
        if let Some(avg) = average_wait_minutes.filter(|avg| *avg > limits.max_average_wait_minutes)
        {
            issues.push(format!(
                "average wait {avg:.1} min (limit {:.1})",
                limits.max_average_wait_minutes
            ));
        }
        if active_alerts > limits.max_active_alerts {
            issues.push(format!(
                "{active_alerts} active alerts (limit {})",
                limits.max_active_alerts
            ));
        }

        if !issues.is_empty() {
            tracing::warn!("system unhealthy: {}", issues.join("; "));
        }

        Ok(SystemHealth {
            healthy: issues.is_empty(),
            checked_at: now,
            critical_waiting,
            total_waiting,
            average_wait_minutes,
            active_alerts,
            issues,
        })
    }
}

fn alerts_in(state: &StoreState, cfg: &TriageConfig, now: DateTime<Utc>) -> Vec<ActiveAlert> {
    let mut alerts: Vec<_> = waiting_entries(state, None)
        .filter_map(|e| {
            let overdue = e.is_overdue(cfg.overdue_threshold(e.level), now);
            (overdue || e.requires_immediate_attention).then(|| ActiveAlert {
                entry: e.clone(),
                wait_minutes: e.wait(now).num_minutes(),
                overdue,
                requires_immediate_attention: e.requires_immediate_attention,
            })
        })
        .collect();
    alerts.sort_by_key(|a| queue_key(&a.entry));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{arrival, harness, harness_with};
    use crate::vitals::tests::normal_vitals;
    use crate::vitals::VitalSigns;
    use crate::{HealthThresholds, NewAssessment, TriageConfig};
    use chrono::Duration;

    #[test]
    fn test_daily_stats_counts_and_averages() {
        let h = harness();
        let dept = RecordId::new();
        let today = h.clock_now().date_naive();

        h.create(arrival(dept, TriageLevel::Emergent));
        h.create(NewAssessment {
            vitals: VitalSigns {
                oxygen_saturation: Some(86),
                ..normal_vitals()
            },
            ..arrival(dept, TriageLevel::Urgent)
        });
        h.create(arrival(RecordId::new(), TriageLevel::Urgent));

        h.clock.advance(Duration::minutes(10));
        let called = h.service.queue().call_next(&h.ctx, dept).unwrap();
        h.clock.advance(Duration::minutes(20));
        h.service.queue().complete(&h.ctx, called.id).unwrap();

        let stats = h.service.statistics().daily_stats(today, Some(dept)).unwrap();
        assert_eq!(stats.total_assessments, 2);
        assert_eq!(
            stats.by_level[1],
            LevelCount {
                level: TriageLevel::Emergent,
                count: 1
            }
        );
        assert_eq!(stats.by_level[2].count, 1);
        assert_eq!(stats.by_status[0].count, 1);
        assert_eq!(stats.by_status[2].count, 1);
        assert_eq!(stats.average_wait_minutes, Some(10.0));
        assert_eq!(stats.average_assessment_minutes, Some(30.0));
        assert_eq!(stats.immediate_attention_count, 1);

        let all = h.service.statistics().daily_stats(today, None).unwrap();
        assert_eq!(all.total_assessments, 3);

        let yesterday = today.pred_opt().unwrap();
        let empty = h.service.statistics().daily_stats(yesterday, None).unwrap();
        assert_eq!(empty.total_assessments, 0);
        assert_eq!(empty.average_wait_minutes, None);
    }

    #[test]
    fn test_scan_overdue_uses_level_thresholds_and_only_reads() {
        let h = harness();
        let dept = RecordId::new();
        h.create(arrival(dept, TriageLevel::Resuscitation));
        h.create(arrival(dept, TriageLevel::Urgent));
        h.create(arrival(dept, TriageLevel::NonUrgent));

        h.clock.advance(Duration::minutes(31));
        let first = h.service.statistics().scan_overdue(Some(dept)).unwrap();
        let levels: Vec<TriageLevel> = first.iter().map(|o| o.entry.level).collect();
        assert_eq!(levels, vec![TriageLevel::Resuscitation, TriageLevel::Urgent]);
        assert_eq!(first[1].threshold_minutes, 30);
        assert_eq!(first[1].wait_minutes, 31);

        let second = h.service.statistics().scan_overdue(Some(dept)).unwrap();
        assert_eq!(first, second);
        assert!(h
            .service
            .statistics()
            .scan_overdue(Some(RecordId::new()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_active_alerts_include_flagged_entries() {
        let h = harness();
        let dept = RecordId::new();
        h.create(NewAssessment {
            vitals: VitalSigns {
                respiratory_rate: Some(34),
                ..normal_vitals()
            },
            ..arrival(dept, TriageLevel::LessUrgent)
        });
        h.create(arrival(dept, TriageLevel::LessUrgent));

        let alerts = h.service.statistics().active_alerts().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].requires_immediate_attention);
        assert!(!alerts[0].overdue);
    }

    #[test]
    fn test_health_is_healthy_when_quiet() {
        let h = harness();
        h.create(arrival(RecordId::new(), TriageLevel::NonUrgent));
        let health = h.service.statistics().system_health().unwrap();
        assert!(health.healthy);
        assert!(health.issues.is_empty());
        assert_eq!(health.total_waiting, 1);
    }

    #[test]
    fn test_health_flags_each_breached_threshold() {
        let cfg = TriageConfig::new(
            crate::constants::DEFAULT_OVERDUE_MINUTES,
            HealthThresholds {
                max_critical_waiting: 1,
                max_average_wait_minutes: 15.0,
                max_active_alerts: 1,
            },
            false,
        )
        .unwrap();
        let h = harness_with(cfg);
        let dept = RecordId::new();
        h.create(arrival(dept, TriageLevel::Resuscitation));
        h.create(arrival(dept, TriageLevel::Emergent));

        h.clock.advance(Duration::minutes(20));
        let health = h.service.statistics().system_health().unwrap();

        assert!(!health.healthy);
        assert_eq!(health.critical_waiting, 2);
        assert_eq!(health.active_alerts, 2);
        assert_eq!(health.average_wait_minutes, Some(20.0));
        assert_eq!(health.issues.len(), 3);
    }

    #[test]
    fn test_health_figures_agree_while_queue_drains() {
        const PATIENTS: usize = 40;
        let h = harness();
        let dept = RecordId::new();
        for _ in 0..PATIENTS {
            h.create(NewAssessment {
                vitals: VitalSigns {
                    heart_rate: Some(135),
                    ..normal_vitals()
                },
                ..arrival(dept, TriageLevel::Urgent)
            });
        }

        std::thread::scope(|scope| {
            let service = h.service.clone();
            let ctx = h.ctx.clone();
            scope.spawn(move || {
                for _ in 0..PATIENTS {
                    service.queue().call_next(&ctx, dept).unwrap();
                }
            });

            for _ in 0..200 {
                let health = h.service.statistics().system_health().unwrap();
                assert_eq!(health.active_alerts, health.total_waiting);
                assert_eq!(health.critical_waiting, 0);
            }
        });

        let health = h.service.statistics().system_health().unwrap();
        assert_eq!(health.total_waiting, 0);
        assert_eq!(health.active_alerts, 0);
    }
}
