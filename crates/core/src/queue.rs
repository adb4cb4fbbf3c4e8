//! Department waiting queues and dispatch.
//!
//! Each open assessment owns exactly one [`QueueEntry`]. Waiting entries are held in a
//! per-department sorted index keyed by `(level, enqueue_time, priority, sequence)`, so the
//! dispatch order always reflects the current field values and there is no stored rank to keep
//! in sync.
//!
//! [`QueueScheduler::call_next`] claims the head of that index inside a store transaction. Two
//! dispatchers calling it at the same time are serialised by the store's write lock, so an entry
//! is handed out at most once.

use crate::assessment::{Assessment, AssessmentStatus};
use crate::context::RequestContext;
use crate::error::{TriageError, TriageResult};
use crate::store::{Changeset, StoreState};
use crate::Shared;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use triage_types::TriageLevel;
use triage_uuid::RecordId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Called,
    Completed,
}

/// Waiting-room slot for one open assessment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: RecordId,
    pub assessment_id: RecordId,
    pub patient_id: RecordId,
    pub department_id: RecordId,
    pub level: TriageLevel,
    pub priority: u32,
    pub status: QueueStatus,
    pub enqueue_time: DateTime<Utc>,
    pub called_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    /// Store-assigned; breaks ties between entries enqueued at the same instant.
    pub sequence: u64,
    pub requires_immediate_attention: bool,
}

impl QueueEntry {
    pub(crate) fn enqueue(assessment: &Assessment, sequence: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            assessment_id: assessment.id,
            patient_id: assessment.patient_id,
            department_id: assessment.department_id,
            level: assessment.level,
            priority: assessment.priority,
            status: QueueStatus::Waiting,
            enqueue_time: now,
            called_time: None,
            completed_time: None,
            sequence,
            requires_immediate_attention: assessment.evaluation.requires_immediate_attention,
        }
    }

    /// Copy of this entry carrying the assessment's current level, priority and flag.
    pub(crate) fn synced_with(&self, assessment: &Assessment) -> Self {
        Self {
            level: assessment.level,
            priority: assessment.priority,
            requires_immediate_attention: assessment.evaluation.requires_immediate_attention,
            ..self.clone()
        }
    }

    pub(crate) fn closed(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: QueueStatus::Completed,
            completed_time: Some(now),
            ..self.clone()
        }
    }

    /// Time spent waiting: up to the call if called, else up to `now`.
    pub fn wait(&self, now: DateTime<Utc>) -> Duration {
        let until = self.called_time.unwrap_or(now);
        until - self.enqueue_time
    }

    pub fn is_overdue(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Waiting && self.wait(now) > threshold
    }
}

/// Half-open reporting window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The UTC calendar day `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// A waiting entry decorated for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WaitingPatient {
    pub entry: QueueEntry,
    pub patient_name: Option<String>,
    pub chief_complaint: String,
    pub wait_minutes: i64,
    pub overdue: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueStats {
    pub department_id: RecordId,
    pub window: TimeWindow,
    pub total_waiting: usize,
    pub total_called: usize,
    pub total_completed: usize,
    /// Mean elapsed wait of entries still waiting.
    pub average_current_wait_minutes: Option<f64>,
    /// Mean enqueue-to-call time of entries called inside the window.
    pub average_wait_to_call_minutes: Option<f64>,
    pub overdue_count: usize,
}

pub(crate) fn minutes(d: Duration) -> f64 {
    d.num_seconds() as f64 / 60.0
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Per-department ordered view over waiting entries.
#[derive(Clone)]
pub struct QueueScheduler {
    shared: Shared,
}

impl QueueScheduler {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Claim the most urgent waiting entry of `department_id`.
    ///
    /// The entry moves Waiting → Called and its assessment moves Pending → InProgress, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::EmptyQueue`] immediately if nothing is waiting.
    pub fn call_next(
        &self,
        ctx: &RequestContext,
        department_id: RecordId,
    ) -> TriageResult<QueueEntry> {
        let _span = tracing::info_span!(
            "call_next",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            department_id = %department_id
        )
        .entered();
        let now = self.shared.clock.now();

        let called = self.shared.store.transact(|state| {
            let head = state
                .waiting_in(&department_id)
                .next()
                .ok_or(TriageError::EmptyQueue(department_id))?;

            let mut called = head.clone();
            called.status = QueueStatus::Called;
            called.called_time = Some(now);

            let mut changes = Changeset::default();
            if let Some(assessment) = state.assessment(&head.assessment_id) {
                if assessment.status == AssessmentStatus::Pending {
                    let mut started = assessment.next_version(ctx.caller_id(), now);
                    started.status = AssessmentStatus::InProgress;
                    changes.assessments.push(started);
                }
            }
            changes.queue_entries.push(called.clone());
            Ok((changes, called))
        })?;

        tracing::info!(
            "called queue entry {} (level {}) for assessment {}",
            called.id,
            called.level.ordinal(),
            called.assessment_id
        );
        Ok(called)
    }

    /// Finish a called entry, completing its assessment in the same step.
    ///
    /// # Errors
    ///
    /// - [`TriageError::NotFound`] if the entry does not exist.
    /// - [`TriageError::Conflict`] unless the entry is Called (or Waiting when the configuration
    ///   allows walk-away completion).
    pub fn complete(&self, ctx: &RequestContext, queue_id: RecordId) -> TriageResult<QueueEntry> {
        let _span = tracing::info_span!(
            "complete_queue_entry",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            queue_id = %queue_id
        )
        .entered();
        let now = self.shared.clock.now();
        let allow_waiting = self.shared.cfg.allow_waiting_completion();

        let completed = self.shared.store.transact(|state| {
            let entry = state
                .queue_entry(&queue_id)
                .ok_or_else(|| TriageError::not_found("queue entry", queue_id))?;

            match entry.status {
                QueueStatus::Called => {}
                QueueStatus::Waiting if allow_waiting => {}
                status => {
                    return Err(TriageError::Conflict(format!(
                        "queue entry {queue_id} is {status:?}, expected Called"
                    )))
                }
            }

            let assessment = state
                .assessment(&entry.assessment_id)
                .ok_or_else(|| TriageError::not_found("assessment", entry.assessment_id))?;
            if !assessment.is_open {
                return Err(TriageError::Conflict(format!(
                    "assessment {} is already {:?}",
                    assessment.id, assessment.status
                )));
            }

            let mut finished = assessment.next_version(ctx.caller_id(), now);
            finished.status = AssessmentStatus::Completed;
            finished.is_open = false;
            finished.triage_end_time = Some(now.max(assessment.triage_start_time));

            let closed = entry.closed(now);
            let changes = Changeset {
                assessments: vec![finished],
                queue_entries: vec![closed.clone()],
                ..Changeset::default()
            };
            Ok((changes, closed))
        })?;

        tracing::info!(
            "completed queue entry {} and assessment {}",
            completed.id,
            completed.assessment_id
        );
        Ok(completed)
    }

    /// Waiting entries of a department in dispatch order.
    pub fn waiting(&self, department_id: RecordId) -> TriageResult<Vec<WaitingPatient>> {
        let now = self.shared.clock.now();
        let cfg = &self.shared.cfg;
        let directory = &self.shared.directory;

        self.shared.store.read(|state| {
            state
                .waiting_in(&department_id)
                .map(|entry| {
                    let threshold = cfg.overdue_threshold(entry.level);
                    WaitingPatient {
                        patient_name: directory.full_name(&entry.patient_id),
                        chief_complaint: state
                            .assessment(&entry.assessment_id)
                            .map(|a| a.chief_complaint.to_string())
                            .unwrap_or_default(),
                        wait_minutes: entry.wait(now).num_minutes(),
                        overdue: entry.is_overdue(threshold, now),
                        entry: entry.clone(),
                    }
                })
                .collect()
        })
    }

    /// Counters for one department. `window` defaults to the current UTC day.
    pub fn stats(
        &self,
        department_id: RecordId,
        window: Option<TimeWindow>,
    ) -> TriageResult<QueueStats> {
        let now = self.shared.clock.now();
        let window = window.unwrap_or_else(|| TimeWindow::day(now.date_naive()));
        let cfg = &self.shared.cfg;

        self.shared.store.read(|state| {
            let entries: Vec<&QueueEntry> = state
                .queue_entries()
                .filter(|e| e.department_id == department_id)
                .collect();

            let waiting: Vec<&&QueueEntry> = entries
                .iter()
                .filter(|e| e.status == QueueStatus::Waiting)
                .collect();

            QueueStats {
                department_id,
                window,
                total_waiting: waiting.len(),
                total_called: entries
                    .iter()
                    .filter(|e| e.status == QueueStatus::Called)
                    .count(),
                total_completed: entries
                    .iter()
                    .filter(|e| e.status == QueueStatus::Completed)
                    .filter(|e| e.completed_time.is_some_and(|t| window.contains(t)))
                    .count(),
                average_current_wait_minutes: mean(waiting.iter().map(|e| minutes(e.wait(now)))),
                average_wait_to_call_minutes: mean(
                    entries
                        .iter()
                        .filter(|e| e.called_time.is_some_and(|t| window.contains(t)))
                        .map(|e| minutes(e.wait(now))),
                ),
                overdue_count: waiting
                    .iter()
                    .filter(|e| e.is_overdue(cfg.overdue_threshold(e.level), now))
                    .count(),
            }
        })
    }

    /// Rebuild the department's stored order from the persisted entry fields.
    ///
    /// Reads already reflect field edits; this exists for callers that cache a rendered list and
    /// want an explicit refresh point.
    pub fn reorder(
        &self,
        ctx: &RequestContext,
        department_id: RecordId,
    ) -> TriageResult<Vec<QueueEntry>> {
        let _span = tracing::info_span!(
            "reorder",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            department_id = %department_id
        )
        .entered();

        let ordered = self.shared.store.transact(|state| {
            let ordered = dispatch_order(state, department_id);
            let changes = Changeset {
                reindex: vec![department_id],
                ..Changeset::default()
            };
            Ok((changes, ordered))
        })?;

        tracing::info!(
            "reordered department {} ({} waiting)",
            department_id,
            ordered.len()
        );
        Ok(ordered)
    }
}

/// Waiting entries of a department sorted from the raw entry table, bypassing the index.
fn dispatch_order(state: &StoreState, department_id: RecordId) -> Vec<QueueEntry> {
    let mut waiting: Vec<QueueEntry> = state
        .queue_entries()
        .filter(|e| e.department_id == department_id && e.status == QueueStatus::Waiting)
        .cloned()
        .collect();
    waiting.sort_by_key(crate::store::queue_key);
    waiting
}

#[cfg(test)]
mod tests {
    use crate::test_support::{arrival, harness};
    use crate::{QueueStatus, TriageError};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Arc;
    use triage_types::TriageLevel;
    use triage_uuid::RecordId;

    #[test]
    fn test_more_urgent_level_is_called_first() {
        let h = harness();
        let dept = RecordId::new();

        let x = h.create(arrival(dept, TriageLevel::Emergent));
        h.clock.advance(Duration::minutes(1));
        let y = h.create(arrival(dept, TriageLevel::Resuscitation));

        let first = h.service.queue().call_next(&h.ctx, dept).unwrap();
        let second = h.service.queue().call_next(&h.ctx, dept).unwrap();

        assert_eq!(first.assessment_id, y.id);
        assert_eq!(second.assessment_id, x.id);
    }

    #[test]
    fn test_same_level_is_first_in_first_out() {
        let h = harness();
        let dept = RecordId::new();

        let x = h.create(arrival(dept, TriageLevel::Urgent));
        h.clock.advance(Duration::seconds(30));
        let y = h.create(arrival(dept, TriageLevel::Urgent));

        assert_eq!(
            h.service.queue().call_next(&h.ctx, dept).unwrap().assessment_id,
            x.id
        );
        assert_eq!(
            h.service.queue().call_next(&h.ctx, dept).unwrap().assessment_id,
            y.id
        );
    }

    #[test]
    fn test_same_instant_arrivals_keep_enqueue_order() {
        let h = harness();
        let dept = RecordId::new();

        let ids: Vec<RecordId> = (0..4)
            .map(|_| h.create(arrival(dept, TriageLevel::LessUrgent)).id)
            .collect();

        let called: Vec<RecordId> = (0..4)
            .map(|_| h.service.queue().call_next(&h.ctx, dept).unwrap().assessment_id)
            .collect();
        assert_eq!(called, ids);
    }

    #[test]
    fn test_never_returns_less_urgent_while_more_urgent_waits() {
        let h = harness();
        let dept = RecordId::new();
        let levels = [
            TriageLevel::NonUrgent,
            TriageLevel::Urgent,
            TriageLevel::Resuscitation,
            TriageLevel::LessUrgent,
            TriageLevel::Emergent,
            TriageLevel::Urgent,
        ];
        for level in levels {
            h.create(arrival(dept, level));
            h.clock.advance(Duration::seconds(10));
        }

        let mut previous = TriageLevel::Resuscitation;
        for _ in 0..levels.len() {
            let entry = h.service.queue().call_next(&h.ctx, dept).unwrap();
            assert!(entry.level >= previous);
            previous = entry.level;
        }
    }

    #[test]
    fn test_empty_department_fails_immediately() {
        let h = harness();
        let dept = RecordId::new();
        let other = RecordId::new();
        h.create(arrival(other, TriageLevel::Urgent));

        match h.service.queue().call_next(&h.ctx, dept) {
            Err(TriageError::EmptyQueue(id)) => assert_eq!(id, dept),
            other => panic!("expected EmptyQueue, got {other:?}"),
        }
    }

    #[test]
    fn test_call_next_starts_assessment_and_stamps_called_time() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::Urgent));
        h.clock.advance(Duration::minutes(7));

        let entry = h.service.queue().call_next(&h.ctx, dept).unwrap();
        assert_eq!(entry.status, QueueStatus::Called);
        assert_eq!(entry.called_time, Some(h.clock_now()));

        let assessment = h.service.lifecycle().get(created.id).unwrap();
        assert_eq!(assessment.status, crate::AssessmentStatus::InProgress);
        assert!(assessment.is_open);
    }

    #[test]
    fn test_concurrent_call_next_dispatches_each_entry_once() {
        let h = harness();
        let dept = RecordId::new();
        const N: usize = 32;
        for _ in 0..N {
            h.create(arrival(dept, TriageLevel::Urgent));
        }

        let service = Arc::new(h.service.clone());
        let claimed: Vec<RecordId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    let service = Arc::clone(&service);
                    let ctx = h.ctx.clone();
                    scope.spawn(move || service.queue().call_next(&ctx, dept).unwrap().id)
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let unique: HashSet<RecordId> = claimed.iter().copied().collect();
        assert_eq!(unique.len(), N);
        assert!(matches!(
            h.service.queue().call_next(&h.ctx, dept),
            Err(TriageError::EmptyQueue(_))
        ));
    }

    #[test]
    fn test_complete_requires_called_state() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::Urgent));
        let waiting = h.service.queue().waiting(dept).unwrap();
        let queue_id = waiting[0].entry.id;

        assert!(matches!(
            h.service.queue().complete(&h.ctx, queue_id),
            Err(TriageError::Conflict(_))
        ));

        h.service.queue().call_next(&h.ctx, dept).unwrap();
        let done = h.service.queue().complete(&h.ctx, queue_id).unwrap();
        assert_eq!(done.status, QueueStatus::Completed);

        let assessment = h.service.lifecycle().get(created.id).unwrap();
        assert_eq!(assessment.status, crate::AssessmentStatus::Completed);
        assert!(assessment.triage_end_time.is_some());

        assert!(matches!(
            h.service.queue().complete(&h.ctx, queue_id),
            Err(TriageError::Conflict(_))
        ));
    }

    #[test]
    fn test_walk_away_completion_when_configured() {
        let cfg = crate::TriageConfig::new(
            crate::constants::DEFAULT_OVERDUE_MINUTES,
            crate::HealthThresholds::default(),
            true,
        )
        .unwrap();
        let h = crate::test_support::harness_with(cfg);
        let dept = RecordId::new();
        h.create(arrival(dept, TriageLevel::NonUrgent));
        let queue_id = h.service.queue().waiting(dept).unwrap()[0].entry.id;

        let done = h.service.queue().complete(&h.ctx, queue_id).unwrap();
        assert_eq!(done.status, QueueStatus::Completed);
        assert!(done.called_time.is_none());
    }

    #[test]
    fn test_complete_unknown_entry_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.service.queue().complete(&h.ctx, RecordId::new()),
            Err(TriageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_waiting_view_flags_overdue_and_names_patients() {
        let h = harness();
        let dept = RecordId::new();
        let critical = h.create(arrival(dept, TriageLevel::Emergent));
        h.directory.insert(critical.patient_id, "Grace Hopper");
        h.create(arrival(dept, TriageLevel::NonUrgent));

        h.clock.advance(Duration::minutes(15));
        let waiting = h.service.queue().waiting(dept).unwrap();

        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].patient_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(waiting[0].wait_minutes, 15);
        assert!(waiting[0].overdue);
        assert!(!waiting[1].overdue);
    }

    #[test]
    fn test_stats_count_states_and_waits() {
        let h = harness();
        let dept = RecordId::new();
        for level in [TriageLevel::Emergent, TriageLevel::Urgent, TriageLevel::NonUrgent] {
            h.create(arrival(dept, level));
        }
        h.clock.advance(Duration::minutes(20));
        let called = h.service.queue().call_next(&h.ctx, dept).unwrap();
        h.service.queue().complete(&h.ctx, called.id).unwrap();
        h.service.queue().call_next(&h.ctx, dept).unwrap();

        let stats = h.service.queue().stats(dept, None).unwrap();
        assert_eq!(stats.total_waiting, 1);
        assert_eq!(stats.total_called, 1);
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.average_current_wait_minutes, Some(20.0));
        assert_eq!(stats.average_wait_to_call_minutes, Some(20.0));
        assert_eq!(stats.overdue_count, 0);
    }

    #[test]
    fn test_reorder_reflects_level_edits() {
        let h = harness();
        let dept = RecordId::new();
        let first = h.create(arrival(dept, TriageLevel::Urgent));
        h.clock.advance(Duration::minutes(1));
        let second = h.create(arrival(dept, TriageLevel::Urgent));

        h.service
            .lifecycle()
            .update(
                &h.ctx,
                second.id,
                crate::AssessmentUpdate {
                    level: Some(TriageLevel::Emergent),
                    ..Default::default()
                },
            )
            .unwrap();

        let ordered = h.service.queue().reorder(&h.ctx, dept).unwrap();
        let order: Vec<RecordId> = ordered.iter().map(|e| e.assessment_id).collect();
        assert_eq!(order, vec![second.id, first.id]);

        let waiting: Vec<RecordId> = h
            .service
            .queue()
            .waiting(dept)
            .unwrap()
            .iter()
            .map(|w| w.entry.assessment_id)
            .collect();
        assert_eq!(waiting, order);
    }
}
