//! Assessment state machine.
//!
//! ```text
//! Pending ──call_next──▶ InProgress ──complete──▶ Completed
//!    │                       │
//!    └───────cancel──────────┴──────cancel──────▶ Cancelled
//! ```
//!
//! Creating an assessment enqueues it; closing it (complete or cancel) closes its queue entry in
//! the same transaction. Closed assessments are never reopened or deleted.

use crate::assessment::{Assessment, AssessmentStatus, IsolationRequirement, RedFlags};
use crate::context::RequestContext;
use crate::error::{TriageError, TriageResult};
use crate::queue::{QueueEntry, QueueStatus};
use crate::store::{Changeset, StoreState};
use crate::vitals::{self, VitalSigns};
use crate::Shared;
use chrono::{DateTime, Utc};
use triage_types::{NonEmptyText, TriageLevel};
use triage_uuid::RecordId;

/// Input for [`AssessmentLifecycle::create`].
#[derive(Clone, Debug)]
pub struct NewAssessment {
    pub patient_id: RecordId,
    pub department_id: RecordId,
    pub chief_complaint: String,
    pub level: TriageLevel,
    pub priority: u32,
    pub vitals: VitalSigns,
    pub red_flags: RedFlags,
    pub isolation: Option<IsolationRequirement>,
    pub is_pregnant: bool,
    pub notes: Option<String>,
}

/// Administrative correction of an open assessment. `None` fields are left as they are.
#[derive(Clone, Debug, Default)]
pub struct AssessmentUpdate {
    pub level: Option<TriageLevel>,
    pub priority: Option<u32>,
    pub notes: Option<String>,
    /// Reject the update unless the stored version still equals this.
    pub expected_version: Option<u64>,
}

#[derive(Clone)]
pub struct AssessmentLifecycle {
    shared: Shared,
}

fn open_assessment<'a>(state: &'a StoreState, id: RecordId) -> TriageResult<&'a Assessment> {
    let assessment = state
        .assessment(&id)
        .ok_or_else(|| TriageError::not_found("assessment", id))?;
    if !assessment.is_open {
        tracing::warn!("assessment {} is already {:?}", id, assessment.status);
        return Err(TriageError::Conflict(format!(
            "assessment {id} is already {:?}",
            assessment.status
        )));
    }
    Ok(assessment)
}

/// The queue entry of `assessment_id`, closed, if it is still live.
fn close_entry(
    state: &StoreState,
    assessment_id: RecordId,
    now: DateTime<Utc>,
) -> Option<QueueEntry> {
    state
        .queue_entry_for(&assessment_id)
        .filter(|entry| entry.status != QueueStatus::Completed)
        .map(|entry| entry.closed(now))
}

impl AssessmentLifecycle {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Record a new arrival and enqueue it in its department.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::Validation`] for a blank chief complaint or out-of-range vitals.
    pub fn create(&self, ctx: &RequestContext, new: NewAssessment) -> TriageResult<Assessment> {
        let _span = tracing::info_span!(
            "create_assessment",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            department_id = %new.department_id
        )
        .entered();

        let chief_complaint = NonEmptyText::new(&new.chief_complaint)?;
        vitals::validate(&new.vitals)?;
        let evaluation = vitals::evaluate(&new.vitals);
        let now = self.shared.clock.now();

        let assessment = Assessment {
            id: RecordId::new(),
            patient_id: new.patient_id,
            department_id: new.department_id,
            chief_complaint,
            level: new.level,
            priority: new.priority,
            status: AssessmentStatus::Pending,
            arrival_time: now,
            triage_start_time: now,
            triage_end_time: None,
            is_open: true,
            red_flags: new.red_flags,
            isolation: new.isolation,
            is_pregnant: new.is_pregnant,
            vitals: new.vitals,
            evaluation,
            notes: new.notes,
            recommended_department_id: None,
            recommended_doctor_id: None,
            cancellation_reason: None,
            created_by: ctx.caller_id().to_string(),
            updated_by: ctx.caller_id().to_string(),
            updated_at: now,
            version: 1,
        };

        let assessment = self.shared.store.transact(|state| {
            let entry = QueueEntry::enqueue(&assessment, state.next_sequence(), now);
            let changes = Changeset {
                assessments: vec![assessment.clone()],
                queue_entries: vec![entry],
                ..Changeset::default()
            };
            Ok((changes, assessment))
        })?;

        if assessment.evaluation.requires_immediate_attention {
            tracing::warn!(
                "assessment {} requires immediate attention: {:?}",
                assessment.id,
                assessment.evaluation.failed_thresholds
            );
        }
        tracing::info!(
            "created assessment {} at level {}",
            assessment.id,
            assessment.level.ordinal()
        );
        Ok(assessment)
    }

    /// Close an open assessment as completed.
    ///
    /// # Errors
    ///
    /// - [`TriageError::NotFound`] if it does not exist.
    /// - [`TriageError::Conflict`] if it is already closed; the stored end time is kept.
    pub fn complete(
        &self,
        ctx: &RequestContext,
        id: RecordId,
        recommended_department_id: Option<RecordId>,
        recommended_doctor_id: Option<RecordId>,
    ) -> TriageResult<Assessment> {
        let _span = tracing::info_span!(
            "complete_assessment",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            assessment_id = %id
        )
        .entered();
        let now = self.shared.clock.now();

        let completed = self.shared.store.transact(|state| {
            let current = open_assessment(state, id)?;

            let mut next = current.next_version(ctx.caller_id(), now);
            next.status = AssessmentStatus::Completed;
            next.is_open = false;
            next.triage_end_time = Some(now.max(current.triage_start_time));
            next.recommended_department_id = recommended_department_id;
            next.recommended_doctor_id = recommended_doctor_id;

            let changes = Changeset {
                assessments: vec![next.clone()],
                queue_entries: close_entry(state, id, now).into_iter().collect(),
                ..Changeset::default()
            };
            Ok((changes, next))
        })?;

        tracing::info!("completed assessment {}", id);
        Ok(completed)
    }

    /// Close an open assessment as cancelled, recording why.
    pub fn cancel(
        &self,
        ctx: &RequestContext,
        id: RecordId,
        reason: &str,
    ) -> TriageResult<Assessment> {
        let _span = tracing::info_span!(
            "cancel_assessment",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            assessment_id = %id
        )
        .entered();
        let reason = NonEmptyText::new(reason)?;
        let now = self.shared.clock.now();

        let cancelled = self.shared.store.transact(|state| {
            let current = open_assessment(state, id)?;

            let mut next = current.next_version(ctx.caller_id(), now);
            next.status = AssessmentStatus::Cancelled;
            next.is_open = false;
            next.cancellation_reason = Some(reason.to_string());

            let changes = Changeset {
                assessments: vec![next.clone()],
                queue_entries: close_entry(state, id, now).into_iter().collect(),
                ..Changeset::default()
            };
            Ok((changes, next))
        })?;

        tracing::info!("cancelled assessment {}: {}", id, reason);
        Ok(cancelled)
    }

    /// Correct level, priority or notes of an open assessment without a reassessment row.
    ///
    /// # Errors
    ///
    /// [`TriageError::Conflict`] if the assessment is closed or `expected_version` is stale.
    pub fn update(
        &self,
        ctx: &RequestContext,
        id: RecordId,
        update: AssessmentUpdate,
    ) -> TriageResult<Assessment> {
        let _span = tracing::info_span!(
            "update_assessment",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            assessment_id = %id
        )
        .entered();
        let now = self.shared.clock.now();

        let updated = self.shared.store.transact(|state| {
            let current = open_assessment(state, id)?;
            if let Some(expected) = update.expected_version {
                if expected != current.version {
                    tracing::warn!(
                        "stale update of assessment {}: expected version {}, found {}",
                        id,
                        expected,
                        current.version
                    );
                    return Err(TriageError::Conflict(format!(
                        "assessment {id} is at version {}, not {expected}",
                        current.version
                    )));
                }
            }

            let mut next = current.next_version(ctx.caller_id(), now);
            if let Some(level) = update.level {
                next.level = level;
            }
            if let Some(priority) = update.priority {
                next.priority = priority;
            }
            if let Some(notes) = update.notes {
                next.notes = Some(notes);
            }

            let entry = state
                .queue_entry_for(&id)
                .filter(|e| e.status != QueueStatus::Completed)
                .map(|e| e.synced_with(&next));

            let changes = Changeset {
                assessments: vec![next.clone()],
                queue_entries: entry.into_iter().collect(),
                ..Changeset::default()
            };
            Ok((changes, next))
        })?;

        tracing::info!("updated assessment {} to version {}", id, updated.version);
        Ok(updated)
    }

    pub fn get(&self, id: RecordId) -> TriageResult<Assessment> {
        self.shared.store.read(|state| {
            state
                .assessment(&id)
                .cloned()
                .ok_or_else(|| TriageError::not_found("assessment", id))
        })?
    }

    /// Open assessments, oldest arrival first, optionally limited to one department.
    pub fn list_open(&self, department_id: Option<RecordId>) -> TriageResult<Vec<Assessment>> {
        let mut open = self.shared.store.read(|state| {
            state
                .assessments()
                .filter(|a| a.is_open)
                .filter(|a| department_id.map_or(true, |d| a.department_id == d))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        open.sort_by(|a, b| {
            a.arrival_time
                .cmp(&b.arrival_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        tracing::debug!("{} open assessments", open.len());
        Ok(open)
    }
}
