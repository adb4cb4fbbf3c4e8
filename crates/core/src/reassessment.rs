//! Follow-up observations on open assessments.
//!
//! Rows are appended to a per-assessment log and never edited. Their ids are time-prefixed and
//! generated strictly after the previous row's id, so the log is chronological by construction.

use crate::context::RequestContext;
use crate::error::{TriageError, TriageResult};
use crate::queue::QueueStatus;
use crate::store::Changeset;
use crate::vitals::{self, VitalSigns, VitalsEvaluation};
use crate::Shared;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_types::TriageLevel;
use triage_uuid::{RecordId, TimestampId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassessmentReason {
    Routine,
    ClinicalChange,
    ProtocolDriven,
    PatientRequest,
    StaffConcern,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reassessment {
    pub id: TimestampId,
    pub assessment_id: RecordId,
    /// Level before this row was recorded.
    pub previous_level: TriageLevel,
    pub new_level: Option<TriageLevel>,
    pub changes: Option<String>,
    pub actions: Option<String>,
    pub reason: ReassessmentReason,
    pub vitals: Option<VitalSigns>,
    pub evaluation: Option<VitalsEvaluation>,
    pub recorded_by: String,
}

impl Reassessment {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.id.timestamp()
    }
}

/// Input for [`ReassessmentManager::create`].
#[derive(Clone, Debug)]
pub struct NewReassessment {
    pub vitals: Option<VitalSigns>,
    pub new_level: Option<TriageLevel>,
    pub changes: Option<String>,
    pub actions: Option<String>,
    pub reason: ReassessmentReason,
}

impl NewReassessment {
    pub fn new(reason: ReassessmentReason) -> Self {
        Self {
            vitals: None,
            new_level: None,
            changes: None,
            actions: None,
            reason,
        }
    }
}

#[derive(Clone)]
pub struct ReassessmentManager {
    shared: Shared,
}

impl ReassessmentManager {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Append a reassessment, applying any level change to the assessment and its queue entry.
    ///
    /// Fresh vitals replace the assessment's current evaluation; the vitals captured at
    /// arrival are kept as recorded.
    ///
    /// # Errors
    ///
    /// - [`TriageError::Validation`] for out-of-range vitals.
    /// - [`TriageError::NotFound`] if the assessment does not exist.
    /// - [`TriageError::Conflict`] if the assessment is no longer open.
    pub fn create(
        &self,
        ctx: &RequestContext,
        assessment_id: RecordId,
        input: NewReassessment,
    ) -> TriageResult<Reassessment> {
        let _span = tracing::info_span!(
            "create_reassessment",
            request_id = %ctx.request_id(),
            caller_id = ctx.caller_id(),
            assessment_id = %assessment_id
        )
        .entered();

        if let Some(v) = &input.vitals {
            vitals::validate(v)?;
        }
        let evaluation = input.vitals.as_ref().map(vitals::evaluate);
        let now = self.shared.clock.now();

        let row = self.shared.store.transact(|state| {
            let assessment = state
                .assessment(&assessment_id)
                .ok_or_else(|| TriageError::not_found("assessment", assessment_id))?;
            if !assessment.is_open {
                tracing::warn!(
                    "rejected reassessment of closed assessment {}",
                    assessment_id
                );
                return Err(TriageError::Conflict(format!(
                    "assessment {assessment_id} is {:?}",
                    assessment.status
                )));
            }

            let last = state.reassessments(&assessment_id).last().map(|r| &r.id);
            let row = Reassessment {
                id: TimestampId::generate(now, last),
                assessment_id,
                previous_level: assessment.level,
                new_level: input.new_level,
                changes: input.changes.clone(),
                actions: input.actions.clone(),
                reason: input.reason,
                vitals: input.vitals.clone(),
                evaluation: evaluation.clone(),
                recorded_by: ctx.caller_id().to_string(),
            };

            let mut changes = Changeset {
                reassessments: vec![row.clone()],
                ..Changeset::default()
            };

            let level_changed = input.new_level.is_some_and(|l| l != assessment.level);
            let evaluation_changed = evaluation
                .as_ref()
                .is_some_and(|e| *e != assessment.evaluation);
            let current = if level_changed || evaluation_changed {
                let mut next = assessment.next_version(ctx.caller_id(), now);
                if let Some(level) = input.new_level {
                    next.level = level;
                }
                if let Some(eval) = &evaluation {
                    next.evaluation = eval.clone();
                }
                changes.assessments.push(next.clone());
                next
            } else {
                assessment.clone()
            };

            if let Some(entry) = state.queue_entry_for(&assessment_id) {
                if entry.status != QueueStatus::Completed {
                    let refreshed = entry.synced_with(&current);
                    if refreshed != *entry {
                        changes.queue_entries.push(refreshed);
                    }
                }
            }

            Ok((changes, row))
        })?;

        match row.new_level {
            Some(level) if level != row.previous_level => tracing::info!(
                "reassessment {} moved assessment {} from level {} to {}",
                row.id,
                assessment_id,
                row.previous_level.ordinal(),
                level.ordinal()
            ),
            _ => tracing::info!(
                "recorded reassessment {} for assessment {}",
                row.id,
                assessment_id
            ),
        }
        Ok(row)
    }

    /// Every reassessment of an assessment, oldest first.
    pub fn list(&self, assessment_id: RecordId) -> TriageResult<Vec<Reassessment>> {
        self.shared.store.read(|state| {
            if state.assessment(&assessment_id).is_none() {
                return Err(TriageError::not_found("assessment", assessment_id));
            }
            Ok(state.reassessments(&assessment_id).to_vec())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::AssessmentUpdate;
    use crate::test_support::{arrival, harness};
    use crate::vitals::tests::normal_vitals;
    use chrono::Duration;

    fn note(reason: ReassessmentReason, text: &str) -> NewReassessment {
        NewReassessment {
            changes: Some(text.into()),
            ..NewReassessment::new(reason)
        }
    }

    #[test]
    fn test_escalation_then_plain_reassessment_keeps_level() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::Urgent));

        let escalated = h
            .service
            .reassessments()
            .create(
                &h.ctx,
                created.id,
                NewReassessment {
                    new_level: Some(TriageLevel::Resuscitation),
                    ..NewReassessment::new(ReassessmentReason::ClinicalChange)
                },
            )
            .unwrap();
        assert_eq!(escalated.new_level, Some(TriageLevel::Resuscitation));
        assert_eq!(escalated.previous_level, TriageLevel::Urgent);

        let assessment = h.service.lifecycle().get(created.id).unwrap();
        assert_eq!(assessment.level, TriageLevel::Resuscitation);

        h.service
            .reassessments()
            .create(&h.ctx, created.id, note(ReassessmentReason::Routine, "stable"))
            .unwrap();
        let assessment = h.service.lifecycle().get(created.id).unwrap();
        assert_eq!(assessment.level, TriageLevel::Resuscitation);

        let waiting = h.service.queue().waiting(dept).unwrap();
        assert_eq!(waiting[0].entry.level, TriageLevel::Resuscitation);
    }

    #[test]
    fn test_de_escalation_is_allowed() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::Emergent));

        h.service
            .reassessments()
            .create(
                &h.ctx,
                created.id,
                NewReassessment {
                    new_level: Some(TriageLevel::LessUrgent),
                    ..NewReassessment::new(ReassessmentReason::ClinicalChange)
                },
            )
            .unwrap();
        assert_eq!(
            h.service.lifecycle().get(created.id).unwrap().level,
            TriageLevel::LessUrgent
        );
    }

    #[test]
    fn test_rows_are_chronological_and_unchanged() {
        let h = harness();
        let created = h.create(arrival(RecordId::new(), TriageLevel::Urgent));

        let mut recorded = Vec::new();
        for i in 0..5 {
            let row = h
                .service
                .reassessments()
                .create(
                    &h.ctx,
                    created.id,
                    note(ReassessmentReason::Routine, &format!("round {i}")),
                )
                .unwrap();
            recorded.push(row);
            let listed = h.service.reassessments().list(created.id).unwrap();
            assert_eq!(listed.len(), i + 1);
            assert_eq!(&listed[..], &recorded[..]);
        }

        let listed = h.service.reassessments().list(created.id).unwrap();
        assert!(listed.windows(2).all(|w| w[0].id < w[1].id));
        assert!(listed.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    }

    #[test]
    fn test_reassessing_closed_assessment_conflicts() {
        let h = harness();
        let created = h.create(arrival(RecordId::new(), TriageLevel::Urgent));
        h.service
            .lifecycle()
            .complete(&h.ctx, created.id, None, None)
            .unwrap();

        let result = h.service.reassessments().create(
            &h.ctx,
            created.id,
            note(ReassessmentReason::Routine, "too late"),
        );
        assert!(matches!(result, Err(TriageError::Conflict(_))));
        assert!(h.service.reassessments().list(created.id).unwrap().is_empty());
    }

    #[test]
    fn test_deteriorating_vitals_flag_queue_entry() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::LessUrgent));
        h.clock.advance(Duration::minutes(5));

        let row = h
            .service
            .reassessments()
            .create(
                &h.ctx,
                created.id,
                NewReassessment {
                    vitals: Some(VitalSigns {
                        heart_rate: Some(135),
                        ..normal_vitals()
                    }),
                    ..NewReassessment::new(ReassessmentReason::StaffConcern)
                },
            )
            .unwrap();

        assert!(row.evaluation.unwrap().requires_immediate_attention);
        let waiting = h.service.queue().waiting(dept).unwrap();
        assert!(waiting[0].entry.requires_immediate_attention);
        assert_eq!(waiting[0].entry.level, TriageLevel::LessUrgent);
    }

    #[test]
    fn test_reassessed_alert_survives_later_update() {
        let h = harness();
        let dept = RecordId::new();
        let created = h.create(arrival(dept, TriageLevel::LessUrgent));
        assert!(!created.evaluation.requires_immediate_attention);

        h.service
            .reassessments()
            .create(
                &h.ctx,
                created.id,
                NewReassessment {
                    vitals: Some(VitalSigns {
                        heart_rate: Some(135),
                        ..normal_vitals()
                    }),
                    ..NewReassessment::new(ReassessmentReason::StaffConcern)
                },
            )
            .unwrap();

        let reassessed = h.service.lifecycle().get(created.id).unwrap();
        assert!(reassessed.evaluation.requires_immediate_attention);
        assert_eq!(reassessed.version, created.version + 1);
        assert_eq!(reassessed.vitals, created.vitals);

        h.service
            .lifecycle()
            .update(
                &h.ctx,
                created.id,
                AssessmentUpdate {
                    notes: Some("typo fix".into()),
                    ..AssessmentUpdate::default()
                },
            )
            .unwrap();

        let alerts = h.service.statistics().active_alerts().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].requires_immediate_attention);
        let waiting = h.service.queue().waiting(dept).unwrap();
        assert!(waiting[0].entry.requires_immediate_attention);
        assert!(
            h.service
                .lifecycle()
                .get(created.id)
                .unwrap()
                .evaluation
                .requires_immediate_attention
        );
    }

    #[test]
    fn test_reassessments_racing_completion_never_land_after_close() {
        const WRITERS: usize = 8;
        const ATTEMPTS: usize = 25;

        let h = harness();
        let created = h.create(arrival(RecordId::new(), TriageLevel::Urgent));

        let outcomes: Vec<Vec<bool>> = std::thread::scope(|scope| {
            let writers: Vec<_> = (0..WRITERS)
                .map(|w| {
                    let service = h.service.clone();
                    let ctx = h.ctx.clone();
                    scope.spawn(move || {
                        (0..ATTEMPTS)
                            .map(|i| {
                                let text = format!("writer {w} round {i}");
                                match service.reassessments().create(
                                    &ctx,
                                    created.id,
                                    note(ReassessmentReason::Routine, &text),
                                ) {
                                    Ok(_) => true,
                                    Err(TriageError::Conflict(_)) => false,
                                    Err(e) => panic!("unexpected error: {e}"),
                                }
                            })
                            .collect::<Vec<bool>>()
                    })
                })
                .collect();

            let service = h.service.clone();
            let ctx = h.ctx.clone();
            let closer = scope.spawn(move || {
                std::thread::yield_now();
                service.lifecycle().complete(&ctx, created.id, None, None)
            });
            closer.join().unwrap().unwrap();

            writers
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        for accepted in &outcomes {
            let first_rejection = accepted.iter().position(|ok| !ok);
            if let Some(at) = first_rejection {
                assert!(accepted[at..].iter().all(|ok| !ok));
            }
        }

        let accepted = outcomes.iter().flatten().filter(|ok| **ok).count();
        let rows = h.service.reassessments().list(created.id).unwrap();
        assert_eq!(rows.len(), accepted);
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));

        let closed = h.service.lifecycle().get(created.id).unwrap();
        assert!(!closed.is_open);
        assert_eq!(closed.version, created.version + 1);
        assert!(matches!(
            h.service.reassessments().create(
                &h.ctx,
                created.id,
                note(ReassessmentReason::Routine, "after close"),
            ),
            Err(TriageError::Conflict(_))
        ));
        assert_eq!(h.service.reassessments().list(created.id).unwrap().len(), accepted);
    }

    #[test]
    fn test_invalid_vitals_rejected_before_write() {
        let h = harness();
        let created = h.create(arrival(RecordId::new(), TriageLevel::Urgent));

        let result = h.service.reassessments().create(
            &h.ctx,
            created.id,
            NewReassessment {
                vitals: Some(VitalSigns {
                    gcs_motor: Some(7),
                    ..normal_vitals()
                }),
                ..NewReassessment::new(ReassessmentReason::Routine)
            },
        );
        assert!(matches!(result, Err(TriageError::Validation(_))));
        assert!(h.service.reassessments().list(created.id).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_assessment_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.service.reassessments().list(RecordId::new()),
            Err(TriageError::NotFound { .. })
        ));
    }
}
