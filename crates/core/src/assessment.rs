//! Assessment record: one triage episode for one patient visit.

use crate::vitals::{VitalSigns, VitalsEvaluation};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use triage_types::{NonEmptyText, TriageLevel};
use triage_uuid::RecordId;

/// Lifecycle state. `Pending` and `InProgress` are open; the others are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl AssessmentStatus {
    pub const ALL: [AssessmentStatus; 4] = [
        AssessmentStatus::Pending,
        AssessmentStatus::InProgress,
        AssessmentStatus::Completed,
        AssessmentStatus::Cancelled,
    ];

    pub fn is_open(self) -> bool {
        matches!(self, AssessmentStatus::Pending | AssessmentStatus::InProgress)
    }
}

/// Critical-condition suspicions flagged at triage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlags {
    #[serde(default)]
    pub sepsis: bool,
    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub acute_coronary_syndrome: bool,
    #[serde(default)]
    pub trauma: bool,
}

impl RedFlags {
    pub fn any(&self) -> bool {
        self.sepsis || self.stroke || self.acute_coronary_syndrome || self.trauma
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationRequirement {
    Contact,
    Droplet,
    Airborne,
    Protective,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub department_id: RecordId,
    pub chief_complaint: NonEmptyText,
    pub level: TriageLevel,
    /// Tie-breaker within a level; lower is more urgent.
    pub priority: u32,
    pub status: AssessmentStatus,
    pub arrival_time: DateTime<Utc>,
    pub triage_start_time: DateTime<Utc>,
    pub triage_end_time: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub red_flags: RedFlags,
    pub isolation: Option<IsolationRequirement>,
    pub is_pregnant: bool,
    pub vitals: VitalSigns,
    pub evaluation: VitalsEvaluation,
    pub notes: Option<String>,
    pub recommended_department_id: Option<RecordId>,
    pub recommended_doctor_id: Option<RecordId>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; used for optimistic concurrency.
    pub version: u64,
}

impl Assessment {
    /// Elapsed triage time for completed assessments.
    pub fn duration(&self) -> Option<Duration> {
        self.triage_end_time.map(|end| end - self.triage_start_time)
    }

    /// Check the record-level invariants. Used by the store before accepting a write.
    pub(crate) fn invariants_hold(&self) -> bool {
        let end_matches_status =
            self.triage_end_time.is_some() == (self.status == AssessmentStatus::Completed);
        let ordered = self
            .triage_end_time
            .map_or(true, |end| self.triage_start_time <= end);
        end_matches_status && ordered && self.is_open == self.status.is_open()
    }

    /// Returns a copy stamped for the next write.
    pub(crate) fn next_version(&self, caller_id: &str, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.updated_by = caller_id.to_string();
        next.updated_at = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        assert!(AssessmentStatus::Pending.is_open());
        assert!(AssessmentStatus::InProgress.is_open());
        assert!(!AssessmentStatus::Completed.is_open());
        assert!(!AssessmentStatus::Cancelled.is_open());
    }

    #[test]
    fn test_red_flags_any() {
        assert!(!RedFlags::default().any());
        let flags = RedFlags {
            stroke: true,
            ..RedFlags::default()
        };
        assert!(flags.any());
    }
}
