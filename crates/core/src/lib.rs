//! # Triage Core
//!
//! Business logic for clinic triage: assessments, department waiting queues, reassessments,
//! protocol suggestion and operational statistics.
//!
//! The crate is transport-agnostic. Every mutating operation takes an explicit
//! [`RequestContext`]; time comes from a [`Clock`]; state lives in a [`Store`] whose
//! transactions make each operation atomic.
//!
//! **No API concerns**: authentication and HTTP servers belong in `api-rest` and `api-shared`.
//!
//! ```text
//! TriageService
//!   ├── lifecycle()      create / complete / cancel / update / get / list_open
//!   ├── reassessments()  create / list
//!   ├── queue()          call_next / complete / waiting / stats / reorder
//!   ├── protocols()      suggest / apply / catalogue
//!   └── statistics()     daily_stats / system_health / scan_overdue / active_alerts
//! ```

pub mod assessment;
pub mod clock;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod queue;
pub mod reassessment;
pub mod statistics;
pub mod store;
pub mod vitals;

pub use assessment::{Assessment, AssessmentStatus, IsolationRequirement, RedFlags};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HealthThresholds, TriageConfig};
pub use context::{NoPatientDirectory, PatientDirectory, RequestContext, StaticPatientDirectory};
pub use error::{ErrorKind, TriageError, TriageResult};
pub use lifecycle::{AssessmentLifecycle, AssessmentUpdate, NewAssessment};
pub use protocol::{
    NewProtocol, Protocol, ProtocolApplication, ProtocolMatcher, ProtocolSuggestion,
    ProtocolType, ProtocolUpdate,
};
pub use queue::{QueueEntry, QueueScheduler, QueueStats, QueueStatus, TimeWindow, WaitingPatient};
pub use reassessment::{NewReassessment, Reassessment, ReassessmentManager, ReassessmentReason};
pub use statistics::{
    ActiveAlert, DailyStats, LevelCount, OverdueEntry, StatisticsAggregator, StatusCount,
    SystemHealth,
};
pub use store::Store;
pub use vitals::{OxygenDevice, ThresholdBreach, VitalSigns, VitalsEvaluation};

pub use triage_types::{NonEmptyText, TriageLevel};
pub use triage_uuid::{RecordId, TimestampId};

use std::sync::Arc;

/// Collaborators every component needs.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) store: Arc<Store>,
    pub(crate) cfg: Arc<TriageConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) directory: Arc<dyn PatientDirectory>,
}

/// Entry point to the triage components.
///
/// Cloning is cheap; all clones share one store.
#[derive(Clone)]
pub struct TriageService {
    shared: Shared,
}

impl TriageService {
    /// Creates a service over `store` using the system clock and no patient directory.
    pub fn new(store: Arc<Store>, cfg: Arc<TriageConfig>) -> Self {
        Self {
            shared: Shared {
                store,
                cfg,
                clock: Arc::new(SystemClock),
                directory: Arc::new(NoPatientDirectory),
            },
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.shared.clock = clock;
        self
    }

    pub fn with_patient_directory(mut self, directory: Arc<dyn PatientDirectory>) -> Self {
        self.shared.directory = directory;
        self
    }

    pub fn config(&self) -> &TriageConfig {
        &self.shared.cfg
    }

    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    /// Current time according to the service clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.shared.clock.now()
    }

    pub fn lifecycle(&self) -> AssessmentLifecycle {
        AssessmentLifecycle::new(self.shared.clone())
    }

    pub fn reassessments(&self) -> ReassessmentManager {
        ReassessmentManager::new(self.shared.clone())
    }

    pub fn queue(&self) -> QueueScheduler {
        QueueScheduler::new(self.shared.clone())
    }

    pub fn protocols(&self) -> ProtocolMatcher {
        ProtocolMatcher::new(self.shared.clone())
    }

    pub fn statistics(&self) -> StatisticsAggregator {
        StatisticsAggregator::new(self.shared.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::vitals::tests::normal_vitals;
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) struct Harness {
        pub(crate) service: TriageService,
        pub(crate) clock: Arc<ManualClock>,
        pub(crate) directory: Arc<StaticPatientDirectory>,
        pub(crate) ctx: RequestContext,
    }

    impl Harness {
        pub(crate) fn create(&self, new: NewAssessment) -> Assessment {
            self.service.lifecycle().create(&self.ctx, new).unwrap()
        }

        pub(crate) fn clock_now(&self) -> DateTime<Utc> {
            self.clock.now()
        }
    }

    pub(crate) fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    pub(crate) fn harness_over(store: Arc<Store>, cfg: TriageConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(start_time()));
        let directory = Arc::new(StaticPatientDirectory::new());
        let service = TriageService::new(store, Arc::new(cfg))
            .with_clock(clock.clone())
            .with_patient_directory(directory.clone());
        Harness {
            service,
            clock,
            directory,
            ctx: RequestContext::new("nurse-triage-1").unwrap(),
        }
    }

    pub(crate) fn harness_with(cfg: TriageConfig) -> Harness {
        harness_over(Arc::new(Store::in_memory()), cfg)
    }

    pub(crate) fn harness() -> Harness {
        harness_with(TriageConfig::default())
    }

    pub(crate) fn arrival(department_id: RecordId, level: TriageLevel) -> NewAssessment {
        NewAssessment {
            patient_id: RecordId::new(),
            department_id,
            chief_complaint: "Abdominal pain".into(),
            level,
            priority: 0,
            vitals: normal_vitals(),
            red_flags: RedFlags::default(),
            isolation: None,
            is_pregnant: false,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{arrival, harness_over};
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_journal_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dept = RecordId::new();

        let (assessment, protocol, rows) = {
            let store = Arc::new(Store::open(temp_dir.path()).unwrap());
            assert!(store.is_persistent());
            let h = harness_over(store, TriageConfig::default());

            let a = h.create(arrival(dept, TriageLevel::Urgent));
            h.create(arrival(dept, TriageLevel::NonUrgent));
            h.clock.advance(Duration::minutes(2));
            let mut rows = Vec::new();
            for level in [TriageLevel::Emergent, TriageLevel::Resuscitation] {
                rows.push(
                    h.service
                        .reassessments()
                        .create(
                            &h.ctx,
                            a.id,
                            NewReassessment {
                                new_level: Some(level),
                                ..NewReassessment::new(ReassessmentReason::ClinicalChange)
                            },
                        )
                        .unwrap(),
                );
            }
            let p = h
                .service
                .protocols()
                .create(
                    &h.ctx,
                    NewProtocol {
                        name: "Abdominal pain pathway".into(),
                        description: None,
                        protocol_type: ProtocolType::General,
                        criteria: "abdominal pain".into(),
                        required_actions: None,
                        priority_weight: 1,
                    },
                )
                .unwrap();
            h.service.protocols().apply(&h.ctx, a.id, p.id).unwrap();
            (h.service.lifecycle().get(a.id).unwrap(), p, rows)
        };

        let store = Arc::new(Store::open(temp_dir.path()).unwrap());
        let h = harness_over(store, TriageConfig::default());

        assert_eq!(h.service.lifecycle().get(assessment.id).unwrap(), assessment);
        assert_eq!(h.service.reassessments().list(assessment.id).unwrap(), rows);
        assert_eq!(h.service.protocols().get(protocol.id).unwrap(), protocol);
        assert_eq!(
            h.service
                .protocols()
                .list_applications(assessment.id)
                .unwrap()
                .len(),
            1
        );

        let waiting = h.service.queue().waiting(dept).unwrap();
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].entry.assessment_id, assessment.id);
        assert_eq!(waiting[0].entry.level, TriageLevel::Resuscitation);

        let next = h.create(arrival(dept, TriageLevel::NonUrgent));
        let entries: Vec<u64> = h
            .service
            .queue()
            .waiting(dept)
            .unwrap()
            .iter()
            .map(|w| w.entry.sequence)
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            h.service
                .queue()
                .waiting(dept)
                .unwrap()
                .last()
                .map(|w| w.entry.assessment_id),
            Some(next.id)
        );
        assert!(entries.iter().all(|&s| s < 3));
    }

    #[test]
    fn test_failed_commit_leaves_records_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dept = RecordId::new();

        let created = {
            let store = Arc::new(Store::open(temp_dir.path()).unwrap());
            let h = harness_over(store, TriageConfig::default());
            let created = h.create(arrival(dept, TriageLevel::Urgent));

            let record_dir = created
                .id
                .sharded_dir(&temp_dir.path().join(constants::ASSESSMENTS_DIR_NAME));
            let entry_path = record_dir.join(constants::QUEUE_ENTRY_JSON_FILENAME);
            let entry_json = std::fs::read(&entry_path).unwrap();
            std::fs::remove_file(&entry_path).unwrap();
            std::fs::create_dir(&entry_path).unwrap();

            let err = h
                .service
                .lifecycle()
                .complete(&h.ctx, created.id, None, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Storage);

            let current = h.service.lifecycle().get(created.id).unwrap();
            assert_eq!(current, created);
            assert_eq!(h.service.queue().waiting(dept).unwrap().len(), 1);

            let leftovers: Vec<_> = std::fs::read_dir(&record_dir)
                .unwrap()
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                .collect();
            assert!(leftovers.is_empty());

            std::fs::remove_dir(&entry_path).unwrap();
            std::fs::write(&entry_path, entry_json).unwrap();
            created
        };

        let store = Arc::new(Store::open(temp_dir.path()).unwrap());
        let h = harness_over(store, TriageConfig::default());
        let reloaded = h.service.lifecycle().get(created.id).unwrap();
        assert_eq!(reloaded, created);
        assert!(reloaded.is_open);
        assert_eq!(h.service.queue().waiting(dept).unwrap().len(), 1);
    }

    #[test]
    fn test_data_dir_is_exclusive_while_open() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let first = Store::open(temp_dir.path()).unwrap();
        let second = Store::open(temp_dir.path());
        assert!(matches!(second, Err(TriageError::DataDirLocked(_))));
        assert_eq!(second.unwrap_err().kind(), ErrorKind::Storage);

        drop(first);
        assert!(Store::open(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_clones_share_one_store() {
        let store = Arc::new(Store::in_memory());
        let h = harness_over(store, TriageConfig::default());
        let other = h.service.clone();
        let created = h.create(arrival(RecordId::new(), TriageLevel::Urgent));
        assert_eq!(other.lifecycle().get(created.id).unwrap().id, created.id);
        assert!(!other.store().is_persistent());
    }
}
