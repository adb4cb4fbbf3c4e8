//! In-memory record state and the changesets that mutate it.
//!
//! Writers never touch [`StoreState`] directly. A transaction body inspects the current state,
//! decides, and returns a [`Changeset`]; the store persists the changeset and then applies it
//! while still holding the write lock.

use crate::assessment::Assessment;
use crate::protocol::{Protocol, ProtocolApplication};
use crate::queue::{QueueEntry, QueueStatus};
use crate::reassessment::Reassessment;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use triage_types::TriageLevel;
use triage_uuid::RecordId;

/// Sort key of a waiting entry: most urgent level, then earliest arrival, then lower priority
/// number, then enqueue sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct QueueKey {
    level: TriageLevel,
    enqueue_time: DateTime<Utc>,
    priority: u32,
    sequence: u64,
    id: RecordId,
}

/// Dispatch-order key of an entry.
pub(crate) fn queue_key(entry: &QueueEntry) -> QueueKey {
    QueueKey::of(entry)
}

impl QueueKey {
    fn of(entry: &QueueEntry) -> Self {
        Self {
            level: entry.level,
            enqueue_time: entry.enqueue_time,
            priority: entry.priority,
            sequence: entry.sequence,
            id: entry.id,
        }
    }
}

/// Writes produced by one transaction.
#[derive(Debug, Default)]
pub struct Changeset {
    pub assessments: Vec<Assessment>,
    pub queue_entries: Vec<QueueEntry>,
    /// Appended, never replacing earlier rows.
    pub reassessments: Vec<Reassessment>,
    pub protocols: Vec<Protocol>,
    /// Appended, never replacing earlier rows.
    pub applications: Vec<ProtocolApplication>,
    /// Departments whose waiting index is rebuilt from the stored entries.
    pub reindex: Vec<RecordId>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
            && self.queue_entries.is_empty()
            && self.reassessments.is_empty()
            && self.protocols.is_empty()
            && self.applications.is_empty()
            && self.reindex.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct StoreState {
    assessments: HashMap<RecordId, Assessment>,
    queue: HashMap<RecordId, QueueEntry>,
    queue_by_assessment: HashMap<RecordId, RecordId>,
    waiting: HashMap<RecordId, BTreeSet<QueueKey>>,
    reassessments: HashMap<RecordId, Vec<Reassessment>>,
    protocols: HashMap<RecordId, Protocol>,
    applications: HashMap<RecordId, Vec<ProtocolApplication>>,
    next_sequence: u64,
}

impl StoreState {
    pub fn assessment(&self, id: &RecordId) -> Option<&Assessment> {
        self.assessments.get(id)
    }

    pub fn assessments(&self) -> impl Iterator<Item = &Assessment> {
        self.assessments.values()
    }

    pub fn queue_entry(&self, id: &RecordId) -> Option<&QueueEntry> {
        self.queue.get(id)
    }

    pub fn queue_entry_for(&self, assessment_id: &RecordId) -> Option<&QueueEntry> {
        self.queue_by_assessment
            .get(assessment_id)
            .and_then(|queue_id| self.queue.get(queue_id))
    }

    pub fn queue_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue.values()
    }

    /// Waiting entries of one department, in dispatch order.
    pub fn waiting_in(&self, department_id: &RecordId) -> impl Iterator<Item = &QueueEntry> {
        self.waiting
            .get(department_id)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|key| self.queue.get(&key.id))
    }

    /// Every department that currently has a waiting index.
    pub fn departments(&self) -> impl Iterator<Item = &RecordId> {
        self.waiting.keys()
    }

    pub fn reassessments(&self, assessment_id: &RecordId) -> &[Reassessment] {
        self.reassessments
            .get(assessment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn protocol(&self, id: &RecordId) -> Option<&Protocol> {
        self.protocols.get(id)
    }

    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.values()
    }

    pub fn applications(&self, assessment_id: &RecordId) -> &[ProtocolApplication] {
        self.applications
            .get(assessment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sequence number the next enqueued entry should carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub(crate) fn apply(&mut self, changes: Changeset) {
        for assessment in changes.assessments {
            self.assessments.insert(assessment.id, assessment);
        }

        for entry in changes.queue_entries {
            self.upsert_queue_entry(entry);
        }

        for row in changes.reassessments {
            self.reassessments
                .entry(row.assessment_id)
                .or_default()
                .push(row);
        }

        for protocol in changes.protocols {
            self.protocols.insert(protocol.id, protocol);
        }

        for application in changes.applications {
            self.applications
                .entry(application.assessment_id)
                .or_default()
                .push(application);
        }

        for department_id in changes.reindex {
            self.rebuild_index(department_id);
        }
    }

    fn upsert_queue_entry(&mut self, entry: QueueEntry) {
        if let Some(old) = self.queue.get(&entry.id) {
            if let Some(keys) = self.waiting.get_mut(&old.department_id) {
                keys.remove(&QueueKey::of(old));
            }
        }

        if entry.status == QueueStatus::Waiting {
            self.waiting
                .entry(entry.department_id)
                .or_default()
                .insert(QueueKey::of(&entry));
        }

        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.queue_by_assessment.insert(entry.assessment_id, entry.id);
        self.queue.insert(entry.id, entry);
    }

    fn rebuild_index(&mut self, department_id: RecordId) {
        let keys: BTreeSet<QueueKey> = self
            .queue
            .values()
            .filter(|e| e.department_id == department_id && e.status == QueueStatus::Waiting)
            .map(QueueKey::of)
            .collect();
        self.waiting.insert(department_id, keys);
    }
}
