//! Explicit per-request context and the patient-identity collaborator.
//!
//! Caller identity is never ambient: every mutating operation takes a [`RequestContext`] and
//! stamps `caller_id` onto the audit fields it writes.

use crate::error::TriageResult;
use std::collections::HashMap;
use std::sync::RwLock;
use triage_types::NonEmptyText;
use triage_uuid::{RecordId, Uuid};

/// Who is calling, and which request this is.
#[derive(Clone, Debug)]
pub struct RequestContext {
    caller_id: NonEmptyText,
    request_id: Uuid,
}

impl RequestContext {
    /// Build a context with a fresh request id.
    pub fn new(caller_id: impl AsRef<str>) -> TriageResult<Self> {
        Ok(Self {
            caller_id: NonEmptyText::new(caller_id)?,
            request_id: Uuid::new_v4(),
        })
    }

    /// Build a context with a request id propagated from the transport.
    pub fn with_request_id(caller_id: impl AsRef<str>, request_id: Uuid) -> TriageResult<Self> {
        Ok(Self {
            caller_id: NonEmptyText::new(caller_id)?,
            request_id,
        })
    }

    pub fn caller_id(&self) -> &str {
        self.caller_id.as_str()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Resolves a patient's display name. Used for rendering only; never for decisions.
pub trait PatientDirectory: Send + Sync {
    fn full_name(&self, patient_id: &RecordId) -> Option<String>;
}

/// A directory that knows nobody.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPatientDirectory;

impl PatientDirectory for NoPatientDirectory {
    fn full_name(&self, _patient_id: &RecordId) -> Option<String> {
        None
    }
}

/// In-process directory, populated by the caller.
#[derive(Debug, Default)]
pub struct StaticPatientDirectory {
    names: RwLock<HashMap<RecordId, String>>,
}

impl StaticPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, patient_id: RecordId, full_name: impl Into<String>) {
        let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
        names.insert(patient_id, full_name.into());
    }
}

impl PatientDirectory for StaticPatientDirectory {
    fn full_name(&self, patient_id: &RecordId) -> Option<String> {
        let names = self.names.read().unwrap_or_else(|e| e.into_inner());
        names.get(patient_id).cloned()
    }
}
