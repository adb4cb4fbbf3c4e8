//! Constants used throughout the triage core crate.
//!
//! Journal path/filename constants and the default clinical thresholds live here so the store,
//! the configuration loader and the tests agree on them.

/// Default directory for the triage journal when no explicit directory is configured.
pub const DEFAULT_TRIAGE_DATA_DIR: &str = "triage_data";

/// Directory name (under the data directory) holding sharded assessment records.
pub const ASSESSMENTS_DIR_NAME: &str = "assessments";

/// Directory name (under the data directory) holding protocol catalogue files.
pub const PROTOCOLS_DIR_NAME: &str = "protocols";

/// Filename for the assessment record.
pub const ASSESSMENT_JSON_FILENAME: &str = "assessment.json";

/// Filename for the assessment's queue entry.
pub const QUEUE_ENTRY_JSON_FILENAME: &str = "queue_entry.json";

/// Filename for the append-only reassessment log (one JSON object per line).
pub const REASSESSMENTS_LOG_FILENAME: &str = "reassessments.jsonl";

/// Filename for the append-only protocol application log.
pub const PROTOCOL_APPLICATIONS_LOG_FILENAME: &str = "protocol_applications.jsonl";

/// Lock file held by the store that owns the data directory.
pub const LOCK_FILENAME: &str = ".lock";

/// Default acceptable wait in minutes, indexed by triage level (level 1 first).
pub const DEFAULT_OVERDUE_MINUTES: [u32; 5] = [0, 10, 30, 60, 120];

/// Health turns red when more than this many level 1–2 patients are waiting.
pub const DEFAULT_MAX_CRITICAL_WAITING: usize = 5;

/// Health turns red when the average wait (minutes) of waiting patients exceeds this.
pub const DEFAULT_MAX_AVERAGE_WAIT_MINUTES: f64 = 60.0;

/// Health turns red when more than this many alerts are outstanding.
pub const DEFAULT_MAX_ACTIVE_ALERTS: usize = 10;
