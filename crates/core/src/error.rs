use triage_uuid::RecordId;

/// The five failure classes callers are expected to branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    EmptyQueue,
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("no waiting entries in department {0}")]
    EmptyQueue(RecordId),

    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record at {path}: {source}")]
    Deserialization {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("data directory {0} is already open in another store")]
    DataDirLocked(std::path::PathBuf),
}

impl TriageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TriageError::Validation(_) => ErrorKind::Validation,
            TriageError::NotFound { .. } => ErrorKind::NotFound,
            TriageError::Conflict(_) => ErrorKind::Conflict,
            TriageError::EmptyQueue(_) => ErrorKind::EmptyQueue,
            TriageError::Config(_)
            | TriageError::StorageDirCreation(_)
            | TriageError::FileWrite(_)
            | TriageError::FileRead(_)
            | TriageError::Serialization(_)
            | TriageError::Deserialization { .. }
            | TriageError::LockPoisoned
            | TriageError::DataDirLocked(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        TriageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<triage_types::TextError> for TriageError {
    fn from(err: triage_types::TextError) -> Self {
        TriageError::Validation(err.to_string())
    }
}

impl From<triage_types::LevelError> for TriageError {
    fn from(err: triage_types::LevelError) -> Self {
        TriageError::Validation(err.to_string())
    }
}

impl From<triage_uuid::UuidError> for TriageError {
    fn from(err: triage_uuid::UuidError) -> Self {
        TriageError::Validation(err.to_string())
    }
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;
