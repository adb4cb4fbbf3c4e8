//! JSON journal backing a persistent [`Store`](super::Store).
//!
//! Layout under the data directory:
//!
//! ```text
//! assessments/<s1>/<s2>/<assessment-id>/assessment.json
//! assessments/<s1>/<s2>/<assessment-id>/queue_entry.json
//! assessments/<s1>/<s2>/<assessment-id>/reassessments.jsonl
//! assessments/<s1>/<s2>/<assessment-id>/protocol_applications.jsonl
//! protocols/<protocol-id>.json
//! .lock
//! ```
//!
//! Every write goes to a synced temp file that is then renamed over the target. Audit logs
//! only ever grow, one JSON object per line.

use super::state::{Changeset, StoreState};
use crate::assessment::Assessment;
use crate::constants::{
    ASSESSMENTS_DIR_NAME, ASSESSMENT_JSON_FILENAME, LOCK_FILENAME, PROTOCOLS_DIR_NAME,
    PROTOCOL_APPLICATIONS_LOG_FILENAME, QUEUE_ENTRY_JSON_FILENAME, REASSESSMENTS_LOG_FILENAME,
};
use crate::error::{TriageError, TriageResult};
use crate::protocol::{Protocol, ProtocolApplication};
use crate::queue::QueueEntry;
use crate::reassessment::Reassessment;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use triage_uuid::RecordId;

#[derive(Debug)]
pub(crate) struct Journal {
    root: PathBuf,
    /// Exclusive advisory lock held for the journal's lifetime; released on drop.
    _lock: File,
}

impl Journal {
    /// Open (creating if needed) the journal at `root` and load everything it holds.
    ///
    /// Fails with [`TriageError::DataDirLocked`] while another store holds the directory.
    pub(crate) fn open(root: &Path) -> TriageResult<(Self, StoreState)> {
        fs::create_dir_all(root).map_err(TriageError::StorageDirCreation)?;
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILENAME))
            .map_err(TriageError::FileWrite)?;
        if let Err(e) = lock.try_lock_exclusive() {
            tracing::error!("data directory {} is locked: {}", root.display(), e);
            return Err(TriageError::DataDirLocked(root.to_path_buf()));
        }

        let journal = Self {
            root: root.to_path_buf(),
            _lock: lock,
        };
        fs::create_dir_all(journal.assessments_dir()).map_err(TriageError::StorageDirCreation)?;
        fs::create_dir_all(journal.protocols_dir()).map_err(TriageError::StorageDirCreation)?;

        let loaded = journal.load()?;
        let mut state = StoreState::default();
        state.apply(loaded);

        Ok((journal, state))
    }

    fn assessments_dir(&self) -> PathBuf {
        self.root.join(ASSESSMENTS_DIR_NAME)
    }

    fn protocols_dir(&self) -> PathBuf {
        self.root.join(PROTOCOLS_DIR_NAME)
    }

    fn record_dir(&self, assessment_id: &RecordId) -> PathBuf {
        assessment_id.sharded_dir(&self.assessments_dir())
    }

    /// Write a changeset to disk. Nothing is applied in memory until this returns `Ok`.
    ///
    /// Every touched file is first staged next to its target. Only when all of them are staged
    /// are they renamed into place; a failed rename restores the files already committed, so a
    /// changeset lands whole or not at all.
    pub(crate) fn persist(&self, changes: &Changeset) -> TriageResult<()> {
        let mut staged = Vec::new();
        for (target, write) in self.planned_writes(changes)? {
            match stage(target, write) {
                Ok(file) => staged.push(file),
                Err(e) => {
                    discard(&staged);
                    return Err(e);
                }
            }
        }

        for (committed, file) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(&file.tmp, &file.target) {
                tracing::error!("journal commit failed at {}: {}", file.target.display(), e);
                roll_back(&staged[..committed]);
                discard(&staged[committed..]);
                return Err(TriageError::FileWrite(e));
            }
        }

        Ok(())
    }

    /// Final content of every file a changeset touches, keyed by path.
    fn planned_writes(&self, changes: &Changeset) -> TriageResult<BTreeMap<PathBuf, PlannedWrite>> {
        let mut writes = BTreeMap::new();

        for assessment in &changes.assessments {
            let path = self.record_dir(&assessment.id).join(ASSESSMENT_JSON_FILENAME);
            writes.insert(path, PlannedWrite::Replace(to_json_pretty(assessment)?));
        }
        for entry in &changes.queue_entries {
            let path = self.record_dir(&entry.assessment_id).join(QUEUE_ENTRY_JSON_FILENAME);
            writes.insert(path, PlannedWrite::Replace(to_json_pretty(entry)?));
        }
        for protocol in &changes.protocols {
            let path = self.protocols_dir().join(format!("{}.json", protocol.id));
            writes.insert(path, PlannedWrite::Replace(to_json_pretty(protocol)?));
        }

        for row in &changes.reassessments {
            let path = self.record_dir(&row.assessment_id).join(REASSESSMENTS_LOG_FILENAME);
            push_line(&mut writes, path, row)?;
        }
        for application in &changes.applications {
            let path = self
                .record_dir(&application.assessment_id)
                .join(PROTOCOL_APPLICATIONS_LOG_FILENAME);
            push_line(&mut writes, path, application)?;
        }

        Ok(writes)
    }

    /// Walk the sharded tree and collect every record as one changeset.
    fn load(&self) -> TriageResult<Changeset> {
        let mut loaded = Changeset::default();

        for record_dir in sharded_leaf_dirs(&self.assessments_dir())? {
            let assessment_path = record_dir.join(ASSESSMENT_JSON_FILENAME);
            if !assessment_path.is_file() {
                tracing::warn!(
                    "skipping record directory without assessment: {}",
                    record_dir.display()
                );
                continue;
            }
            let assessment: Assessment = read_json(&assessment_path)?;

            let queue_path = record_dir.join(QUEUE_ENTRY_JSON_FILENAME);
            if queue_path.is_file() {
                let entry: QueueEntry = read_json(&queue_path)?;
                loaded.queue_entries.push(entry);
            }

            let mut rows: Vec<Reassessment> =
                read_json_lines(&record_dir.join(REASSESSMENTS_LOG_FILENAME))?;
            rows.sort_by(|a, b| a.id.cmp(&b.id));
            loaded.reassessments.extend(rows);

            let applications: Vec<ProtocolApplication> =
                read_json_lines(&record_dir.join(PROTOCOL_APPLICATIONS_LOG_FILENAME))?;
            loaded.applications.extend(applications);

            loaded.assessments.push(assessment);
        }

        for entry in fs::read_dir(self.protocols_dir()).map_err(TriageError::FileRead)? {
            let path = entry.map_err(TriageError::FileRead)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let protocol: Protocol = read_json(&path)?;
            loaded.protocols.push(protocol);
        }

        loaded
            .queue_entries
            .sort_by_key(|entry| entry.sequence);

        tracing::debug!(
            "loaded {} assessments and {} protocols from {}",
            loaded.assessments.len(),
            loaded.protocols.len(),
            self.root.display()
        );

        Ok(loaded)
    }
}

/// Leaf directories of a `<s1>/<s2>/<id>` shard tree.
fn sharded_leaf_dirs(base: &Path) -> TriageResult<Vec<PathBuf>> {
    let mut leaves = Vec::new();

    for s1 in fs::read_dir(base).map_err(TriageError::FileRead)?.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }
        for s2 in fs::read_dir(&s1_path).map_err(TriageError::FileRead)?.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }
            for leaf in fs::read_dir(&s2_path).map_err(TriageError::FileRead)?.flatten() {
                let leaf_path = leaf.path();
                let canonical = leaf_path
                    .file_name()
                    .and_then(|os| os.to_str())
                    .is_some_and(RecordId::is_canonical);
                if leaf_path.is_dir() && canonical {
                    leaves.push(leaf_path);
                }
            }
        }
    }

    Ok(leaves)
}

enum PlannedWrite {
    /// Whole-record file.
    Replace(String),
    /// Lines added to the end of an audit log.
    Append(String),
}

/// A file written to its temp path and not yet renamed over the target.
struct StagedFile {
    target: PathBuf,
    tmp: PathBuf,
    previous: Option<Vec<u8>>,
}

fn to_json_pretty<T: Serialize>(value: &T) -> TriageResult<String> {
    serde_json::to_string_pretty(value).map_err(TriageError::Serialization)
}

fn push_line<T: Serialize>(
    writes: &mut BTreeMap<PathBuf, PlannedWrite>,
    path: PathBuf,
    value: &T,
) -> TriageResult<()> {
    let mut line = serde_json::to_string(value).map_err(TriageError::Serialization)?;
    line.push('\n');
    match writes
        .entry(path)
        .or_insert_with(|| PlannedWrite::Append(String::new()))
    {
        PlannedWrite::Append(lines) | PlannedWrite::Replace(lines) => lines.push_str(&line),
    }
    Ok(())
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

fn stage(target: PathBuf, write: PlannedWrite) -> TriageResult<StagedFile> {
    let previous = match fs::symlink_metadata(&target) {
        Ok(meta) if meta.is_file() => Some(fs::read(&target).map_err(TriageError::FileRead)?),
        Ok(_) => {
            return Err(TriageError::FileWrite(io::Error::other(format!(
                "{} is not a regular file",
                target.display()
            ))))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(TriageError::FileRead(e)),
    };

    let bytes = match write {
        PlannedWrite::Replace(json) => json.into_bytes(),
        PlannedWrite::Append(lines) => {
            let mut bytes = previous.clone().unwrap_or_default();
            if bytes.last().is_some_and(|&b| b != b'\n') {
                bytes.push(b'\n');
            }
            bytes.extend_from_slice(lines.as_bytes());
            bytes
        }
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(TriageError::StorageDirCreation)?;
    }
    let tmp = tmp_path(&target);
    write_synced(&tmp, &bytes)?;

    Ok(StagedFile {
        target,
        tmp,
        previous,
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> TriageResult<()> {
    let written = File::create(path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(path);
        return Err(TriageError::FileWrite(e));
    }
    Ok(())
}

fn discard(staged: &[StagedFile]) {
    for file in staged {
        if let Err(e) = fs::remove_file(&file.tmp) {
            tracing::warn!("could not remove staged {}: {}", file.tmp.display(), e);
        }
    }
}

/// Put committed targets back to their content before the failed changeset.
fn roll_back(committed: &[StagedFile]) {
    for file in committed.iter().rev() {
        let restored = match &file.previous {
            Some(bytes) => write_synced(&file.tmp, bytes).and_then(|()| {
                fs::rename(&file.tmp, &file.target).map_err(TriageError::FileWrite)
            }),
            None => fs::remove_file(&file.target).map_err(TriageError::FileWrite),
        };
        if let Err(e) = restored {
            tracing::error!("could not roll back {}: {}", file.target.display(), e);
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> TriageResult<T> {
    let contents = fs::read_to_string(path).map_err(TriageError::FileRead)?;
    serde_json::from_str(&contents).map_err(|source| TriageError::Deserialization {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> TriageResult<Vec<T>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(TriageError::FileRead)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| TriageError::Deserialization {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}
