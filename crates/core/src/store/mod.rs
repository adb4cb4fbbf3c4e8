//! Record store with atomic conditional transactions.
//!
//! All triage state lives in one [`StoreState`] behind a `RwLock`. Mutations go through
//! [`Store::transact`]: the body runs under the write lock, sees the current state, checks its
//! preconditions (status, version) and returns a [`Changeset`]. The changeset is written to the
//! journal (when the store is persistent) and only then applied in memory, so a failed disk
//! write leaves the visible state unchanged.
//!
//! Because the check and the write happen under the same lock, two writers racing on the same
//! assessment or the same department queue can never both succeed on stale state.

mod journal;
mod state;

pub(crate) use state::queue_key;
pub use state::{Changeset, StoreState};

use crate::error::{TriageError, TriageResult};
use journal::Journal;
use std::path::Path;
use std::sync::RwLock;

#[derive(Debug)]
pub struct Store {
    state: RwLock<StoreState>,
    journal: Option<Journal>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            journal: None,
        }
    }

    /// Open a journal-backed store rooted at `data_dir`, loading any existing records.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory cannot be created or a record file cannot be
    /// read or parsed.
    pub fn open(data_dir: &Path) -> TriageResult<Self> {
        let (journal, state) = Journal::open(data_dir)?;
        tracing::info!("opened triage journal at {}", data_dir.display());
        Ok(Self {
            state: RwLock::new(state),
            journal: Some(journal),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    /// Run a read-only closure against a consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> TriageResult<T> {
        let state = self.state.read().map_err(|_| TriageError::LockPoisoned)?;
        Ok(f(&state))
    }

    /// Run a conditional write.
    ///
    /// The closure decides on the current state and returns the changes plus a value for the
    /// caller. Returning `Err` aborts without writing anything.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&StoreState) -> TriageResult<(Changeset, T)>,
    ) -> TriageResult<T> {
        let mut state = self.state.write().map_err(|_| TriageError::LockPoisoned)?;
        let (changes, out) = f(&state)?;

        debug_assert!(changes.assessments.iter().all(|a| a.invariants_hold()));

        if changes.is_empty() {
            return Ok(out);
        }
        if let Some(journal) = &self.journal {
            journal.persist(&changes)?;
        }
        state.apply(changes);
        Ok(out)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}
