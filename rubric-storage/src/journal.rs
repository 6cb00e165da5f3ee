//! Change journal of store mutations.
//!
//! Every mutation the store commits is appended here with its before and
//! after images. A host replays the journal to raise the trigger events that
//! the engine's own writes cause, which is how nested invocations (and the
//! recursion guard that stops them) are exercised.

use crate::Record;
use chrono::Utc;
use rubric_core::{Operation, RecordKey, RubricResult, StorageError, Timestamp};
use std::sync::Mutex;

/// One committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    /// Monotonically increasing, starting at 1.
    pub sequence: u64,
    pub operation: Operation,
    pub key: RecordKey,
    pub before: Option<Record>,
    pub after: Option<Record>,
    pub recorded_at: Timestamp,
}

/// Append-only log of mutations.
pub trait ChangeJournal: Send + Sync {
    /// Record a mutation and return its sequence number.
    fn record(
        &self,
        operation: Operation,
        key: RecordKey,
        before: Option<Record>,
        after: Option<Record>,
    ) -> RubricResult<u64>;

    /// Sequence of the latest recorded mutation (0 when empty).
    fn current_sequence(&self) -> RubricResult<u64>;

    /// Remove and return every entry recorded so far, oldest first.
    fn drain(&self) -> RubricResult<Vec<ChangeEntry>>;
}

/// In-memory change journal for testing.
#[derive(Debug, Default)]
pub struct InMemoryChangeJournal {
    state: Mutex<JournalState>,
}

#[derive(Debug, Default)]
struct JournalState {
    sequence: u64,
    log: Vec<ChangeEntry>,
}

impl InMemoryChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeJournal for InMemoryChangeJournal {
    fn record(
        &self,
        operation: Operation,
        key: RecordKey,
        before: Option<Record>,
        after: Option<Record>,
    ) -> RubricResult<u64> {
        let mut state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        state.sequence += 1;
        let sequence = state.sequence;
        state.log.push(ChangeEntry {
            sequence,
            operation,
            key,
            before,
            after,
            recorded_at: Utc::now(),
        });
        Ok(sequence)
    }

    fn current_sequence(&self) -> RubricResult<u64> {
        let state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state.sequence)
    }

    fn drain(&self) -> RubricResult<Vec<ChangeEntry>> {
        let mut state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(std::mem::take(&mut state.log))
    }
}
