//! Update payloads and batched submission.

use rubric_core::{LifecycleState, RecordKey, StorageError, SubsetSelection};

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// One field written by the engine. The engine only ever touches lifecycle
/// state, cached summaries and subset selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    State(LifecycleState),
    SubsetSummary(String),
    AnswerSummary(String),
    Selection(SubsetSelection),
}

impl FieldChange {
    pub fn field(&self) -> &'static str {
        match self {
            FieldChange::State(_) => "state",
            FieldChange::SubsetSummary(_) => "subset_summary",
            FieldChange::AnswerSummary(_) => "answer_summary",
            FieldChange::Selection(_) => "uses_full_list",
        }
    }
}

/// Update payload for a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub key: RecordKey,
    pub changes: Vec<FieldChange>,
}

impl RecordUpdate {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            changes: Vec::new(),
        }
    }

    pub fn with(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Shorthand for an Active -> Inactive write.
    pub fn deactivate(key: RecordKey) -> Self {
        Self::new(key).with(FieldChange::State(LifecycleState::Inactive))
    }
}

// ============================================================================
// BATCHES
// ============================================================================

/// Several updates submitted in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub updates: Vec<RecordUpdate>,
    /// Keep applying later items after one fails.
    pub continue_on_error: bool,
}

impl Batch {
    pub fn new(continue_on_error: bool) -> Self {
        Self {
            updates: Vec::new(),
            continue_on_error,
        }
    }

    pub fn push(&mut self, update: RecordUpdate) {
        self.updates.push(update);
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    Failed(StorageError),
    /// Skipped because an earlier item failed without continue-on-error.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub key: RecordKey,
    pub status: ItemStatus,
}

/// Per-item outcomes, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
}

impl BatchOutcome {
    pub fn applied(&self) -> impl Iterator<Item = &RecordKey> {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::Applied)
            .map(|i| &i.key)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&RecordKey, &StorageError)> {
        self.items.iter().filter_map(|i| match &i.status {
            ItemStatus::Failed(err) => Some((&i.key, err)),
            _ => None,
        })
    }

    pub fn not_attempted(&self) -> impl Iterator<Item = &RecordKey> {
        self.items
            .iter()
            .filter(|i| i.status == ItemStatus::NotAttempted)
            .map(|i| &i.key)
    }

    pub fn is_complete_success(&self) -> bool {
        self.items.iter().all(|i| i.status == ItemStatus::Applied)
    }
}
