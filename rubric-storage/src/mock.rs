//! In-memory record store.

use crate::journal::{ChangeEntry, ChangeJournal, InMemoryChangeJournal};
use crate::{
    Batch, BatchItem, BatchOutcome, ItemStatus, Query, Record, RecordStore, RecordUpdate,
};
use chrono::Utc;
use rubric_core::{EntityKind, Operation, RecordKey, RubricResult, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory mock store for testing.
///
/// Records live in a `BTreeMap` keyed by [`RecordKey`]; since ids are UUIDv7,
/// query results come back in creation order. Each single-record write holds
/// the write lock for its whole duration, which is the transaction boundary.
#[derive(Debug, Default, Clone)]
pub struct MockStore {
    records: Arc<RwLock<BTreeMap<RecordKey, Record>>>,
    journal: Arc<InMemoryChangeJournal>,
    failing: Arc<RwLock<BTreeSet<RecordKey>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records. Seeding goes through `insert`, so the
    /// journal sees it; drain it before asserting on engine writes.
    pub fn with_records<I>(records: I) -> RubricResult<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Clear all stored data and injected failures.
    pub fn clear(&self) -> RubricResult<()> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        self.failing
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        self.journal.drain()?;
        Ok(())
    }

    /// Get count of stored records.
    pub fn record_count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Get count of stored records of one kind.
    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.records
            .read()
            .map(|r| r.keys().filter(|k| k.kind == kind).count())
            .unwrap_or(0)
    }

    /// Make every later update of `key` fail.
    pub fn fail_updates_for(&self, key: RecordKey) -> RubricResult<()> {
        self.failing
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(key);
        Ok(())
    }

    /// Simulate the store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Take every mutation committed since the last drain.
    pub fn drain_changes(&self) -> RubricResult<Vec<ChangeEntry>> {
        self.journal.drain()
    }

    pub fn journal(&self) -> &InMemoryChangeJournal {
        &self.journal
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "mock store switched off".to_string(),
            });
        }
        Ok(())
    }

    fn apply_one(&self, update: &RecordUpdate) -> RubricResult<Record> {
        let injected = self
            .failing
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains(&update.key);
        if injected {
            return Err(StorageError::UpdateFailed {
                key: update.key,
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let (before, after) = {
            let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
            let record = records
                .get_mut(&update.key)
                .ok_or(StorageError::NotFound { key: update.key })?;

            let before = record.clone();
            let mut staged = record.clone();
            for change in &update.changes {
                staged
                    .apply(change)
                    .map_err(|reason| StorageError::UpdateFailed {
                        key: update.key,
                        reason,
                    })?;
            }
            staged.touch(Utc::now());
            *record = staged.clone();
            (before, staged)
        };

        self.journal
            .record(Operation::Update, update.key, Some(before), Some(after.clone()))?;
        Ok(after)
    }
}

impl RecordStore for MockStore {
    fn insert(&self, record: Record) -> RubricResult<()> {
        self.ensure_available()?;
        let key = record.key();
        {
            let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
            if records.contains_key(&key) {
                return Err(StorageError::InsertFailed {
                    key,
                    reason: "already exists".to_string(),
                }
                .into());
            }
            records.insert(key, record.clone());
        }
        self.journal.record(Operation::Create, key, None, Some(record))?;
        Ok(())
    }

    fn get(&self, key: RecordKey) -> RubricResult<Option<Record>> {
        self.ensure_available()?;
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(&key).cloned())
    }

    fn update(&self, update: RecordUpdate) -> RubricResult<Record> {
        self.ensure_available()?;
        self.apply_one(&update)
    }

    fn delete(&self, key: RecordKey) -> RubricResult<Record> {
        self.ensure_available()?;
        let removed = self
            .records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(&key)
            .ok_or(StorageError::NotFound { key })?;
        self.journal
            .record(Operation::Delete, key, Some(removed.clone()), None)?;
        Ok(removed)
    }

    fn query(&self, query: &Query) -> RubricResult<Vec<Record>> {
        self.ensure_available()?;
        query.validate()?;
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .values()
            .filter(|r| r.kind() == query.kind)
            .filter(|r| query.state.matches(r.state()))
            .filter(|r| query.placement.is_none() || r.placement() == query.placement)
            .filter(|r| {
                let parents = r.parents();
                query.parents.iter().all(|p| parents.contains(p))
            })
            .cloned()
            .collect())
    }

    fn submit_batch(&self, batch: Batch) -> RubricResult<BatchOutcome> {
        self.ensure_available()?;
        let mut outcome = BatchOutcome::default();
        let mut halted = false;

        for update in &batch.updates {
            if halted {
                outcome.items.push(BatchItem {
                    key: update.key,
                    status: ItemStatus::NotAttempted,
                });
                continue;
            }

            let status = match self.apply_one(update) {
                Ok(_) => ItemStatus::Applied,
                Err(rubric_core::RubricError::Storage(err)) => ItemStatus::Failed(err),
                Err(other) => ItemStatus::Failed(StorageError::UpdateFailed {
                    key: update.key,
                    reason: other.to_string(),
                }),
            };
            if matches!(status, ItemStatus::Failed(_)) && !batch.continue_on_error {
                halted = true;
            }
            outcome.items.push(BatchItem {
                key: update.key,
                status,
            });
        }

        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldChange, ParentKey, RecordStoreExt, StateFilter, StoredRecord};
    use rubric_core::{
        EntityIdType, LifecycleState, Placement, QuestionLineId, QuestionLineReferenceListEntry,
        ReferenceListEntryId, RubricError, Study, StudyQuestionLine, StudyStatus,
    };

    fn make_line(study: &Study) -> StudyQuestionLine {
        StudyQuestionLine::new(study.study_id, QuestionLineId::now_v7(), 1)
    }

    #[test]
    fn test_insert_get() {
        let store = MockStore::new();
        let study = Study::new("Tracker", StudyStatus::Draft);

        store.insert(study.clone().into()).unwrap();
        let fetched: Option<Study> = store.fetch(study.study_id).unwrap();

        assert_eq!(fetched.unwrap().study_id, study.study_id);
    }

    #[test]
    fn test_insert_duplicate() {
        let store = MockStore::new();
        let study = Study::new("Tracker", StudyStatus::Draft);

        store.insert(study.clone().into()).unwrap();
        let result = store.insert(study.into());

        assert!(matches!(
            result,
            Err(RubricError::Storage(StorageError::InsertFailed { .. }))
        ));
    }

    #[test]
    fn test_update_bumps_modified_on_and_journals() {
        let store = MockStore::new();
        let study = Study::new("Tracker", StudyStatus::Draft);
        store.insert(study.clone().into()).unwrap();
        store.drain_changes().unwrap();

        let after = store
            .update(
                RecordUpdate::new(study.study_id.key())
                    .with(FieldChange::SubsetSummary("<table/>".to_string())),
            )
            .unwrap();

        assert!(after.modified_on() >= study.modified_on);
        let changes = store.drain_changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, Operation::Update);
        assert!(changes[0].before.is_some());
        assert!(changes[0].after.is_some());
    }

    #[test]
    fn test_update_inapplicable_field_is_atomic() {
        let store = MockStore::new();
        let study = Study::new("Tracker", StudyStatus::Draft);
        store.insert(study.clone().into()).unwrap();

        let result = store.update(
            RecordUpdate::new(study.study_id.key())
                .with(FieldChange::SubsetSummary("partial".to_string()))
                .with(FieldChange::State(LifecycleState::Inactive)),
        );

        assert!(result.is_err());
        let stored: Study = store.fetch(study.study_id).unwrap().unwrap();
        assert_eq!(stored.subset_summary, "");
    }

    #[test]
    fn test_query_filters_by_parent_state_and_placement() {
        let study = Study::new("Tracker", StudyStatus::Draft);
        let line = make_line(&study);
        let row = QuestionLineReferenceListEntry::new(&line, ReferenceListEntryId::now_v7(), Placement::Row);
        let col = QuestionLineReferenceListEntry::new(&line, ReferenceListEntryId::now_v7(), Placement::Column);
        let mut dead = QuestionLineReferenceListEntry::new(&line, ReferenceListEntryId::now_v7(), Placement::Row);
        dead.state = LifecycleState::Inactive;

        let store = MockStore::with_records([
            study.clone().into(),
            line.clone().into(),
            row.clone().into(),
            col.clone().into(),
            dead.clone().into(),
        ])
        .unwrap();

        let base = Query::new(EntityKind::QuestionLineReferenceListEntry)
            .parent(ParentKey::StudyQuestionLine(line.study_question_line_id));

        assert_eq!(store.query(&base).unwrap().len(), 2);
        assert_eq!(store.query(&base.clone().placement(Placement::Row)).unwrap().len(), 1);
        assert_eq!(store.query(&base.clone().include_inactive()).unwrap().len(), 3);
        assert_eq!(
            store
                .query(&base.clone().state(StateFilter::InactiveOnly))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_projection_returns_whole_records() {
        let study = Study::new("Tracker", StudyStatus::Draft);
        let store = MockStore::with_records([study.clone().into()]).unwrap();
        let query = Query::new(EntityKind::Study).select(&["study_id"]);

        let rows = store.query(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(Study::from_record(rows[0].clone()), Some(study));
    }

    #[test]
    fn test_query_rejects_unknown_projection() {
        let store = MockStore::new();
        let query = Query::new(EntityKind::Study).select(&["nope"]);
        assert!(matches!(
            store.query(&query),
            Err(RubricError::Storage(StorageError::InvalidQuery { .. }))
        ));
    }

    #[test]
    fn test_batch_continue_on_error() {
        let study = Study::new("Tracker", StudyStatus::Draft);
        let line = make_line(&study);
        let entries: Vec<_> = (0..3)
            .map(|_| {
                QuestionLineReferenceListEntry::new(&line, ReferenceListEntryId::now_v7(), Placement::Row)
            })
            .collect();
        let store = MockStore::with_records(entries.iter().cloned().map(Record::from)).unwrap();
        let bad = entries[1].question_line_reference_list_entry_id.key();
        store.fail_updates_for(bad).unwrap();

        let mut batch = Batch::new(true);
        for e in &entries {
            batch.push(RecordUpdate::deactivate(
                e.question_line_reference_list_entry_id.key(),
            ));
        }
        let outcome = store.submit_batch(batch).unwrap();

        assert_eq!(outcome.applied().count(), 2);
        assert_eq!(outcome.failed().map(|(k, _)| *k).collect::<Vec<_>>(), vec![bad]);
    }

    #[test]
    fn test_batch_halts_without_continue_on_error() {
        let study = Study::new("Tracker", StudyStatus::Draft);
        let line = make_line(&study);
        let entries: Vec<_> = (0..3)
            .map(|_| {
                QuestionLineReferenceListEntry::new(&line, ReferenceListEntryId::now_v7(), Placement::Row)
            })
            .collect();
        let store = MockStore::with_records(entries.iter().cloned().map(Record::from)).unwrap();
        store
            .fail_updates_for(entries[0].question_line_reference_list_entry_id.key())
            .unwrap();

        let mut batch = Batch::new(false);
        for e in &entries {
            batch.push(RecordUpdate::deactivate(
                e.question_line_reference_list_entry_id.key(),
            ));
        }
        let outcome = store.submit_batch(batch).unwrap();

        assert_eq!(outcome.failed().count(), 1);
        assert_eq!(outcome.not_attempted().count(), 2);
    }

    #[test]
    fn test_unavailable_store_surfaces_error() {
        let store = MockStore::new();
        store.set_unavailable(true);
        let result = store.get(rubric_core::StudyId::now_v7().key());
        assert!(matches!(
            result,
            Err(RubricError::Storage(StorageError::Unavailable { .. }))
        ));
        store.set_unavailable(false);
        assert!(store.get(rubric_core::StudyId::now_v7().key()).unwrap().is_none());
    }

    #[test]
    fn test_delete_returns_before_image() {
        let study = Study::new("Tracker", StudyStatus::Draft);
        let store = MockStore::with_records([study.clone().into()]).unwrap();

        let removed = store.delete(study.study_id.key()).unwrap();
        assert_eq!(removed.key(), study.study_id.key());
        assert!(store.delete(study.study_id.key()).is_err());
        assert_eq!(store.record_count(), 0);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
