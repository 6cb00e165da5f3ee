//! RUBRIC Storage - Record Store Trait and Mock Implementation
//!
//! Defines the store boundary the synchronization engine consumes:
//! transactional single-record writes, continue-on-error batches with
//! per-item outcomes, and filtered reads by parent key with a state filter
//! and column projection. The real store belongs to the host platform; this
//! crate ships an in-memory [`MockStore`] and the read-only
//! [`AssociationReader`] built on top of the trait.

pub mod journal;
pub mod mock;
pub mod query;
pub mod reader;
pub mod record;
pub mod update;

pub use journal::{ChangeEntry, ChangeJournal, InMemoryChangeJournal};
pub use mock::MockStore;
pub use query::{columns_of, ParentKey, Query, StateFilter};
pub use reader::AssociationReader;
pub use record::{Record, StoredRecord};
pub use update::{Batch, BatchItem, BatchOutcome, FieldChange, ItemStatus, RecordUpdate};

use rubric_core::{EntityIdType, RubricResult};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Record store consumed by the engine.
///
/// Implementations own transactions and consistency. The engine does no
/// locking of its own; concurrent writers to the same cached field resolve
/// last-write-wins at this layer.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails if the key already exists.
    fn insert(&self, record: Record) -> RubricResult<()>;

    /// Get a record by key.
    fn get(&self, key: rubric_core::RecordKey) -> RubricResult<Option<Record>>;

    /// Apply field changes to one record atomically and return the after image.
    fn update(&self, update: RecordUpdate) -> RubricResult<Record>;

    /// Delete a record and return the before image.
    fn delete(&self, key: rubric_core::RecordKey) -> RubricResult<Record>;

    /// Filtered read. `query.columns` is validated against the kind's
    /// catalogue and tells the backend which columns the caller reads; the
    /// returned records are always whole, so unselected fields may hold
    /// whatever the backend has on hand.
    fn query(&self, query: &Query) -> RubricResult<Vec<Record>>;

    /// Submit several updates in one round trip. Only a store-wide failure is
    /// an `Err`; per-item failures are reported in the outcome.
    fn submit_batch(&self, batch: Batch) -> RubricResult<BatchOutcome>;
}

/// Typed helpers over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    /// Get a typed record by id. A record of a different kind under the same
    /// key reads as missing.
    fn fetch<T: StoredRecord>(&self, id: T::Id) -> RubricResult<Option<T>> {
        Ok(self.get(id.key())?.and_then(T::from_record))
    }

    /// Run a query and keep the records that decode as `T`.
    fn query_as<T: StoredRecord>(&self, query: &Query) -> RubricResult<Vec<T>> {
        Ok(self
            .query(query)?
            .into_iter()
            .filter_map(T::from_record)
            .collect())
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}
