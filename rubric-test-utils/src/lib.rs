//! RUBRIC Test Utilities
//!
//! Centralized test infrastructure for the RUBRIC workspace:
//! - Proptest generators for ids, enums and study layouts
//! - Scenario builders over the in-memory mock store
//! - Custom assertions for RUBRIC-specific errors

// Re-export mock storage from its source crate
pub use rubric_storage::MockStore;

// Re-export core types for convenience
pub use rubric_core::{
    Answer, EntityIdType, EntityKind, LifecycleState, Operation, Placement, QuestionLine,
    QuestionLineId, QuestionLineReferenceList, QuestionLineReferenceListEntry, QuestionLineSubset,
    RecordKey, ReferenceList, ReferenceListEntry, ReferenceListEntryId, RubricError,
    RubricResult, StorageError, Study, StudyId, StudyQuestionLine, StudyReferenceListEntry,
    StudyStatus, StudySubsetDefinition, SubsetDefinition, SubsetMember, SubsetSelection,
    SyncConfig, SyncError,
};

use rubric_storage::{
    AssociationReader, FieldChange, Record, RecordStore, RecordStoreExt, RecordUpdate,
    StoredRecord,
};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating RUBRIC values.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a random StudyId.
    pub fn arb_study_id() -> impl Strategy<Value = StudyId> {
        arb_uuid().prop_map(StudyId::new)
    }

    /// Generate a random ReferenceListEntryId.
    pub fn arb_reference_list_entry_id() -> impl Strategy<Value = ReferenceListEntryId> {
        arb_uuid().prop_map(ReferenceListEntryId::new)
    }

    // === Enum Generators ===

    pub fn arb_placement() -> impl Strategy<Value = Placement> {
        prop_oneof![Just(Placement::Row), Just(Placement::Column)]
    }

    pub fn arb_lifecycle_state() -> impl Strategy<Value = LifecycleState> {
        prop_oneof![Just(LifecycleState::Active), Just(LifecycleState::Inactive)]
    }

    pub fn arb_study_status() -> impl Strategy<Value = StudyStatus> {
        prop_oneof![
            Just(StudyStatus::Draft),
            Just(StudyStatus::Fielding),
            Just(StudyStatus::Closed),
            Just(StudyStatus::Cancelled),
        ]
    }

    pub fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Create),
            Just(Operation::Update),
            Just(Operation::Delete),
        ]
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop::sample::select(EntityKind::ALL.to_vec())
    }

    // === Text Generators ===

    /// Short entry code.
    pub fn arb_code() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9]{0,5}"
    }

    /// Label text mixing plain words, allowed and disallowed tags, and every
    /// line-break spelling the renderer normalizes.
    pub fn arb_label() -> impl Strategy<Value = String> {
        let fragment = prop_oneof![
            "[a-zA-Z ]{1,12}",
            Just("<b>bold</b>".to_string()),
            Just("<EM>em</EM>".to_string()),
            Just("<script>x</script>".to_string()),
            Just("a & b".to_string()),
            Just("\r\n".to_string()),
            Just("\\n".to_string()),
            Just("\u{2028}".to_string()),
            Just("End. Next".to_string()),
        ];
        prop::collection::vec(fragment, 0..6).prop_map(|parts| parts.concat())
    }

    // === Config Generators ===

    /// Generate a valid SyncConfig.
    pub fn arb_valid_sync_config() -> impl Strategy<Value = SyncConfig> {
        (1u32..4, any::<bool>(), any::<bool>()).prop_map(
            |(max_trigger_depth, continue_on_error, rebuild_non_draft_lines)| SyncConfig {
                max_trigger_depth,
                continue_on_error,
                rebuild_non_draft_lines,
                ..SyncConfig::default()
            },
        )
    }

    // === Layout Generators ===

    /// Placement grid for one study: `grid[line][entry]` is where that entry
    /// sits on that line, if anywhere. 1-4 lines, 1-6 entries.
    pub fn arb_placement_grid() -> impl Strategy<Value = Vec<Vec<Option<Placement>>>> {
        (1usize..=4, 1usize..=6).prop_flat_map(|(lines, entries)| {
            prop::collection::vec(
                prop::collection::vec(prop::option::of(arb_placement()), entries),
                lines,
            )
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Scenario builders over a [`MockStore`].
    //!
    //! Every builder method inserts through the store and then drains the
    //! change journal, so a test starts from an empty journal and only sees
    //! the writes it causes itself.

    use super::*;
    use std::collections::BTreeMap;

    /// A mock store plus helpers for populating it.
    #[derive(Debug, Clone, Default)]
    pub struct Scenario {
        pub store: MockStore,
    }

    impl Scenario {
        pub fn new() -> Self {
            Self::default()
        }

        fn put<T: StoredRecord>(&self, value: T) -> T {
            self.store
                .insert(value.clone().into_record())
                .expect("fixture insert");
            self.settle();
            value
        }

        /// Drop everything recorded in the change journal so far.
        pub fn settle(&self) {
            self.store.drain_changes().expect("drain journal");
        }

        // === Records ===

        pub fn study(&self, name: &str, status: StudyStatus) -> Study {
            self.put(Study::new(name, status))
        }

        pub fn question_line(&self, name: &str) -> QuestionLine {
            self.put(QuestionLine::new(name, format!("{name}?")))
        }

        pub fn reference_list(&self, name: &str) -> ReferenceList {
            self.put(ReferenceList::new(name, true))
        }

        /// Entry labelled `"{code} label"`.
        pub fn entry(&self, list: &ReferenceList, code: &str, sort_order: i32) -> ReferenceListEntry {
            self.put(ReferenceListEntry::new(
                list.reference_list_id,
                code,
                format!("{code} label"),
                sort_order,
            ))
        }

        pub fn labelled_entry(
            &self,
            list: &ReferenceList,
            code: &str,
            label: &str,
            sort_order: i32,
        ) -> ReferenceListEntry {
            self.put(ReferenceListEntry::new(list.reference_list_id, code, label, sort_order))
        }

        pub fn attach_list(
            &self,
            question_line: &QuestionLine,
            list: &ReferenceList,
            placement: Placement,
            sort_order: i32,
        ) -> QuestionLineReferenceList {
            self.put(QuestionLineReferenceList::new(
                question_line.question_line_id,
                list.reference_list_id,
                placement,
                sort_order,
            ))
        }

        pub fn answer(
            &self,
            question_line: &QuestionLine,
            code: &str,
            label: &str,
            sort_order: i32,
        ) -> Answer {
            self.put(Answer::new(question_line.question_line_id, code, label, sort_order))
        }

        // === Study-scoped associations ===

        pub fn study_line(&self, study: &Study, question_line: &QuestionLine) -> StudyQuestionLine {
            let sort_order = self.store.count_of(EntityKind::StudyQuestionLine) as i32 + 1;
            self.put(StudyQuestionLine::new(
                study.study_id,
                question_line.question_line_id,
                sort_order,
            ))
        }

        pub fn study_entry(&self, study: &Study, entry: &ReferenceListEntry) -> StudyReferenceListEntry {
            self.put(StudyReferenceListEntry::new(
                study.study_id,
                entry.reference_list_entry_id,
            ))
        }

        pub fn line_entry(
            &self,
            line: &StudyQuestionLine,
            entry: &ReferenceListEntry,
            placement: Placement,
        ) -> QuestionLineReferenceListEntry {
            self.put(QuestionLineReferenceListEntry::new(
                line,
                entry.reference_list_entry_id,
                placement,
            ))
        }

        /// Place `entry` on `line`, creating the study-scoped association
        /// unless an active one already exists.
        pub fn place(
            &self,
            study: &Study,
            line: &StudyQuestionLine,
            entry: &ReferenceListEntry,
            placement: Placement,
        ) -> (StudyReferenceListEntry, QuestionLineReferenceListEntry) {
            let existing = AssociationReader::new(&self.store)
                .study_entry(study.study_id, entry.reference_list_entry_id)
                .expect("study entry lookup");
            let study_entry = match existing {
                Some(found) => found,
                None => self.study_entry(study, entry),
            };
            (study_entry, self.line_entry(line, entry, placement))
        }

        // === Subsets ===

        pub fn subset_definition(&self, list: &ReferenceList, name: &str) -> SubsetDefinition {
            self.put(SubsetDefinition::new(list.reference_list_id, name))
        }

        pub fn subset_member(
            &self,
            definition: &SubsetDefinition,
            entry: &ReferenceListEntry,
        ) -> SubsetMember {
            self.put(SubsetMember::new(
                definition.subset_definition_id,
                entry.reference_list_entry_id,
            ))
        }

        pub fn study_subset(&self, study: &Study, definition: &SubsetDefinition) -> StudySubsetDefinition {
            self.put(StudySubsetDefinition::new(
                study.study_id,
                definition.subset_definition_id,
            ))
        }

        pub fn line_subset(
            &self,
            line: &StudyQuestionLine,
            list: &ReferenceList,
            selection: SubsetSelection,
        ) -> QuestionLineSubset {
            self.put(QuestionLineSubset::new(line, list.reference_list_id, selection))
        }

        // === Mutations ===

        /// Set a record Inactive and return its after image.
        pub fn deactivate<T: StoredRecord>(&self, id: T::Id) -> T {
            let after = self
                .store
                .update(RecordUpdate::new(id.key()).with(FieldChange::State(LifecycleState::Inactive)))
                .expect("deactivate");
            self.settle();
            T::from_record(after).expect("record kind")
        }

        /// Current stored version of a record.
        pub fn reload<T: StoredRecord>(&self, id: T::Id) -> Option<T> {
            self.store.fetch::<T>(id).expect("reload")
        }

        /// Lifecycle state of any stateful record.
        pub fn state_of(&self, key: RecordKey) -> LifecycleState {
            self.store
                .get(key)
                .expect("get")
                .and_then(|r: Record| r.state())
                .expect("record with lifecycle state")
        }
    }

    // === Canned scenarios ===

    /// Draft study, one line, two row entries (R1, R2) from one list and one
    /// column entry (C1) from another, both lists selected as full list.
    #[derive(Debug, Clone)]
    pub struct FullListScenario {
        pub scenario: Scenario,
        pub study: Study,
        pub question_line: QuestionLine,
        pub line: StudyQuestionLine,
        pub row_list: ReferenceList,
        pub column_list: ReferenceList,
        pub rows: Vec<ReferenceListEntry>,
        pub column: ReferenceListEntry,
    }

    pub fn full_list_scenario() -> FullListScenario {
        let scenario = Scenario::new();
        let study = scenario.study("Tracker", StudyStatus::Draft);
        let question_line = scenario.question_line("Q1");
        let row_list = scenario.reference_list("Brands");
        let column_list = scenario.reference_list("Regions");
        scenario.attach_list(&question_line, &row_list, Placement::Row, 1);
        scenario.attach_list(&question_line, &column_list, Placement::Column, 2);

        let rows = vec![
            scenario.entry(&row_list, "R1", 1),
            scenario.entry(&row_list, "R2", 2),
        ];
        let column = scenario.entry(&column_list, "C1", 1);

        let line = scenario.study_line(&study, &question_line);
        for entry in &rows {
            scenario.place(&study, &line, entry, Placement::Row);
        }
        scenario.place(&study, &line, &column, Placement::Column);
        scenario.line_subset(&line, &row_list, SubsetSelection::FullList);
        scenario.line_subset(&line, &column_list, SubsetSelection::FullList);

        FullListScenario {
            scenario,
            study,
            question_line,
            line,
            row_list,
            column_list,
            rows,
            column,
        }
    }

    /// A Draft study built from a placement grid (see
    /// [`generators::arb_placement_grid`]). Every entry comes from one list.
    #[derive(Debug, Clone)]
    pub struct StudyGrid {
        pub scenario: Scenario,
        pub study: Study,
        pub list: ReferenceList,
        pub lines: Vec<StudyQuestionLine>,
        pub entries: Vec<ReferenceListEntry>,
        /// `(line index, entry index, association)` for every filled cell.
        pub placed: Vec<(usize, usize, QuestionLineReferenceListEntry)>,
        pub study_entries: BTreeMap<ReferenceListEntryId, StudyReferenceListEntry>,
    }

    pub fn study_grid(grid: &[Vec<Option<Placement>>]) -> StudyGrid {
        let scenario = Scenario::new();
        let study = scenario.study("Grid", StudyStatus::Draft);
        let list = scenario.reference_list("Grid list");
        let width = grid.first().map(Vec::len).unwrap_or(0);
        let entries: Vec<ReferenceListEntry> = (0..width)
            .map(|i| scenario.entry(&list, &format!("E{i}"), i as i32))
            .collect();

        let mut lines = Vec::new();
        let mut placed = Vec::new();
        let mut study_entries = BTreeMap::new();
        for (l, row) in grid.iter().enumerate() {
            let question_line = scenario.question_line(&format!("Q{l}"));
            let line = scenario.study_line(&study, &question_line);
            for (e, cell) in row.iter().enumerate() {
                if let Some(placement) = cell {
                    let (study_entry, association) =
                        scenario.place(&study, &line, &entries[e], *placement);
                    study_entries.insert(study_entry.reference_list_entry_id, study_entry);
                    placed.push((l, e, association));
                }
            }
            lines.push(line);
        }

        StudyGrid {
            scenario,
            study,
            list,
            lines,
            entries,
            placed,
            study_entries,
        }
    }

    /// Default engine configuration.
    pub fn default_config() -> SyncConfig {
        SyncConfig::default()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for RUBRIC-specific validation.

    use super::*;

    /// Assert that a RubricResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RubricResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a RubricResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &RubricResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a RubricResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &RubricResult<T>) {
        match result {
            Err(RubricError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a RubricResult is a store outage.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &RubricResult<T>) {
        match result {
            Err(RubricError::Storage(StorageError::Unavailable { .. })) => {}
            other => panic!("Expected Unavailable storage error, got: {:?}", other),
        }
    }

    /// Assert that a RubricResult is a partial failure with `failed` items.
    #[track_caller]
    pub fn assert_partial_failure<T: std::fmt::Debug>(result: &RubricResult<T>, failed: usize) {
        match result {
            Err(RubricError::Sync(SyncError::PartialFailure { failed: f, .. })) => {
                assert_eq!(*f, failed, "Wrong failure count in PartialFailure");
            }
            other => panic!("Expected PartialFailure, got: {:?}", other),
        }
    }

    /// Assert that a RubricResult is an unresolved-reference failure.
    #[track_caller]
    pub fn assert_missing_reference<T: std::fmt::Debug>(result: &RubricResult<T>, key: RecordKey) {
        match result {
            Err(RubricError::Sync(SyncError::MissingReference { key: k, .. })) => {
                assert_eq!(*k, key, "Wrong key in MissingReference");
            }
            other => panic!("Expected MissingReference for {key}, got: {:?}", other),
        }
    }

    /// Assert the lifecycle state of a stored record.
    #[track_caller]
    pub fn assert_state(store: &MockStore, key: RecordKey, expected: LifecycleState) {
        let actual = store
            .get(key)
            .expect("get")
            .and_then(|r| r.state());
        assert_eq!(actual, Some(expected), "Unexpected state for {key}");
    }
}
