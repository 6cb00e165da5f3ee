//! Property-Based Tests for Summary Synchronization
//!
//! **Property 1: Idempotence**
//! Rebuilding a summary twice against unchanged state writes once, and the
//! stored text is byte-identical afterwards.
//!
//! **Property 2: Empty Input**
//! A study with no active subset definition in effect has an empty-string
//! subset summary.
//!
//! **Property 3: Full-List Fallback**
//! After a subset definition is deleted, no line subset row still points at
//! it.
//!
//! **Property 4: Cascade Completeness**
//! Deactivating a study question line deactivates every association under
//! it, and exactly the study entries left unreferenced in the study.
//!
//! **Property 5: Placement Partition**
//! Resolved rows and columns are disjoint and together equal the active
//! associations at each placement.

use proptest::prelude::*;
use rubric_core::{
    EntityIdType, LifecycleState, Placement, QuestionLineSubset, ReferenceListEntryId, Study,
    StudyQuestionLine, StudyStatus, SubsetSelection, SyncConfig,
};
use rubric_storage::{AssociationReader, RecordStoreExt};
use rubric_sync::{CascadeSynchronizer, Orchestrator, RecursionGuard, SubsetResolver};
use rubric_test_utils::fixtures::{study_grid, Scenario, StudyGrid};
use rubric_test_utils::generators::{arb_label, arb_placement_grid};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// HELPERS
// ============================================================================

fn orchestrator(scenario: &Scenario) -> Orchestrator {
    Orchestrator::new(Arc::new(scenario.store.clone()), SyncConfig::default())
        .expect("orchestrator")
}

fn top() -> RecursionGuard {
    RecursionGuard::top_level(1)
}

fn stored_line(grid: &StudyGrid, index: usize) -> StudyQuestionLine {
    grid.scenario
        .store
        .fetch::<StudyQuestionLine>(grid.lines[index].study_question_line_id)
        .expect("fetch")
        .expect("line")
}

fn stored_study(scenario: &Scenario, study: &Study) -> Study {
    scenario
        .store
        .fetch::<Study>(study.study_id)
        .expect("fetch")
        .expect("study")
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// **Property 1: Idempotence**
    #[test]
    fn prop_line_rebuild_idempotent(grid in arb_placement_grid()) {
        let built = study_grid(&grid);
        let orch = orchestrator(&built.scenario);

        for (index, line) in built.lines.iter().enumerate() {
            let id = line.study_question_line_id;
            orch.rebuild_study_question_line_summary(id, &mut top()).expect("first");
            let first = stored_line(&built, index).subset_summary;

            let again = orch.rebuild_study_question_line_summary(id, &mut top()).expect("second");
            prop_assert!(again.summaries_written.is_empty());
            prop_assert_eq!(again.summaries_unchanged, 1);
            prop_assert_eq!(stored_line(&built, index).subset_summary, first);
        }
    }

    /// **Property 1: Idempotence** (study listing, arbitrary label text)
    #[test]
    fn prop_study_rebuild_idempotent(labels in prop::collection::vec(arb_label(), 1..5)) {
        let sc = Scenario::new();
        let study = sc.study("S", StudyStatus::Draft);
        let ql = sc.question_line("Q");
        let list = sc.reference_list("L");
        let line = sc.study_line(&study, &ql);
        let definition = sc.subset_definition(&list, "Picked");
        for (i, label) in labels.iter().enumerate() {
            let entry = sc.labelled_entry(&list, &format!("E{i}"), label, i as i32);
            sc.subset_member(&definition, &entry);
        }
        sc.study_subset(&study, &definition);
        sc.line_subset(&line, &list, SubsetSelection::Subset(definition.subset_definition_id));

        let orch = orchestrator(&sc);
        orch.rebuild_study_subset_summary(study.study_id, &mut top()).expect("first");
        let first = stored_study(&sc, &study).subset_summary;
        prop_assert!(!first.is_empty());

        let again = orch.rebuild_study_subset_summary(study.study_id, &mut top()).expect("second");
        prop_assert!(again.summaries_written.is_empty());
        prop_assert_eq!(stored_study(&sc, &study).subset_summary, first);
    }

    /// **Property 2: Empty Input**
    #[test]
    fn prop_no_definition_in_effect_is_empty(
        grid in arb_placement_grid(),
        attach_inactive in any::<bool>(),
    ) {
        let built = study_grid(&grid);
        let sc = &built.scenario;
        if attach_inactive {
            // Attached but never selected by a line: not in effect
            let definition = sc.subset_definition(&built.list, "Idle");
            sc.subset_member(&definition, &built.entries[0]);
            let attached = sc.study_subset(&built.study, &definition);
            sc.deactivate::<rubric_core::StudySubsetDefinition>(attached.study_subset_definition_id);
        }

        let outcome = orchestrator(sc)
            .rebuild_study_subset_summary(built.study.study_id, &mut top())
            .expect("rebuild");
        prop_assert!(outcome.summaries_written.is_empty());
        prop_assert_eq!(stored_study(sc, &built.study).subset_summary, "");
    }

    /// **Property 3: Full-List Fallback**
    #[test]
    fn prop_definition_delete_falls_back(studies in 1usize..4, lines_per_study in 1usize..4) {
        let sc = Scenario::new();
        let list = sc.reference_list("L");
        let entry = sc.entry(&list, "E", 1);
        let doomed = sc.subset_definition(&list, "Doomed");
        sc.subset_member(&doomed, &entry);

        let mut rows = Vec::new();
        for s in 0..studies {
            let study = sc.study(&format!("S{s}"), StudyStatus::Draft);
            sc.study_subset(&study, &doomed);
            for l in 0..lines_per_study {
                let line = sc.study_line(&study, &sc.question_line(&format!("Q{s}-{l}")));
                sc.place(&study, &line, &entry, Placement::Row);
                rows.push(sc.line_subset(
                    &line,
                    &list,
                    SubsetSelection::Subset(doomed.subset_definition_id),
                ));
            }
        }

        orchestrator(&sc)
            .subset_definition_deleting(doomed.subset_definition_id, &mut top())
            .expect("fallback");

        for row in rows {
            let stored = sc
                .reload::<QuestionLineSubset>(row.question_line_subset_id)
                .expect("row");
            prop_assert_eq!(stored.selection, SubsetSelection::FullList);
            prop_assert!(stored.selection.subset_definition_id().is_none());
        }
        prop_assert!(AssociationReader::new(&sc.store)
            .include_inactive()
            .subsets_selecting(doomed.subset_definition_id)
            .expect("query")
            .is_empty());
    }

    /// **Property 4: Cascade Completeness**
    #[test]
    fn prop_line_cascade_complete(grid in arb_placement_grid(), pick in any::<prop::sample::Index>()) {
        let built = study_grid(&grid);
        let sc = &built.scenario;
        let victim = pick.index(built.lines.len());
        let inactive = sc.deactivate::<StudyQuestionLine>(built.lines[victim].study_question_line_id);

        CascadeSynchronizer::new(&sc.store, true)
            .on_study_question_line_deactivated(&inactive)
            .expect("cascade");

        for (line, _, association) in &built.placed {
            let state = sc.state_of(association.question_line_reference_list_entry_id.key());
            if *line == victim {
                prop_assert_eq!(state, LifecycleState::Inactive);
            } else {
                prop_assert_eq!(state, LifecycleState::Active);
            }
        }

        for (entry_id, study_entry) in &built.study_entries {
            let still_referenced = built
                .placed
                .iter()
                .any(|(line, _, a)| *line != victim && a.reference_list_entry_id == *entry_id);
            let expected = if still_referenced {
                LifecycleState::Active
            } else {
                LifecycleState::Inactive
            };
            prop_assert_eq!(
                sc.state_of(study_entry.study_reference_list_entry_id.key()),
                expected
            );
        }
    }

    /// **Property 5: Placement Partition**
    #[test]
    fn prop_resolved_entries_partition_by_placement(
        grid in arb_placement_grid(),
        drop_mask in prop::collection::vec(any::<bool>(), 24),
    ) {
        let built = study_grid(&grid);
        let sc = &built.scenario;
        for (i, (_, _, association)) in built.placed.iter().enumerate() {
            if drop_mask[i % drop_mask.len()] {
                sc.deactivate::<rubric_core::QuestionLineReferenceListEntry>(
                    association.question_line_reference_list_entry_id,
                );
            }
        }

        let reader = AssociationReader::new(&sc.store);
        for (index, line) in built.lines.iter().enumerate() {
            let resolved = SubsetResolver::new(reader)
                .resolve(built.study.study_id, line.study_question_line_id)
                .expect("resolve");

            prop_assert!(resolved.rows.iter().all(|e| e.placement() == Placement::Row));
            prop_assert!(resolved.columns.iter().all(|e| e.placement() == Placement::Column));

            for placement in [Placement::Row, Placement::Column] {
                let got: BTreeSet<ReferenceListEntryId> =
                    resolved.at(placement).iter().map(|e| e.entry_id()).collect();
                let expected: BTreeSet<ReferenceListEntryId> = built
                    .placed
                    .iter()
                    .filter(|(l, _, a)| *l == index && a.placement == placement)
                    .filter(|(_, _, a)| {
                        sc.state_of(a.question_line_reference_list_entry_id.key()).is_active()
                    })
                    .map(|(_, _, a)| a.reference_list_entry_id)
                    .collect();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
