//! End-to-end scenarios through the orchestrator.

use rubric_core::{
    EntityIdType, LifecycleState, Placement, QuestionLineReferenceListEntry, QuestionLineSubset,
    Study, StudyQuestionLine, StudyReferenceListEntry, StudyStatus, SubsetSelection, SyncConfig,
};
use rubric_storage::RecordStoreExt;
use rubric_sync::{Orchestrator, RecursionGuard, SubsetResolver};
use rubric_test_utils::assertions::{assert_ok, assert_state};
use rubric_test_utils::fixtures::{full_list_scenario, Scenario};
use std::sync::Arc;

fn orchestrator(scenario: &Scenario) -> Orchestrator {
    Orchestrator::new(Arc::new(scenario.store.clone()), SyncConfig::default())
        .expect("orchestrator")
}

fn top() -> RecursionGuard {
    RecursionGuard::top_level(1)
}

fn study_summary(scenario: &Scenario, study: &Study) -> String {
    scenario
        .store
        .fetch::<Study>(study.study_id)
        .expect("fetch")
        .expect("study")
        .subset_summary
}

// ============================================================================
// FULL LIST
// ============================================================================

#[test]
fn test_full_list_resolves_two_rows_one_column() {
    let fx = full_list_scenario();
    let resolved = SubsetResolver::new(rubric_storage::AssociationReader::new(&fx.scenario.store))
        .resolve(fx.study.study_id, fx.line.study_question_line_id)
        .expect("resolve");

    assert_eq!(resolved.rows.len(), 2);
    assert_eq!(resolved.columns.len(), 1);
    let rows: Vec<_> = resolved.rows.iter().map(|e| e.entry_id()).collect();
    let expected: Vec<_> = fx.rows.iter().map(|e| e.reference_list_entry_id).collect();
    assert_eq!(rows, expected);
    assert_eq!(resolved.columns[0].entry_id(), fx.column.reference_list_entry_id);
}

#[test]
fn test_full_list_line_summary_written_once() {
    let fx = full_list_scenario();
    let orch = orchestrator(&fx.scenario);

    let outcome = orch
        .reference_membership_changed(fx.question_line.question_line_id, &mut top())
        .expect("membership");
    // Answer summary and the draft line's subset summary
    assert_eq!(outcome.summaries_written.len(), 2);

    let line = fx
        .scenario
        .reload::<StudyQuestionLine>(fx.line.study_question_line_id)
        .expect("line");
    for code in ["R1", "R2", "C1"] {
        assert!(line.subset_summary.contains(code), "missing {code}");
    }

    let again = orch
        .reference_membership_changed(fx.question_line.question_line_id, &mut top())
        .expect("membership");
    assert!(again.summaries_written.is_empty());
}

// ============================================================================
// SUBSET DELETION
// ============================================================================

#[test]
fn test_subset_deletion_falls_back_and_clears_listing() {
    let sc = Scenario::new();
    let list = sc.reference_list("Brands");
    let a = sc.entry(&list, "A", 1);
    let b = sc.entry(&list, "B", 2);
    let only = sc.study("Only D", StudyStatus::Draft);
    let other = sc.study("Other", StudyStatus::Draft);
    let d = sc.subset_definition(&list, "D");
    let keep = sc.subset_definition(&list, "Keep");
    sc.subset_member(&d, &a);
    sc.subset_member(&keep, &b);

    let q = sc.question_line("Q");
    let line1 = sc.study_line(&only, &q);
    let line2 = sc.study_line(&other, &q);
    sc.place(&only, &line1, &a, Placement::Row);
    sc.place(&only, &line1, &b, Placement::Row);
    sc.place(&other, &line2, &a, Placement::Row);
    sc.place(&other, &line2, &b, Placement::Row);

    sc.study_subset(&only, &d);
    sc.study_subset(&other, &d);
    sc.study_subset(&other, &keep);
    let row1 = sc.line_subset(&line1, &list, SubsetSelection::Subset(d.subset_definition_id));
    let row2 = sc.line_subset(&line2, &list, SubsetSelection::Subset(d.subset_definition_id));
    let q2 = sc.question_line("Q2");
    let line3 = sc.study_line(&other, &q2);
    sc.place(&other, &line3, &b, Placement::Row);
    sc.line_subset(&line3, &list, SubsetSelection::Subset(keep.subset_definition_id));

    let orch = orchestrator(&sc);
    orch.subset_definition_changed(d.subset_definition_id, &mut top())
        .expect("initial listing");
    orch.subset_definition_changed(keep.subset_definition_id, &mut top())
        .expect("initial listing");
    assert!(study_summary(&sc, &only).contains("<h4>D</h4>"));

    let outcome = orch
        .subset_definition_deleting(d.subset_definition_id, &mut top())
        .expect("delete");
    assert_eq!(outcome.records_updated.len(), 2);

    for row in [row1, row2] {
        let stored = sc
            .reload::<QuestionLineSubset>(row.question_line_subset_id)
            .expect("row");
        assert_eq!(stored.selection, SubsetSelection::FullList);
    }
    assert_eq!(study_summary(&sc, &only), "");

    let remaining = study_summary(&sc, &other);
    assert!(remaining.contains("<h4>Keep</h4>"));
    assert!(!remaining.contains("<h4>D</h4>"));

    // Line summaries now show the whole placed list again
    let line1 = sc
        .reload::<StudyQuestionLine>(line1.study_question_line_id)
        .expect("line");
    assert!(line1.subset_summary.contains("<td>B</td>"));
}

// ============================================================================
// CASCADE
// ============================================================================

struct SharedEntry {
    sc: Scenario,
    study: Study,
    study_entry: StudyReferenceListEntry,
    first: QuestionLineReferenceListEntry,
    second: QuestionLineReferenceListEntry,
}

fn shared_entry() -> SharedEntry {
    let sc = Scenario::new();
    let study = sc.study("S", StudyStatus::Draft);
    let list = sc.reference_list("Brands");
    let e = sc.entry(&list, "E", 1);
    let line1 = sc.study_line(&study, &sc.question_line("Q1"));
    let line2 = sc.study_line(&study, &sc.question_line("Q2"));
    let (study_entry, first) = sc.place(&study, &line1, &e, Placement::Row);
    let (_, second) = sc.place(&study, &line2, &e, Placement::Row);
    SharedEntry {
        sc,
        study,
        study_entry,
        first,
        second,
    }
}

#[test]
fn test_study_entry_deactivation_reaches_both_lines() {
    let fx = shared_entry();
    let before = fx.study_entry.clone();
    let after = fx
        .sc
        .deactivate::<StudyReferenceListEntry>(fx.study_entry.study_reference_list_entry_id);

    let result = orchestrator(&fx.sc)
        .study_reference_list_entry_transitioned(Some(&before), &after, &mut top());
    assert_ok(&result);
    let outcome = result.expect("cascade");
    assert_eq!(outcome.cascade.deactivated.len(), 2);
    assert!(outcome.cascade.studies_touched.contains(&fx.study.study_id));

    for placed in [&fx.first, &fx.second] {
        assert_state(
            &fx.sc.store,
            placed.question_line_reference_list_entry_id.key(),
            LifecycleState::Inactive,
        );
    }
}

#[test]
fn test_one_line_entry_gone_keeps_study_entry() {
    let fx = shared_entry();
    let before = fx.first.clone();
    let after = fx
        .sc
        .deactivate::<QuestionLineReferenceListEntry>(fx.first.question_line_reference_list_entry_id);

    orchestrator(&fx.sc)
        .question_line_reference_list_entry_transitioned(Some(&before), &after, &mut top())
        .expect("transition");

    assert_state(
        &fx.sc.store,
        fx.study_entry.study_reference_list_entry_id.key(),
        LifecycleState::Active,
    );
    assert_state(
        &fx.sc.store,
        fx.second.question_line_reference_list_entry_id.key(),
        LifecycleState::Active,
    );
}

#[test]
fn test_both_line_entries_gone_releases_study_entry() {
    let fx = shared_entry();
    let orch = orchestrator(&fx.sc);
    for placed in [&fx.first, &fx.second] {
        let after = fx
            .sc
            .deactivate::<QuestionLineReferenceListEntry>(placed.question_line_reference_list_entry_id);
        orch.question_line_reference_list_entry_transitioned(Some(placed), &after, &mut top())
            .expect("transition");
    }
    assert_state(
        &fx.sc.store,
        fx.study_entry.study_reference_list_entry_id.key(),
        LifecycleState::Inactive,
    );
}

#[test]
fn test_line_deactivation_rebuilds_study_listing() {
    let sc = Scenario::new();
    let study = sc.study("S", StudyStatus::Draft);
    let list = sc.reference_list("Brands");
    let a = sc.entry(&list, "A", 1);
    let line = sc.study_line(&study, &sc.question_line("Q"));
    sc.place(&study, &line, &a, Placement::Row);
    let d = sc.subset_definition(&list, "D");
    sc.subset_member(&d, &a);
    sc.study_subset(&study, &d);
    sc.line_subset(&line, &list, SubsetSelection::Subset(d.subset_definition_id));

    let orch = orchestrator(&sc);
    orch.rebuild_study_subset_summary(study.study_id, &mut top())
        .expect("listing");
    assert!(study_summary(&sc, &study).contains("<h4>D</h4>"));

    // The only line selecting D goes away, so D drops out of the listing
    let after = sc.deactivate::<StudyQuestionLine>(line.study_question_line_id);
    let outcome = orch
        .study_question_line_transitioned(Some(&line), &after, &mut top())
        .expect("cascade");

    assert!(outcome.summaries_written.contains(&study.study_id.key()));
    assert_eq!(study_summary(&sc, &study), "");
}
