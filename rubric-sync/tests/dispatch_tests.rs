//! Trigger dispatch: host events, trigger chains and the recursion guard.

use rubric_core::{
    EntityIdType, Operation, Placement, QuestionLineSubset, StudyId, StudyReferenceListEntry,
    StudyStatus, StudySubsetDefinition, SubsetDefinitionId, SubsetMember, SubsetSelection,
    SyncConfig,
};
use rubric_storage::{ChangeJournal, RecordStore};
use rubric_sync::{MutationEvent, Orchestrator, SkipReason, TriggerDispatcher};
use rubric_test_utils::assertions::{assert_missing_reference, assert_unavailable};
use rubric_test_utils::fixtures::{full_list_scenario, Scenario};
use std::sync::Arc;

fn dispatcher_with(scenario: &Scenario, config: SyncConfig) -> TriggerDispatcher {
    let orch = Orchestrator::new(Arc::new(scenario.store.clone()), config).expect("orchestrator");
    TriggerDispatcher::new(orch)
}

fn dispatcher(scenario: &Scenario) -> TriggerDispatcher {
    dispatcher_with(scenario, SyncConfig::default())
}

#[test]
fn test_summary_writes_raise_nested_events_that_are_skipped() {
    let fx = full_list_scenario();
    let answer = fx.scenario.answer(&fx.question_line, "DK", "Don't know", 99);
    let root = MutationEvent::new(Operation::Create, answer.answer_id.key()).with_after(answer);

    let steps = dispatcher(&fx.scenario)
        .dispatch_chain(&root, fx.scenario.store.journal())
        .expect("chain");

    // Root plus one nested event per summary the root wrote
    let written = steps[0].outcome.summaries_written.len();
    assert_eq!(written, 2);
    assert_eq!(steps.len(), 1 + written);
    for nested in &steps[1..] {
        assert_eq!(nested.event.depth, 2);
        assert_eq!(
            nested.outcome.skipped,
            Some(SkipReason::DepthExceeded { depth: 2, max_depth: 1 })
        );
    }
    assert!(fx.scenario.store.journal().drain().expect("drain").is_empty());
}

#[test]
fn test_cascade_chain_settles_with_deeper_ceiling() {
    let sc = Scenario::new();
    let study = sc.study("S", StudyStatus::Draft);
    let list = sc.reference_list("Brands");
    let e = sc.entry(&list, "E", 1);
    let line1 = sc.study_line(&study, &sc.question_line("Q1"));
    let line2 = sc.study_line(&study, &sc.question_line("Q2"));
    let (study_entry, _) = sc.place(&study, &line1, &e, Placement::Row);
    sc.place(&study, &line2, &e, Placement::Row);

    let before = study_entry.clone();
    let after = sc.deactivate::<StudyReferenceListEntry>(study_entry.study_reference_list_entry_id);
    let root = MutationEvent::new(Operation::Update, after.study_reference_list_entry_id.key())
        .with_before(before)
        .with_after(after);

    let config = SyncConfig {
        max_trigger_depth: 2,
        ..SyncConfig::default()
    };
    let steps = dispatcher_with(&sc, config)
        .dispatch_chain(&root, sc.store.journal())
        .expect("chain");

    assert_eq!(steps[0].outcome.cascade.deactivated.len(), 2);
    // Nested line-entry events run at depth 2 but find nothing left to do
    let nested: Vec<_> = steps.iter().filter(|s| s.event.depth == 2).collect();
    assert_eq!(nested.len(), 2);
    assert!(nested.iter().all(|s| !s.outcome.is_skipped()));
    assert!(nested.iter().all(|s| s.outcome.summaries_written.is_empty()));
    assert!(steps.iter().all(|s| s.event.depth <= 2));
}

#[test]
fn test_json_payload_dispatches() {
    let fx = full_list_scenario();
    let payload = serde_json::to_string(
        &MutationEvent::new(Operation::Update, fx.line.study_question_line_id.key())
            .with_after(fx.line.clone()),
    )
    .expect("serialize");

    let event = MutationEvent::from_json(&payload).expect("parse");
    let outcome = dispatcher(&fx.scenario).dispatch(&event).expect("dispatch");
    assert_eq!(
        outcome.summaries_written,
        vec![fx.line.study_question_line_id.key()]
    );
}

#[test]
fn test_definition_delete_event_falls_back() {
    let sc = Scenario::new();
    let study = sc.study("S", StudyStatus::Draft);
    let list = sc.reference_list("Brands");
    let e = sc.entry(&list, "E", 1);
    let line = sc.study_line(&study, &sc.question_line("Q"));
    sc.place(&study, &line, &e, Placement::Row);
    let d = sc.subset_definition(&list, "D");
    sc.study_subset(&study, &d);
    let row = sc.line_subset(&line, &list, SubsetSelection::Subset(d.subset_definition_id));

    let event = MutationEvent::new(Operation::Delete, d.subset_definition_id.key()).with_before(d);
    dispatcher(&sc).dispatch(&event).expect("dispatch");

    let stored = sc
        .reload::<QuestionLineSubset>(row.question_line_subset_id)
        .expect("row");
    assert_eq!(stored.selection, SubsetSelection::FullList);
}

#[test]
fn test_line_for_missing_study_is_a_hard_failure() {
    let sc = Scenario::new();
    let ghost = rubric_core::Study::new("Never saved", StudyStatus::Draft);
    let q = sc.question_line("Q");
    let line = rubric_core::StudyQuestionLine::new(ghost.study_id, q.question_line_id, 1);
    sc.store.insert(line.clone().into()).expect("insert");
    sc.settle();

    let event = MutationEvent::new(Operation::Update, line.study_question_line_id.key())
        .with_after(line);
    let result = dispatcher(&sc).dispatch(&event);
    assert_missing_reference(&result, ghost.study_id.key());
}

#[test]
fn test_study_attachment_for_missing_study_is_a_hard_failure() {
    let sc = Scenario::new();
    let list = sc.reference_list("Brands");
    let d = sc.subset_definition(&list, "D");
    let ghost = StudyId::now_v7();
    let attached = StudySubsetDefinition::new(ghost, d.subset_definition_id);

    let event = MutationEvent::new(Operation::Create, attached.study_subset_definition_id.key())
        .with_after(attached);
    assert_missing_reference(&dispatcher(&sc).dispatch(&event), ghost.key());
}

#[test]
fn test_member_of_missing_definition_is_a_hard_failure() {
    let sc = Scenario::new();
    let list = sc.reference_list("Brands");
    let e = sc.entry(&list, "E", 1);
    let ghost = SubsetDefinitionId::now_v7();
    let member = SubsetMember::new(ghost, e.reference_list_entry_id);

    let event = MutationEvent::new(Operation::Create, member.subset_member_id.key())
        .with_after(member);
    assert_missing_reference(&dispatcher(&sc).dispatch(&event), ghost.key());
}

#[test]
fn test_study_entry_for_missing_study_is_a_hard_failure() {
    let sc = Scenario::new();
    let list = sc.reference_list("Brands");
    let e = sc.entry(&list, "E", 1);
    let ghost = StudyId::now_v7();
    let entry = StudyReferenceListEntry::new(ghost, e.reference_list_entry_id);

    let event = MutationEvent::new(Operation::Update, entry.study_reference_list_entry_id.key())
        .with_after(entry);
    assert_missing_reference(&dispatcher(&sc).dispatch(&event), ghost.key());
}

#[test]
fn test_delete_with_missing_parent_is_not_a_failure() {
    let sc = Scenario::new();
    let list = sc.reference_list("Brands");
    let d = sc.subset_definition(&list, "D");
    let ghost = StudyId::now_v7();
    let attached = StudySubsetDefinition::new(ghost, d.subset_definition_id);

    let event = MutationEvent::new(Operation::Delete, attached.study_subset_definition_id.key())
        .with_before(attached);
    let outcome = dispatcher(&sc).dispatch(&event).expect("delete path");
    assert_eq!(
        outcome.skipped,
        Some(SkipReason::MissingRecord { key: ghost.key() })
    );
}

#[test]
fn test_store_outage_aborts() {
    let fx = full_list_scenario();
    fx.scenario.store.set_unavailable(true);
    let event = MutationEvent::new(Operation::Update, fx.study.study_id.key())
        .with_after(fx.study.clone());
    assert_unavailable(&dispatcher(&fx.scenario).dispatch(&event));
}
