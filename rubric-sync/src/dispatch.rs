//! Trigger Dispatch Adapter
//!
//! Boundary between the host's mutation triggers and the orchestrator. The
//! host hands over `(operation, before?, after?, depth)` for one record; the
//! adapter checks the event, fills in a missing after-image with a fresh
//! read, rejects creates and updates whose parents do not resolve, routes it
//! by record kind, and turns per-item failures into a single
//! error so the host can abort the triggering transaction.

use crate::guard::RecursionGuard;
use crate::orchestrator::{Orchestrator, SkipReason, SyncOutcome};
use rubric_core::{
    LifecycleState, Operation, QuestionLineReferenceListEntry, RecordKey, RubricResult,
    StudyQuestionLine, StudyReferenceListEntry, SyncError,
};
use rubric_storage::{ChangeEntry, ChangeJournal, Record, StoredRecord};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ============================================================================
// EVENT
// ============================================================================

fn default_depth() -> u32 {
    1
}

/// One observed mutation, as the host reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub operation: Operation,
    pub target: RecordKey,
    #[serde(default)]
    pub before: Option<Record>,
    #[serde(default)]
    pub after: Option<Record>,
    /// Host invocation depth; 1 is a direct user mutation.
    #[serde(default = "default_depth")]
    pub depth: u32,
}

impl MutationEvent {
    pub fn new(operation: Operation, target: RecordKey) -> Self {
        Self {
            operation,
            target,
            before: None,
            after: None,
            depth: default_depth(),
        }
    }

    pub fn with_before(mut self, before: impl Into<Record>) -> Self {
        self.before = Some(before.into());
        self
    }

    pub fn with_after(mut self, after: impl Into<Record>) -> Self {
        self.after = Some(after.into());
        self
    }

    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Parse a host payload.
    pub fn from_json(payload: &str) -> RubricResult<Self> {
        let event: Self = serde_json::from_str(payload).map_err(|e| SyncError::InvalidEvent {
            reason: e.to_string(),
        })?;
        event.validate()?;
        Ok(event)
    }

    /// Event for a mutation recorded in a change journal.
    pub fn from_change(change: ChangeEntry, depth: u32) -> Self {
        Self {
            operation: change.operation,
            target: change.key,
            before: change.before,
            after: change.after,
            depth,
        }
    }

    /// Snapshots must describe the target record.
    pub fn validate(&self) -> RubricResult<()> {
        if self.depth == 0 {
            return Err(SyncError::InvalidEvent {
                reason: "depth starts at 1".to_string(),
            }
            .into());
        }
        let mismatched = [&self.before, &self.after]
            .into_iter()
            .flatten()
            .any(|r| r.key() != self.target);
        if mismatched {
            return Err(SyncError::SnapshotMismatch {
                target: self.target,
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// One handled event in a trigger chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub event: MutationEvent,
    pub outcome: SyncOutcome,
}

pub struct TriggerDispatcher {
    orchestrator: Orchestrator,
}

impl TriggerDispatcher {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Handle one host event with a fresh guard at the event's depth.
    pub fn dispatch(&self, event: &MutationEvent) -> RubricResult<SyncOutcome> {
        let mut guard =
            RecursionGuard::at_depth(event.depth, self.orchestrator.config().max_trigger_depth);
        self.dispatch_with_guard(event, &mut guard)
    }

    /// Handle one event under an existing guard. Partial failures come back
    /// as `SyncError::PartialFailure`.
    pub fn dispatch_with_guard(
        &self,
        event: &MutationEvent,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        event.validate()?;
        if !guard.admits() {
            tracing::debug!(
                operation = %event.operation,
                record = %event.target,
                depth = guard.depth(),
                "nested trigger skipped"
            );
            return Ok(SyncOutcome::skipped(SkipReason::DepthExceeded {
                depth: guard.depth(),
                max_depth: guard.max_depth(),
            }));
        }

        let Some(subject) = self.subject(event)? else {
            tracing::debug!(record = %event.target, "no snapshot and nothing to read");
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: event.target,
            }));
        };
        if references_nil(&subject) {
            tracing::debug!(record = %event.target, "record lacks a required reference");
            return Ok(SyncOutcome::skipped(SkipReason::IncompleteRecord {
                key: event.target,
            }));
        }

        if event.operation != Operation::Delete {
            if let Some(key) = self.unresolved_parent(&subject)? {
                tracing::warn!(record = %event.target, missing = %key, "declared reference not found");
                return Err(SyncError::MissingReference {
                    key,
                    referenced_by: event.target,
                }
                .into());
            }
        }

        tracing::debug!(
            operation = %event.operation,
            record = %event.target,
            depth = guard.depth(),
            "dispatching"
        );
        let outcome = self.route(event, subject, guard)?;

        if let Some(SkipReason::MissingRecord { key }) = &outcome.skipped {
            if event.operation != Operation::Delete && *key != event.target {
                return Err(SyncError::MissingReference {
                    key: *key,
                    referenced_by: event.target,
                }
                .into());
            }
        }
        outcome.into_result()
    }

    /// Dispatch `root`, then every mutation the engine's own writes recorded
    /// in `journal`, one level deeper each time, until nothing new is
    /// written. The journal should be drained before calling.
    pub fn dispatch_chain(
        &self,
        root: &MutationEvent,
        journal: &dyn ChangeJournal,
    ) -> RubricResult<Vec<ChainStep>> {
        let max_depth = self.orchestrator.config().max_trigger_depth;
        let mut queue = VecDeque::from([(
            root.clone(),
            RecursionGuard::at_depth(root.depth, max_depth),
        )]);
        let mut steps = Vec::new();

        while let Some((event, mut guard)) = queue.pop_front() {
            let outcome = self.dispatch_with_guard(&event, &mut guard)?;
            for change in journal.drain()? {
                let nested = guard.descend();
                queue.push_back((MutationEvent::from_change(change, nested.depth()), nested));
            }
            steps.push(ChainStep { event, outcome });
        }

        tracing::info!(
            record = %root.target,
            events = steps.len(),
            skipped = steps.iter().filter(|s| s.outcome.is_skipped()).count(),
            "trigger chain settled"
        );
        Ok(steps)
    }

    /// The record the event is about. Deletes use the before-image, every
    /// other operation the after-image, read fresh when the host left it out.
    fn subject(&self, event: &MutationEvent) -> RubricResult<Option<Record>> {
        let snapshot = match event.operation {
            Operation::Delete => event.before.clone(),
            Operation::Create | Operation::Update => event.after.clone(),
        };
        match snapshot {
            Some(record) => Ok(Some(record)),
            None => self.orchestrator.store().get(event.target),
        }
    }

    /// First parent the record declares that is not in the store.
    fn unresolved_parent(&self, record: &Record) -> RubricResult<Option<RecordKey>> {
        let store = self.orchestrator.store();
        for parent in record.parents() {
            let key = parent.key();
            if store.get(key)?.is_none() {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn route(
        &self,
        event: &MutationEvent,
        subject: Record,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        let orch = &self.orchestrator;
        let deleting = event.operation == Operation::Delete;

        match subject {
            Record::Study(study) if !deleting => {
                orch.rebuild_study_subset_summary(study.study_id, guard)
            }
            Record::QuestionLine(question_line) if !deleting => {
                orch.rebuild_question_line_summary(question_line.question_line_id, guard)
            }
            Record::Study(_) | Record::QuestionLine(_) => {
                Ok(SyncOutcome::skipped(SkipReason::NotApplicable))
            }
            Record::Answer(answer) => {
                orch.reference_membership_changed(answer.question_line_id, guard)
            }
            Record::ReferenceList(list) => {
                if event.operation == Operation::Create {
                    return Ok(SyncOutcome::skipped(SkipReason::NotApplicable));
                }
                orch.reference_list_changed(list.reference_list_id, guard)
            }
            Record::ReferenceListEntry(entry) => {
                orch.reference_list_changed(entry.reference_list_id, guard)
            }
            Record::QuestionLineReferenceList(attachment) => {
                orch.reference_membership_changed(attachment.question_line_id, guard)
            }
            Record::StudyQuestionLine(line) => {
                if deleting {
                    let gone = removed(&line);
                    return orch.study_question_line_transitioned(Some(&line), &gone, guard);
                }
                let before = typed_before::<StudyQuestionLine>(event)?;
                orch.study_question_line_transitioned(before.as_ref(), &line, guard)
            }
            Record::StudyReferenceListEntry(entry) => {
                if deleting {
                    return orch.study_reference_list_entry_removed(&entry, guard);
                }
                let before = typed_before::<StudyReferenceListEntry>(event)?;
                orch.study_reference_list_entry_transitioned(before.as_ref(), &entry, guard)
            }
            Record::QuestionLineReferenceListEntry(placed) => {
                if deleting {
                    return orch.question_line_reference_list_entry_removed(&placed, guard);
                }
                let before = typed_before::<QuestionLineReferenceListEntry>(event)?;
                orch.question_line_reference_list_entry_transitioned(before.as_ref(), &placed, guard)
            }
            Record::SubsetDefinition(definition) => {
                if deleting {
                    return orch.subset_definition_deleting(definition.subset_definition_id, guard);
                }
                orch.subset_definition_changed(definition.subset_definition_id, guard)
            }
            Record::SubsetMember(member) => {
                orch.subset_member_changed(member.subset_definition_id, guard)
            }
            Record::StudySubsetDefinition(attached) => {
                orch.study_subset_definition_changed(attached.study_id, guard)
            }
            Record::QuestionLineSubset(selection) => {
                orch.question_line_subset_changed(selection.study_question_line_id, guard)
            }
        }
    }
}

fn typed_before<T: StoredRecord>(event: &MutationEvent) -> RubricResult<Option<T>> {
    match &event.before {
        None => Ok(None),
        Some(record) => T::from_record(record.clone()).map(Some).ok_or_else(|| {
            SyncError::SnapshotMismatch {
                target: event.target,
            }
            .into()
        }),
    }
}

fn removed(line: &StudyQuestionLine) -> StudyQuestionLine {
    StudyQuestionLine {
        state: LifecycleState::Inactive,
        ..line.clone()
    }
}

/// A parent reference left at the nil id means the host saved the record
/// before filling it in.
fn references_nil(record: &Record) -> bool {
    record.parents().iter().any(|p| p.key().id.is_nil())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rubric_core::{
        EntityIdType, Placement, QuestionLineId, ReferenceListEntryId, RubricError, StudyId,
        StudyStatus, SyncConfig,
    };
    use rubric_storage::{MockStore, RecordStore};
    use rubric_test_utils::fixtures::{full_list_scenario, Scenario};
    use std::sync::Arc;

    fn dispatcher(store: &MockStore) -> TriggerDispatcher {
        let orch = Orchestrator::new(Arc::new(store.clone()), SyncConfig::default())
            .expect("orchestrator");
        TriggerDispatcher::new(orch)
    }

    #[test]
    fn test_from_json_defaults_depth() {
        let id = StudyId::now_v7();
        let payload = format!(
            r#"{{"operation":"Update","target":{{"kind":"Study","id":"{}"}}}}"#,
            id
        );
        let event = MutationEvent::from_json(&payload).expect("parse");
        assert_eq!(event.operation, Operation::Update);
        assert_eq!(event.target, id.key());
        assert_eq!(event.depth, 1);
        assert!(event.before.is_none() && event.after.is_none());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = MutationEvent::from_json("{\"operation\":\"Upsert\"}").unwrap_err();
        assert!(matches!(err, RubricError::Sync(SyncError::InvalidEvent { .. })));
    }

    #[test]
    fn test_snapshot_for_other_record_rejected() {
        let study = rubric_core::Study::new("S", StudyStatus::Draft);
        let event = MutationEvent::new(Operation::Update, StudyId::now_v7().key()).with_after(study);
        assert!(matches!(
            event.validate(),
            Err(RubricError::Sync(SyncError::SnapshotMismatch { .. }))
        ));
    }

    #[test]
    fn test_nested_event_skipped() {
        let fx = full_list_scenario();
        let event = MutationEvent::new(Operation::Update, fx.line.study_question_line_id.key())
            .with_after(fx.line.clone())
            .at_depth(2);
        let outcome = dispatcher(&fx.scenario.store).dispatch(&event).expect("dispatch");
        assert!(matches!(
            outcome.skipped,
            Some(SkipReason::DepthExceeded { depth: 2, max_depth: 1 })
        ));
    }

    #[test]
    fn test_missing_after_image_read_fresh() {
        let fx = full_list_scenario();
        let event = MutationEvent::new(Operation::Update, fx.line.study_question_line_id.key());
        let outcome = dispatcher(&fx.scenario.store).dispatch(&event).expect("dispatch");
        assert!(outcome.skipped.is_none());
        assert_eq!(
            outcome.summaries_written,
            vec![fx.line.study_question_line_id.key()]
        );
    }

    #[test]
    fn test_nil_reference_is_noop() {
        let sc = Scenario::new();
        let orphan = rubric_core::Answer::new(QuestionLineId::nil(), "A", "Answer", 1);
        let event = MutationEvent::new(Operation::Create, orphan.answer_id.key()).with_after(orphan);
        let outcome = dispatcher(&sc.store).dispatch(&event).expect("dispatch");
        assert!(matches!(outcome.skipped, Some(SkipReason::IncompleteRecord { .. })));
    }

    #[test]
    fn test_unresolved_reference_fails_create_but_not_delete() {
        let sc = Scenario::new();
        let ghost = QuestionLineId::now_v7();
        let answer = rubric_core::Answer::new(ghost, "A", "Answer", 1);
        let key = answer.answer_id.key();

        let create = MutationEvent::new(Operation::Create, key).with_after(answer.clone());
        let err = dispatcher(&sc.store).dispatch(&create).unwrap_err();
        assert_eq!(
            err,
            RubricError::Sync(SyncError::MissingReference {
                key: ghost.key(),
                referenced_by: key,
            })
        );

        let delete = MutationEvent::new(Operation::Delete, key).with_before(answer);
        let outcome = dispatcher(&sc.store).dispatch(&delete).expect("delete path");
        assert!(matches!(outcome.skipped, Some(SkipReason::MissingRecord { .. })));
    }

    #[test]
    fn test_study_entry_delete_cascades() {
        let sc = Scenario::new();
        let study = sc.study("S", StudyStatus::Draft);
        let ql = sc.question_line("Q");
        let list = sc.reference_list("Brands");
        let e = sc.entry(&list, "E", 1);
        let line = sc.study_line(&study, &ql);
        let (srle, qlrle) = sc.place(&study, &line, &e, Placement::Row);

        sc.store.delete(srle.study_reference_list_entry_id.key()).expect("delete");
        let event = MutationEvent::new(Operation::Delete, srle.study_reference_list_entry_id.key())
            .with_before(srle);
        let outcome = dispatcher(&sc.store).dispatch(&event).expect("dispatch");
        assert!(outcome
            .cascade
            .deactivated
            .contains(&qlrle.question_line_reference_list_entry_id.key()));
    }

    #[test]
    fn test_partial_failure_surfaces_to_host() {
        let sc = Scenario::new();
        let study = sc.study("S", StudyStatus::Draft);
        let ql = sc.question_line("Q");
        let list = sc.reference_list("Brands");
        let e = sc.entry(&list, "E", 1);
        let a = sc.study_line(&study, &ql);
        let b = sc.study_line(&study, &ql);
        let (srle, on_a) = sc.place(&study, &a, &e, Placement::Row);
        let (_, on_b) = sc.place(&study, &b, &e, Placement::Row);
        sc.store
            .fail_updates_for(on_a.question_line_reference_list_entry_id.key())
            .expect("inject");

        let before = srle.clone();
        let after = sc.deactivate::<StudyReferenceListEntry>(srle.study_reference_list_entry_id);
        let event = MutationEvent::new(Operation::Update, after.study_reference_list_entry_id.key())
            .with_before(before)
            .with_after(after);

        let err = dispatcher(&sc.store).dispatch(&event).unwrap_err();
        assert!(matches!(
            err,
            RubricError::Sync(SyncError::PartialFailure { failed: 1, .. })
        ));
        // The sibling still went through
        let sibling = sc
            .reload::<QuestionLineReferenceListEntry>(on_b.question_line_reference_list_entry_id)
            .expect("sibling");
        assert_eq!(sibling.state, LifecycleState::Inactive);
    }

    #[test]
    fn test_unplaced_study_entry_writes_nothing() {
        let fx = full_list_scenario();
        let spare = fx.scenario.entry(&fx.row_list, "R9", 9);
        let entry = StudyReferenceListEntry::new(fx.study.study_id, spare.reference_list_entry_id);
        let event = MutationEvent::new(Operation::Create, entry.study_reference_list_entry_id.key())
            .with_after(entry);
        let outcome = dispatcher(&fx.scenario.store).dispatch(&event).expect("dispatch");
        assert!(outcome.summaries_written.is_empty());
    }

    #[test]
    fn test_study_entry_for_unknown_entry_fails_create() {
        let fx = full_list_scenario();
        let ghost = ReferenceListEntryId::now_v7();
        let entry = StudyReferenceListEntry::new(fx.study.study_id, ghost);
        let key = entry.study_reference_list_entry_id.key();
        let event = MutationEvent::new(Operation::Create, key).with_after(entry);
        let err = dispatcher(&fx.scenario.store).dispatch(&event).unwrap_err();
        assert_eq!(
            err,
            RubricError::Sync(SyncError::MissingReference {
                key: ghost.key(),
                referenced_by: key,
            })
        );
    }
}
