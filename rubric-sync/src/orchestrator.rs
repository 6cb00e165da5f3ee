//! Derived-View Orchestrator.
//!
//! One entry point per observed mutation class. Every entry point checks the
//! recursion guard first, gathers the cached fields it must rebuild, renders
//! them, and writes only the ones whose text changed: one plain update for a
//! single record, one continue-on-error batch for several. Lifecycle
//! transitions go through the cascade first and then rebuild whatever it
//! touched. Re-running an entry point against unchanged store state writes
//! nothing.
//!
//! Concurrent invocations against the same study are not serialized here.
//! Cached summaries resolve last-write-wins at the store.

use crate::cascade::{CascadeReport, CascadeSynchronizer};
use crate::guard::RecursionGuard;
use crate::views::SummaryBuilder;
use rubric_core::{
    EntityIdType, EntityKind, QuestionLine, QuestionLineId, QuestionLineReferenceList,
    QuestionLineReferenceListEntry,
    RecordKey, ReferenceListEntryId, ReferenceListId, RubricResult, StorageError, Study, StudyId,
    StudyQuestionLine, StudyQuestionLineId, StudyReferenceListEntry, SubsetDefinitionId,
    SubsetSelection, SyncConfig, SyncError,
};
use rubric_storage::{
    AssociationReader, Batch, FieldChange, ItemStatus, ParentKey, RecordStore, RecordUpdate,
    StoredRecord,
};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// OUTCOME
// ============================================================================

/// Why an invocation did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Invoked deeper in a trigger chain than the configured ceiling.
    DepthExceeded { depth: u32, max_depth: u32 },
    /// The record the entry point was asked about is not in the store.
    MissingRecord { key: RecordKey },
    /// A line summary was requested for a study that has left Draft.
    StudyNotDraft { study: StudyId },
    /// The triggering record lacks a reference the handler needs.
    IncompleteRecord { key: RecordKey },
    /// Nothing in the engine reacts to this mutation.
    NotApplicable,
}

/// Result of one entry point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// Cached fields whose text changed and was written.
    pub summaries_written: Vec<RecordKey>,
    /// Cached fields rebuilt to identical text and left alone.
    pub summaries_unchanged: usize,
    /// Per-item failures from a summary batch.
    pub write_failures: Vec<(RecordKey, StorageError)>,
    /// Other writes (subset fallbacks) that were applied.
    pub records_updated: Vec<RecordKey>,
    pub cascade: CascadeReport,
    pub skipped: Option<SkipReason>,
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    pub fn failure_count(&self) -> usize {
        self.write_failures.len() + self.cascade.failures.len() + self.cascade.not_attempted.len()
    }

    pub fn attempted(&self) -> usize {
        self.summaries_written.len()
            + self.records_updated.len()
            + self.write_failures.len()
            + self.cascade.attempted()
            + self.cascade.not_attempted.len()
    }

    /// Collapse per-item failures into a single error for the host. Committed
    /// writes stay committed.
    pub fn into_result(self) -> RubricResult<Self> {
        let failed = self.failure_count();
        if failed == 0 {
            return Ok(self);
        }
        let first_error = self
            .write_failures
            .iter()
            .chain(self.cascade.failures.iter())
            .map(|(key, err)| format!("{key}: {err}"))
            .next()
            .or_else(|| {
                self.cascade
                    .not_attempted
                    .first()
                    .map(|key| format!("{key}: not attempted"))
            })
            .unwrap_or_default();
        Err(SyncError::PartialFailure {
            failed,
            attempted: self.attempted(),
            first_error,
        }
        .into())
    }

    /// Fold another outcome into this one. The first skip reason wins.
    pub fn merge(&mut self, other: SyncOutcome) {
        self.summaries_written.extend(other.summaries_written);
        self.summaries_unchanged += other.summaries_unchanged;
        self.write_failures.extend(other.write_failures);
        self.records_updated.extend(other.records_updated);
        self.cascade.merge(other.cascade);
        if self.skipped.is_none() {
            self.skipped = other.skipped;
        }
    }
}

/// Summary writes gathered before submission.
#[derive(Debug, Default)]
struct SummaryPlan {
    updates: Vec<RecordUpdate>,
    unchanged: usize,
}

impl SummaryPlan {
    fn stage(&mut self, key: RecordKey, current: &str, rebuilt: String, change: fn(String) -> FieldChange) {
        if current == rebuilt {
            self.unchanged += 1;
        } else {
            self.updates.push(RecordUpdate::new(key).with(change(rebuilt)));
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    config: SyncConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, config: SyncConfig) -> RubricResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn reader(&self) -> AssociationReader<'_> {
        AssociationReader::new(self.store.as_ref())
    }

    fn builder(&self) -> SummaryBuilder<'_> {
        SummaryBuilder::new(self.reader(), &self.config.section_separator)
    }

    fn cascade(&self) -> CascadeSynchronizer<'_> {
        CascadeSynchronizer::new(self.store.as_ref(), self.config.continue_on_error)
    }

    fn tripped(&self, guard: &RecursionGuard, entry_point: &'static str) -> Option<SyncOutcome> {
        if guard.admits() {
            return None;
        }
        tracing::debug!(
            entry_point,
            depth = guard.depth(),
            max_depth = guard.max_depth(),
            "recursion guard tripped, skipping"
        );
        Some(SyncOutcome::skipped(SkipReason::DepthExceeded {
            depth: guard.depth(),
            max_depth: guard.max_depth(),
        }))
    }

    // === Primitive rebuilds ===

    /// Rebuild a question line's answer summary.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn rebuild_question_line_summary(
        &self,
        question_line_id: QuestionLineId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "rebuild_question_line_summary") {
            return Ok(skip);
        }
        let Some(question_line) = self.reader().question_line(question_line_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: question_line_id.key(),
            }));
        };
        let mut plan = SummaryPlan::default();
        self.plan_question_line(&question_line, guard, &mut plan)?;
        self.submit(plan)
    }

    /// Rebuild one study question line's subset summary. Skipped unless the
    /// study is in Draft or `rebuild_non_draft_lines` is set.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn rebuild_study_question_line_summary(
        &self,
        study_question_line_id: StudyQuestionLineId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "rebuild_study_question_line_summary") {
            return Ok(skip);
        }
        let reader = self.reader();
        let Some(line) = reader.study_question_line(study_question_line_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: study_question_line_id.key(),
            }));
        };
        let Some(study) = reader.study(line.study_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: line.study_id.key(),
            }));
        };
        if !self.accepts_line_rebuild(&study) {
            return Ok(SyncOutcome::skipped(SkipReason::StudyNotDraft {
                study: study.study_id,
            }));
        }
        let mut plan = SummaryPlan::default();
        self.plan_line(&line, guard, &mut plan)?;
        self.submit(plan)
    }

    /// Rebuild a study's subset-listing summary.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn rebuild_study_subset_summary(
        &self,
        study_id: StudyId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "rebuild_study_subset_summary") {
            return Ok(skip);
        }
        let Some(study) = self.reader().study(study_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: study_id.key(),
            }));
        };
        let mut plan = SummaryPlan::default();
        self.plan_study(&study, guard, &mut plan)?;
        self.submit(plan)
    }

    // === Membership ===

    /// An entry or answer was added, changed or removed against a question
    /// line. Rebuilds its answer summary and the subset summary of each of
    /// its lines in a Draft study.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn reference_membership_changed(
        &self,
        question_line_id: QuestionLineId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "reference_membership_changed") {
            return Ok(skip);
        }
        let Some(question_line) = self.reader().question_line(question_line_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: question_line_id.key(),
            }));
        };
        let mut plan = SummaryPlan::default();
        self.plan_membership(&question_line, guard, &mut plan)?;
        self.submit(plan)
    }

    /// A reference list (or one of its entries) changed: every question line
    /// the list is attached to is treated as a membership change.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn reference_list_changed(
        &self,
        reference_list_id: ReferenceListId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "reference_list_changed") {
            return Ok(skip);
        }
        let reader = self.reader();
        let question_lines: BTreeSet<QuestionLineId> = reader
            .get_active(
                ParentKey::ReferenceList(reference_list_id),
                EntityKind::QuestionLineReferenceList,
                &["question_line_id"],
            )?
            .into_iter()
            .filter_map(QuestionLineReferenceList::from_record)
            .map(|a| a.question_line_id)
            .collect();

        let mut plan = SummaryPlan::default();
        for question_line_id in question_lines {
            if let Some(question_line) = reader.question_line(question_line_id)? {
                self.plan_membership(&question_line, guard, &mut plan)?;
            }
        }
        self.submit(plan)
    }

    /// A study-scoped entry association changed without deactivating: every
    /// question line placing the entry in that study is a membership change.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn study_reference_list_entry_changed(
        &self,
        study_id: StudyId,
        reference_list_entry_id: ReferenceListEntryId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "study_reference_list_entry_changed") {
            return Ok(skip);
        }
        let mut plan = SummaryPlan::default();
        self.plan_entry_lines(study_id, reference_list_entry_id, guard, &mut plan)?;
        self.submit(plan)
    }

    // === Subsets ===

    /// A subset definition was created or updated: rebuild the listing of
    /// every study it is attached to.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn subset_definition_changed(
        &self,
        subset_definition_id: SubsetDefinitionId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "subset_definition_changed") {
            return Ok(skip);
        }
        let mut plan = SummaryPlan::default();
        for study_id in self.definition_studies(subset_definition_id)? {
            self.plan_study_by_id(study_id, guard, &mut plan)?;
        }
        self.submit(plan)
    }

    /// Subset membership rows changed: study listings as for a definition
    /// change, plus the subset summary of every line selecting it.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn subset_member_changed(
        &self,
        subset_definition_id: SubsetDefinitionId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "subset_member_changed") {
            return Ok(skip);
        }
        let mut plan = SummaryPlan::default();
        let mut studies = self.definition_studies(subset_definition_id)?;
        let selecting = self.reader().subsets_selecting(subset_definition_id)?;
        studies.extend(selecting.iter().map(|s| s.study_id));

        let lines: BTreeSet<StudyQuestionLineId> =
            selecting.iter().map(|s| s.study_question_line_id).collect();
        for line_id in lines {
            self.plan_line_by_id(line_id, guard, &mut plan)?;
        }
        for study_id in studies {
            self.plan_study_by_id(study_id, guard, &mut plan)?;
        }
        self.submit(plan)
    }

    /// A subset definition was attached to, detached from or changed on a
    /// study.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn study_subset_definition_changed(
        &self,
        study_id: StudyId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "study_subset_definition_changed") {
            return Ok(skip);
        }
        let Some(study) = self.reader().study(study_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: study_id.key(),
            }));
        };
        let mut plan = SummaryPlan::default();
        self.plan_study(&study, guard, &mut plan)?;
        self.submit(plan)
    }

    /// A line's subset choice changed: the line's effective entries and the
    /// study's set of in-effect definitions may both have moved.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn question_line_subset_changed(
        &self,
        study_question_line_id: StudyQuestionLineId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "question_line_subset_changed") {
            return Ok(skip);
        }
        let Some(line) = self.reader().study_question_line(study_question_line_id)? else {
            return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                key: study_question_line_id.key(),
            }));
        };
        let mut plan = SummaryPlan::default();
        self.plan_line_gated(&line, guard, &mut plan)?;
        self.plan_study_by_id(line.study_id, guard, &mut plan)?;
        self.submit(plan)
    }

    /// A subset definition is about to be deleted. Every line subset row
    /// pointing at it falls back to the full list first, then the affected
    /// summaries are rebuilt.
    #[tracing::instrument(skip(self, guard), fields(depth = guard.depth()))]
    pub fn subset_definition_deleting(
        &self,
        subset_definition_id: SubsetDefinitionId,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "subset_definition_deleting") {
            return Ok(skip);
        }
        let selecting = self
            .reader()
            .include_inactive()
            .subsets_selecting(subset_definition_id)?;

        let mut outcome = SyncOutcome::default();
        if !selecting.is_empty() {
            let mut batch = Batch::new(self.config.continue_on_error);
            for row in &selecting {
                batch.push(
                    RecordUpdate::new(row.question_line_subset_id.key())
                        .with(FieldChange::Selection(SubsetSelection::FullList)),
                );
            }
            let result = self.store.submit_batch(batch)?;
            for item in result.items {
                match item.status {
                    ItemStatus::Applied => outcome.records_updated.push(item.key),
                    ItemStatus::Failed(err) => {
                        tracing::warn!(key = %item.key, error = %err, "subset fallback failed");
                        outcome.write_failures.push((item.key, err));
                    }
                    ItemStatus::NotAttempted => outcome.cascade.not_attempted.push(item.key),
                }
            }
            tracing::info!(
                definition = %subset_definition_id,
                rows = selecting.len(),
                applied = outcome.records_updated.len(),
                "line subsets fell back to full list"
            );
        }

        let mut plan = SummaryPlan::default();
        let lines: BTreeSet<StudyQuestionLineId> =
            selecting.iter().map(|s| s.study_question_line_id).collect();
        for line_id in lines {
            self.plan_line_by_id(line_id, guard, &mut plan)?;
        }
        let mut studies = self.definition_studies(subset_definition_id)?;
        studies.extend(selecting.iter().map(|s| s.study_id));
        for study_id in studies {
            self.plan_study_by_id(study_id, guard, &mut plan)?;
        }
        outcome.merge(self.submit(plan)?);
        Ok(outcome)
    }

    // === Lifecycle transitions ===

    /// A study-scoped entry association was written. Active -> Inactive
    /// cascades to its line associations and rebuilds what that touched;
    /// anything else is a membership change. A missing before-image with an
    /// inactive after-image is treated as a transition.
    #[tracing::instrument(skip_all, fields(depth = guard.depth()))]
    pub fn study_reference_list_entry_transitioned(
        &self,
        before: Option<&StudyReferenceListEntry>,
        after: &StudyReferenceListEntry,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "study_reference_list_entry_transitioned") {
            return Ok(skip);
        }
        if !is_deactivation(before.map(|b| b.state), after.state) {
            return self.study_reference_list_entry_changed(
                after.study_id,
                after.reference_list_entry_id,
                guard,
            );
        }
        let report = self.cascade().on_study_reference_list_entry_deactivated(after)?;
        self.rebuild_after_cascade(report, guard)
    }

    /// A study-scoped entry association was removed. Its line associations
    /// cannot stay active without it.
    #[tracing::instrument(skip_all, fields(depth = guard.depth()))]
    pub fn study_reference_list_entry_removed(
        &self,
        removed: &StudyReferenceListEntry,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "study_reference_list_entry_removed") {
            return Ok(skip);
        }
        let report = self.cascade().on_study_reference_list_entry_deactivated(removed)?;
        self.rebuild_after_cascade(report, guard)
    }

    /// A study question line was written. Active -> Inactive cascades;
    /// anything else rebuilds the line's own summary.
    #[tracing::instrument(skip_all, fields(depth = guard.depth()))]
    pub fn study_question_line_transitioned(
        &self,
        before: Option<&StudyQuestionLine>,
        after: &StudyQuestionLine,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "study_question_line_transitioned") {
            return Ok(skip);
        }
        if !is_deactivation(before.map(|b| b.state), after.state) {
            if self.reader().study(after.study_id)?.is_none() {
                return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                    key: after.study_id.key(),
                }));
            }
            let mut plan = SummaryPlan::default();
            self.plan_line_gated(after, guard, &mut plan)?;
            return self.submit(plan);
        }
        let report = self.cascade().on_study_question_line_deactivated(after)?;
        self.rebuild_after_cascade(report, guard)
    }

    /// A line-scoped entry association was written. Active -> Inactive
    /// releases its study-scoped entry if nothing else references it;
    /// anything else is a membership change of the line's question line.
    #[tracing::instrument(skip_all, fields(depth = guard.depth()))]
    pub fn question_line_reference_list_entry_transitioned(
        &self,
        before: Option<&QuestionLineReferenceListEntry>,
        after: &QuestionLineReferenceListEntry,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) =
            self.tripped(guard, "question_line_reference_list_entry_transitioned")
        {
            return Ok(skip);
        }
        if !is_deactivation(before.map(|b| b.state), after.state) {
            let Some(line) = self.reader().study_question_line(after.study_question_line_id)?
            else {
                return Ok(SyncOutcome::skipped(SkipReason::MissingRecord {
                    key: after.study_question_line_id.key(),
                }));
            };
            return self.reference_membership_changed(line.question_line_id, guard);
        }
        let report = self
            .cascade()
            .on_question_line_reference_list_entry_deactivated(after)?;
        self.rebuild_after_cascade(report, guard)
    }

    /// A line-scoped entry association was removed.
    #[tracing::instrument(skip_all, fields(depth = guard.depth()))]
    pub fn question_line_reference_list_entry_removed(
        &self,
        removed: &QuestionLineReferenceListEntry,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        if let Some(skip) = self.tripped(guard, "question_line_reference_list_entry_removed") {
            return Ok(skip);
        }
        let report = self
            .cascade()
            .on_question_line_reference_list_entry_deactivated(removed)?;
        self.rebuild_after_cascade(report, guard)
    }

    fn rebuild_after_cascade(
        &self,
        report: CascadeReport,
        guard: &mut RecursionGuard,
    ) -> RubricResult<SyncOutcome> {
        let mut plan = SummaryPlan::default();
        for line_id in &report.lines_touched {
            self.plan_line_by_id(*line_id, guard, &mut plan)?;
        }
        for study_id in &report.studies_touched {
            self.plan_study_by_id(*study_id, guard, &mut plan)?;
        }
        let mut outcome = self.submit(plan)?;
        outcome.cascade.merge(report);
        Ok(outcome)
    }

    // === Planning ===

    fn accepts_line_rebuild(&self, study: &Study) -> bool {
        study.is_draft() || self.config.rebuild_non_draft_lines
    }

    fn definition_studies(
        &self,
        subset_definition_id: SubsetDefinitionId,
    ) -> RubricResult<BTreeSet<StudyId>> {
        Ok(self
            .reader()
            .definition_studies(subset_definition_id)?
            .into_iter()
            .map(|s| s.study_id)
            .collect())
    }

    fn plan_membership(
        &self,
        question_line: &QuestionLine,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        self.plan_question_line(question_line, guard, plan)?;
        for line in self.reader().study_lines_of(question_line.question_line_id)? {
            self.plan_line_gated(&line, guard, plan)?;
        }
        Ok(())
    }

    fn plan_entry_lines(
        &self,
        study_id: StudyId,
        reference_list_entry_id: ReferenceListEntryId,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        let reader = self.reader();
        let lines: BTreeSet<StudyQuestionLineId> = reader
            .include_inactive()
            .line_entries_for(study_id, reference_list_entry_id)?
            .into_iter()
            .map(|p| p.study_question_line_id)
            .collect();
        let mut question_lines = BTreeSet::new();
        for line_id in lines {
            if let Some(line) = reader.study_question_line(line_id)? {
                question_lines.insert(line.question_line_id);
            }
        }
        for question_line_id in question_lines {
            if let Some(question_line) = reader.question_line(question_line_id)? {
                self.plan_membership(&question_line, guard, plan)?;
            }
        }
        Ok(())
    }

    fn plan_question_line(
        &self,
        question_line: &QuestionLine,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        let key = question_line.question_line_id.key();
        if !guard.claim(key) {
            return Ok(());
        }
        let rebuilt = self.builder().question_line_summary(question_line)?;
        plan.stage(key, &question_line.answer_summary, rebuilt, FieldChange::AnswerSummary);
        Ok(())
    }

    fn plan_line_by_id(
        &self,
        line_id: StudyQuestionLineId,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        match self.reader().study_question_line(line_id)? {
            Some(line) => self.plan_line_gated(&line, guard, plan),
            None => Ok(()),
        }
    }

    /// Line rebuild honoring the Draft gate.
    fn plan_line_gated(
        &self,
        line: &StudyQuestionLine,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        let Some(study) = self.reader().study(line.study_id)? else {
            tracing::warn!(line = %line.study_question_line_id, "line belongs to a missing study");
            return Ok(());
        };
        if !self.accepts_line_rebuild(&study) {
            return Ok(());
        }
        self.plan_line(line, guard, plan)
    }

    fn plan_line(
        &self,
        line: &StudyQuestionLine,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        let key = line.study_question_line_id.key();
        if !guard.claim(key) {
            return Ok(());
        }
        let rebuilt = self.builder().line_summary(line)?;
        plan.stage(key, &line.subset_summary, rebuilt, FieldChange::SubsetSummary);
        Ok(())
    }

    fn plan_study_by_id(
        &self,
        study_id: StudyId,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        match self.reader().study(study_id)? {
            Some(study) => self.plan_study(&study, guard, plan),
            None => Ok(()),
        }
    }

    fn plan_study(
        &self,
        study: &Study,
        guard: &mut RecursionGuard,
        plan: &mut SummaryPlan,
    ) -> RubricResult<()> {
        let key = study.study_id.key();
        if !guard.claim(key) {
            return Ok(());
        }
        let rebuilt = self.builder().study_summary(study)?;
        plan.stage(key, &study.subset_summary, rebuilt, FieldChange::SubsetSummary);
        Ok(())
    }

    // === Writing ===

    /// Single-record plans are a plain update and any failure propagates.
    /// Larger plans go out as one batch with per-item outcomes.
    fn submit(&self, plan: SummaryPlan) -> RubricResult<SyncOutcome> {
        let mut outcome = SyncOutcome {
            summaries_unchanged: plan.unchanged,
            ..SyncOutcome::default()
        };
        let mut updates = plan.updates;

        match updates.len() {
            0 => {}
            1 => {
                let update = updates.remove(0);
                let key = update.key;
                self.store.update(update)?;
                outcome.summaries_written.push(key);
            }
            _ => {
                let mut batch = Batch::new(self.config.continue_on_error);
                for update in updates {
                    batch.push(update);
                }
                let result = self.store.submit_batch(batch)?;
                for item in result.items {
                    match item.status {
                        ItemStatus::Applied => outcome.summaries_written.push(item.key),
                        ItemStatus::Failed(err) => {
                            tracing::warn!(key = %item.key, error = %err, "summary write failed");
                            outcome.write_failures.push((item.key, err));
                        }
                        ItemStatus::NotAttempted => {
                            outcome.write_failures.push((
                                item.key,
                                StorageError::UpdateFailed {
                                    key: item.key,
                                    reason: "not attempted".to_string(),
                                },
                            ));
                        }
                    }
                }
            }
        }

        tracing::info!(
            written = outcome.summaries_written.len(),
            unchanged = outcome.summaries_unchanged,
            failed = outcome.write_failures.len(),
            "summary rebuild submitted"
        );
        Ok(outcome)
    }
}

/// Active -> Inactive, or an inactive after-image with no before-image.
fn is_deactivation(
    before: Option<rubric_core::LifecycleState>,
    after: rubric_core::LifecycleState,
) -> bool {
    match before {
        Some(before) => before.is_deactivation(after),
        None => !after.is_active(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
