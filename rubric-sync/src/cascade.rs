//! Cascading State Synchronizer.
//!
//! Walks the dependents of an association that went Active -> Inactive and
//! deactivates them in continue-on-error batches. Before a study-scoped entry
//! is deactivated the synchronizer checks that no active line-scoped
//! association anywhere in the study still references it. There is no reverse
//! transition.

use rubric_core::{
    EntityIdType, QuestionLineReferenceListEntry, RecordKey, ReferenceListEntryId, RubricResult,
    StorageError, StudyId, StudyQuestionLine, StudyQuestionLineId, StudyReferenceListEntry,
};
use rubric_storage::{AssociationReader, Batch, ItemStatus, RecordStore, RecordUpdate};
use std::collections::BTreeSet;

// ============================================================================
// REPORT
// ============================================================================

/// What a cascade did. Failures are recorded per item; nothing is rolled
/// back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeReport {
    pub deactivated: Vec<RecordKey>,
    pub failures: Vec<(RecordKey, StorageError)>,
    pub not_attempted: Vec<RecordKey>,
    /// Studies whose cached summaries must be rebuilt.
    pub studies_touched: BTreeSet<StudyId>,
    /// Lines whose effective entries changed.
    pub lines_touched: BTreeSet<StudyQuestionLineId>,
}

impl CascadeReport {
    pub fn attempted(&self) -> usize {
        self.deactivated.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.not_attempted.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0 && self.not_attempted.is_empty()
    }

    pub fn merge(&mut self, other: CascadeReport) {
        self.deactivated.extend(other.deactivated);
        self.failures.extend(other.failures);
        self.not_attempted.extend(other.not_attempted);
        self.studies_touched.extend(other.studies_touched);
        self.lines_touched.extend(other.lines_touched);
    }
}

// ============================================================================
// SYNCHRONIZER
// ============================================================================

pub struct CascadeSynchronizer<'a> {
    store: &'a dyn RecordStore,
    reader: AssociationReader<'a>,
    continue_on_error: bool,
}

impl<'a> CascadeSynchronizer<'a> {
    pub fn new(store: &'a dyn RecordStore, continue_on_error: bool) -> Self {
        Self {
            store,
            reader: AssociationReader::new(store),
            continue_on_error,
        }
    }

    /// A study-scoped entry went inactive: every active line association to
    /// the same (study, entry) pair follows.
    pub fn on_study_reference_list_entry_deactivated(
        &self,
        study_entry: &StudyReferenceListEntry,
    ) -> RubricResult<CascadeReport> {
        let mut report = CascadeReport::default();
        report.studies_touched.insert(study_entry.study_id);

        let dependents = self
            .reader
            .line_entries_for(study_entry.study_id, study_entry.reference_list_entry_id)?;
        report
            .lines_touched
            .extend(dependents.iter().map(|d| d.study_question_line_id));

        let keys: Vec<RecordKey> = dependents
            .iter()
            .map(|d| d.question_line_reference_list_entry_id.key())
            .collect();
        self.deactivate_all(&keys, &mut report)?;

        tracing::info!(
            study = %study_entry.study_id,
            entry = %study_entry.reference_list_entry_id,
            deactivated = report.deactivated.len(),
            failed = report.failures.len(),
            "study entry cascade complete"
        );
        Ok(report)
    }

    /// A study question line went inactive: its line associations follow,
    /// then every study-scoped entry left with no active reference in the
    /// study.
    pub fn on_study_question_line_deactivated(
        &self,
        line: &StudyQuestionLine,
    ) -> RubricResult<CascadeReport> {
        let mut report = CascadeReport::default();
        report.studies_touched.insert(line.study_id);
        report.lines_touched.insert(line.study_question_line_id);

        let placed = self.reader.line_entries(line.study_question_line_id, None)?;
        let keys: Vec<RecordKey> = placed
            .iter()
            .map(|p| p.question_line_reference_list_entry_id.key())
            .collect();
        self.deactivate_all(&keys, &mut report)?;

        let touched: BTreeSet<ReferenceListEntryId> =
            placed.iter().map(|p| p.reference_list_entry_id).collect();
        let orphaned = self.orphaned_study_entries(line.study_id, &touched)?;
        self.deactivate_all(&orphaned, &mut report)?;

        tracing::info!(
            study = %line.study_id,
            line = %line.study_question_line_id,
            line_entries = keys.len(),
            study_entries = orphaned.len(),
            failed = report.failures.len(),
            "study question line cascade complete"
        );
        Ok(report)
    }

    /// A single line association went inactive: its study-scoped entry
    /// follows only if nothing else in the study still references it.
    pub fn on_question_line_reference_list_entry_deactivated(
        &self,
        placed: &QuestionLineReferenceListEntry,
    ) -> RubricResult<CascadeReport> {
        let mut report = CascadeReport::default();
        report.studies_touched.insert(placed.study_id);
        report.lines_touched.insert(placed.study_question_line_id);

        let touched = BTreeSet::from([placed.reference_list_entry_id]);
        let orphaned = self.orphaned_study_entries(placed.study_id, &touched)?;
        self.deactivate_all(&orphaned, &mut report)?;

        tracing::debug!(
            study = %placed.study_id,
            entry = %placed.reference_list_entry_id,
            orphaned = orphaned.len(),
            "line entry cascade complete"
        );
        Ok(report)
    }

    /// Active study-scoped entries among `entries` with zero active line
    /// associations left anywhere in the study.
    fn orphaned_study_entries(
        &self,
        study_id: StudyId,
        entries: &BTreeSet<ReferenceListEntryId>,
    ) -> RubricResult<Vec<RecordKey>> {
        let mut orphaned = Vec::new();
        for entry_id in entries {
            let remaining = self.reader.line_entries_for(study_id, *entry_id)?;
            if !remaining.is_empty() {
                tracing::debug!(
                    study = %study_id,
                    entry = %entry_id,
                    remaining = remaining.len(),
                    "study entry still referenced"
                );
                continue;
            }
            if let Some(study_entry) = self.reader.study_entry(study_id, *entry_id)? {
                orphaned.push(study_entry.study_reference_list_entry_id.key());
            }
        }
        Ok(orphaned)
    }

    /// Submit one deactivation batch and fold the outcome into `report`.
    /// Only a store-wide failure is returned as an error.
    fn deactivate_all(&self, keys: &[RecordKey], report: &mut CascadeReport) -> RubricResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = Batch::new(self.continue_on_error);
        for key in keys {
            batch.push(RecordUpdate::deactivate(*key));
        }

        let outcome = self.store.submit_batch(batch)?;
        for item in outcome.items {
            match item.status {
                ItemStatus::Applied => report.deactivated.push(item.key),
                ItemStatus::Failed(err) => {
                    tracing::warn!(key = %item.key, error = %err, "cascade deactivation failed");
                    report.failures.push((item.key, err));
                }
                ItemStatus::NotAttempted => report.not_attempted.push(item.key),
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
