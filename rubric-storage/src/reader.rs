//! Association Reader - read-only queries over association records.
//!
//! Every read defaults to Active records. Store failures are returned as-is;
//! nothing here retries.

use crate::{ParentKey, Query, Record, RecordStore, RecordStoreExt, StateFilter, StoredRecord};
use rubric_core::{
    Answer, EntityKind, Placement, QuestionLine, QuestionLineId, QuestionLineReferenceList,
    QuestionLineReferenceListEntry, QuestionLineSubset, ReferenceList, ReferenceListEntry,
    ReferenceListEntryId, ReferenceListId, RubricResult, Study, StudyId, StudyQuestionLine,
    StudyQuestionLineId, StudyReferenceListEntry, StudySubsetDefinition, SubsetDefinition,
    SubsetDefinitionId, SubsetMember,
};

/// Read-only view over a [`RecordStore`].
#[derive(Clone, Copy)]
pub struct AssociationReader<'a> {
    store: &'a dyn RecordStore,
    state: StateFilter,
}

impl<'a> AssociationReader<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            state: StateFilter::ActiveOnly,
        }
    }

    /// A reader whose association queries return inactive rows as well.
    pub fn include_inactive(self) -> Self {
        Self {
            state: StateFilter::Any,
            ..self
        }
    }

    pub fn store(&self) -> &'a dyn RecordStore {
        self.store
    }

    // === Generic contract ===

    /// Children of `kind` under `parent`. `columns` is checked against the
    /// kind's catalogue and passed to the store as a fetch hint.
    pub fn get_active(
        &self,
        parent: ParentKey,
        kind: EntityKind,
        columns: &[&'static str],
    ) -> RubricResult<Vec<Record>> {
        self.get_by_parents(&[parent], kind, columns, None)
    }

    /// Children of `kind` linked to every one of `parents`, optionally
    /// restricted to one placement.
    fn get_by_parents(
        &self,
        parents: &[ParentKey],
        kind: EntityKind,
        columns: &[&'static str],
        placement: Option<Placement>,
    ) -> RubricResult<Vec<Record>> {
        let mut query = Query::new(kind).state(self.state).select(columns);
        for parent in parents {
            query = query.parent(*parent);
        }
        if let Some(placement) = placement {
            query = query.placement(placement);
        }
        tracing::trace!(kind = %kind, parents = parents.len(), "association read");
        self.store.query(&query)
    }

    fn children<T: StoredRecord>(
        &self,
        kind: EntityKind,
        parents: &[ParentKey],
        placement: Option<Placement>,
    ) -> RubricResult<Vec<T>> {
        Ok(self
            .get_by_parents(parents, kind, &[], placement)?
            .into_iter()
            .filter_map(T::from_record)
            .collect())
    }

    // === Single records (any state) ===

    pub fn study(&self, id: StudyId) -> RubricResult<Option<Study>> {
        self.store.fetch(id)
    }

    pub fn question_line(&self, id: QuestionLineId) -> RubricResult<Option<QuestionLine>> {
        self.store.fetch(id)
    }

    pub fn study_question_line(
        &self,
        id: StudyQuestionLineId,
    ) -> RubricResult<Option<StudyQuestionLine>> {
        self.store.fetch(id)
    }

    pub fn reference_list(&self, id: ReferenceListId) -> RubricResult<Option<ReferenceList>> {
        self.store.fetch(id)
    }

    pub fn reference_list_entry(
        &self,
        id: ReferenceListEntryId,
    ) -> RubricResult<Option<ReferenceListEntry>> {
        self.store.fetch(id)
    }

    pub fn subset_definition(
        &self,
        id: SubsetDefinitionId,
    ) -> RubricResult<Option<SubsetDefinition>> {
        self.store.fetch(id)
    }

    // === Question line axis ===

    /// Reference lists attached to a question line.
    pub fn question_line_lists(
        &self,
        question_line_id: QuestionLineId,
    ) -> RubricResult<Vec<QuestionLineReferenceList>> {
        self.children(
            EntityKind::QuestionLineReferenceList,
            &[ParentKey::QuestionLine(question_line_id)],
            None,
        )
    }

    pub fn list_entries(
        &self,
        reference_list_id: ReferenceListId,
    ) -> RubricResult<Vec<ReferenceListEntry>> {
        self.children(
            EntityKind::ReferenceListEntry,
            &[ParentKey::ReferenceList(reference_list_id)],
            None,
        )
    }

    pub fn answers(&self, question_line_id: QuestionLineId) -> RubricResult<Vec<Answer>> {
        self.children(
            EntityKind::Answer,
            &[ParentKey::QuestionLine(question_line_id)],
            None,
        )
    }

    /// Study instantiations of a question line, across every study.
    pub fn study_lines_of(
        &self,
        question_line_id: QuestionLineId,
    ) -> RubricResult<Vec<StudyQuestionLine>> {
        self.children(
            EntityKind::StudyQuestionLine,
            &[ParentKey::QuestionLine(question_line_id)],
            None,
        )
    }

    // === Line-scoped entries ===

    /// Entries placed on a study question line, optionally one axis only.
    pub fn line_entries(
        &self,
        line_id: StudyQuestionLineId,
        placement: Option<Placement>,
    ) -> RubricResult<Vec<QuestionLineReferenceListEntry>> {
        self.children(
            EntityKind::QuestionLineReferenceListEntry,
            &[ParentKey::StudyQuestionLine(line_id)],
            placement,
        )
    }

    /// Line-scoped associations to one entry anywhere in a study.
    pub fn line_entries_for(
        &self,
        study_id: StudyId,
        entry_id: ReferenceListEntryId,
    ) -> RubricResult<Vec<QuestionLineReferenceListEntry>> {
        self.children(
            EntityKind::QuestionLineReferenceListEntry,
            &[
                ParentKey::Study(study_id),
                ParentKey::ReferenceListEntry(entry_id),
            ],
            None,
        )
    }

    /// The study-scoped association for one entry.
    pub fn study_entry(
        &self,
        study_id: StudyId,
        entry_id: ReferenceListEntryId,
    ) -> RubricResult<Option<StudyReferenceListEntry>> {
        Ok(self
            .children::<StudyReferenceListEntry>(
                EntityKind::StudyReferenceListEntry,
                &[
                    ParentKey::Study(study_id),
                    ParentKey::ReferenceListEntry(entry_id),
                ],
                None,
            )?
            .into_iter()
            .next())
    }

    // === Subsets ===

    pub fn line_subsets(
        &self,
        line_id: StudyQuestionLineId,
    ) -> RubricResult<Vec<QuestionLineSubset>> {
        self.children(
            EntityKind::QuestionLineSubset,
            &[ParentKey::StudyQuestionLine(line_id)],
            None,
        )
    }

    /// Subset choices pointing at a definition, across every study.
    pub fn subsets_selecting(
        &self,
        definition_id: SubsetDefinitionId,
    ) -> RubricResult<Vec<QuestionLineSubset>> {
        self.children(
            EntityKind::QuestionLineSubset,
            &[ParentKey::SubsetDefinition(definition_id)],
            None,
        )
    }

    /// Subset choices pointing at a definition within one study.
    pub fn study_subsets_selecting(
        &self,
        study_id: StudyId,
        definition_id: SubsetDefinitionId,
    ) -> RubricResult<Vec<QuestionLineSubset>> {
        self.children(
            EntityKind::QuestionLineSubset,
            &[
                ParentKey::Study(study_id),
                ParentKey::SubsetDefinition(definition_id),
            ],
            None,
        )
    }

    pub fn subset_members(
        &self,
        definition_id: SubsetDefinitionId,
    ) -> RubricResult<Vec<SubsetMember>> {
        self.children(
            EntityKind::SubsetMember,
            &[ParentKey::SubsetDefinition(definition_id)],
            None,
        )
    }

    pub fn study_subset_definitions(
        &self,
        study_id: StudyId,
    ) -> RubricResult<Vec<StudySubsetDefinition>> {
        self.children(
            EntityKind::StudySubsetDefinition,
            &[ParentKey::Study(study_id)],
            None,
        )
    }

    /// Studies a definition is attached to.
    pub fn definition_studies(
        &self,
        definition_id: SubsetDefinitionId,
    ) -> RubricResult<Vec<StudySubsetDefinition>> {
        self.children(
            EntityKind::StudySubsetDefinition,
            &[ParentKey::SubsetDefinition(definition_id)],
            None,
        )
    }
}
