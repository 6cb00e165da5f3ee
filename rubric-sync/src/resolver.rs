//! Subset Resolver - the effective entries of one study question line.
//!
//! Starting set: active line-scoped entry associations whose study-scoped
//! association is also active. Each entry's reference list then decides the
//! filter through the line's `QuestionLineSubset` row for that list: full
//! list keeps everything, a subset keeps only its active members. A list with
//! no subset row falls back to the full list. Membership never adds an entry
//! the line does not already have active.

use rubric_core::{
    Placement, QuestionLineReferenceListEntry, ReferenceListEntry, ReferenceListEntryId,
    ReferenceListId, RubricResult, StudyId, StudyQuestionLineId, StudyReferenceListEntryId,
    SubsetDefinitionId, SubsetSelection,
};
use rubric_storage::AssociationReader;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One entry in effect on a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub entry: ReferenceListEntry,
    pub association: QuestionLineReferenceListEntry,
    pub study_entry_id: StudyReferenceListEntryId,
    /// Definition that admitted the entry, `None` under the full list.
    pub via_subset: Option<SubsetDefinitionId>,
}

impl ResolvedEntry {
    pub fn entry_id(&self) -> ReferenceListEntryId {
        self.entry.reference_list_entry_id
    }

    pub fn placement(&self) -> Placement {
        self.association.placement
    }
}

/// Effective entries split by axis. Each side is ordered by entry sort order,
/// then code, then id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedEntries {
    pub rows: Vec<ResolvedEntry>,
    pub columns: Vec<ResolvedEntry>,
}

impl ResolvedEntries {
    pub fn len(&self) -> usize {
        self.rows.len() + self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty()
    }

    pub fn at(&self, placement: Placement) -> &[ResolvedEntry] {
        match placement {
            Placement::Row => &self.rows,
            Placement::Column => &self.columns,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.rows.iter().chain(self.columns.iter())
    }
}

/// Resolves effective entries through an [`AssociationReader`].
#[derive(Clone, Copy)]
pub struct SubsetResolver<'a> {
    reader: AssociationReader<'a>,
}

impl<'a> SubsetResolver<'a> {
    pub fn new(reader: AssociationReader<'a>) -> Self {
        Self { reader }
    }

    /// Effective (row, column) entries for a line of a study.
    ///
    /// Line associations pointing at an entry record that no longer exists
    /// are skipped with a warning; that only happens while a delete is being
    /// processed.
    pub fn resolve(
        &self,
        study_id: StudyId,
        study_question_line_id: StudyQuestionLineId,
    ) -> RubricResult<ResolvedEntries> {
        let associations: Vec<QuestionLineReferenceListEntry> = self
            .reader
            .line_entries(study_question_line_id, None)?
            .into_iter()
            .filter(|a| a.study_id == study_id)
            .collect();
        if associations.is_empty() {
            return Ok(ResolvedEntries::default());
        }

        let selections = self.selections(study_question_line_id)?;
        let mut members: BTreeMap<SubsetDefinitionId, BTreeSet<ReferenceListEntryId>> =
            BTreeMap::new();

        let mut resolved = ResolvedEntries::default();
        for association in associations {
            let entry_id = association.reference_list_entry_id;
            let Some(study_entry) = self.reader.study_entry(study_id, entry_id)? else {
                continue;
            };
            let Some(entry) = self.reader.reference_list_entry(entry_id)? else {
                tracing::warn!(
                    association = %association.question_line_reference_list_entry_id,
                    entry = %entry_id,
                    "line entry references a missing reference list entry"
                );
                continue;
            };

            let selection = selections
                .get(&entry.reference_list_id)
                .copied()
                .unwrap_or_default();
            let via_subset = match selection {
                SubsetSelection::FullList => None,
                SubsetSelection::Subset(definition) => {
                    if !members.contains_key(&definition) {
                        members.insert(definition, self.member_entries(definition)?);
                    }
                    let admitted = members
                        .get(&definition)
                        .is_some_and(|set| set.contains(&entry_id));
                    if !admitted {
                        continue;
                    }
                    Some(definition)
                }
            };

            let item = ResolvedEntry {
                entry,
                study_entry_id: study_entry.study_reference_list_entry_id,
                via_subset,
                association,
            };
            match item.placement() {
                Placement::Row => resolved.rows.push(item),
                Placement::Column => resolved.columns.push(item),
            }
        }

        sort_entries(&mut resolved.rows);
        sort_entries(&mut resolved.columns);
        tracing::debug!(
            study = %study_id,
            line = %study_question_line_id,
            rows = resolved.rows.len(),
            columns = resolved.columns.len(),
            "resolved effective entries"
        );
        Ok(resolved)
    }

    /// Active subset choice per reference list for a line. If several active
    /// rows exist for one list the most recently modified wins.
    fn selections(
        &self,
        line_id: StudyQuestionLineId,
    ) -> RubricResult<BTreeMap<ReferenceListId, SubsetSelection>> {
        let mut rows = self.reader.line_subsets(line_id)?;
        rows.sort_by_key(|row| row.modified_on);
        Ok(rows
            .into_iter()
            .map(|row| (row.reference_list_id, row.selection))
            .collect())
    }

    fn member_entries(
        &self,
        definition: SubsetDefinitionId,
    ) -> RubricResult<BTreeSet<ReferenceListEntryId>> {
        Ok(self
            .reader
            .subset_members(definition)?
            .into_iter()
            .map(|m| m.reference_list_entry_id)
            .collect())
    }
}

fn sort_entries(entries: &mut [ResolvedEntry]) {
    entries.sort_by(|a, b| {
        (a.entry.sort_order, &a.entry.code, a.entry_id())
            .cmp(&(b.entry.sort_order, &b.entry.code, b.entry_id()))
    });
}
