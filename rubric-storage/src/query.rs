//! Filtered read requests.

use rubric_core::{
    EntityKind, LifecycleState, Placement, QuestionLineId, RecordKey, ReferenceListEntryId,
    ReferenceListId, StorageError, StudyId, StudyQuestionLineId, SubsetDefinitionId,
    EntityIdType,
};
use serde::{Deserialize, Serialize};

/// A parent link a record can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentKey {
    Study(StudyId),
    QuestionLine(QuestionLineId),
    StudyQuestionLine(StudyQuestionLineId),
    ReferenceList(ReferenceListId),
    ReferenceListEntry(ReferenceListEntryId),
    SubsetDefinition(SubsetDefinitionId),
}

impl ParentKey {
    pub fn key(&self) -> RecordKey {
        match self {
            ParentKey::Study(id) => id.key(),
            ParentKey::QuestionLine(id) => id.key(),
            ParentKey::StudyQuestionLine(id) => id.key(),
            ParentKey::ReferenceList(id) => id.key(),
            ParentKey::ReferenceListEntry(id) => id.key(),
            ParentKey::SubsetDefinition(id) => id.key(),
        }
    }
}

/// Which lifecycle states a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StateFilter {
    #[default]
    ActiveOnly,
    InactiveOnly,
    Any,
}

impl StateFilter {
    /// Records without a lifecycle state always match.
    pub fn matches(&self, state: Option<LifecycleState>) -> bool {
        match (self, state) {
            (_, None) | (StateFilter::Any, _) => true,
            (StateFilter::ActiveOnly, Some(state)) => state.is_active(),
            (StateFilter::InactiveOnly, Some(state)) => !state.is_active(),
        }
    }
}

/// Column catalogue per kind. Projections may only name these.
pub fn columns_of(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Study => &["study_id", "name", "status", "subset_summary", "modified_on"],
        EntityKind::QuestionLine => &[
            "question_line_id",
            "name",
            "question_text",
            "state",
            "answer_summary",
            "modified_on",
        ],
        EntityKind::Answer => &[
            "answer_id",
            "question_line_id",
            "code",
            "label",
            "sort_order",
            "placement",
            "state",
            "modified_on",
        ],
        EntityKind::ReferenceList => {
            &["reference_list_id", "name", "is_managed", "state", "modified_on"]
        }
        EntityKind::ReferenceListEntry => &[
            "reference_list_entry_id",
            "reference_list_id",
            "code",
            "label",
            "sort_order",
            "state",
            "modified_on",
        ],
        EntityKind::QuestionLineReferenceList => &[
            "question_line_reference_list_id",
            "question_line_id",
            "reference_list_id",
            "placement",
            "sort_order",
            "state",
            "modified_on",
        ],
        EntityKind::StudyQuestionLine => &[
            "study_question_line_id",
            "study_id",
            "question_line_id",
            "sort_order",
            "state",
            "subset_summary",
            "modified_on",
        ],
        EntityKind::StudyReferenceListEntry => &[
            "study_reference_list_entry_id",
            "study_id",
            "reference_list_entry_id",
            "state",
            "modified_on",
        ],
        EntityKind::QuestionLineReferenceListEntry => &[
            "question_line_reference_list_entry_id",
            "study_id",
            "study_question_line_id",
            "reference_list_entry_id",
            "placement",
            "state",
            "modified_on",
        ],
        EntityKind::SubsetDefinition => &[
            "subset_definition_id",
            "reference_list_id",
            "name",
            "state",
            "modified_on",
        ],
        EntityKind::SubsetMember => &[
            "subset_member_id",
            "subset_definition_id",
            "reference_list_entry_id",
            "state",
            "modified_on",
        ],
        EntityKind::StudySubsetDefinition => &[
            "study_subset_definition_id",
            "study_id",
            "subset_definition_id",
            "state",
            "modified_on",
        ],
        EntityKind::QuestionLineSubset => &[
            "question_line_subset_id",
            "study_id",
            "study_question_line_id",
            "reference_list_id",
            "uses_full_list",
            "subset_definition_id",
            "state",
            "modified_on",
        ],
    }
}

/// A filtered read of one record kind.
///
/// ```ignore
/// let q = Query::new(EntityKind::QuestionLineReferenceListEntry)
///     .parent(ParentKey::StudyQuestionLine(line_id))
///     .placement(Placement::Row)
///     .select(&["reference_list_entry_id", "placement"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: EntityKind,
    pub parents: Vec<ParentKey>,
    pub state: StateFilter,
    pub placement: Option<Placement>,
    pub columns: Vec<&'static str>,
}

impl Query {
    /// Active records of `kind`, all columns.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            parents: Vec::new(),
            state: StateFilter::ActiveOnly,
            placement: None,
            columns: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: ParentKey) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn state(mut self, state: StateFilter) -> Self {
        self.state = state;
        self
    }

    pub fn include_inactive(self) -> Self {
        self.state(StateFilter::Any)
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Columns the caller will read. Records come back whole either way;
    /// a database backend may use this to narrow its fetch.
    pub fn select(mut self, columns: &[&'static str]) -> Self {
        self.columns.extend_from_slice(columns);
        self
    }

    /// Reject projections naming columns the kind does not have.
    pub fn validate(&self) -> Result<(), StorageError> {
        let known = columns_of(self.kind);
        if let Some(unknown) = self.columns.iter().find(|c| !known.contains(*c)) {
            return Err(StorageError::InvalidQuery {
                kind: self.kind,
                reason: format!("unknown column '{unknown}'"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_filter() {
        assert!(StateFilter::ActiveOnly.matches(Some(LifecycleState::Active)));
        assert!(!StateFilter::ActiveOnly.matches(Some(LifecycleState::Inactive)));
        assert!(StateFilter::InactiveOnly.matches(Some(LifecycleState::Inactive)));
        assert!(StateFilter::Any.matches(Some(LifecycleState::Inactive)));
        assert!(StateFilter::ActiveOnly.matches(None));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let query = Query::new(EntityKind::SubsetMember).select(&["subset_definition_id", "colour"]);
        let err = query.validate().unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_every_kind_has_columns() {
        for kind in EntityKind::ALL {
            assert!(!columns_of(kind).is_empty(), "{kind} has no columns");
        }
    }
}
