//! Core record structures

use crate::{
    AnswerId, LifecycleState, Placement, QuestionLineId, QuestionLineReferenceListEntryId,
    QuestionLineReferenceListId, QuestionLineSubsetId, ReferenceListEntryId, ReferenceListId,
    StudyId, StudyQuestionLineId, StudyReferenceListEntryId, StudyStatus,
    StudySubsetDefinitionId, SubsetDefinitionId, SubsetMemberId, Timestamp,
};
use crate::identity::EntityIdType;
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// AGGREGATE ROOTS
// ============================================================================

/// Study - one fielded instance of a questionnaire.
/// Owns the subset-listing summary; only the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub study_id: StudyId,
    pub name: String,
    pub status: StudyStatus,
    /// Rendered listing of the subset definitions in effect for this study.
    #[serde(default)]
    pub subset_summary: String,
    pub modified_on: Timestamp,
}

impl Study {
    pub fn new(name: impl Into<String>, status: StudyStatus) -> Self {
        Self {
            study_id: StudyId::now_v7(),
            name: name.into(),
            status,
            subset_summary: String::new(),
            modified_on: Utc::now(),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status.is_draft()
    }
}

/// QuestionLine - a question of a project, independent of any study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionLine {
    pub question_line_id: QuestionLineId,
    pub name: String,
    pub question_text: String,
    pub state: LifecycleState,
    /// Rendered table of every list-backed and discrete answer.
    #[serde(default)]
    pub answer_summary: String,
    pub modified_on: Timestamp,
}

impl QuestionLine {
    pub fn new(name: impl Into<String>, question_text: impl Into<String>) -> Self {
        Self {
            question_line_id: QuestionLineId::now_v7(),
            name: name.into(),
            question_text: question_text.into(),
            state: LifecycleState::Active,
            answer_summary: String::new(),
            modified_on: Utc::now(),
        }
    }
}

/// Answer - a discrete answer row typed directly on a question line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: AnswerId,
    pub question_line_id: QuestionLineId,
    pub code: String,
    pub label: String,
    pub sort_order: i32,
    pub placement: Placement,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl Answer {
    pub fn new(
        question_line_id: QuestionLineId,
        code: impl Into<String>,
        label: impl Into<String>,
        sort_order: i32,
    ) -> Self {
        Self {
            answer_id: AnswerId::now_v7(),
            question_line_id,
            code: code.into(),
            label: label.into(),
            sort_order,
            placement: Placement::Row,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

// ============================================================================
// REFERENCE LISTS
// ============================================================================

/// ReferenceList - a named, shared list of entries (e.g. a managed pick-list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceList {
    pub reference_list_id: ReferenceListId,
    pub name: String,
    /// Managed lists are curated centrally and rendered with their name.
    pub is_managed: bool,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl ReferenceList {
    pub fn new(name: impl Into<String>, is_managed: bool) -> Self {
        Self {
            reference_list_id: ReferenceListId::now_v7(),
            name: name.into(),
            is_managed,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// ReferenceListEntry - a member row of a reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceListEntry {
    pub reference_list_entry_id: ReferenceListEntryId,
    pub reference_list_id: ReferenceListId,
    pub code: String,
    pub label: String,
    pub sort_order: i32,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl ReferenceListEntry {
    pub fn new(
        reference_list_id: ReferenceListId,
        code: impl Into<String>,
        label: impl Into<String>,
        sort_order: i32,
    ) -> Self {
        Self {
            reference_list_entry_id: ReferenceListEntryId::now_v7(),
            reference_list_id,
            code: code.into(),
            label: label.into(),
            sort_order,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// QuestionLineReferenceList - attaches a whole reference list to one axis
/// of a question line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionLineReferenceList {
    pub question_line_reference_list_id: QuestionLineReferenceListId,
    pub question_line_id: QuestionLineId,
    pub reference_list_id: ReferenceListId,
    pub placement: Placement,
    pub sort_order: i32,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl QuestionLineReferenceList {
    pub fn new(
        question_line_id: QuestionLineId,
        reference_list_id: ReferenceListId,
        placement: Placement,
        sort_order: i32,
    ) -> Self {
        Self {
            question_line_reference_list_id: QuestionLineReferenceListId::now_v7(),
            question_line_id,
            reference_list_id,
            placement,
            sort_order,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

// ============================================================================
// STUDY-SCOPED ASSOCIATIONS
// ============================================================================

/// StudyQuestionLine - a question line instantiated inside a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyQuestionLine {
    pub study_question_line_id: StudyQuestionLineId,
    pub study_id: StudyId,
    pub question_line_id: QuestionLineId,
    pub sort_order: i32,
    pub state: LifecycleState,
    /// Rendered table of the effective entries after subset filtering.
    #[serde(default)]
    pub subset_summary: String,
    pub modified_on: Timestamp,
}

impl StudyQuestionLine {
    pub fn new(study_id: StudyId, question_line_id: QuestionLineId, sort_order: i32) -> Self {
        Self {
            study_question_line_id: StudyQuestionLineId::now_v7(),
            study_id,
            question_line_id,
            sort_order,
            state: LifecycleState::Active,
            subset_summary: String::new(),
            modified_on: Utc::now(),
        }
    }
}

/// StudyReferenceListEntry - makes a reference list entry available to a study.
/// Must exist before any line-scoped association to the same entry is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReferenceListEntry {
    pub study_reference_list_entry_id: StudyReferenceListEntryId,
    pub study_id: StudyId,
    pub reference_list_entry_id: ReferenceListEntryId,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl StudyReferenceListEntry {
    pub fn new(study_id: StudyId, reference_list_entry_id: ReferenceListEntryId) -> Self {
        Self {
            study_reference_list_entry_id: StudyReferenceListEntryId::now_v7(),
            study_id,
            reference_list_entry_id,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// QuestionLineReferenceListEntry - places a reference list entry on an axis
/// of a study question line. Active only while both the line and the study
/// entry are active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionLineReferenceListEntry {
    pub question_line_reference_list_entry_id: QuestionLineReferenceListEntryId,
    pub study_id: StudyId,
    pub study_question_line_id: StudyQuestionLineId,
    pub reference_list_entry_id: ReferenceListEntryId,
    pub placement: Placement,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl QuestionLineReferenceListEntry {
    pub fn new(
        line: &StudyQuestionLine,
        reference_list_entry_id: ReferenceListEntryId,
        placement: Placement,
    ) -> Self {
        Self {
            question_line_reference_list_entry_id: QuestionLineReferenceListEntryId::now_v7(),
            study_id: line.study_id,
            study_question_line_id: line.study_question_line_id,
            reference_list_entry_id,
            placement,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

// ============================================================================
// SUBSETS
// ============================================================================

/// SubsetDefinition - a named, reusable filter over one reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetDefinition {
    pub subset_definition_id: SubsetDefinitionId,
    pub reference_list_id: ReferenceListId,
    pub name: String,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl SubsetDefinition {
    pub fn new(reference_list_id: ReferenceListId, name: impl Into<String>) -> Self {
        Self {
            subset_definition_id: SubsetDefinitionId::now_v7(),
            reference_list_id,
            name: name.into(),
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// SubsetMember - one reference list entry included in a subset definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetMember {
    pub subset_member_id: SubsetMemberId,
    pub subset_definition_id: SubsetDefinitionId,
    pub reference_list_entry_id: ReferenceListEntryId,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl SubsetMember {
    pub fn new(
        subset_definition_id: SubsetDefinitionId,
        reference_list_entry_id: ReferenceListEntryId,
    ) -> Self {
        Self {
            subset_member_id: SubsetMemberId::now_v7(),
            subset_definition_id,
            reference_list_entry_id,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// StudySubsetDefinition - a subset definition made available to a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySubsetDefinition {
    pub study_subset_definition_id: StudySubsetDefinitionId,
    pub study_id: StudyId,
    pub subset_definition_id: SubsetDefinitionId,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl StudySubsetDefinition {
    pub fn new(study_id: StudyId, subset_definition_id: SubsetDefinitionId) -> Self {
        Self {
            study_subset_definition_id: StudySubsetDefinitionId::now_v7(),
            study_id,
            subset_definition_id,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}

/// Which entries of a reference list a study question line uses.
///
/// Exactly one of "full list" or "this subset" is in effect at any time.
/// The stored form is the `uses_full_list` flag plus an optional reference;
/// a row claiming both normalizes to `FullList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "SubsetSelectionRepr", into = "SubsetSelectionRepr")]
pub enum SubsetSelection {
    #[default]
    FullList,
    Subset(SubsetDefinitionId),
}

impl SubsetSelection {
    pub fn uses_full_list(&self) -> bool {
        matches!(self, SubsetSelection::FullList)
    }

    pub fn subset_definition_id(&self) -> Option<SubsetDefinitionId> {
        match self {
            SubsetSelection::FullList => None,
            SubsetSelection::Subset(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SubsetSelectionRepr {
    uses_full_list: bool,
    #[serde(default)]
    subset_definition_id: Option<SubsetDefinitionId>,
}

impl From<SubsetSelectionRepr> for SubsetSelection {
    fn from(repr: SubsetSelectionRepr) -> Self {
        match (repr.uses_full_list, repr.subset_definition_id) {
            (false, Some(id)) => SubsetSelection::Subset(id),
            _ => SubsetSelection::FullList,
        }
    }
}

impl From<SubsetSelection> for SubsetSelectionRepr {
    fn from(selection: SubsetSelection) -> Self {
        Self {
            uses_full_list: selection.uses_full_list(),
            subset_definition_id: selection.subset_definition_id(),
        }
    }
}

/// QuestionLineSubset - the subset choice of a study question line for one
/// of its reference lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionLineSubset {
    pub question_line_subset_id: QuestionLineSubsetId,
    pub study_id: StudyId,
    pub study_question_line_id: StudyQuestionLineId,
    pub reference_list_id: ReferenceListId,
    #[serde(flatten)]
    pub selection: SubsetSelection,
    pub state: LifecycleState,
    pub modified_on: Timestamp,
}

impl QuestionLineSubset {
    pub fn new(
        line: &StudyQuestionLine,
        reference_list_id: ReferenceListId,
        selection: SubsetSelection,
    ) -> Self {
        Self {
            question_line_subset_id: QuestionLineSubsetId::now_v7(),
            study_id: line.study_id,
            study_question_line_id: line.study_question_line_id,
            reference_list_id,
            selection,
            state: LifecycleState::Active,
            modified_on: Utc::now(),
        }
    }
}
