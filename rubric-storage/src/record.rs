//! Polymorphic record envelope.
//!
//! The store deals in [`Record`] values so one trait can serve every kind.
//! [`StoredRecord`] recovers the typed struct on the way out.

use crate::query::ParentKey;
use crate::update::FieldChange;
use rubric_core::{
    Answer, EntityIdType, EntityKind, LifecycleState, Placement, QuestionLine,
    QuestionLineReferenceList, QuestionLineReferenceListEntry, QuestionLineSubset, RecordKey,
    ReferenceList, ReferenceListEntry, Study, StudyQuestionLine, StudyReferenceListEntry,
    StudySubsetDefinition, SubsetDefinition, SubsetMember, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Any record the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record")]
pub enum Record {
    Study(Study),
    QuestionLine(QuestionLine),
    Answer(Answer),
    ReferenceList(ReferenceList),
    ReferenceListEntry(ReferenceListEntry),
    QuestionLineReferenceList(QuestionLineReferenceList),
    StudyQuestionLine(StudyQuestionLine),
    StudyReferenceListEntry(StudyReferenceListEntry),
    QuestionLineReferenceListEntry(QuestionLineReferenceListEntry),
    SubsetDefinition(SubsetDefinition),
    SubsetMember(SubsetMember),
    StudySubsetDefinition(StudySubsetDefinition),
    QuestionLineSubset(QuestionLineSubset),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Study(_) => EntityKind::Study,
            Record::QuestionLine(_) => EntityKind::QuestionLine,
            Record::Answer(_) => EntityKind::Answer,
            Record::ReferenceList(_) => EntityKind::ReferenceList,
            Record::ReferenceListEntry(_) => EntityKind::ReferenceListEntry,
            Record::QuestionLineReferenceList(_) => EntityKind::QuestionLineReferenceList,
            Record::StudyQuestionLine(_) => EntityKind::StudyQuestionLine,
            Record::StudyReferenceListEntry(_) => EntityKind::StudyReferenceListEntry,
            Record::QuestionLineReferenceListEntry(_) => {
                EntityKind::QuestionLineReferenceListEntry
            }
            Record::SubsetDefinition(_) => EntityKind::SubsetDefinition,
            Record::SubsetMember(_) => EntityKind::SubsetMember,
            Record::StudySubsetDefinition(_) => EntityKind::StudySubsetDefinition,
            Record::QuestionLineSubset(_) => EntityKind::QuestionLineSubset,
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Record::Study(r) => r.study_id.key(),
            Record::QuestionLine(r) => r.question_line_id.key(),
            Record::Answer(r) => r.answer_id.key(),
            Record::ReferenceList(r) => r.reference_list_id.key(),
            Record::ReferenceListEntry(r) => r.reference_list_entry_id.key(),
            Record::QuestionLineReferenceList(r) => r.question_line_reference_list_id.key(),
            Record::StudyQuestionLine(r) => r.study_question_line_id.key(),
            Record::StudyReferenceListEntry(r) => r.study_reference_list_entry_id.key(),
            Record::QuestionLineReferenceListEntry(r) => {
                r.question_line_reference_list_entry_id.key()
            }
            Record::SubsetDefinition(r) => r.subset_definition_id.key(),
            Record::SubsetMember(r) => r.subset_member_id.key(),
            Record::StudySubsetDefinition(r) => r.study_subset_definition_id.key(),
            Record::QuestionLineSubset(r) => r.question_line_subset_id.key(),
        }
    }

    /// Lifecycle state, or `None` for records without one (studies).
    pub fn state(&self) -> Option<LifecycleState> {
        match self {
            Record::Study(_) => None,
            Record::QuestionLine(r) => Some(r.state),
            Record::Answer(r) => Some(r.state),
            Record::ReferenceList(r) => Some(r.state),
            Record::ReferenceListEntry(r) => Some(r.state),
            Record::QuestionLineReferenceList(r) => Some(r.state),
            Record::StudyQuestionLine(r) => Some(r.state),
            Record::StudyReferenceListEntry(r) => Some(r.state),
            Record::QuestionLineReferenceListEntry(r) => Some(r.state),
            Record::SubsetDefinition(r) => Some(r.state),
            Record::SubsetMember(r) => Some(r.state),
            Record::StudySubsetDefinition(r) => Some(r.state),
            Record::QuestionLineSubset(r) => Some(r.state),
        }
    }

    /// Axis placement for records that carry one.
    pub fn placement(&self) -> Option<Placement> {
        match self {
            Record::Answer(r) => Some(r.placement),
            Record::QuestionLineReferenceList(r) => Some(r.placement),
            Record::QuestionLineReferenceListEntry(r) => Some(r.placement),
            _ => None,
        }
    }

    /// Every parent this record links to. A query matches when all of its
    /// parent filters appear here.
    pub fn parents(&self) -> Vec<ParentKey> {
        match self {
            Record::Study(_) | Record::QuestionLine(_) | Record::ReferenceList(_) => Vec::new(),
            Record::Answer(r) => vec![ParentKey::QuestionLine(r.question_line_id)],
            Record::ReferenceListEntry(r) => vec![ParentKey::ReferenceList(r.reference_list_id)],
            Record::QuestionLineReferenceList(r) => vec![
                ParentKey::QuestionLine(r.question_line_id),
                ParentKey::ReferenceList(r.reference_list_id),
            ],
            Record::StudyQuestionLine(r) => vec![
                ParentKey::Study(r.study_id),
                ParentKey::QuestionLine(r.question_line_id),
            ],
            Record::StudyReferenceListEntry(r) => vec![
                ParentKey::Study(r.study_id),
                ParentKey::ReferenceListEntry(r.reference_list_entry_id),
            ],
            Record::QuestionLineReferenceListEntry(r) => vec![
                ParentKey::Study(r.study_id),
                ParentKey::StudyQuestionLine(r.study_question_line_id),
                ParentKey::ReferenceListEntry(r.reference_list_entry_id),
            ],
            Record::SubsetDefinition(r) => vec![ParentKey::ReferenceList(r.reference_list_id)],
            Record::SubsetMember(r) => vec![
                ParentKey::SubsetDefinition(r.subset_definition_id),
                ParentKey::ReferenceListEntry(r.reference_list_entry_id),
            ],
            Record::StudySubsetDefinition(r) => vec![
                ParentKey::Study(r.study_id),
                ParentKey::SubsetDefinition(r.subset_definition_id),
            ],
            Record::QuestionLineSubset(r) => {
                let mut parents = vec![
                    ParentKey::Study(r.study_id),
                    ParentKey::StudyQuestionLine(r.study_question_line_id),
                    ParentKey::ReferenceList(r.reference_list_id),
                ];
                if let Some(definition) = r.selection.subset_definition_id() {
                    parents.push(ParentKey::SubsetDefinition(definition));
                }
                parents
            }
        }
    }

    pub fn modified_on(&self) -> Timestamp {
        match self {
            Record::Study(r) => r.modified_on,
            Record::QuestionLine(r) => r.modified_on,
            Record::Answer(r) => r.modified_on,
            Record::ReferenceList(r) => r.modified_on,
            Record::ReferenceListEntry(r) => r.modified_on,
            Record::QuestionLineReferenceList(r) => r.modified_on,
            Record::StudyQuestionLine(r) => r.modified_on,
            Record::StudyReferenceListEntry(r) => r.modified_on,
            Record::QuestionLineReferenceListEntry(r) => r.modified_on,
            Record::SubsetDefinition(r) => r.modified_on,
            Record::SubsetMember(r) => r.modified_on,
            Record::StudySubsetDefinition(r) => r.modified_on,
            Record::QuestionLineSubset(r) => r.modified_on,
        }
    }

    pub(crate) fn touch(&mut self, at: Timestamp) {
        let slot = match self {
            Record::Study(r) => &mut r.modified_on,
            Record::QuestionLine(r) => &mut r.modified_on,
            Record::Answer(r) => &mut r.modified_on,
            Record::ReferenceList(r) => &mut r.modified_on,
            Record::ReferenceListEntry(r) => &mut r.modified_on,
            Record::QuestionLineReferenceList(r) => &mut r.modified_on,
            Record::StudyQuestionLine(r) => &mut r.modified_on,
            Record::StudyReferenceListEntry(r) => &mut r.modified_on,
            Record::QuestionLineReferenceListEntry(r) => &mut r.modified_on,
            Record::SubsetDefinition(r) => &mut r.modified_on,
            Record::SubsetMember(r) => &mut r.modified_on,
            Record::StudySubsetDefinition(r) => &mut r.modified_on,
            Record::QuestionLineSubset(r) => &mut r.modified_on,
        };
        *slot = at;
    }

    fn state_mut(&mut self) -> Option<&mut LifecycleState> {
        match self {
            Record::Study(_) => None,
            Record::QuestionLine(r) => Some(&mut r.state),
            Record::Answer(r) => Some(&mut r.state),
            Record::ReferenceList(r) => Some(&mut r.state),
            Record::ReferenceListEntry(r) => Some(&mut r.state),
            Record::QuestionLineReferenceList(r) => Some(&mut r.state),
            Record::StudyQuestionLine(r) => Some(&mut r.state),
            Record::StudyReferenceListEntry(r) => Some(&mut r.state),
            Record::QuestionLineReferenceListEntry(r) => Some(&mut r.state),
            Record::SubsetDefinition(r) => Some(&mut r.state),
            Record::SubsetMember(r) => Some(&mut r.state),
            Record::StudySubsetDefinition(r) => Some(&mut r.state),
            Record::QuestionLineSubset(r) => Some(&mut r.state),
        }
    }

    /// Apply one field change in place. Returns a reason when the change does
    /// not exist on this kind.
    pub fn apply(&mut self, change: &FieldChange) -> Result<(), String> {
        match (self, change) {
            (record, FieldChange::State(state)) => {
                let kind = record.kind();
                match record.state_mut() {
                    Some(slot) => {
                        *slot = *state;
                        Ok(())
                    }
                    None => Err(format!("{kind} has no lifecycle state")),
                }
            }
            (Record::Study(r), FieldChange::SubsetSummary(text)) => {
                r.subset_summary = text.clone();
                Ok(())
            }
            (Record::StudyQuestionLine(r), FieldChange::SubsetSummary(text)) => {
                r.subset_summary = text.clone();
                Ok(())
            }
            (Record::QuestionLine(r), FieldChange::AnswerSummary(text)) => {
                r.answer_summary = text.clone();
                Ok(())
            }
            (Record::QuestionLineSubset(r), FieldChange::Selection(selection)) => {
                r.selection = *selection;
                Ok(())
            }
            (record, change) => Err(format!("{} has no field {}", record.kind(), change.field())),
        }
    }
}

/// A typed record that can travel through the [`Record`] envelope.
pub trait StoredRecord: Sized + Clone {
    type Id: EntityIdType;

    fn from_record(record: Record) -> Option<Self>;

    fn into_record(self) -> Record;
}

macro_rules! impl_stored_record {
    ($ty:ident, $id:ty) => {
        impl StoredRecord for $ty {
            type Id = $id;

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_record(self) -> Record {
                Record::$ty(self)
            }
        }

        impl From<$ty> for Record {
            fn from(inner: $ty) -> Record {
                Record::$ty(inner)
            }
        }
    };
}

impl_stored_record!(Study, rubric_core::StudyId);
impl_stored_record!(QuestionLine, rubric_core::QuestionLineId);
impl_stored_record!(Answer, rubric_core::AnswerId);
impl_stored_record!(ReferenceList, rubric_core::ReferenceListId);
impl_stored_record!(ReferenceListEntry, rubric_core::ReferenceListEntryId);
impl_stored_record!(
    QuestionLineReferenceList,
    rubric_core::QuestionLineReferenceListId
);
impl_stored_record!(StudyQuestionLine, rubric_core::StudyQuestionLineId);
impl_stored_record!(StudyReferenceListEntry, rubric_core::StudyReferenceListEntryId);
impl_stored_record!(
    QuestionLineReferenceListEntry,
    rubric_core::QuestionLineReferenceListEntryId
);
impl_stored_record!(SubsetDefinition, rubric_core::SubsetDefinitionId);
impl_stored_record!(SubsetMember, rubric_core::SubsetMemberId);
impl_stored_record!(StudySubsetDefinition, rubric_core::StudySubsetDefinitionId);
impl_stored_record!(QuestionLineSubset, rubric_core::QuestionLineSubsetId);
