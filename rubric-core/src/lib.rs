//! RUBRIC Core - Record Types
//!
//! Pure data structures for the questionnaire-configuration graph: typed ids,
//! records, lifecycle enums, errors and engine configuration. Every other
//! crate in the workspace depends on this one. No store access and no
//! synchronization logic lives here.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::{SyncConfig, DEFAULT_MAX_TRIGGER_DEPTH, DEFAULT_SECTION_SEPARATOR};
pub use entities::{
    Answer, QuestionLine, QuestionLineReferenceList, QuestionLineReferenceListEntry,
    QuestionLineSubset, ReferenceList, ReferenceListEntry, Study, StudyQuestionLine,
    StudyReferenceListEntry, StudySubsetDefinition, SubsetDefinition, SubsetMember,
    SubsetSelection,
};
pub use enums::{
    EntityKind, LifecycleState, Operation, Placement, StudyStatus, StudyStatusParseError,
};
pub use error::{ConfigError, RenderError, RubricError, RubricResult, StorageError, SyncError};
pub use identity::{
    AnswerId, EntityIdType, QuestionLineId, QuestionLineReferenceListEntryId,
    QuestionLineReferenceListId, QuestionLineSubsetId, RecordKey, ReferenceListEntryId,
    ReferenceListId, StudyId, StudyQuestionLineId, StudyReferenceListEntryId,
    StudySubsetDefinitionId, SubsetDefinitionId, SubsetMemberId, Timestamp,
};
