//! Identity types for RUBRIC records

use crate::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Strongly-typed record identifier.
///
/// Each record kind gets its own newtype so a `StudyId` can never be passed
/// where a `StudyQuestionLineId` is expected. All ids are UUIDv7 so they sort
/// by creation time.
pub trait EntityIdType:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Record kind this id belongs to.
    const KIND: EntityKind;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Unwrap into the raw UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh timestamp-sortable id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The all-zero id.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    /// Polymorphic key for this id.
    fn key(&self) -> RecordKey {
        RecordKey::new(Self::KIND, self.as_uuid())
    }
}

macro_rules! define_entity_id {
    ($name:ident, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const KIND: EntityKind = EntityKind::$kind;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_entity_id!(StudyId, Study, "Identifier of a study.");
define_entity_id!(QuestionLineId, QuestionLine, "Identifier of a question line.");
define_entity_id!(AnswerId, Answer, "Identifier of a discrete answer row.");
define_entity_id!(ReferenceListId, ReferenceList, "Identifier of a reference list.");
define_entity_id!(
    ReferenceListEntryId,
    ReferenceListEntry,
    "Identifier of a reference list entry."
);
define_entity_id!(
    QuestionLineReferenceListId,
    QuestionLineReferenceList,
    "Identifier of a question line to reference list association."
);
define_entity_id!(
    StudyQuestionLineId,
    StudyQuestionLine,
    "Identifier of a study-scoped question line."
);
define_entity_id!(
    StudyReferenceListEntryId,
    StudyReferenceListEntry,
    "Identifier of a study to reference list entry association."
);
define_entity_id!(
    QuestionLineReferenceListEntryId,
    QuestionLineReferenceListEntry,
    "Identifier of a study question line to reference list entry association."
);
define_entity_id!(SubsetDefinitionId, SubsetDefinition, "Identifier of a subset definition.");
define_entity_id!(SubsetMemberId, SubsetMember, "Identifier of a subset member row.");
define_entity_id!(
    StudySubsetDefinitionId,
    StudySubsetDefinition,
    "Identifier of a study to subset definition association."
);
define_entity_id!(
    QuestionLineSubsetId,
    QuestionLineSubset,
    "Identifier of a question line subset choice."
);

/// Reference to any record by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl RecordKey {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    /// Reinterpret this key as a typed id, if the kind matches.
    pub fn typed<I: EntityIdType>(&self) -> Option<I> {
        (self.kind == I::KIND).then(|| I::new(self.id))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
