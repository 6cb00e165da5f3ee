//! Enum types for RUBRIC records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RECORD KINDS
// ============================================================================

/// Record kind discriminator for polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Study,
    QuestionLine,
    Answer,
    ReferenceList,
    ReferenceListEntry,
    QuestionLineReferenceList,
    StudyQuestionLine,
    StudyReferenceListEntry,
    QuestionLineReferenceListEntry,
    SubsetDefinition,
    SubsetMember,
    StudySubsetDefinition,
    QuestionLineSubset,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Study,
        EntityKind::QuestionLine,
        EntityKind::Answer,
        EntityKind::ReferenceList,
        EntityKind::ReferenceListEntry,
        EntityKind::QuestionLineReferenceList,
        EntityKind::StudyQuestionLine,
        EntityKind::StudyReferenceListEntry,
        EntityKind::QuestionLineReferenceListEntry,
        EntityKind::SubsetDefinition,
        EntityKind::SubsetMember,
        EntityKind::StudySubsetDefinition,
        EntityKind::QuestionLineSubset,
    ];

    /// Whether records of this kind link two other records and carry their
    /// own lifecycle state.
    pub fn is_association(&self) -> bool {
        matches!(
            self,
            EntityKind::QuestionLineReferenceList
                | EntityKind::StudyQuestionLine
                | EntityKind::StudyReferenceListEntry
                | EntityKind::QuestionLineReferenceListEntry
                | EntityKind::SubsetMember
                | EntityKind::StudySubsetDefinition
                | EntityKind::QuestionLineSubset
        )
    }

    /// Logical table name used in log fields and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Study => "study",
            EntityKind::QuestionLine => "question_line",
            EntityKind::Answer => "answer",
            EntityKind::ReferenceList => "reference_list",
            EntityKind::ReferenceListEntry => "reference_list_entry",
            EntityKind::QuestionLineReferenceList => "question_line_reference_list",
            EntityKind::StudyQuestionLine => "study_question_line",
            EntityKind::StudyReferenceListEntry => "study_reference_list_entry",
            EntityKind::QuestionLineReferenceListEntry => "question_line_reference_list_entry",
            EntityKind::SubsetDefinition => "subset_definition",
            EntityKind::SubsetMember => "subset_member",
            EntityKind::StudySubsetDefinition => "study_subset_definition",
            EntityKind::QuestionLineSubset => "question_line_subset",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Binary lifecycle state carried by most records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    #[default]
    Active,
    Inactive,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// True when moving from `self` to `next` is the Active -> Inactive edge.
    /// This is the only transition the engine reacts to.
    pub fn is_deactivation(&self, next: LifecycleState) -> bool {
        self.is_active() && !next.is_active()
    }
}

/// Axis a reference-list entry or answer is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Placement {
    Row,
    Column,
}

impl Placement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::Row => "Row",
            Placement::Column => "Column",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// STUDY STATUS
// ============================================================================

/// Fielding status of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StudyStatus {
    /// Study is still being configured
    #[default]
    Draft,
    /// Study is live with respondents
    Fielding,
    /// Fieldwork finished
    Closed,
    /// Study abandoned before completion
    Cancelled,
}

impl StudyStatus {
    /// Convert to the status label stored on the record.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            StudyStatus::Draft => "Draft",
            StudyStatus::Fielding => "Fielding",
            StudyStatus::Closed => "Closed",
            StudyStatus::Cancelled => "Cancelled",
        }
    }

    /// Parse from the stored status label.
    pub fn from_db_str(s: &str) -> Result<Self, StudyStatusParseError> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(StudyStatus::Draft),
            "fielding" => Ok(StudyStatus::Fielding),
            "closed" => Ok(StudyStatus::Closed),
            "cancelled" | "canceled" => Ok(StudyStatus::Cancelled),
            _ => Err(StudyStatusParseError(s.to_string())),
        }
    }

    /// Only draft studies accept downstream configuration edits.
    pub fn is_draft(&self) -> bool {
        matches!(self, StudyStatus::Draft)
    }
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for StudyStatus {
    type Err = StudyStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid study status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyStatusParseError(pub String);

impl fmt::Display for StudyStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid study status: {}", self.0)
    }
}

impl std::error::Error for StudyStatusParseError {}

// ============================================================================
// MUTATIONS
// ============================================================================

/// Kind of mutation observed on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "Create",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_status_roundtrip_db_str() {
        for status in [
            StudyStatus::Draft,
            StudyStatus::Fielding,
            StudyStatus::Closed,
            StudyStatus::Cancelled,
        ] {
            assert_eq!(StudyStatus::from_db_str(status.as_db_str()), Ok(status));
        }
        assert_eq!("canceled".parse::<StudyStatus>(), Ok(StudyStatus::Cancelled));
        assert!("Archived".parse::<StudyStatus>().is_err());
    }

    #[test]
    fn test_only_draft_is_draft() {
        assert!(StudyStatus::Draft.is_draft());
        assert!(!StudyStatus::Fielding.is_draft());
        assert!(!StudyStatus::Closed.is_draft());
    }

    #[test]
    fn test_deactivation_edge() {
        use LifecycleState::*;
        assert!(Active.is_deactivation(Inactive));
        assert!(!Active.is_deactivation(Active));
        assert!(!Inactive.is_deactivation(Inactive));
        assert!(!Inactive.is_deactivation(Active));
    }

    #[test]
    fn test_association_kinds() {
        assert!(EntityKind::QuestionLineReferenceListEntry.is_association());
        assert!(!EntityKind::Study.is_association());
        assert!(!EntityKind::ReferenceListEntry.is_association());
        assert_eq!(EntityKind::ALL.len(), 13);
    }
}
