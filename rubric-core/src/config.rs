//! Configuration types

use crate::{ConfigError, RubricResult};
use serde::{Deserialize, Serialize};

/// Separator placed between rendered table sections of one summary field.
pub const DEFAULT_SECTION_SEPARATOR: &str = "<hr/>";

/// Deepest trigger invocation that may still cascade. Events raised by the
/// engine's own writes arrive one level deeper and are skipped.
pub const DEFAULT_MAX_TRIGGER_DEPTH: u32 = 1;

/// Synchronization engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Highest host invocation depth at which handlers still run.
    pub max_trigger_depth: u32,
    /// Submit cascade batches with continue-on-error.
    pub continue_on_error: bool,
    /// Token joining rendered table sections.
    pub section_separator: String,
    /// Rebuild study question line summaries even when the study left Draft.
    pub rebuild_non_draft_lines: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_trigger_depth: DEFAULT_MAX_TRIGGER_DEPTH,
            continue_on_error: true,
            section_separator: DEFAULT_SECTION_SEPARATOR.to_string(),
            rebuild_non_draft_lines: false,
        }
    }
}

impl SyncConfig {
    /// Build a configuration from `RUBRIC_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// - `RUBRIC_MAX_TRIGGER_DEPTH`
    /// - `RUBRIC_CONTINUE_ON_ERROR`
    /// - `RUBRIC_SECTION_SEPARATOR`
    /// - `RUBRIC_REBUILD_NON_DRAFT_LINES`
    pub fn from_env() -> RubricResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> RubricResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("RUBRIC_MAX_TRIGGER_DEPTH") {
            config.max_trigger_depth =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "max_trigger_depth".to_string(),
                        value: raw.clone(),
                        reason: "must be a non-negative integer".to_string(),
                    })?;
        }
        if let Some(raw) = lookup("RUBRIC_CONTINUE_ON_ERROR") {
            config.continue_on_error = parse_flag("continue_on_error", &raw)?;
        }
        if let Some(raw) = lookup("RUBRIC_SECTION_SEPARATOR") {
            config.section_separator = raw;
        }
        if let Some(raw) = lookup("RUBRIC_REBUILD_NON_DRAFT_LINES") {
            config.rebuild_non_draft_lines = parse_flag("rebuild_non_draft_lines", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_trigger_depth >= 1 (depth 1 is the user-initiated mutation)
    /// - section_separator is not blank
    pub fn validate(&self) -> RubricResult<()> {
        if self.max_trigger_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_trigger_depth".to_string(),
                value: self.max_trigger_depth.to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.section_separator.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "section_separator".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn parse_flag(field: &str, raw: &str) -> RubricResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected true/false".to_string(),
        }
        .into()),
    }
}
