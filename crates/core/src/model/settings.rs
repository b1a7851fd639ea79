use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("low time warning must be > 0 seconds")]
    InvalidLowTimeWarning,
}

/// Engine-wide knobs for running attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    low_time_warning_secs: u32,
    require_published: bool,
}

impl ExamSettings {
    /// Remaining time under which the forced-submission warning is shown.
    pub const DEFAULT_LOW_TIME_WARNING_SECS: u32 = 300;

    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidLowTimeWarning` if the threshold is zero.
    pub fn new(low_time_warning_secs: u32, require_published: bool) -> Result<Self, SettingsError> {
        if low_time_warning_secs == 0 {
            return Err(SettingsError::InvalidLowTimeWarning);
        }
        Ok(Self {
            low_time_warning_secs,
            require_published,
        })
    }

    #[must_use]
    pub fn low_time_warning_secs(&self) -> u32 {
        self.low_time_warning_secs
    }

    /// Whether unpublished tests are refused at attempt start.
    #[must_use]
    pub fn require_published(&self) -> bool {
        self.require_published
    }
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            low_time_warning_secs: Self::DEFAULT_LOW_TIME_WARNING_SECS,
            require_published: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_five_minute_warning() {
        let settings = ExamSettings::default();
        assert_eq!(settings.low_time_warning_secs(), 300);
        assert!(settings.require_published());
    }

    #[test]
    fn rejects_zero_threshold() {
        assert_eq!(
            ExamSettings::new(0, true).unwrap_err(),
            SettingsError::InvalidLowTimeWarning
        );
    }
}
