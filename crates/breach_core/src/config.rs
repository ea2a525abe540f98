use std::path::Path;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::AppError;

pub const DEFAULT_NOTIFICATION_WINDOW_HOURS: u32 = 72;
const MAX_NOTIFICATION_WINDOW_HOURS: u32 = 24 * 365;

/// Deployment-wide regulatory deadline policy.
///
/// A single window applies to every incident; the default follows the ANPD 72-hour expectation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DeadlinePolicy {
    pub notification_window_hours: u32,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            notification_window_hours: DEFAULT_NOTIFICATION_WINDOW_HOURS,
        }
    }
}

impl DeadlinePolicy {
    pub fn with_window_hours(hours: u32) -> Result<Self, AppError> {
        let policy = Self {
            notification_window_hours: hours,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.notification_window_hours))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_NOTIFICATION_WINDOW_HOURS).contains(&self.notification_window_hours) {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "notification_window_hours out of range",
            )
            .with_details(format!(
                "value={}; allowed=1..={MAX_NOTIFICATION_WINDOW_HOURS}",
                self.notification_window_hours
            )));
        }
        Ok(())
    }

    /// Parse a JSON policy document. Missing keys fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        let policy: DeadlinePolicy = serde_json::from_str(json).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Failed to parse deadline policy JSON")
                .with_details(e.to_string())
        })?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read deadline policy file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }
}
