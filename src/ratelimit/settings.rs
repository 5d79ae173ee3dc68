//! Rate configuration and validation of runtime updates.

use serde::Serialize;
use std::fmt;
use std::num::{IntErrorKind, ParseIntError};
use std::time::Duration;
use thiserror::Error;

use super::window::WINDOW;

/// Share of the even per-call spacing used as the default base delay.
const DEFAULT_SPACING_SHARE: f64 = 0.25;

/// Current admission budget.
///
/// Both values are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateConfig {
    /// Admissions allowed per rolling window
    limit_per_window: u32,
    /// Minimum spacing between admissions, in milliseconds
    base_delay_ms: u64,
}

impl RateConfig {
    /// Create a configuration from explicit values.
    pub fn new(limit_per_window: u32, base_delay_ms: u64) -> Result<Self, ConfigValidationError> {
        if limit_per_window == 0 {
            return Err(ConfigValidationError::NotPositive {
                field: ConfigField::LimitPerWindow,
                value: 0,
            });
        }
        if base_delay_ms == 0 {
            return Err(ConfigValidationError::NotPositive {
                field: ConfigField::BaseDelayMs,
                value: 0,
            });
        }

        Ok(Self {
            limit_per_window,
            base_delay_ms,
        })
    }

    /// Create a configuration whose base delay is derived from the limit.
    pub fn with_limit(limit_per_window: u32) -> Result<Self, ConfigValidationError> {
        Self::new(limit_per_window, default_base_delay_ms(limit_per_window))
    }

    /// Admissions allowed per rolling window.
    pub fn limit_per_window(&self) -> u32 {
        self.limit_per_window
    }

    /// Minimum spacing between admissions, in milliseconds.
    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Minimum spacing between admissions.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Overwrite the fields that passed validation.
    pub(super) fn apply(&mut self, limit_per_window: Option<u32>, base_delay_ms: Option<u64>) {
        if let Some(limit) = limit_per_window {
            self.limit_per_window = limit;
        }
        if let Some(delay) = base_delay_ms {
            self.base_delay_ms = delay;
        }
    }
}

/// Default base delay for a limit: a quarter of the even spacing over the window.
///
/// Never below one millisecond.
pub fn default_base_delay_ms(limit_per_window: u32) -> u64 {
    let even_spacing_ms = WINDOW.as_millis() as f64 / f64::from(limit_per_window.max(1));
    ((even_spacing_ms * DEFAULT_SPACING_SHARE) as u64).max(1)
}

/// A reconfigurable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigField {
    LimitPerWindow,
    BaseDelayMs,
}

impl ConfigField {
    /// Query parameter name used by the HTTP gate.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ConfigField::LimitPerWindow => "new_limit",
            ConfigField::BaseDelayMs => "new_delay",
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigField::LimitPerWindow => write!(f, "rate limit"),
            ConfigField::BaseDelayMs => write!(f, "base delay"),
        }
    }
}

/// Why a requested field was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{0} value is missing")]
    Missing(ConfigField),

    #[error("{field} value `{raw}` is not a whole number")]
    NotNumeric { field: ConfigField, raw: String },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: ConfigField, value: i128 },

    #[error("{field} value `{raw}` is out of range")]
    OutOfRange { field: ConfigField, raw: String },
}

impl ConfigValidationError {
    /// The field this error refers to.
    pub fn field(&self) -> ConfigField {
        match self {
            ConfigValidationError::Missing(field) => *field,
            ConfigValidationError::NotNumeric { field, .. }
            | ConfigValidationError::NotPositive { field, .. }
            | ConfigValidationError::OutOfRange { field, .. } => *field,
        }
    }
}

/// Outcome for one requested field: the applied value or the rejection.
pub type FieldOutcome<T> = Result<T, ConfigValidationError>;

/// A requested reconfiguration, carrying raw values as received.
///
/// Absent fields are left unchanged. Provided fields are validated
/// independently of each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    limit_per_window: Option<String>,
    base_delay_ms: Option<String>,
}

impl ConfigUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an update from optional raw values.
    pub fn from_raw(limit_per_window: Option<String>, base_delay_ms: Option<String>) -> Self {
        Self {
            limit_per_window,
            base_delay_ms,
        }
    }

    /// Request a new limit.
    pub fn limit_per_window(mut self, raw: impl ToString) -> Self {
        self.limit_per_window = Some(raw.to_string());
        self
    }

    /// Request a new base delay in milliseconds.
    pub fn base_delay_ms(mut self, raw: impl ToString) -> Self {
        self.base_delay_ms = Some(raw.to_string());
        self
    }

    /// Whether no field was requested.
    pub fn is_empty(&self) -> bool {
        self.limit_per_window.is_none() && self.base_delay_ms.is_none()
    }

    pub(super) fn parse_limit_per_window(&self) -> Option<FieldOutcome<u32>> {
        self.limit_per_window
            .as_deref()
            .map(|raw| parse_positive(ConfigField::LimitPerWindow, raw))
    }

    pub(super) fn parse_base_delay_ms(&self) -> Option<FieldOutcome<u64>> {
        self.base_delay_ms
            .as_deref()
            .map(|raw| parse_positive(ConfigField::BaseDelayMs, raw))
    }
}

/// Per-field result of an update, plus the configuration in force afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// `None` when the limit was not requested
    pub limit_per_window: Option<FieldOutcome<u32>>,
    /// `None` when the base delay was not requested
    pub base_delay_ms: Option<FieldOutcome<u64>>,
    /// Configuration after the valid fields were applied
    pub config: RateConfig,
}

impl UpdateReport {
    /// True when every requested field was applied.
    pub fn is_success(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Rejections, limit first.
    pub fn errors(&self) -> impl Iterator<Item = &ConfigValidationError> {
        let limit = self.limit_per_window.as_ref().and_then(|r| r.as_ref().err());
        let delay = self.base_delay_ms.as_ref().and_then(|r| r.as_ref().err());
        limit.into_iter().chain(delay)
    }
}

fn parse_positive<T: TryFrom<i128>>(field: ConfigField, raw: &str) -> FieldOutcome<T> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigValidationError::Missing(field));
    }

    let value: i128 = trimmed.parse().map_err(|e: ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ConfigValidationError::OutOfRange {
            field,
            raw: trimmed.to_string(),
        },
        _ => ConfigValidationError::NotNumeric {
            field,
            raw: trimmed.to_string(),
        },
    })?;

    if value <= 0 {
        return Err(ConfigValidationError::NotPositive { field, value });
    }

    T::try_from(value).map_err(|_| ConfigValidationError::OutOfRange {
        field,
        raw: trimmed.to_string(),
    })
}
