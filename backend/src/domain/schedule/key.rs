//! Addressing a stored schedule by surrogate key or legacy UUID.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Identifier accepted by schedule deletion.
///
/// New callers address schedules by surrogate key. The UUID form is kept
/// for callers that still delete by external identity and should go away
/// once they have migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleKey {
    /// Store-assigned surrogate key.
    Id(i32),
    /// External identity. Legacy lookup path for deletion only.
    LegacyUuid(Uuid),
}

/// Failure to interpret a schedule identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleKeyError {
    /// The input was empty.
    #[error("schedule identifier must not be empty")]
    Empty,
    /// Surrogate keys start at 1.
    #[error("schedule surrogate key must be positive, got {0}")]
    NonPositive(i32),
    /// Neither an integer key nor a UUID.
    #[error("`{0}` is neither a schedule surrogate key nor a UUID")]
    Malformed(String),
}

impl ScheduleKey {
    /// Build a surrogate-key address, rejecting values the store never assigns.
    pub fn id(id: i32) -> Result<Self, ScheduleKeyError> {
        if id <= 0 {
            return Err(ScheduleKeyError::NonPositive(id));
        }
        Ok(Self::Id(id))
    }

    /// Whether the key uses the legacy UUID path.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyUuid(_))
    }
}

impl FromStr for ScheduleKey {
    type Err = ScheduleKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScheduleKeyError::Empty);
        }
        if let Ok(id) = trimmed.parse::<i32>() {
            return Self::id(id);
        }
        Uuid::parse_str(trimmed)
            .map(Self::LegacyUuid)
            .map_err(|_| ScheduleKeyError::Malformed(trimmed.to_owned()))
    }
}

impl From<Uuid> for ScheduleKey {
    fn from(value: Uuid) -> Self {
        Self::LegacyUuid(value)
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::LegacyUuid(uuid) => write!(f, "{uuid}"),
        }
    }
}
