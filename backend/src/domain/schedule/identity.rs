//! Store-assigned surrogate identity for schedule entities.

use serde::{Deserialize, Serialize};

/// Surrogate identity of a schedule, period or trip row.
///
/// Editor-built entities start as [`Identity::Pending`]; the store assigns a
/// key on first insert and the entity is [`Identity::Persisted`] from then
/// on. On the wire the identity is the nullable `integer_id` field.
///
/// # Examples
/// ```
/// use transit_schedules::domain::Identity;
///
/// assert_eq!(Identity::from(None), Identity::Pending);
/// assert_eq!(Identity::from(Some(4)).surrogate(), Some(4));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<i32>", into = "Option<i32>")]
pub enum Identity {
    /// Not stored yet.
    #[default]
    Pending,
    /// Stored under the given surrogate key.
    Persisted(i32),
}

impl Identity {
    /// Surrogate key when persisted.
    pub fn surrogate(self) -> Option<i32> {
        match self {
            Self::Pending => None,
            Self::Persisted(id) => Some(id),
        }
    }

    /// Whether the entity has not been stored yet.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl From<Option<i32>> for Identity {
    fn from(value: Option<i32>) -> Self {
        value.map_or(Self::Pending, Self::Persisted)
    }
}

impl From<Identity> for Option<i32> {
    fn from(value: Identity) -> Self {
        value.surrogate()
    }
}
