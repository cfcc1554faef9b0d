//! Decoding editor payloads into a [`Schedule`].
//!
//! Identifier fields are checked before the typed decode so a malformed
//! identity is reported with its JSON pointer rather than as a generic
//! deserialisation failure.

use serde_json::Value;
use uuid::Uuid;

use super::Schedule;

const SCHEDULE_UUID_FIELDS: &[&str] = &["id", "service_id", "line_id"];
const PERIOD_UUID_FIELDS: &[&str] = &["id", "outbound_path_id", "inbound_path_id"];
const TRIP_UUID_FIELDS: &[&str] = &["id", "path_id", "unit_id", "block_id"];

/// Failure to decode an editor payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// A UUID or surrogate key field holds something else.
    #[error("{pointer} is not a valid identifier: {value}")]
    InvalidIdentifier {
        /// JSON pointer of the offending field.
        pointer: String,
        /// Offending value, rendered as JSON.
        value: String,
    },
    /// The payload does not describe a schedule.
    #[error("schedule payload is malformed: {0}")]
    Malformed(String),
}

/// Decode an editor payload, rejecting malformed identifiers first.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use transit_schedules::domain::{IdentifierError, decode_schedule};
///
/// let payload = json!({
///     "id": "not a uuid",
///     "service_id": "5ac2b1a4-2a7c-4d1e-9a49-4f6c3e0b8f10",
///     "line_id": "0b8d6a4e-3f0a-4c55-9d2b-9f1f1e6b2c31",
/// });
/// let error = decode_schedule(payload).unwrap_err();
/// assert!(matches!(error, IdentifierError::InvalidIdentifier { .. }));
/// ```
pub fn decode_schedule(value: Value) -> Result<Schedule, IdentifierError> {
    check_identifiers(&value)?;
    serde_json::from_value(value).map_err(|err| IdentifierError::Malformed(err.to_string()))
}

fn check_identifiers(schedule: &Value) -> Result<(), IdentifierError> {
    check_entity(schedule, "", SCHEDULE_UUID_FIELDS)?;
    for (period_index, period) in children(schedule, "periods").enumerate() {
        let period_pointer = format!("/periods/{period_index}");
        check_entity(period, &period_pointer, PERIOD_UUID_FIELDS)?;
        for (trip_index, trip) in children(period, "trips").enumerate() {
            let trip_pointer = format!("{period_pointer}/trips/{trip_index}");
            check_entity(trip, &trip_pointer, TRIP_UUID_FIELDS)?;
        }
    }
    Ok(())
}

fn children<'a>(value: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn check_entity(entity: &Value, pointer: &str, uuid_fields: &[&str]) -> Result<(), IdentifierError> {
    for field in uuid_fields {
        match entity.get(*field) {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) if Uuid::parse_str(raw).is_ok() => {}
            Some(other) => return Err(invalid(pointer, field, other)),
        }
    }

    match entity.get("integer_id") {
        None | Some(Value::Null) => Ok(()),
        Some(raw) if is_surrogate_key(raw) => Ok(()),
        Some(other) => Err(invalid(pointer, "integer_id", other)),
    }
}

fn is_surrogate_key(raw: &Value) -> bool {
    raw.as_i64()
        .and_then(|value| i32::try_from(value).ok())
        .is_some_and(|value| value > 0)
}

fn invalid(pointer: &str, field: &str, value: &Value) -> IdentifierError {
    IdentifierError::InvalidIdentifier {
        pointer: format!("{pointer}/{field}"),
        value: value.to_string(),
    }
}
