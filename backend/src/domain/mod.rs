//! Domain types, ports and services for transit schedules.
//!
//! Public surface:
//! - [`Schedule`], [`SchedulePeriod`], [`ScheduleTrip`]: the aggregate.
//! - [`Identity`] and [`ScheduleKey`]: surrogate and legacy addressing.
//! - [`ScheduleValidator`]: pure structural and topology checks.
//! - [`reconcile`]: the insert/update/delete planner used by adapters.
//! - [`ScheduleService`]: validation plus persistence with error translation.
//! - [`Error`] and [`ErrorCode`]: the caller-facing failure payload.

pub mod error;
pub mod ports;
mod schedule;
mod schedule_service;

pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::schedule::{
    IdentifierError, Identity, Schedule, ScheduleKey, ScheduleKeyError, SchedulePeriod,
    ScheduleTrip, decode_schedule, reconcile, validation,
};
pub use self::schedule::validation::{
    Location, NodeCount, ScheduleValidator, ValidationIssue, ValidationReport, parse_time_of_day,
};
pub use self::schedule_service::ScheduleService;

/// Result alias for domain services.
pub type DomainResult<T> = Result<T, Error>;
