//! PostgreSQL persistence for schedules using Diesel.
//!
//! Concrete implementation of the schedule repository port backed by
//! PostgreSQL through `diesel-async` and a `bb8` connection pool.
//!
//! Row structs (`models.rs`) and table definitions (`schema.rs`) stay
//! private to this module; the domain only ever sees [`crate::domain::Schedule`]
//! trees.
//!
//! # Example
//!
//! ```no_run
//! use transit_schedules::domain::ports::{QueryOptions, ScheduleRepository};
//! use transit_schedules::outbound::persistence::{
//!     DbPool, DieselScheduleRepository, PoolConfig,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/schedules")).await?;
//! let repository = DieselScheduleRepository::new(pool);
//! let stored = repository.exists(42, QueryOptions::default()).await?;
//! # let _ = stored;
//! # Ok(())
//! # }
//! ```

mod diesel_schedule_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_schedule_repository::DieselScheduleRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
