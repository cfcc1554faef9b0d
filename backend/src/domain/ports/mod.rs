//! Domain ports for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod path_topology;
mod schedule_repository;

#[cfg(test)]
pub use path_topology::MockPathTopology;
pub use path_topology::{FixturePathTopology, PathTopology, PathTopologyError, StaticPathTopology};
pub use schedule_repository::{
    QueryOptions, ScheduleRepository, ScheduleRepositoryError, ensure_valid_structure,
};
