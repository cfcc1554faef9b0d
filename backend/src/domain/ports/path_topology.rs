//! Port for looking up the stop structure of transit paths.
//!
//! Schedules only need to know how many nodes each path visits so trip
//! timing arrays can be checked against it. Paths are owned elsewhere.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use super::define_port_error;

define_port_error! {
    /// Errors raised by path topology adapters.
    pub enum PathTopologyError {
        /// The path source could not be reached.
        Unavailable {
            /// Adapter message.
            message: String,
        } => "path topology unavailable: {message}",
    }
}

/// Port for path node counts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PathTopology: Send + Sync {
    /// Node counts for the requested paths.
    ///
    /// Unknown paths are omitted from the result rather than reported.
    async fn node_counts(&self, path_ids: &[Uuid]) -> Result<HashMap<Uuid, usize>, PathTopologyError>;
}

/// Fixture that knows no paths, so node counts are never checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePathTopology;

#[async_trait]
impl PathTopology for FixturePathTopology {
    async fn node_counts(&self, _path_ids: &[Uuid]) -> Result<HashMap<Uuid, usize>, PathTopologyError> {
        Ok(HashMap::new())
    }
}

/// Path topology backed by a fixed table.
///
/// Used by the admin CLI (counts given on the command line) and by tests.
#[derive(Debug, Default, Clone)]
pub struct StaticPathTopology {
    counts: HashMap<Uuid, usize>,
}

impl StaticPathTopology {
    /// Build from `(path_id, node_count)` pairs.
    pub fn new(counts: impl IntoIterator<Item = (Uuid, usize)>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PathTopology for StaticPathTopology {
    async fn node_counts(&self, path_ids: &[Uuid]) -> Result<HashMap<Uuid, usize>, PathTopologyError> {
        Ok(path_ids
            .iter()
            .filter_map(|id| self.counts.get(id).map(|count| (*id, *count)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    //! Behaviour of the bundled path topology adapters.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn static_topology_omits_unknown_paths() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let topology = StaticPathTopology::new([(known, 4)]);

        let counts = topology
            .node_counts(&[known, unknown])
            .await
            .expect("lookup succeeds");

        assert_eq!(counts, HashMap::from([(known, 4)]));
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_topology_knows_nothing() {
        let counts = FixturePathTopology
            .node_counts(&[Uuid::new_v4()])
            .await
            .expect("lookup succeeds");
        assert!(counts.is_empty());
    }
}
