#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graph contains an edge with a missing endpoint: {edge_id}")]
    MissingEndpoint { edge_id: String },

    #[error("duplicate id in graph: {id}")]
    DuplicateId { id: String },

    #[error("{kind} {id} references unknown parent cluster {parent}")]
    UnknownParent {
        kind: &'static str,
        id: String,
        parent: String,
    },

    #[error("cluster hierarchy contains a cycle through {cluster_id}")]
    ClusterCycle { cluster_id: String },

    #[error("node {node_id} has non-finite geometry")]
    NonFiniteGeometry { node_id: String },

    #[error("unknown node: {id}")]
    UnknownNode { id: String },

    #[error("invalid setting `{name}` = {value}: expected {expected}")]
    InvalidSetting {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("separation constraint between node {id} and itself")]
    SelfSeparation { id: String },

    #[error("edge {edge_id} has invalid length {length}: expected a finite non-negative number")]
    InvalidEdgeLength { edge_id: String, length: f64 },

    #[error("cluster {cluster_id} has an invalid boundary: {reason}")]
    InvalidBoundary {
        cluster_id: String,
        reason: &'static str,
    },

    #[error("unknown lock handle: {0}")]
    UnknownLock(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_range(
    name: &'static str,
    value: f64,
    ok: bool,
    expected: &'static str,
) -> Result<()> {
    if ok && !value.is_nan() {
        Ok(())
    } else {
        Err(Error::InvalidSetting {
            name,
            value,
            expected,
        })
    }
}
