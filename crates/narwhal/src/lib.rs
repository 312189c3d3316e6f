#![forbid(unsafe_code)]

//! Headless incremental force-directed graph layout.
//!
//! `narwhal` places the nodes of a compound graph with a spring/repulsion simulation and keeps
//! the result clean by projecting it, axis by axis, onto separation constraints: caller-supplied
//! ones, edge directions, locks, and generated non-overlap and cluster-containment constraints.

pub mod algo;
pub mod error;
pub mod geom;
pub mod graph;
pub mod solver;

pub use algo::incremental::{Axis, IncrementalLayout, LockHandle};
pub use algo::overlap::OverlapRemovalParameters;
pub use algo::{EdgeDirection, IdealEdgeLength, IncrementalLayoutSettings};
pub use error::{Error, Result};
pub use geom::{Point, Rect};
pub use graph::{BorderInfo, Cluster, ClusterEdge, Edge, Graph, Node, RectangularBoundary};

/// Lays out `graph` in place, running every constraint level of `settings` to convergence.
pub fn layout(graph: &mut Graph, settings: IncrementalLayoutSettings) -> Result<()> {
    let mut engine = IncrementalLayout::new(graph, settings)?;
    engine.run_to_convergence();
    Ok(())
}
