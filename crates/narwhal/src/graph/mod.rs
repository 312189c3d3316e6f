//! Geometry graph consumed and updated in place by the layout engine.
//!
//! Entities are addressed by string ids (mirroring how callers describe diagrams); the engine
//! resolves them once into a [`Hierarchy`] of integer indices and never stores algorithm data on
//! the entities themselves.

use crate::error::{Error, Result};
use crate::geom::{Point, Rect, is_finite_point, rect_from_center};
use indexmap::IndexMap;

mod boundary;

pub use boundary::{BorderInfo, RectangularBoundary};

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub clusters: Vec<Cluster>,
    /// Attraction edges between clusters (pull the two clusters' barycenters together).
    pub cluster_edges: Vec<ClusterEdge>,
}

impl Graph {
    pub fn validate(&self) -> Result<()> {
        Hierarchy::build(self).map(|_| ())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn cluster(&self, id: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub center: Point,
    pub width: f64,
    pub height: f64,
    /// Id of the closest enclosing cluster; `None` for top-level nodes.
    pub parent: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, center: Point, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            center,
            width,
            height,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn bounding_box(&self) -> Rect {
        rect_from_center(self.center, self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Ideal length override; the layout's configured default applies when unset.
    pub length: Option<f64>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            length: None,
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: String,
    pub parent: Option<String>,
    pub boundary: RectangularBoundary,
    /// Current rectangle. Recomputed by the layout so that it tightly wraps the descendants plus
    /// margins; only consulted as-is when the cluster is empty.
    pub rect: Rect,
}

impl Cluster {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            boundary: RectangularBoundary::default(),
            rect: Rect::zero(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.boundary = RectangularBoundary::with_margin(margin);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClusterEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Index form of a validated [`Graph`].
///
/// Cluster indices refer to `Graph::clusters`; the implicit root cluster is represented by
/// `None` parents and the `root_*` lists.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub node_index: IndexMap<String, usize>,
    pub cluster_index: IndexMap<String, usize>,
    pub node_parent: Vec<Option<usize>>,
    pub cluster_parent: Vec<Option<usize>>,
    pub child_nodes: Vec<Vec<usize>>,
    pub child_clusters: Vec<Vec<usize>>,
    pub root_nodes: Vec<usize>,
    pub root_clusters: Vec<usize>,
    /// `(source, target)` per entry of `Graph::edges`.
    pub edges: Vec<(usize, usize)>,
    pub cluster_edges: Vec<(usize, usize)>,
}

impl Hierarchy {
    pub fn build(graph: &Graph) -> Result<Self> {
        let mut node_index: IndexMap<String, usize> = IndexMap::new();
        for (i, n) in graph.nodes.iter().enumerate() {
            if node_index.insert(n.id.clone(), i).is_some() {
                return Err(Error::DuplicateId { id: n.id.clone() });
            }
            let finite = is_finite_point(n.center)
                && n.width.is_finite()
                && n.height.is_finite()
                && n.width >= 0.0
                && n.height >= 0.0;
            if !finite {
                return Err(Error::NonFiniteGeometry {
                    node_id: n.id.clone(),
                });
            }
        }

        let mut cluster_index: IndexMap<String, usize> = IndexMap::new();
        for (i, c) in graph.clusters.iter().enumerate() {
            if node_index.contains_key(&c.id) || cluster_index.insert(c.id.clone(), i).is_some() {
                return Err(Error::DuplicateId { id: c.id.clone() });
            }
            if let Some(reason) = c.boundary.defect() {
                return Err(Error::InvalidBoundary {
                    cluster_id: c.id.clone(),
                    reason,
                });
            }
        }

        let resolve_parent = |kind: &'static str, id: &str, parent: Option<&String>| {
            parent
                .map(|p| {
                    cluster_index
                        .get(p.as_str())
                        .copied()
                        .ok_or_else(|| Error::UnknownParent {
                            kind,
                            id: id.to_string(),
                            parent: p.clone(),
                        })
                })
                .transpose()
        };

        let mut node_parent = Vec::with_capacity(graph.nodes.len());
        for n in &graph.nodes {
            node_parent.push(resolve_parent("node", &n.id, n.parent.as_ref())?);
        }
        let mut cluster_parent = Vec::with_capacity(graph.clusters.len());
        for c in &graph.clusters {
            cluster_parent.push(resolve_parent("cluster", &c.id, c.parent.as_ref())?);
        }

        // A parent chain longer than the cluster count must revisit a cluster.
        for (start, c) in graph.clusters.iter().enumerate() {
            let mut cur = cluster_parent[start];
            let mut steps = 0usize;
            while let Some(p) = cur {
                steps += 1;
                if p == start || steps > graph.clusters.len() {
                    return Err(Error::ClusterCycle {
                        cluster_id: c.id.clone(),
                    });
                }
                cur = cluster_parent[p];
            }
        }

        let mut child_nodes = vec![Vec::new(); graph.clusters.len()];
        let mut child_clusters = vec![Vec::new(); graph.clusters.len()];
        let mut root_nodes = Vec::new();
        let mut root_clusters = Vec::new();
        for (i, p) in node_parent.iter().enumerate() {
            match p {
                Some(p) => child_nodes[*p].push(i),
                None => root_nodes.push(i),
            }
        }
        for (i, p) in cluster_parent.iter().enumerate() {
            match p {
                Some(p) => child_clusters[*p].push(i),
                None => root_clusters.push(i),
            }
        }

        let mut edges = Vec::with_capacity(graph.edges.len());
        for e in &graph.edges {
            if let Some(length) = e.length.filter(|l| !(l.is_finite() && *l >= 0.0)) {
                return Err(Error::InvalidEdgeLength {
                    edge_id: e.id.clone(),
                    length,
                });
            }
            match (
                node_index.get(e.source.as_str()),
                node_index.get(e.target.as_str()),
            ) {
                (Some(&s), Some(&t)) => edges.push((s, t)),
                _ => {
                    return Err(Error::MissingEndpoint {
                        edge_id: e.id.clone(),
                    });
                }
            }
        }
        let mut cluster_edges = Vec::with_capacity(graph.cluster_edges.len());
        for e in &graph.cluster_edges {
            match (
                cluster_index.get(e.source.as_str()),
                cluster_index.get(e.target.as_str()),
            ) {
                (Some(&s), Some(&t)) => cluster_edges.push((s, t)),
                _ => {
                    return Err(Error::MissingEndpoint {
                        edge_id: e.id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            node_index,
            cluster_index,
            node_parent,
            cluster_parent,
            child_nodes,
            child_clusters,
            root_nodes,
            root_clusters,
            edges,
            cluster_edges,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_parent.len()
    }

    /// Clusters ordered so that every cluster appears after all of its descendants.
    pub fn clusters_bottom_up(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.cluster_count());
        let mut stack: Vec<(usize, bool)> = self
            .root_clusters
            .iter()
            .rev()
            .map(|&c| (c, false))
            .collect();
        while let Some((c, expanded)) = stack.pop() {
            if expanded {
                order.push(c);
                continue;
            }
            stack.push((c, true));
            for &child in self.child_clusters[c].iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// All nodes below `cluster`, at any depth, in depth-first order.
    pub fn descendant_nodes(&self, cluster: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![cluster];
        while let Some(c) = stack.pop() {
            out.extend_from_slice(&self.child_nodes[c]);
            stack.extend(self.child_clusters[c].iter().rev().copied());
        }
        out
    }

    /// Proper ancestors of `cluster`, innermost first.
    pub fn cluster_ancestors(&self, cluster: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = self.cluster_parent[cluster];
        while let Some(p) = cur {
            out.push(p);
            cur = self.cluster_parent[p];
        }
        out
    }

    /// Clusters enclosing `node`, innermost first.
    pub fn node_ancestors(&self, node: usize) -> Vec<usize> {
        match self.node_parent[node] {
            Some(p) => {
                let mut out = vec![p];
                out.extend(self.cluster_ancestors(p));
                out
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::point;

    fn clustered() -> Graph {
        Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 10.0, 10.0).with_parent("inner"),
                Node::new("b", point(20.0, 0.0), 10.0, 10.0).with_parent("outer"),
                Node::new("c", point(40.0, 0.0), 10.0, 10.0),
            ],
            edges: vec![Edge::new("e0", "a", "c")],
            clusters: vec![
                Cluster::new("inner").with_parent("outer"),
                Cluster::new("outer"),
            ],
            cluster_edges: Vec::new(),
        }
    }

    #[test]
    fn bottom_up_order_lists_children_first() {
        let h = Hierarchy::build(&clustered()).expect("valid");
        assert_eq!(h.clusters_bottom_up(), vec![0, 1]);
        assert_eq!(h.descendant_nodes(1), vec![1, 0]);
        assert_eq!(h.node_ancestors(0), vec![0, 1]);
        assert_eq!(h.root_nodes, vec![2]);
    }

    #[test]
    fn missing_endpoint_is_rejected() {
        let mut g = clustered();
        g.edges.push(Edge::new("bad", "a", "zzz"));
        assert!(matches!(
            g.validate(),
            Err(Error::MissingEndpoint { edge_id }) if edge_id == "bad"
        ));
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let mut g = clustered();
        g.clusters[1].parent = Some("inner".to_string());
        assert!(matches!(g.validate(), Err(Error::ClusterCycle { .. })));
    }

    #[test]
    fn bad_edge_length_is_rejected() {
        for length in [f64::NAN, -5.0] {
            let mut g = clustered();
            g.edges[0].length = Some(length);
            assert!(matches!(
                g.validate(),
                Err(Error::InvalidEdgeLength { edge_id, .. }) if edge_id == "e0"
            ));
        }
        let mut g = clustered();
        g.edges[0].length = Some(0.0);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn bad_boundary_is_rejected() {
        let mut g = clustered();
        g.clusters[0].boundary.top.margin = f64::INFINITY;
        assert!(matches!(
            g.validate(),
            Err(Error::InvalidBoundary { cluster_id, .. }) if cluster_id == "inner"
        ));

        let mut g = clustered();
        g.clusters[1].boundary.min_height = -1.0;
        assert!(matches!(g.validate(), Err(Error::InvalidBoundary { .. })));

        let mut g = clustered();
        g.clusters[1].boundary.right.weight = 0.0;
        assert!(matches!(g.validate(), Err(Error::InvalidBoundary { .. })));
    }

    #[test]
    fn non_finite_node_is_rejected() {
        let mut g = clustered();
        g.nodes[2].center = point(f64::NAN, 0.0);
        assert!(matches!(g.validate(), Err(Error::NonFiniteGeometry { .. })));
    }
}
