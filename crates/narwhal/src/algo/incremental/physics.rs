use crate::geom::{Point, Rect, rect_from_center};
use crate::graph::{Graph, Hierarchy};

/// Simulation state of one geometry node. Indexed like `Graph::nodes`.
#[derive(Debug, Clone)]
pub(crate) struct PhysicsNode {
    pub(crate) center: Point,
    pub(crate) previous_center: Point,
    /// 1 for free nodes; locks raise it.
    pub(crate) stay_weight: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
}

impl PhysicsNode {
    pub(crate) const FREE_WEIGHT: f64 = 1.0;

    pub(crate) fn new(center: Point, width: f64, height: f64) -> Self {
        Self {
            center,
            previous_center: center,
            stay_weight: Self::FREE_WEIGHT,
            width,
            height,
        }
    }

    pub(crate) fn bounding_box(&self) -> Rect {
        rect_from_center(self.center, self.width, self.height)
    }

    pub(crate) fn size(&self, horizontal: bool) -> f64 {
        if horizontal { self.width } else { self.height }
    }

    /// Makes the current center the starting point of the next step, dropping momentum.
    pub(crate) fn settle(&mut self) {
        self.previous_center = self.center;
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PhysicsEdge {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) length: f64,
}

pub(crate) fn build_nodes(graph: &Graph) -> Vec<PhysicsNode> {
    graph
        .nodes
        .iter()
        .map(|n| PhysicsNode::new(n.center, n.width, n.height))
        .collect()
}

/// One physics edge per non-loop geometry edge.
pub(crate) fn build_edges(
    graph: &Graph,
    hierarchy: &Hierarchy,
    default_length: f64,
) -> Vec<PhysicsEdge> {
    graph
        .edges
        .iter()
        .zip(&hierarchy.edges)
        .filter(|(_, (s, t))| s != t)
        .map(|(e, &(source, target))| PhysicsEdge {
            source,
            target,
            length: e.length.unwrap_or(default_length),
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so the partition does not depend on union order.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Groups nodes that interact: nodes joined by an edge, nodes under the same top-level cluster,
/// and the contents of clusters joined by a cluster edge. Components are ordered by their first
/// node and list nodes in ascending order.
pub(crate) fn connected_components(
    node_count: usize,
    edges: &[PhysicsEdge],
    hierarchy: &Hierarchy,
) -> Vec<Vec<usize>> {
    let mut set = DisjointSet::new(node_count);
    for e in edges {
        set.union(e.source, e.target);
    }
    for &c in &hierarchy.root_clusters {
        let members = hierarchy.descendant_nodes(c);
        for pair in members.windows(2) {
            set.union(pair[0], pair[1]);
        }
    }
    for &(a, b) in &hierarchy.cluster_edges {
        let (ma, mb) = (hierarchy.descendant_nodes(a), hierarchy.descendant_nodes(b));
        if let (Some(&x), Some(&y)) = (ma.first(), mb.first()) {
            set.union(x, y);
        }
    }

    let mut slot = vec![usize::MAX; node_count];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for n in 0..node_count {
        let root = set.find(n);
        if slot[root] == usize::MAX {
            slot[root] = components.len();
            components.push(Vec::new());
        }
        components[slot[root]].push(n);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::point;
    use crate::graph::{Cluster, Edge, Node};

    #[test]
    fn components_follow_edges_and_clusters() {
        let graph = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 1.0, 1.0),
                Node::new("b", point(1.0, 0.0), 1.0, 1.0),
                Node::new("c", point(2.0, 0.0), 1.0, 1.0).with_parent("k"),
                Node::new("d", point(3.0, 0.0), 1.0, 1.0).with_parent("k"),
                Node::new("e", point(4.0, 0.0), 1.0, 1.0),
            ],
            edges: vec![Edge::new("ab", "a", "b"), Edge::new("ee", "e", "e")],
            clusters: vec![Cluster::new("k")],
            cluster_edges: Vec::new(),
        };
        let h = Hierarchy::build(&graph).unwrap();
        let edges = build_edges(&graph, &h, 40.0);
        assert_eq!(edges.len(), 1);
        let comps = connected_components(graph.nodes.len(), &edges, &h);
        assert_eq!(comps, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }
}
