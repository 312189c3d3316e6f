//! Structural constraints projected directly onto node centers between force steps.

use super::physics::{PhysicsEdge, PhysicsNode};
use crate::algo::{EdgeDirection, IdealEdgeLength};
use crate::geom::{Rect, Vector, coord, set_coord, vector};
use crate::graph::RectangularBoundary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Axis::Horizontal)
    }
}

/// `target.axis − source.axis ≥ gap` (or `= gap`) on node centers.
#[derive(Debug, Clone)]
pub(crate) struct SeparationConstraint {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) axis: Axis,
    pub(crate) gap: f64,
    pub(crate) equality: bool,
    pub(crate) level: usize,
    /// Generated from edge directions at initialization rather than added by the caller.
    pub(crate) derived: bool,
}

/// Handle returned by [`IncrementalLayout::create_lock`](super::IncrementalLayout::create_lock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockTarget {
    Node(usize),
    Cluster(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct LockConstraint {
    pub(crate) handle: LockHandle,
    pub(crate) target: LockTarget,
    pub(crate) bounds: Rect,
    pub(crate) weight: f64,
    /// Nodes moved by the lock: the node itself, or every descendant of the cluster.
    pub(crate) members: Vec<usize>,
    /// Boundary of a locked cluster; its margins pad the pinned box.
    pub(crate) boundary: Option<RectangularBoundary>,
}

#[derive(Debug, Clone)]
pub(crate) enum Constraint {
    Separation(SeparationConstraint),
    Lock(LockConstraint),
}

impl Constraint {
    pub(crate) fn level(&self) -> usize {
        match self {
            Constraint::Separation(c) => c.level,
            Constraint::Lock(_) => 0,
        }
    }

    pub(crate) fn nodes(&self) -> Vec<usize> {
        match self {
            Constraint::Separation(c) => vec![c.source, c.target],
            Constraint::Lock(l) => l.members.clone(),
        }
    }

    pub(crate) fn is_lock(&self) -> bool {
        matches!(self, Constraint::Lock(_))
    }

    /// Moves node centers to satisfy the constraint; returns the squared displacement applied.
    pub(crate) fn project(&self, nodes: &mut [PhysicsNode]) -> f64 {
        match self {
            Constraint::Separation(c) => c.project(nodes),
            Constraint::Lock(l) => l.project(nodes),
        }
    }
}

impl SeparationConstraint {
    fn project(&self, nodes: &mut [PhysicsNode]) -> f64 {
        let h = self.axis.is_horizontal();
        let (u, v) = (self.source, self.target);
        if u == v {
            return 0.0;
        }
        let (pu, pv) = (coord(nodes[u].center, h), coord(nodes[v].center, h));
        let deficit = self.gap - (pv - pu);
        if deficit <= 0.0 && !self.equality {
            return 0.0;
        }
        let (wu, wv) = (nodes[u].stay_weight, nodes[v].stay_weight);
        let f = deficit / (wu + wv);
        let (du, dv) = (wv * f, wu * f);
        set_coord(&mut nodes[u].center, h, pu - du);
        set_coord(&mut nodes[v].center, h, pv + dv);
        du * du + dv * dv
    }
}

impl LockConstraint {
    /// Bounding box of the locked node, or of the cluster contents plus margins.
    fn current_bounds(&self, nodes: &[PhysicsNode]) -> Option<Rect> {
        let mut it = self.members.iter().map(|&n| nodes[n].bounding_box());
        let first = it.next()?;
        let mut r = it.fold(first, |acc, b| acc.union(&b));
        if let Some(b) = &self.boundary {
            r.min -= vector(b.left.margin, b.top.margin);
            r.max += vector(b.right.margin, b.bottom.margin);
        }
        Some(r)
    }

    fn project(&self, nodes: &mut [PhysicsNode]) -> f64 {
        let Some(current) = self.current_bounds(nodes) else {
            return 0.0;
        };
        let delta = self.bounds.center() - current.center();
        if delta == Vector::zero() {
            return 0.0;
        }
        for &n in &self.members {
            nodes[n].center += delta;
        }
        delta.square_length() * self.members.len() as f64
    }
}

/// Level of the separations generated from edge directions.
pub(crate) const EDGE_DIRECTION_LEVEL: usize = 1;

/// Edges closing a cycle in depth-first order over `source → target`.
fn back_edges(node_count: usize, edges: &[PhysicsEdge]) -> Vec<bool> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); node_count];
    for (i, e) in edges.iter().enumerate() {
        adjacency[e.source].push((i, e.target));
    }
    let mut mark = vec![Mark::Unvisited; node_count];
    let mut back = vec![false; edges.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for start in 0..node_count {
        if mark[start] != Mark::Unvisited {
            continue;
        }
        mark[start] = Mark::OnStack;
        stack.push((start, 0));
        while let Some(top) = stack.last_mut() {
            let u = top.0;
            let Some(&(e, v)) = adjacency[u].get(top.1) else {
                mark[u] = Mark::Done;
                stack.pop();
                continue;
            };
            top.1 += 1;
            match mark[v] {
                Mark::Unvisited => {
                    mark[v] = Mark::OnStack;
                    stack.push((v, 0));
                }
                Mark::OnStack => back[e] = true,
                Mark::Done => {}
            }
        }
    }
    back
}

/// Separations keeping every acyclic edge's target on the configured side of its source.
pub(crate) fn edge_direction_constraints(
    nodes: &[PhysicsNode],
    edges: &[PhysicsEdge],
    ideal: &IdealEdgeLength,
) -> Vec<Constraint> {
    let axis = match ideal.direction {
        EdgeDirection::None => return Vec::new(),
        EdgeDirection::North | EdgeDirection::South => Axis::Vertical,
        EdgeDirection::East | EdgeDirection::West => Axis::Horizontal,
    };
    let reversed = matches!(ideal.direction, EdgeDirection::North | EdgeDirection::West);
    let back = back_edges(nodes.len(), edges);
    edges
        .iter()
        .zip(back)
        .filter(|(_, back)| !back)
        .map(|(e, _)| {
            let h = axis.is_horizontal();
            let half = (nodes[e.source].size(h) + nodes[e.target].size(h)) / 2.0;
            let (source, target) = if reversed {
                (e.target, e.source)
            } else {
                (e.source, e.target)
            };
            Constraint::Separation(SeparationConstraint {
                source,
                target,
                axis,
                gap: ideal.separation + half,
                equality: false,
                level: EDGE_DIRECTION_LEVEL,
                derived: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{point, rect};

    fn node(x: f64, y: f64) -> PhysicsNode {
        PhysicsNode::new(point(x, y), 10.0, 10.0)
    }

    #[test]
    fn separation_moves_lighter_endpoint_more() {
        let mut nodes = vec![node(0.0, 0.0), node(5.0, 0.0)];
        nodes[1].stay_weight = 3.0;
        let c = SeparationConstraint {
            source: 0,
            target: 1,
            axis: Axis::Horizontal,
            gap: 9.0,
            equality: false,
            level: 0,
            derived: false,
        };
        let moved = Constraint::Separation(c.clone()).project(&mut nodes);
        assert!(moved > 0.0);
        assert!((nodes[0].center.x + 3.0).abs() < 1e-12);
        assert!((nodes[1].center.x - 6.0).abs() < 1e-12);
        assert_eq!(Constraint::Separation(c).project(&mut nodes), 0.0);
    }

    #[test]
    fn separation_of_a_node_from_itself_is_inert() {
        let mut nodes = vec![node(0.0, 0.0)];
        let c = Constraint::Separation(SeparationConstraint {
            source: 0,
            target: 0,
            axis: Axis::Horizontal,
            gap: 10.0,
            equality: false,
            level: 0,
            derived: false,
        });
        for _ in 0..5 {
            assert_eq!(c.project(&mut nodes), 0.0);
        }
        assert_eq!(nodes[0].center, point(0.0, 0.0));
    }

    #[test]
    fn equality_pulls_endpoints_together() {
        let mut nodes = vec![node(0.0, 0.0), node(0.0, 20.0)];
        let c = Constraint::Separation(SeparationConstraint {
            source: 0,
            target: 1,
            axis: Axis::Vertical,
            gap: 10.0,
            equality: true,
            level: 1,
            derived: false,
        });
        c.project(&mut nodes);
        assert!((nodes[1].center.y - nodes[0].center.y - 10.0).abs() < 1e-12);
        assert_eq!(c.level(), 1);
        assert_eq!(c.nodes(), vec![0, 1]);
    }

    #[test]
    fn lock_translates_members_onto_bounds() {
        let mut nodes = vec![node(0.0, 0.0), node(20.0, 0.0)];
        let lock = LockConstraint {
            handle: LockHandle(0),
            target: LockTarget::Cluster(0),
            bounds: rect(100.0, 100.0, 140.0, 120.0),
            weight: 1e6,
            members: vec![0, 1],
            boundary: Some(RectangularBoundary::with_margin(5.0)),
        };
        Constraint::Lock(lock).project(&mut nodes);
        assert_eq!(nodes[0].center, point(110.0, 110.0));
        assert_eq!(nodes[1].center, point(130.0, 110.0));
    }

    #[test]
    fn edge_directions_skip_back_edges() {
        let nodes = vec![node(0.0, 0.0), node(0.0, 0.0), node(0.0, 0.0)];
        let edge = |source, target| PhysicsEdge {
            source,
            target,
            length: 10.0,
        };
        // 0 → 1 → 2 → 0: the closing edge is dropped.
        let edges = [edge(0, 1), edge(1, 2), edge(2, 0)];
        let ideal = IdealEdgeLength {
            direction: EdgeDirection::North,
            separation: 5.0,
            ..Default::default()
        };
        let cs = edge_direction_constraints(&nodes, &edges, &ideal);
        assert_eq!(cs.len(), 2);
        let Constraint::Separation(first) = &cs[0] else {
            panic!("expected a separation");
        };
        // North: the target sits above, so it is the left-hand variable.
        assert_eq!((first.source, first.target), (1, 0));
        assert_eq!(first.axis, Axis::Vertical);
        assert_eq!(first.gap, 15.0);
        assert_eq!(first.level, EDGE_DIRECTION_LEVEL);

        let none = IdealEdgeLength::default();
        assert!(edge_direction_constraints(&nodes, &edges, &none).is_empty());
    }
}
