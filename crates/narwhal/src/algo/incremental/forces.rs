//! Descent-direction forces.
//!
//! Every term is a gradient: integration moves a node by `−stepSize · force`, so attractive terms
//! point away from their attractor and repulsion points towards the repelling node.

use super::physics::PhysicsEdge;
use crate::algo::IncrementalLayoutSettings;
use crate::algo::multipole::{KdTree, exact_repulsion};
use crate::geom::{Point, Vector};
use crate::graph::Hierarchy;

/// Components with more nodes than this use the multipole approximation when it is enabled.
const MULTIPOLE_THRESHOLD: usize = 16;
const REPULSION_SCALE: f64 = 10.0;
const GRAVITY_SCALE: f64 = 0.0001;
const LOG_SPRING_SCALE: f64 = 0.0007;

pub(crate) struct ForceModel<'a> {
    pub(crate) settings: &'a IncrementalLayoutSettings,
    pub(crate) hierarchy: &'a Hierarchy,
    pub(crate) edges: &'a [PhysicsEdge],
    pub(crate) components: &'a [Vec<usize>],
    /// Descendant node count per cluster.
    pub(crate) cluster_weights: &'a [usize],
}

impl ForceModel<'_> {
    /// Forces at `positions` (indexed like the physics nodes).
    pub(crate) fn compute(&self, positions: &[Point]) -> Vec<Vector> {
        let s = self.settings;
        let mut forces = vec![Vector::zero(); positions.len()];

        for component in self.components {
            self.add_repulsion(component, positions, &mut forces);
        }
        for e in self.edges {
            let d = positions[e.source] - positions[e.target];
            let f = spring(
                d.length(),
                e.length,
                s.attractive_force_constant,
                s.log_scale_edge_forces,
            );
            forces[e.source] += d * f;
            forces[e.target] -= d * f;
        }
        for component in self.components {
            let origin = centroid(component.iter().map(|&n| positions[n]));
            for &n in component {
                forces[n] -= (origin - positions[n]) * (GRAVITY_SCALE * s.gravity_constant);
            }
        }
        if self.hierarchy.cluster_count() > 0 {
            let barycenters = self.cluster_barycenters(positions);
            self.add_cluster_gravity(&barycenters, positions, &mut forces);
            self.add_inter_cluster_attraction(&barycenters, &mut forces);
        }
        for component in self.components {
            clamp(component, &mut forces, s.max_force);
        }
        debug_assert!(forces.iter().all(|f| f.x.is_finite() && f.y.is_finite()));
        forces
    }

    fn add_repulsion(&self, component: &[usize], positions: &[Point], forces: &mut [Vector]) {
        let s = self.settings;
        if s.repulsive_force_constant == 0.0 || component.len() < 2 {
            return;
        }
        let points: Vec<Point> = component.iter().map(|&n| positions[n]).collect();
        let sums = if s.approximate_repulsion && points.len() > MULTIPOLE_THRESHOLD {
            KdTree::new(&points, s.multipole_bucket_size, s.multipole_precision).compute_forces()
        } else {
            exact_repulsion(&points)
        };
        let scale = REPULSION_SCALE * s.repulsive_force_constant;
        for (&n, r) in component.iter().zip(sums) {
            forces[n] -= r * scale;
        }
    }

    /// Weighted barycenter per cluster, children before parents. `None` for empty clusters.
    pub(crate) fn cluster_barycenters(&self, positions: &[Point]) -> Vec<Option<Point>> {
        let h = self.hierarchy;
        let mut barycenters: Vec<Option<Point>> = vec![None; h.cluster_count()];
        for c in h.clusters_bottom_up() {
            let mut sum = Vector::zero();
            let mut weight = 0.0;
            for &n in &h.child_nodes[c] {
                sum += positions[n].to_vector();
                weight += 1.0;
            }
            for &cc in &h.child_clusters[c] {
                if let Some(b) = barycenters[cc] {
                    let w = self.cluster_weights[cc] as f64;
                    sum += b.to_vector() * w;
                    weight += w;
                }
            }
            if weight > 0.0 {
                barycenters[c] = Some((sum / weight).to_point());
            }
        }
        barycenters
    }

    fn add_cluster_gravity(
        &self,
        barycenters: &[Option<Point>],
        positions: &[Point],
        forces: &mut [Vector],
    ) {
        let k = GRAVITY_SCALE * self.settings.cluster_gravity;
        if k == 0.0 {
            return;
        }
        for (c, bary) in barycenters.iter().enumerate() {
            let Some(bary) = *bary else { continue };
            for &n in &self.hierarchy.child_nodes[c] {
                forces[n] -= (bary - positions[n]) * k;
            }
        }
    }

    fn add_inter_cluster_attraction(&self, barycenters: &[Option<Point>], forces: &mut [Vector]) {
        let k = GRAVITY_SCALE * self.settings.inter_cluster_attraction;
        for &(a, b) in &self.hierarchy.cluster_edges {
            let (Some(ba), Some(bb)) = (barycenters[a], barycenters[b]) else {
                continue;
            };
            let duv = (ba - bb) * k;
            for n in self.hierarchy.descendant_nodes(a) {
                forces[n] += duv;
            }
            for n in self.hierarchy.descendant_nodes(b) {
                forces[n] -= duv;
            }
        }
    }
}

/// Spring factor applied to `source − target`; positive when the edge is longer than `ideal`.
pub(crate) fn spring(length: f64, ideal: f64, k: f64, log_scale: bool) -> f64 {
    if log_scale {
        LOG_SPRING_SCALE * k * length * ((length + 0.1) / (ideal + 0.1)).ln()
    } else {
        k * (length - ideal) / (ideal * ideal + 0.1)
    }
}

fn centroid(points: impl Iterator<Item = Point>) -> Point {
    let mut sum = Vector::zero();
    let mut count = 0usize;
    for p in points {
        sum += p.to_vector();
        count += 1;
    }
    if count == 0 {
        return Point::origin();
    }
    (sum / count as f64).to_point()
}

fn clamp(component: &[usize], forces: &mut [Vector], max_force: f64) {
    let max = component
        .iter()
        .map(|&n| forces[n].length())
        .fold(0.0, f64::max);
    if max > max_force {
        let scale = max_force / max;
        for &n in component {
            forces[n] *= scale;
        }
    }
}

pub(crate) fn energy(forces: &[Vector]) -> f64 {
    forces.iter().map(|f| f.square_length()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::point;
    use crate::graph::{Cluster, ClusterEdge, Graph, Node};

    fn settings() -> IncrementalLayoutSettings {
        IncrementalLayoutSettings {
            gravity_constant: 0.0,
            cluster_gravity: 0.0,
            ..Default::default()
        }
    }

    fn model<'a>(
        settings: &'a IncrementalLayoutSettings,
        hierarchy: &'a Hierarchy,
        edges: &'a [PhysicsEdge],
        components: &'a [Vec<usize>],
        weights: &'a [usize],
    ) -> ForceModel<'a> {
        ForceModel {
            settings,
            hierarchy,
            edges,
            components,
            cluster_weights: weights,
        }
    }

    fn two_nodes() -> Hierarchy {
        let g = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 1.0, 1.0),
                Node::new("b", point(1.0, 0.0), 1.0, 1.0),
            ],
            ..Default::default()
        };
        Hierarchy::build(&g).unwrap()
    }

    #[test]
    fn stretched_spring_pulls_endpoints_together() {
        let s = IncrementalLayoutSettings {
            repulsive_force_constant: 0.0,
            ..settings()
        };
        let h = two_nodes();
        let edges = [PhysicsEdge {
            source: 0,
            target: 1,
            length: 10.0,
        }];
        let comps = vec![vec![0, 1]];
        let m = model(&s, &h, &edges, &comps, &[]);
        let f = m.compute(&[point(0.0, 0.0), point(20.0, 0.0)]);
        // Descent direction: the source moves by −force, i.e. towards the target.
        assert!(f[0].x < 0.0 && f[1].x > 0.0);
        assert!((f[0].x + f[1].x).abs() < 1e-12);
        let expected = -(20.0 - 10.0) / 100.1 * 20.0;
        assert!((f[0].x - expected).abs() < 1e-12);
    }

    #[test]
    fn repulsion_pushes_apart_and_is_clamped() {
        let s = IncrementalLayoutSettings {
            max_force: 1.0,
            ..settings()
        };
        let h = two_nodes();
        let comps = vec![vec![0, 1]];
        let m = model(&s, &h, &[], &comps, &[]);
        let f = m.compute(&[point(0.0, 0.0), point(1.0, 0.0)]);
        assert!(f[0].x > 0.0 && f[1].x < 0.0);
        assert!((f[0].length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn separate_components_do_not_repel() {
        let s = settings();
        let h = two_nodes();
        let comps = vec![vec![0], vec![1]];
        let m = model(&s, &h, &[], &comps, &[]);
        let f = m.compute(&[point(0.0, 0.0), point(1.0, 0.0)]);
        assert_eq!(f, vec![Vector::zero(), Vector::zero()]);
    }

    #[test]
    fn cluster_gravity_pulls_members_to_barycenter() {
        let g = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 1.0, 1.0).with_parent("c"),
                Node::new("b", point(10.0, 0.0), 1.0, 1.0).with_parent("c"),
            ],
            clusters: vec![Cluster::new("c")],
            ..Default::default()
        };
        let h = Hierarchy::build(&g).unwrap();
        let s = IncrementalLayoutSettings {
            repulsive_force_constant: 0.0,
            cluster_gravity: 1.0,
            ..settings()
        };
        let comps = vec![vec![0, 1]];
        let weights = [2];
        let m = model(&s, &h, &[], &comps, &weights);
        let positions = [point(0.0, 0.0), point(10.0, 0.0)];
        assert_eq!(m.cluster_barycenters(&positions), vec![Some(point(5.0, 0.0))]);
        let f = m.compute(&positions);
        assert!((f[0].x + 0.0005).abs() < 1e-12);
        assert!((f[1].x - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn cluster_edge_pulls_clusters_together() {
        let g = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 1.0, 1.0).with_parent("c1"),
                Node::new("b", point(10.0, 0.0), 1.0, 1.0).with_parent("c2"),
            ],
            clusters: vec![Cluster::new("c1"), Cluster::new("c2")],
            cluster_edges: vec![ClusterEdge {
                id: "c1c2".to_string(),
                source: "c1".to_string(),
                target: "c2".to_string(),
            }],
            ..Default::default()
        };
        let h = Hierarchy::build(&g).unwrap();
        let s = IncrementalLayoutSettings {
            repulsive_force_constant: 0.0,
            inter_cluster_attraction: 2.0,
            ..settings()
        };
        let comps = vec![vec![0, 1]];
        let weights = [1, 1];
        let m = model(&s, &h, &[], &comps, &weights);
        let f = m.compute(&[point(0.0, 0.0), point(10.0, 0.0)]);
        // a moves by −force, towards b.
        assert!((f[0].x + 0.002).abs() < 1e-12, "{f:?}");
        assert!((f[1].x - 0.002).abs() < 1e-12, "{f:?}");
        assert_eq!((f[0].y, f[1].y), (0.0, 0.0));

        let off = IncrementalLayoutSettings {
            inter_cluster_attraction: 0.0,
            ..s
        };
        let m = model(&off, &h, &[], &comps, &weights);
        let f = m.compute(&[point(0.0, 0.0), point(10.0, 0.0)]);
        assert_eq!(f, vec![Vector::zero(), Vector::zero()]);
    }

    #[test]
    fn log_spring_vanishes_at_ideal_length() {
        assert_eq!(spring(10.0, 10.0, 1.0, true), 0.0);
        assert!(spring(20.0, 10.0, 1.0, true) > 0.0);
        assert!(spring(5.0, 10.0, 1.0, false) < 0.0);
    }
}
