use super::constraints::Constraint;
use super::physics::PhysicsNode;
use crate::algo::IncrementalLayoutSettings;
use crate::algo::overlap::{ClusterHandle, ClusterSpec, ConstraintGenerator, NodeHandle, NodeSpec};
use crate::geom::{coord, set_coord};
use crate::graph::{Hierarchy, RectangularBoundary};
use crate::solver::{Solver, VarId};

/// Constraint level from which overlap removal takes part in the solve.
pub(crate) const OVERLAP_LEVEL: usize = 2;

/// Everything one axis solve reads besides the physics nodes.
pub(crate) struct SolveScope<'a> {
    pub(crate) settings: &'a IncrementalLayoutSettings,
    pub(crate) hierarchy: &'a Hierarchy,
    /// Indexed like `Graph::clusters`, with active locks applied.
    pub(crate) boundaries: &'a [RectangularBoundary],
    pub(crate) constraints: &'a [Constraint],
    pub(crate) level: usize,
}

impl SolveScope<'_> {
    fn avoids_overlaps(&self) -> bool {
        self.settings.avoid_overlaps && self.level >= OVERLAP_LEVEL
    }
}

struct MirroredHierarchy {
    generator: ConstraintGenerator,
    nodes: Vec<NodeHandle>,
    clusters: Vec<ClusterHandle>,
}

/// Projects node centers onto the structural and overlap constraints of one axis.
#[derive(Debug, Clone)]
pub(crate) struct AxisSolver {
    horizontal: bool,
    /// Squeezed cluster intervals from the last overlap-aware solve, indexed like
    /// `Graph::clusters`.
    extents: Vec<Option<(f64, f64)>>,
}

impl AxisSolver {
    pub(crate) fn new(horizontal: bool, cluster_count: usize) -> Self {
        Self {
            horizontal,
            extents: vec![None; cluster_count],
        }
    }

    pub(crate) fn extent(&self, cluster: usize) -> Option<(f64, f64)> {
        self.extents.get(cluster).copied().flatten()
    }

    /// Solves with node centers as desired positions (weighted by stay weight) and writes the
    /// solved coordinates back.
    pub(crate) fn solve(&mut self, nodes: &mut [PhysicsNode], scope: &SolveScope<'_>) {
        let h = self.horizontal;
        let params = scope.settings.overlap_removal;
        let mut solver = Solver::new();
        self.extents.iter_mut().for_each(|e| *e = None);

        let mut mirrored = scope
            .avoids_overlaps()
            .then(|| self.mirror_hierarchy(nodes, scope));
        let vars: Vec<VarId> = match mirrored.as_mut() {
            Some(m) => {
                m.generator.create_variables(&mut solver);
                m.nodes
                    .iter()
                    .filter_map(|&handle| m.generator.node_variable(handle))
                    .collect()
            }
            None => nodes
                .iter()
                .map(|n| solver.add_variable(coord(n.center, h), n.stay_weight))
                .collect(),
        };
        debug_assert_eq!(vars.len(), nodes.len());

        for c in scope.constraints {
            let Constraint::Separation(sep) = c else {
                continue;
            };
            if sep.axis.is_horizontal() == h && sep.level <= scope.level {
                solver.add_constraint(vars[sep.source], vars[sep.target], sep.gap, sep.equality);
            }
        }
        if let Some(m) = mirrored.as_mut() {
            m.generator.generate(&mut solver, &params);
        }
        if solver.constraint_count() == 0 {
            return;
        }

        let solution = match mirrored.as_mut() {
            Some(m) => m.generator.solve(&mut solver, &params),
            None => solver.solve(&params.solver_parameters()),
        };
        if solution.unsatisfiable_constraints > 0 {
            tracing::debug!(
                horizontal = h,
                level = scope.level,
                unsatisfiable = solution.unsatisfiable_constraints,
                "axis solve left constraints unsatisfied"
            );
        }
        for (n, &v) in nodes.iter_mut().zip(&vars) {
            set_coord(&mut n.center, h, solver.actual_pos(v));
        }
        if let Some(m) = mirrored {
            for (extent, &handle) in self.extents.iter_mut().zip(&m.clusters) {
                *extent = m.generator.cluster_extent(handle);
            }
        }
    }

    fn mirror_hierarchy(&self, nodes: &[PhysicsNode], scope: &SolveScope<'_>) -> MirroredHierarchy {
        let h = self.horizontal;
        let s = scope.settings;
        let hierarchy = scope.hierarchy;
        let mut generator = ConstraintGenerator::new(
            h,
            s.node_separation,
            s.node_separation,
            s.cluster_separation,
            s.cluster_separation,
        );

        // Parents are registered before their children.
        let root = generator.root();
        let mut clusters = vec![root; hierarchy.cluster_count()];
        let mut stack: Vec<(usize, ClusterHandle)> = hierarchy
            .root_clusters
            .iter()
            .rev()
            .map(|&c| (c, root))
            .collect();
        while let Some((c, parent)) = stack.pop() {
            let spec = ClusterSpec::from_boundary(&scope.boundaries[c], h);
            let handle = generator.add_cluster(parent, spec);
            clusters[c] = handle;
            stack.extend(hierarchy.child_clusters[c].iter().rev().map(|&cc| (cc, handle)));
        }

        let nodes = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let cluster = hierarchy.node_parent[i].map_or(root, |p| clusters[p]);
                generator.add_node(
                    cluster,
                    NodeSpec {
                        position: coord(n.center, h),
                        size: n.size(h),
                        perp_position: coord(n.center, !h),
                        perp_size: n.size(!h),
                        weight: n.stay_weight,
                    },
                )
            })
            .collect();

        MirroredHierarchy {
            generator,
            nodes,
            clusters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::incremental::constraints::{Axis, SeparationConstraint};
    use crate::geom::point;
    use crate::graph::{Graph, Node};

    fn scope<'a>(
        settings: &'a IncrementalLayoutSettings,
        hierarchy: &'a Hierarchy,
        constraints: &'a [Constraint],
        level: usize,
    ) -> SolveScope<'a> {
        SolveScope {
            settings,
            hierarchy,
            boundaries: &[],
            constraints,
            level,
        }
    }

    fn overlapping_pair() -> (Hierarchy, Vec<PhysicsNode>) {
        let g = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 20.0, 20.0),
                Node::new("b", point(5.0, 2.0), 20.0, 20.0),
            ],
            ..Default::default()
        };
        let h = Hierarchy::build(&g).unwrap();
        let nodes = g
            .nodes
            .iter()
            .map(|n| PhysicsNode::new(n.center, n.width, n.height))
            .collect();
        (h, nodes)
    }

    #[test]
    fn overlap_removal_waits_for_its_level() {
        let settings = IncrementalLayoutSettings::default();
        let (h, mut nodes) = overlapping_pair();
        let mut solver = AxisSolver::new(true, 0);
        solver.solve(&mut nodes, &scope(&settings, &h, &[], 1));
        assert_eq!(nodes[0].center.x, 0.0);
        assert_eq!(nodes[1].center.x, 5.0);

        solver.solve(&mut nodes, &scope(&settings, &h, &[], 2));
        assert!(nodes[1].center.x - nodes[0].center.x >= 30.0 - 1e-6);
    }

    #[test]
    fn structural_constraints_apply_on_their_axis_only() {
        let settings = IncrementalLayoutSettings::default();
        let (h, mut nodes) = overlapping_pair();
        let constraints = [Constraint::Separation(SeparationConstraint {
            source: 0,
            target: 1,
            axis: Axis::Vertical,
            gap: 50.0,
            equality: false,
            level: 0,
            derived: false,
        })];
        AxisSolver::new(true, 0).solve(&mut nodes, &scope(&settings, &h, &constraints, 0));
        assert_eq!(nodes[1].center.x, 5.0);
        AxisSolver::new(false, 0).solve(&mut nodes, &scope(&settings, &h, &constraints, 0));
        assert!((nodes[1].center.y - nodes[0].center.y - 50.0).abs() < 1e-6);
    }
}
