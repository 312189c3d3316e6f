//! Incremental force-directed layout with constraint projection.
//!
//! [`IncrementalLayout`] moves nodes along the descent direction of a spring/repulsion/gravity
//! energy, then projects them back onto the structural constraints and, from constraint level 2,
//! onto the overlap-removal constraints of each axis. Callers either drive it one `run` at a time
//! (interactive use) or call [`IncrementalLayout::run_to_convergence`].

mod axis_solver;
mod constraints;
mod feasibility;
mod forces;
mod physics;

pub use constraints::{Axis, LockHandle};

use crate::algo::IncrementalLayoutSettings;
use crate::algo::overlap::tight_interval;
use crate::error::{Error, Result, check_range};
use crate::geom::{Point, Rect, Vector, is_finite_point, rect};
use crate::graph::{BorderInfo, Graph, Hierarchy, RectangularBoundary};
use axis_solver::{AxisSolver, SolveScope};
use constraints::{Constraint, LockConstraint, LockTarget, SeparationConstraint};
use forces::ForceModel;
use physics::{PhysicsEdge, PhysicsNode};

const VERLET_ALPHA: f64 = 1.0;
const RUNGE_KUTTA_ALPHA: f64 = 3.0;
/// Consecutive energy decreases before the step size grows.
const STEP_GROWTH_PATIENCE: u32 = 3;
const MIN_LOCK_WEIGHT: f64 = 1e-3;
const MAX_LOCK_WEIGHT: f64 = 1e20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Initialized,
    Converged,
}

/// Additive-increase/multiplicative-decrease step size driven by the force energy.
#[derive(Debug, Clone)]
struct StepSize {
    value: f64,
    decay: f64,
    previous_energy: Option<f64>,
    progress: u32,
}

impl StepSize {
    fn new(initial: f64, decay: f64) -> Self {
        Self {
            value: initial,
            decay,
            previous_energy: None,
            progress: 0,
        }
    }

    fn update(&mut self, energy: f64) {
        let decreased = self.previous_energy.is_none_or(|previous| energy < previous);
        if decreased {
            self.progress += 1;
            if self.progress >= STEP_GROWTH_PATIENCE {
                self.progress = 0;
                self.value /= self.decay;
            }
        } else {
            self.progress = 0;
            self.value *= self.decay;
        }
        self.previous_energy = Some(energy);
    }
}

pub struct IncrementalLayout<'g> {
    graph: &'g mut Graph,
    settings: IncrementalLayoutSettings,
    hierarchy: Hierarchy,
    state: State,
    level: usize,
    nodes: Vec<PhysicsNode>,
    edges: Vec<PhysicsEdge>,
    components: Vec<Vec<usize>>,
    cluster_weights: Vec<usize>,
    /// Cluster boundaries as the solver sees them: the graph's, with active locks applied.
    boundaries: Vec<RectangularBoundary>,
    /// Caller separations, edge-direction separations and locks.
    constraints: Vec<Constraint>,
    horizontal: AxisSolver,
    vertical: AxisSolver,
    step: StepSize,
    iterations: usize,
    next_lock: usize,
}

impl<'g> IncrementalLayout<'g> {
    /// Validates `settings` and the graph structure. The layout holds the graph mutably until it
    /// is dropped; positions are written back after every [`run`](Self::run).
    pub fn new(graph: &'g mut Graph, settings: IncrementalLayoutSettings) -> Result<Self> {
        settings.validate()?;
        let hierarchy = Hierarchy::build(graph)?;
        let cluster_count = hierarchy.cluster_count();
        let boundaries = graph.clusters.iter().map(|c| c.boundary.clone()).collect();
        Ok(Self {
            graph,
            step: StepSize::new(settings.initial_step_size, settings.decay),
            level: settings.min_constraint_level,
            settings,
            hierarchy,
            state: State::Uninitialized,
            nodes: Vec::new(),
            edges: Vec::new(),
            components: Vec::new(),
            cluster_weights: Vec::new(),
            boundaries,
            constraints: Vec::new(),
            horizontal: AxisSolver::new(true, cluster_count),
            vertical: AxisSolver::new(false, cluster_count),
            iterations: 0,
            next_lock: 0,
        })
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn settings(&self) -> &IncrementalLayoutSettings {
        &self.settings
    }

    /// Builds the simulation from the current graph positions and makes them feasible for the
    /// current constraint level. Called by `run` when needed; calling it again restarts the
    /// simulation from the graph.
    pub fn initialize(&mut self) {
        let s = &self.settings;
        self.nodes = physics::build_nodes(self.graph);
        self.edges = physics::build_edges(self.graph, &self.hierarchy, s.ideal_edge_length.length);
        self.components = if s.inter_component_forces {
            if self.nodes.is_empty() {
                Vec::new()
            } else {
                vec![(0..self.nodes.len()).collect()]
            }
        } else {
            physics::connected_components(self.nodes.len(), &self.edges, &self.hierarchy)
        };
        self.cluster_weights = (0..self.hierarchy.cluster_count())
            .map(|c| self.hierarchy.descendant_nodes(c).len())
            .collect();

        self.constraints
            .retain(|c| !matches!(c, Constraint::Separation(sep) if sep.derived));
        self.constraints.extend(constraints::edge_direction_constraints(
            &self.nodes,
            &self.edges,
            &s.ideal_edge_length,
        ));
        self.step = StepSize::new(s.initial_step_size, s.decay);
        self.iterations = 0;
        let cluster_count = self.hierarchy.cluster_count();
        self.horizontal = AxisSolver::new(true, cluster_count);
        self.vertical = AxisSolver::new(false, cluster_count);
        self.apply_lock_effects();
        self.state = State::Initialized;

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            clusters = cluster_count,
            components = self.components.len(),
            constraints = self.constraints.len(),
            level = self.level,
            "initialized incremental layout"
        );
        self.enforce_feasibility(self.level);
        self.write_back();
    }

    /// One outer iteration: up to `minor_iterations` force/projection substeps.
    pub fn run(&mut self) {
        if self.state == State::Uninitialized {
            self.initialize();
        }
        if self.state == State::Converged {
            return;
        }
        let mut displacement = f64::INFINITY;
        for _ in 0..self.settings.minor_iterations {
            displacement = self.substep();
            if displacement < self.settings.displacement_threshold {
                self.state = State::Converged;
                break;
            }
        }
        self.iterations += 1;
        if self.iterations > self.settings.max_iterations {
            self.state = State::Converged;
        }
        tracing::trace!(
            iteration = self.iterations,
            level = self.level,
            energy = self.energy(),
            step_size = self.step.value,
            displacement,
            "incremental layout run"
        );
        if self.state == State::Converged {
            tracing::debug!(
                iterations = self.iterations,
                level = self.level,
                displacement,
                "incremental layout converged"
            );
        }
        self.write_back();
    }

    /// Runs every level from `min_constraint_level` to `max_constraint_level` until converged.
    pub fn run_to_convergence(&mut self) {
        if self.state == State::Uninitialized {
            self.initialize();
        }
        for level in self.settings.min_constraint_level..=self.settings.max_constraint_level {
            self.set_current_constraint_level(level);
            while !self.converged() {
                self.run();
            }
        }
    }

    /// Switches the active constraint level, making the layout feasible for it and clearing
    /// convergence. The iteration budget restarts.
    pub fn set_current_constraint_level(&mut self, level: usize) {
        self.level = level;
        if self.state == State::Uninitialized {
            return;
        }
        self.enforce_feasibility(level);
        self.state = State::Initialized;
        self.iterations = 0;
        self.write_back();
    }

    pub fn current_constraint_level(&self) -> usize {
        self.level
    }

    pub fn converged(&self) -> bool {
        self.state == State::Converged
    }

    pub fn percent_done(&self) -> f64 {
        if self.converged() || self.settings.max_iterations == 0 {
            return 100.0;
        }
        (100.0 * self.iterations as f64 / self.settings.max_iterations as f64).min(100.0)
    }

    /// Σ |force|² of the last substep.
    pub fn energy(&self) -> f64 {
        self.step.previous_energy.unwrap_or(0.0)
    }

    pub fn step_size(&self) -> f64 {
        self.step.value
    }

    /// `run` calls at the current level.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Requires `target.axis − source.axis ≥ gap` (`= gap` with `equality`) between node centers
    /// from constraint level `level` on.
    pub fn add_separation_constraint(
        &mut self,
        source: &str,
        target: &str,
        axis: Axis,
        gap: f64,
        equality: bool,
        level: usize,
    ) -> Result<()> {
        check_range("gap", gap, gap.is_finite(), "a finite number")?;
        if source == target {
            return Err(Error::SelfSeparation {
                id: source.to_string(),
            });
        }
        let source = self.node_index(source)?;
        let target = self.node_index(target)?;
        self.constraints
            .push(Constraint::Separation(SeparationConstraint {
                source,
                target,
                axis,
                gap,
                equality,
                level,
                derived: false,
            }));
        self.unconverge();
        Ok(())
    }

    /// Pins a node, or a cluster with all of its contents, to `bounds`. `weight` must lie in
    /// `[1e-3, 1e20]`.
    pub fn create_lock(&mut self, id: &str, bounds: Rect, weight: f64) -> Result<LockHandle> {
        check_range(
            "lockWeight",
            weight,
            (MIN_LOCK_WEIGHT..=MAX_LOCK_WEIGHT).contains(&weight),
            "a value in [1e-3, 1e20]",
        )?;
        check_lock_bounds(id, bounds)?;
        let (target, members, boundary) = if let Some(&n) = self.hierarchy.node_index.get(id) {
            (LockTarget::Node(n), vec![n], None)
        } else if let Some(&c) = self.hierarchy.cluster_index.get(id) {
            (
                LockTarget::Cluster(c),
                self.hierarchy.descendant_nodes(c),
                Some(self.graph.clusters[c].boundary.clone()),
            )
        } else {
            return Err(Error::UnknownNode { id: id.to_string() });
        };

        let handle = LockHandle(self.next_lock);
        self.next_lock += 1;
        self.constraints.push(Constraint::Lock(LockConstraint {
            handle,
            target,
            bounds,
            weight,
            members,
            boundary,
        }));
        self.apply_lock_effects();
        self.unconverge();
        Ok(handle)
    }

    /// Moves an existing lock, e.g. while the user drags the locked node.
    pub fn update_lock(&mut self, handle: LockHandle, bounds: Rect) -> Result<()> {
        let lock = self
            .constraints
            .iter_mut()
            .find_map(|c| match c {
                Constraint::Lock(l) if l.handle == handle => Some(l),
                _ => None,
            })
            .ok_or(Error::UnknownLock(handle.0))?;
        let id = match lock.target {
            LockTarget::Node(n) => &self.graph.nodes[n].id,
            LockTarget::Cluster(c) => &self.graph.clusters[c].id,
        };
        check_lock_bounds(id, bounds)?;
        lock.bounds = bounds;
        self.apply_lock_effects();
        self.unconverge();
        Ok(())
    }

    pub fn remove_lock(&mut self, handle: LockHandle) -> Result<()> {
        let index = self
            .constraints
            .iter()
            .position(|c| matches!(c, Constraint::Lock(l) if l.handle == handle))
            .ok_or(Error::UnknownLock(handle.0))?;
        self.constraints.remove(index);
        self.apply_lock_effects();
        self.unconverge();
        Ok(())
    }

    pub fn clear_locks(&mut self) {
        self.constraints.retain(|c| !c.is_lock());
        self.apply_lock_effects();
        self.unconverge();
    }

    fn node_index(&self, id: &str) -> Result<usize> {
        self.hierarchy
            .node_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::UnknownNode { id: id.to_string() })
    }

    fn unconverge(&mut self) {
        if self.state == State::Converged {
            self.state = State::Initialized;
            self.iterations = 0;
        }
    }

    /// Rebuilds stay weights and the solver's view of cluster boundaries from the active locks.
    /// Locked clusters get fixed borders; their ancestors stop generating fixed constraints.
    fn apply_lock_effects(&mut self) {
        self.boundaries = self
            .graph
            .clusters
            .iter()
            .map(|c| c.boundary.clone())
            .collect();
        for n in &mut self.nodes {
            n.stay_weight = PhysicsNode::FREE_WEIGHT;
        }
        for c in &self.constraints {
            let Constraint::Lock(lock) = c else { continue };
            if !self.nodes.is_empty() {
                for n in c.nodes() {
                    let w = &mut self.nodes[n].stay_weight;
                    *w = w.max(lock.weight);
                }
            }
            let ancestors = match lock.target {
                LockTarget::Node(node) => self.hierarchy.node_ancestors(node),
                LockTarget::Cluster(cluster) => {
                    let b = lock.bounds;
                    self.boundaries[cluster].lock(b.min.x, b.min.y, b.max.x, b.max.y, lock.weight);
                    self.hierarchy.cluster_ancestors(cluster)
                }
            };
            for a in ancestors {
                self.boundaries[a].generate_fixed_constraints = false;
            }
        }
    }

    fn force_model(&self) -> ForceModel<'_> {
        ForceModel {
            settings: &self.settings,
            hierarchy: &self.hierarchy,
            edges: &self.edges,
            components: &self.components,
            cluster_weights: &self.cluster_weights,
        }
    }

    fn forces_at(&self, positions: &[Point]) -> Vec<Vector> {
        if self.settings.apply_forces {
            self.force_model().compute(positions)
        } else {
            vec![Vector::zero(); positions.len()]
        }
    }

    /// One force step plus projection; returns Σ squared node displacement.
    fn substep(&mut self) -> f64 {
        let energy = if self.settings.runge_kutta_integration {
            self.runge_kutta_step()
        } else {
            self.verlet_step()
        };
        self.step.update(energy);

        for _ in 0..self.settings.projection_iterations {
            for c in &self.constraints {
                if !c.is_lock() && c.level() <= self.level {
                    c.project(&mut self.nodes);
                }
            }
            for c in self.constraints.iter().filter(|c| c.is_lock()) {
                c.project(&mut self.nodes);
            }
        }
        self.solve_axis(true, self.level);
        self.solve_axis(false, self.level);

        self.nodes
            .iter()
            .map(|n| (n.center - n.previous_center).square_length())
            .sum()
    }

    fn verlet_step(&mut self) -> f64 {
        let positions: Vec<Point> = self.nodes.iter().map(|n| n.center).collect();
        let forces = self.forces_at(&positions);
        let step = self.step.value * VERLET_ALPHA;
        let friction = self.settings.friction;
        for (n, f) in self.nodes.iter_mut().zip(&forces) {
            let momentum = (n.center - n.previous_center) * friction;
            n.previous_center = n.center;
            n.center += momentum - *f * step;
        }
        forces::energy(&forces)
    }

    fn runge_kutta_step(&mut self) -> f64 {
        let h = self.step.value * RUNGE_KUTTA_ALPHA;
        let x0: Vec<Point> = self.nodes.iter().map(|n| n.center).collect();
        let advance = |scale: f64, k: &[Vector]| -> Vec<Point> {
            x0.iter().zip(k).map(|(&p, &f)| p - f * (h * scale)).collect()
        };
        let k1 = self.forces_at(&x0);
        let k2 = self.forces_at(&advance(0.5, &k1));
        let k3 = self.forces_at(&advance(0.5, &k2));
        let k4 = self.forces_at(&advance(1.0, &k3));
        let combined: Vec<Vector> = (0..x0.len())
            .map(|i| (k1[i] + k2[i] * 2.0 + k3[i] * 2.0 + k4[i]) / 6.0)
            .collect();
        for (n, f) in self.nodes.iter_mut().zip(&combined) {
            n.previous_center = n.center;
            n.center -= *f * h;
        }
        forces::energy(&combined)
    }

    fn solve_axis(&mut self, horizontal: bool, level: usize) {
        let scope = SolveScope {
            settings: &self.settings,
            hierarchy: &self.hierarchy,
            boundaries: &self.boundaries,
            constraints: &self.constraints,
            level,
        };
        let solver = if horizontal {
            &mut self.horizontal
        } else {
            &mut self.vertical
        };
        solver.solve(&mut self.nodes, &scope);
    }

    /// Copies centers to the graph and recomputes cluster rectangles.
    fn write_back(&mut self) {
        for (node, p) in self.graph.nodes.iter_mut().zip(&self.nodes) {
            node.center = p.center;
        }
        let mut rects: Vec<Option<Rect>> = vec![None; self.hierarchy.cluster_count()];
        for c in self.hierarchy.clusters_bottom_up() {
            rects[c] = match (self.horizontal.extent(c), self.vertical.extent(c)) {
                (Some(x), Some(y)) => Some(rect(x.0, y.0, x.1, y.1)),
                _ => self.tight_cluster_rect(c, &rects),
            };
            if let Some(r) = rects[c] {
                self.graph.clusters[c].rect = r;
            }
        }
    }

    /// Descendant boxes plus margins, grown to the minimum size and to fixed borders.
    fn tight_cluster_rect(&self, c: usize, child_rects: &[Option<Rect>]) -> Option<Rect> {
        let boxes: Vec<Rect> = self.hierarchy.child_nodes[c]
            .iter()
            .map(|&n| self.nodes[n].bounding_box())
            .chain(
                self.hierarchy.child_clusters[c]
                    .iter()
                    .filter_map(|&cc| child_rects[cc]),
            )
            .collect();
        let boundary = &self.boundaries[c];
        let fixed = |b: &BorderInfo| {
            b.fixed_position
                .filter(|_| boundary.generate_fixed_constraints)
        };
        let axis = |horizontal: bool| -> Option<(f64, f64)> {
            let (open, close) = boundary.borders(horizontal);
            let interval = tight_interval(
                boxes.iter().map(|b| {
                    if horizontal {
                        (b.min.x, b.max.x)
                    } else {
                        (b.min.y, b.max.y)
                    }
                }),
                open.margin,
                close.margin,
                boundary.min_size(horizontal),
            )?;
            Some((
                fixed(open).map_or(interval.0, |f| f.min(interval.0)),
                fixed(close).map_or(interval.1, |f| f.max(interval.1)),
            ))
        };
        let (x, y) = (axis(true)?, axis(false)?);
        Some(rect(x.0, y.0, x.1, y.1))
    }
}

fn check_lock_bounds(id: &str, bounds: Rect) -> Result<()> {
    if is_finite_point(bounds.min) && is_finite_point(bounds.max) {
        Ok(())
    } else {
        Err(Error::NonFiniteGeometry {
            node_id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_size_grows_after_three_decreases_and_shrinks_otherwise() {
        let mut s = StepSize::new(1.0, 0.5);
        s.update(10.0);
        s.update(9.0);
        assert_eq!(s.value, 1.0);
        s.update(8.0);
        assert_eq!(s.value, 2.0);
        s.update(8.0);
        assert_eq!(s.value, 1.0);
        s.update(9.0);
        assert_eq!(s.value, 0.5);
        s.update(1.0);
        s.update(0.5);
        assert_eq!(s.value, 0.5);
    }
}
