//! Per-axis overlap-removal constraint generation.
//!
//! For one axis, a [`ConstraintGenerator`] turns the node and cluster rectangles of a scope into
//! separation constraints for the projection [`Solver`]: every cluster is swept with a scan line
//! over the perpendicular axis, neighbouring siblings are linked, transitively implied links are
//! dropped, and the remaining links become constraints when their items leave the scan line.
//! Non-empty clusters get two border variables that contain their children and stand in for the
//! cluster in the parent's sweep.

use crate::solver::{Solution, Solver, SolverParameters, VarId};
use serde::{Deserialize, Serialize};

mod cluster;
mod scan_line;

pub use cluster::{BorderSpec, ClusterSpec, tight_interval};
use cluster::with_fixed;
use scan_line::{Event, EventKind, ScanLine, sort_events};

/// Perpendicular overlaps up to this amount are treated as touching.
const PERP_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlapRemovalParameters {
    /// Horizontal pass only: leave overlaps that are cheaper to resolve vertically to the
    /// vertical pass. Never applies to cluster borders.
    pub allow_defer_to_vertical: bool,
    /// Compare overlaps relative to the summed sizes of the pair instead of absolutely.
    pub consider_proportional_overlap: bool,
    pub gap_tolerance: f64,
    pub max_refine_iterations: usize,
}

impl Default for OverlapRemovalParameters {
    fn default() -> Self {
        Self {
            allow_defer_to_vertical: true,
            consider_proportional_overlap: false,
            gap_tolerance: 1e-6,
            max_refine_iterations: 100,
        }
    }
}

impl OverlapRemovalParameters {
    pub fn solver_parameters(&self) -> SolverParameters {
        SolverParameters {
            gap_tolerance: self.gap_tolerance,
            max_refine_iterations: self.max_refine_iterations,
            ..SolverParameters::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterHandle(usize);

/// Node geometry along the generator's axis (`position`, `size`) and across it (`*_p`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSpec {
    pub position: f64,
    pub size: f64,
    pub perp_position: f64,
    pub perp_size: f64,
    pub weight: f64,
}

#[derive(Debug, Clone)]
struct GenNode {
    spec: NodeSpec,
    var: Option<VarId>,
}

#[derive(Debug, Clone)]
struct GenCluster {
    parent: Option<usize>,
    spec: ClusterSpec,
    nodes: Vec<usize>,
    clusters: Vec<usize>,
    open_var: Option<VarId>,
    close_var: Option<VarId>,
    extent: Option<(f64, f64)>,
    extent_p: Option<(f64, f64)>,
}

/// One sibling in a sweep: a node, or a non-empty cluster represented by its borders.
#[derive(Debug, Clone, Copy)]
struct Item {
    open_var: VarId,
    open_offset: f64,
    close_var: VarId,
    close_offset: f64,
    lo: f64,
    hi: f64,
    lo_p: f64,
    hi_p: f64,
    is_cluster: bool,
}

impl Item {
    fn center(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }

    fn size(&self) -> f64 {
        self.hi - self.lo
    }

    fn size_p(&self) -> f64 {
        self.hi_p - self.lo_p
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintGenerator {
    horizontal: bool,
    padding: f64,
    padding_p: f64,
    cluster_padding: f64,
    cluster_padding_p: f64,
    nodes: Vec<GenNode>,
    clusters: Vec<GenCluster>,
    generated_constraints: usize,
}

impl ConstraintGenerator {
    const ROOT: usize = 0;

    pub fn new(
        horizontal: bool,
        padding: f64,
        padding_p: f64,
        cluster_padding: f64,
        cluster_padding_p: f64,
    ) -> Self {
        let root_spec = ClusterSpec {
            open: BorderSpec {
                margin: 0.0,
                fixed_position: None,
                weight: 0.0,
            },
            close: BorderSpec {
                margin: 0.0,
                fixed_position: None,
                weight: 0.0,
            },
            open_margin_p: 0.0,
            close_margin_p: 0.0,
            min_size: 0.0,
            min_size_p: 0.0,
        };
        Self {
            horizontal,
            padding,
            padding_p,
            cluster_padding,
            cluster_padding_p,
            nodes: Vec::new(),
            clusters: vec![GenCluster {
                parent: None,
                spec: root_spec,
                nodes: Vec::new(),
                clusters: Vec::new(),
                open_var: None,
                close_var: None,
                extent: None,
                extent_p: None,
            }],
            generated_constraints: 0,
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.horizontal
    }

    pub fn root(&self) -> ClusterHandle {
        ClusterHandle(Self::ROOT)
    }

    pub fn add_cluster(&mut self, parent: ClusterHandle, spec: ClusterSpec) -> ClusterHandle {
        let id = self.clusters.len();
        self.clusters.push(GenCluster {
            parent: Some(parent.0),
            spec,
            nodes: Vec::new(),
            clusters: Vec::new(),
            open_var: None,
            close_var: None,
            extent: None,
            extent_p: None,
        });
        self.clusters[parent.0].clusters.push(id);
        ClusterHandle(id)
    }

    pub fn add_node(&mut self, cluster: ClusterHandle, spec: NodeSpec) -> NodeHandle {
        let id = self.nodes.len();
        self.nodes.push(GenNode { spec, var: None });
        self.clusters[cluster.0].nodes.push(id);
        NodeHandle(id)
    }

    pub fn node_variable(&self, node: NodeHandle) -> Option<VarId> {
        self.nodes[node.0].var
    }

    /// Solved (and squeezed) `(open, close)` interval of a cluster; `None` for empty clusters
    /// or before constraints were generated.
    pub fn cluster_extent(&self, cluster: ClusterHandle) -> Option<(f64, f64)> {
        self.clusters[cluster.0].extent
    }

    pub fn generated_constraints(&self) -> usize {
        self.generated_constraints
    }

    /// Adds one solver variable per node. Must run before any other constraint referencing the
    /// nodes is added.
    pub fn create_variables(&mut self, solver: &mut Solver) {
        for n in &mut self.nodes {
            n.var = Some(solver.add_variable(n.spec.position, n.spec.weight));
        }
    }

    /// Clusters after all of their descendants; the root comes last.
    fn clusters_bottom_up(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.clusters.len());
        let mut stack = vec![(Self::ROOT, false)];
        while let Some((c, expanded)) = stack.pop() {
            if expanded {
                order.push(c);
                continue;
            }
            stack.push((c, true));
            for &child in self.clusters[c].clusters.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    fn node_interval(&self, n: usize) -> ((f64, f64), (f64, f64)) {
        let s = &self.nodes[n].spec;
        (
            (s.position - s.size / 2.0, s.position + s.size / 2.0),
            (
                s.perp_position - s.perp_size / 2.0,
                s.perp_position + s.perp_size / 2.0,
            ),
        )
    }

    /// Emits containment and separation constraints. `create_variables` must have run.
    pub fn generate(&mut self, solver: &mut Solver, params: &OverlapRemovalParameters) {
        debug_assert!(self.nodes.iter().all(|n| n.var.is_some()));
        let order = self.clusters_bottom_up();
        for &c in &order {
            if c != Self::ROOT {
                self.create_borders(c, solver);
            }
        }
        for &c in &order {
            if c == Self::ROOT || self.clusters[c].extent.is_some() {
                self.sweep(c, solver, params);
            }
        }
        tracing::trace!(
            horizontal = self.horizontal,
            nodes = self.nodes.len(),
            clusters = self.clusters.len() - 1,
            constraints = self.generated_constraints,
            "generated overlap constraints"
        );
    }

    fn add(&mut self, solver: &mut Solver, left: VarId, right: VarId, gap: f64) {
        if solver.add_constraint(left, right, gap, false).is_some() {
            self.generated_constraints += 1;
        }
    }

    fn create_borders(&mut self, c: usize, solver: &mut Solver) {
        let spec = self.clusters[c].spec;
        let mut primary = Vec::new();
        let mut perp = Vec::new();
        for &n in &self.clusters[c].nodes {
            let (p, q) = self.node_interval(n);
            primary.push(p);
            perp.push(q);
        }
        for &cc in &self.clusters[c].clusters {
            if let (Some(p), Some(q)) = (self.clusters[cc].extent, self.clusters[cc].extent_p) {
                primary.push(p);
                perp.push(q);
            }
        }
        let Some(extent) =
            tight_interval(primary, spec.open.margin, spec.close.margin, spec.min_size)
        else {
            // Empty clusters take no part in the solve.
            return;
        };
        let extent = with_fixed(extent, &spec.open, &spec.close);
        let extent_p =
            tight_interval(perp, spec.open_margin_p, spec.close_margin_p, spec.min_size_p);

        let open_var = solver.add_variable(
            spec.open.fixed_position.unwrap_or(extent.0),
            spec.open.solver_weight(),
        );
        let close_var = solver.add_variable(
            spec.close.fixed_position.unwrap_or(extent.1),
            spec.close.solver_weight(),
        );
        {
            let gc = &mut self.clusters[c];
            gc.open_var = Some(open_var);
            gc.close_var = Some(close_var);
            gc.extent = Some(extent);
            gc.extent_p = extent_p;
        }

        let child_nodes = self.clusters[c].nodes.clone();
        for n in child_nodes {
            let (Some(var), half) = (self.nodes[n].var, self.nodes[n].spec.size / 2.0) else {
                continue;
            };
            self.add(solver, open_var, var, spec.open.margin + half);
            self.add(solver, var, close_var, half + spec.close.margin);
        }
        let child_clusters = self.clusters[c].clusters.clone();
        for cc in child_clusters {
            let (Some(child_open), Some(child_close)) =
                (self.clusters[cc].open_var, self.clusters[cc].close_var)
            else {
                continue;
            };
            self.add(solver, open_var, child_open, spec.open.margin);
            self.add(solver, child_close, close_var, spec.close.margin);
        }
        if spec.min_size > 0.0 {
            self.add(solver, open_var, close_var, spec.min_size);
        }
    }

    fn sweep_items(&self, c: usize) -> Vec<Item> {
        let gc = &self.clusters[c];
        let mut items = Vec::with_capacity(gc.nodes.len() + gc.clusters.len());
        for &n in &gc.nodes {
            let Some(var) = self.nodes[n].var else {
                continue;
            };
            let ((lo, hi), (lo_p, hi_p)) = self.node_interval(n);
            let half = self.nodes[n].spec.size / 2.0;
            items.push(Item {
                open_var: var,
                open_offset: -half,
                close_var: var,
                close_offset: half,
                lo,
                hi,
                lo_p,
                hi_p,
                is_cluster: false,
            });
        }
        for &cc in &gc.clusters {
            let child = &self.clusters[cc];
            if let (Some(open_var), Some(close_var), Some((lo, hi)), Some((lo_p, hi_p))) =
                (child.open_var, child.close_var, child.extent, child.extent_p)
            {
                items.push(Item {
                    open_var,
                    open_offset: 0.0,
                    close_var,
                    close_offset: 0.0,
                    lo,
                    hi,
                    lo_p,
                    hi_p,
                    is_cluster: true,
                });
            }
        }
        items
    }

    fn pair_padding(&self, a: &Item, b: &Item) -> (f64, f64) {
        if a.is_cluster || b.is_cluster {
            (self.cluster_padding, self.cluster_padding_p)
        } else {
            (self.padding, self.padding_p)
        }
    }

    /// Whether the overlap of `a` and `b` should be left to the vertical pass.
    fn defer_to_vertical(&self, a: &Item, b: &Item, params: &OverlapRemovalParameters) -> bool {
        if !self.horizontal || !params.allow_defer_to_vertical || a.is_cluster || b.is_cluster {
            return false;
        }
        let (pad, pad_p) = self.pair_padding(a, b);
        let overlap = a.hi.min(b.hi) - a.lo.max(b.lo) + pad;
        let overlap_p = a.hi_p.min(b.hi_p) - a.lo_p.max(b.lo_p) + pad_p;
        if params.consider_proportional_overlap {
            let size = a.size() + b.size();
            let size_p = a.size_p() + b.size_p();
            if size > 0.0 && size_p > 0.0 {
                return overlap / size > overlap_p / size_p;
            }
        }
        overlap > overlap_p
    }

    fn primary_overlap(&self, a: &Item, b: &Item) -> f64 {
        let (pad, _) = self.pair_padding(a, b);
        a.hi.min(b.hi) - a.lo.max(b.lo) + pad
    }

    fn sweep(&mut self, c: usize, solver: &mut Solver, params: &OverlapRemovalParameters) {
        let items = self.sweep_items(c);
        if items.len() < 2 {
            return;
        }

        let mut events = Vec::with_capacity(items.len() * 2);
        for (k, it) in items.iter().enumerate() {
            let pad_p = if it.is_cluster {
                self.cluster_padding_p
            } else {
                self.padding_p
            };
            let open = it.lo_p - pad_p / 2.0 + PERP_EPSILON;
            let close = it.hi_p + pad_p / 2.0 - PERP_EPSILON;
            if close > open {
                events.push(Event {
                    coord: open,
                    kind: EventKind::Open,
                    item: k,
                });
                events.push(Event {
                    coord: close,
                    kind: EventKind::Close,
                    item: k,
                });
            } else {
                let mid = (it.lo_p + it.hi_p) / 2.0;
                events.push(Event {
                    coord: mid,
                    kind: EventKind::Open,
                    item: k,
                });
                events.push(Event {
                    coord: mid,
                    kind: EventKind::CloseDegenerate,
                    item: k,
                });
            }
        }
        sort_events(&mut events);

        let mut scan_line = ScanLine::default();
        let mut left_nbrs: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
        let mut right_nbrs: Vec<Vec<usize>> = vec![Vec::new(); items.len()];

        for ev in events {
            let v = ev.item;
            let iv = &items[v];
            if ev.is_open() {
                scan_line.insert(iv.center(), v);

                let mut lefts = Vec::new();
                let mut cur = scan_line.next_left(iv.center(), v);
                while let Some((pos, u)) = cur {
                    if self.primary_overlap(&items[u], iv) <= 0.0 {
                        lefts.push(u);
                        break;
                    }
                    if !self.defer_to_vertical(&items[u], iv, params) {
                        lefts.push(u);
                    }
                    cur = scan_line.next_left(pos, u);
                }
                let mut rights = Vec::new();
                let mut cur = scan_line.next_right(iv.center(), v);
                while let Some((pos, w)) = cur {
                    if self.primary_overlap(iv, &items[w]) <= 0.0 {
                        rights.push(w);
                        break;
                    }
                    if !self.defer_to_vertical(iv, &items[w], params) {
                        rights.push(w);
                    }
                    cur = scan_line.next_right(pos, w);
                }

                // u < v < w makes an existing u–w link redundant.
                for &u in &lefts {
                    for &w in &rights {
                        if let Some(i) = right_nbrs[u].iter().position(|&x| x == w) {
                            right_nbrs[u].remove(i);
                            left_nbrs[w].retain(|&x| x != u);
                        }
                    }
                }
                for &u in &lefts {
                    right_nbrs[u].push(v);
                }
                for &w in &rights {
                    left_nbrs[w].push(v);
                }
                left_nbrs[v] = lefts;
                right_nbrs[v] = rights;
            } else {
                for u in std::mem::take(&mut left_nbrs[v]) {
                    self.separate(solver, &items[u], iv);
                    right_nbrs[u].retain(|&x| x != v);
                }
                for w in std::mem::take(&mut right_nbrs[v]) {
                    self.separate(solver, iv, &items[w]);
                    left_nbrs[w].retain(|&x| x != v);
                }
                scan_line.remove(iv.center(), v);
            }
        }
        debug_assert_eq!(scan_line.len(), 0);
    }

    fn separate(&mut self, solver: &mut Solver, left: &Item, right: &Item) {
        let (pad, _) = self.pair_padding(left, right);
        let gap = left.close_offset - right.open_offset + pad;
        self.add(solver, left.close_var, right.open_var, gap);
    }

    /// Solves, then squeezes every free cluster border onto its contents.
    pub fn solve(&mut self, solver: &mut Solver, params: &OverlapRemovalParameters) -> Solution {
        let solution = solver.solve(&params.solver_parameters());
        self.squeeze(solver);
        solution
    }

    fn squeeze(&mut self, solver: &Solver) {
        for c in self.clusters_bottom_up() {
            if c == Self::ROOT {
                continue;
            }
            let (Some(open_var), Some(close_var)) =
                (self.clusters[c].open_var, self.clusters[c].close_var)
            else {
                continue;
            };
            let spec = self.clusters[c].spec;
            let solved = (solver.actual_pos(open_var), solver.actual_pos(close_var));

            let mut content = Vec::new();
            for &n in &self.clusters[c].nodes {
                if let Some(var) = self.nodes[n].var {
                    let half = self.nodes[n].spec.size / 2.0;
                    let p = solver.actual_pos(var);
                    content.push((p - half, p + half));
                }
            }
            for &cc in &self.clusters[c].clusters {
                if let Some(e) = self.clusters[cc].extent {
                    content.push(e);
                }
            }
            let Some((mut open, mut close)) =
                tight_interval(content, spec.open.margin, spec.close.margin, 0.0)
            else {
                continue;
            };
            if spec.open.fixed_position.is_some() {
                open = solved.0;
            }
            if spec.close.fixed_position.is_some() {
                close = solved.1;
            }
            if close - open < spec.min_size {
                open = open.max(solved.0).min(solved.1 - spec.min_size);
                close = open + spec.min_size;
            }
            self.clusters[c].extent = Some((open, close));
        }
    }

    pub fn node_position(&self, solver: &Solver, node: NodeHandle) -> Option<f64> {
        self.nodes[node.0].var.map(|v| solver.actual_pos(v))
    }

    pub fn parent_of(&self, cluster: ClusterHandle) -> Option<ClusterHandle> {
        self.clusters[cluster.0].parent.map(ClusterHandle)
    }
}
