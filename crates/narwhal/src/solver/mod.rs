//! Weighted 1-D projection solver.
//!
//! Finds positions `x` minimising `Σ w_i (x_i − d_i)²` subject to separation constraints
//! `x_right − x_left ≥ gap` (or `= gap`). Variables are grouped into rigid blocks joined by active
//! constraints: a satisfy pass merges blocks across violated constraints in topological order, then
//! a refine pass splits blocks across active constraints whose Lagrange multiplier is negative.
//!
//! Constraint sets containing cycles or contradicting equalities are not errors; the constraints
//! that remain violated are reported through [`Solution::unsatisfiable_constraints`].

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub usize);

#[derive(Debug, Clone, Copy)]
pub struct SolverParameters {
    /// Violations up to this amount count as satisfied.
    pub gap_tolerance: f64,
    /// Negative Lagrange multipliers above `-lagrangian_tolerance` do not split a block.
    pub lagrangian_tolerance: f64,
    pub max_refine_iterations: usize,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            gap_tolerance: 1e-6,
            lagrangian_tolerance: 1e-7,
            max_refine_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Solution {
    pub unsatisfiable_constraints: usize,
    /// `Σ w (actual − desired)²` at the returned positions.
    pub goal_function_value: f64,
    pub refine_iterations: usize,
}

#[derive(Debug, Clone)]
struct Variable {
    desired: f64,
    weight: f64,
    actual: f64,
    offset: f64,
    block: usize,
    ins: Vec<usize>,
    outs: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Constraint {
    left: usize,
    right: usize,
    gap: f64,
    equality: bool,
    active: bool,
    lm: f64,
}

#[derive(Debug, Clone, Default)]
struct Block {
    vars: Vec<usize>,
    weight: f64,
    // Σ w (desired − offset); the optimal block position is `weighted / weight`.
    weighted: f64,
    posn: f64,
}

impl Block {
    fn update_posn(&mut self) {
        self.posn = self.weighted / self.weight;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Solver {
    vars: Vec<Variable>,
    constraints: Vec<Constraint>,
    blocks: Vec<Block>,
    inequality_pairs: FxHashMap<(usize, usize), usize>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, desired: f64, weight: f64) -> VarId {
        debug_assert!(desired.is_finite(), "non-finite desired position");
        let id = self.vars.len();
        self.vars.push(Variable {
            desired,
            weight: weight.max(f64::MIN_POSITIVE),
            actual: desired,
            offset: 0.0,
            block: id,
            ins: Vec::new(),
            outs: Vec::new(),
        });
        VarId(id)
    }

    /// Adds `right − left ≥ gap` (or `= gap`). Returns `None` when the constraint is redundant: a
    /// self constraint, or an inequality dominated by one already present for the same pair.
    pub fn add_constraint(
        &mut self,
        left: VarId,
        right: VarId,
        gap: f64,
        equality: bool,
    ) -> Option<ConstraintId> {
        debug_assert!(gap.is_finite(), "non-finite constraint gap");
        if left == right {
            return None;
        }
        if !equality {
            if let Some(&existing) = self.inequality_pairs.get(&(left.0, right.0)) {
                let c = &mut self.constraints[existing];
                if gap <= c.gap {
                    return None;
                }
                c.gap = gap;
                return Some(ConstraintId(existing));
            }
        }
        let id = self.constraints.len();
        self.constraints.push(Constraint {
            left: left.0,
            right: right.0,
            gap,
            equality,
            active: false,
            lm: 0.0,
        });
        self.vars[left.0].outs.push(id);
        self.vars[right.0].ins.push(id);
        if !equality {
            self.inequality_pairs.insert((left.0, right.0), id);
        }
        Some(ConstraintId(id))
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn set_desired_pos(&mut self, v: VarId, desired: f64) {
        self.vars[v.0].desired = desired;
    }

    pub fn set_weight(&mut self, v: VarId, weight: f64) {
        self.vars[v.0].weight = weight.max(f64::MIN_POSITIVE);
    }

    pub fn desired_pos(&self, v: VarId) -> f64 {
        self.vars[v.0].desired
    }

    pub fn actual_pos(&self, v: VarId) -> f64 {
        self.vars[v.0].actual
    }

    /// Resets actual positions to the desired ones, discarding the previous solve.
    pub fn update_variables(&mut self) {
        for v in &mut self.vars {
            v.actual = v.desired;
        }
    }

    pub fn solve(&mut self, params: &SolverParameters) -> Solution {
        self.reset_blocks();
        self.satisfy(params);

        let mut refine_iterations = 0;
        while refine_iterations < params.max_refine_iterations {
            if !self.split_worst_block(params) {
                break;
            }
            refine_iterations += 1;
            self.merge_violated(params);
        }

        for i in 0..self.vars.len() {
            self.vars[i].actual = self.position(i);
        }

        let unsatisfiable_constraints = self
            .constraints
            .iter()
            .filter(|c| self.is_violated(c, params))
            .count();
        let goal_function_value = self
            .vars
            .iter()
            .map(|v| v.weight * (v.actual - v.desired).powi(2))
            .sum();
        Solution {
            unsatisfiable_constraints,
            goal_function_value,
            refine_iterations,
        }
    }

    fn reset_blocks(&mut self) {
        self.blocks.clear();
        for (i, v) in self.vars.iter_mut().enumerate() {
            v.offset = 0.0;
            v.block = i;
            let mut b = Block {
                vars: vec![i],
                weight: v.weight,
                weighted: v.weight * v.desired,
                posn: v.desired,
            };
            b.update_posn();
            self.blocks.push(b);
        }
        for c in &mut self.constraints {
            c.active = false;
            c.lm = 0.0;
        }
    }

    fn position(&self, v: usize) -> f64 {
        let var = &self.vars[v];
        self.blocks[var.block].posn + var.offset
    }

    /// Positive when the constraint wants the right variable further right.
    fn violation(&self, c: &Constraint) -> f64 {
        self.position(c.left) + c.gap - self.position(c.right)
    }

    fn is_violated(&self, c: &Constraint, params: &SolverParameters) -> bool {
        let v = self.violation(c);
        if c.equality {
            v.abs() > params.gap_tolerance
        } else {
            v > params.gap_tolerance
        }
    }

    fn topological_order(&self) -> Vec<usize> {
        let n = self.vars.len();
        let mut in_degree: Vec<usize> = self.vars.iter().map(|v| v.ins.len()).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut placed = vec![false; n];
        while let Some(v) = queue.pop_front() {
            placed[v] = true;
            order.push(v);
            for &ci in &self.vars[v].outs {
                let r = self.constraints[ci].right;
                in_degree[r] -= 1;
                if in_degree[r] == 0 {
                    queue.push_back(r);
                }
            }
        }
        if order.len() < n {
            // Variables on cycles: fall back to desired-position order.
            let mut rest: Vec<usize> = (0..n).filter(|&i| !placed[i]).collect();
            rest.sort_by(|&a, &b| {
                self.vars[a]
                    .desired
                    .total_cmp(&self.vars[b].desired)
                    .then(a.cmp(&b))
            });
            order.extend(rest);
        }
        order
    }

    fn satisfy(&mut self, params: &SolverParameters) {
        for v in self.topological_order() {
            loop {
                let b = self.vars[v].block;
                let Some(ci) = self.most_violated_incident(b, params) else {
                    break;
                };
                self.merge(ci);
            }
        }
        self.merge_violated(params);
    }

    /// Most violated constraint joining block `b` to another block.
    fn most_violated_incident(&self, b: usize, params: &SolverParameters) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for &v in &self.blocks[b].vars {
            let var = &self.vars[v];
            for &ci in var.ins.iter().chain(var.outs.iter()) {
                let c = &self.constraints[ci];
                if c.active || self.vars[c.left].block == self.vars[c.right].block {
                    continue;
                }
                if !self.is_violated(c, params) {
                    continue;
                }
                let amount = self.violation(c).abs();
                if best.is_none_or(|(_, a)| amount > a) {
                    best = Some((ci, amount));
                }
            }
        }
        best.map(|(ci, _)| ci)
    }

    fn merge_violated(&mut self, params: &SolverParameters) {
        loop {
            let mut best: Option<(usize, f64)> = None;
            for (ci, c) in self.constraints.iter().enumerate() {
                if c.active || self.vars[c.left].block == self.vars[c.right].block {
                    continue;
                }
                if !self.is_violated(c, params) {
                    continue;
                }
                let amount = self.violation(c).abs();
                if best.is_none_or(|(_, a)| amount > a) {
                    best = Some((ci, amount));
                }
            }
            match best {
                Some((ci, _)) => self.merge(ci),
                None => break,
            }
        }
    }

    /// Joins the blocks on both sides of constraint `ci`, making it tight and active.
    fn merge(&mut self, ci: usize) {
        let (left, right, gap) = {
            let c = &self.constraints[ci];
            (c.left, c.right, c.gap)
        };
        let lb = self.vars[left].block;
        let rb = self.vars[right].block;
        debug_assert_ne!(lb, rb);
        // Offset that moves the right block into the left block's frame.
        let d = self.vars[left].offset + gap - self.vars[right].offset;

        let (keep, gone, shift) = if self.blocks[rb].vars.len() <= self.blocks[lb].vars.len() {
            (lb, rb, d)
        } else {
            (rb, lb, -d)
        };
        let moved = std::mem::take(&mut self.blocks[gone].vars);
        for &v in &moved {
            self.vars[v].offset += shift;
            self.vars[v].block = keep;
        }
        let (gw, gweighted) = (self.blocks[gone].weight, self.blocks[gone].weighted);
        self.blocks[gone].weight = 0.0;
        self.blocks[gone].weighted = 0.0;
        let kb = &mut self.blocks[keep];
        kb.vars.extend(moved);
        kb.weight += gw;
        kb.weighted += gweighted - shift * gw;
        kb.update_posn();
        self.constraints[ci].active = true;
    }

    /// Computes Lagrange multipliers of active constraints and splits the block containing the
    /// most negative one. Returns `false` when no block benefits from splitting.
    fn split_worst_block(&mut self, params: &SolverParameters) -> bool {
        for b in 0..self.blocks.len() {
            if self.blocks[b].vars.len() > 1 {
                self.compute_lagrange_multipliers(b);
            }
        }
        let mut worst: Option<(usize, f64)> = None;
        for (ci, c) in self.constraints.iter().enumerate() {
            if !c.active || c.equality {
                continue;
            }
            if c.lm < -params.lagrangian_tolerance && worst.is_none_or(|(_, lm)| c.lm < lm) {
                worst = Some((ci, c.lm));
            }
        }
        let Some((ci, _)) = worst else {
            return false;
        };
        self.split(ci);
        true
    }

    fn compute_lagrange_multipliers(&mut self, b: usize) {
        let root = self.blocks[b].vars[0];
        // Spanning-tree order over active constraints, with the constraint leading to each var.
        let mut order: Vec<(usize, Option<usize>)> = Vec::with_capacity(self.blocks[b].vars.len());
        let mut stack: Vec<(usize, Option<usize>)> = vec![(root, None)];
        while let Some((v, via)) = stack.pop() {
            order.push((v, via));
            let var = &self.vars[v];
            for &ci in var.ins.iter().chain(var.outs.iter()) {
                if Some(ci) == via || !self.constraints[ci].active {
                    continue;
                }
                let c = &self.constraints[ci];
                let other = if c.left == v { c.right } else { c.left };
                stack.push((other, Some(ci)));
            }
        }

        let mut dfdv: FxHashMap<usize, f64> = FxHashMap::default();
        for &(v, _) in &order {
            let var = &self.vars[v];
            dfdv.insert(v, var.weight * (self.position(v) - var.desired));
        }
        for &(v, via) in order.iter().rev() {
            let Some(ci) = via else {
                continue;
            };
            let own = dfdv[&v];
            let c = &mut self.constraints[ci];
            let parent = if c.left == v { c.right } else { c.left };
            if c.right == v {
                // parent -> v
                c.lm = own;
                *dfdv.entry(parent).or_default() += own;
            } else {
                // v -> parent
                c.lm = -own;
                *dfdv.entry(parent).or_default() += own;
            }
        }
    }

    fn split(&mut self, ci: usize) {
        self.constraints[ci].active = false;
        let (left, right) = (self.constraints[ci].left, self.constraints[ci].right);
        let b = self.vars[left].block;

        let mut side: FxHashMap<usize, bool> = FxHashMap::default();
        let mut stack = vec![left];
        side.insert(left, true);
        while let Some(v) = stack.pop() {
            let var = &self.vars[v];
            for &cj in var.ins.iter().chain(var.outs.iter()) {
                let c = &self.constraints[cj];
                if !c.active {
                    continue;
                }
                let other = if c.left == v { c.right } else { c.left };
                if side.insert(other, true).is_none() {
                    stack.push(other);
                }
            }
        }
        debug_assert!(!side.contains_key(&right));

        let all = std::mem::take(&mut self.blocks[b].vars);
        let (left_vars, right_vars): (Vec<usize>, Vec<usize>) =
            all.into_iter().partition(|v| side.contains_key(v));
        let new_block = self.blocks.len();
        self.blocks.push(Block::default());
        self.rebuild_block(b, left_vars);
        self.rebuild_block(new_block, right_vars);
    }

    fn rebuild_block(&mut self, b: usize, vars: Vec<usize>) {
        let mut weight = 0.0;
        let mut weighted = 0.0;
        for &v in &vars {
            let var = &mut self.vars[v];
            var.block = b;
            weight += var.weight;
            weighted += var.weight * (var.desired - var.offset);
        }
        let block = &mut self.blocks[b];
        block.vars = vars;
        block.weight = weight;
        block.weighted = weighted;
        block.update_posn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(s: &mut Solver) -> Solution {
        s.solve(&SolverParameters::default())
    }

    #[test]
    fn unconstrained_variables_stay_at_desired_positions() {
        let mut s = Solver::new();
        let a = s.add_variable(3.0, 1.0);
        let b = s.add_variable(-7.5, 2.0);
        let sol = solve(&mut s);
        assert_eq!(sol.unsatisfiable_constraints, 0);
        assert_eq!(s.actual_pos(a), 3.0);
        assert_eq!(s.actual_pos(b), -7.5);
    }

    #[test]
    fn overlapping_pair_moves_apart_symmetrically() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(2.0, 1.0);
        s.add_constraint(a, b, 10.0, false).expect("new constraint");
        solve(&mut s);
        assert!((s.actual_pos(a) + 4.0).abs() < 1e-9);
        assert!((s.actual_pos(b) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn heavy_variable_barely_moves() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1e6);
        let b = s.add_variable(0.0, 1.0);
        s.add_constraint(a, b, 5.0, false);
        solve(&mut s);
        assert!(s.actual_pos(a).abs() < 1e-4);
        assert!((s.actual_pos(b) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn chain_is_satisfied_and_refined() {
        // a=0, b=1, c=100 with a<b<c gaps of 10: only a/b interact, c stays put.
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(1.0, 1.0);
        let c = s.add_variable(100.0, 1.0);
        s.add_constraint(a, b, 10.0, false);
        s.add_constraint(b, c, 10.0, false);
        let sol = solve(&mut s);
        assert_eq!(sol.unsatisfiable_constraints, 0);
        assert!((s.actual_pos(b) - s.actual_pos(a) - 10.0).abs() < 1e-9);
        assert!((s.actual_pos(c) - 100.0).abs() < 1e-9);
        assert!((s.actual_pos(a) + 4.5).abs() < 1e-9);
    }

    #[test]
    fn refine_splits_block_that_pulls_apart() {
        // Satisfy merges a, b and d into one block; a then sits right of its desired position
        // only because of the a/b constraint, which gets a negative multiplier and is split.
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(0.0, 1.0);
        let d = s.add_variable(10.0, 1.0);
        s.add_constraint(a, b, 4.0, false);
        s.add_constraint(d, b, 1.0, false);
        let sol = solve(&mut s);
        assert_eq!(sol.unsatisfiable_constraints, 0);
        assert!(sol.refine_iterations >= 1);
        assert!(s.actual_pos(a).abs() < 1e-9);
        assert!((s.actual_pos(b) - 5.5).abs() < 1e-9);
        assert!((s.actual_pos(d) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn equality_is_enforced_in_both_directions() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(30.0, 1.0);
        s.add_constraint(a, b, 10.0, true);
        solve(&mut s);
        assert!((s.actual_pos(b) - s.actual_pos(a) - 10.0).abs() < 1e-9);
        assert!((s.actual_pos(a) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn dominated_duplicate_is_redundant() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(0.0, 1.0);
        assert!(s.add_constraint(a, b, 5.0, false).is_some());
        assert!(s.add_constraint(a, b, 3.0, false).is_none());
        assert!(s.add_constraint(a, b, 8.0, false).is_some());
        assert!(s.add_constraint(a, a, 1.0, false).is_none());
        assert_eq!(s.constraint_count(), 1);
        solve(&mut s);
        assert!((s.actual_pos(b) - s.actual_pos(a) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn resolving_after_changing_goals() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(2.0, 1.0);
        s.add_constraint(a, b, 10.0, false);
        solve(&mut s);
        assert_eq!(s.variable_count(), 2);

        s.set_desired_pos(a, -20.0);
        assert_eq!(s.desired_pos(a), -20.0);
        s.update_variables();
        assert_eq!(s.actual_pos(a), -20.0);
        assert_eq!(s.actual_pos(b), 2.0);

        s.set_desired_pos(a, 0.0);
        s.set_weight(b, 1e6);
        solve(&mut s);
        assert!((s.actual_pos(b) - 2.0).abs() < 1e-4);
        assert!((s.actual_pos(a) + 8.0).abs() < 1e-4);
    }

    #[test]
    fn cycle_reports_unsatisfiable_constraint() {
        let mut s = Solver::new();
        let a = s.add_variable(0.0, 1.0);
        let b = s.add_variable(0.0, 1.0);
        s.add_constraint(a, b, 5.0, false);
        s.add_constraint(b, a, 5.0, false);
        let sol = solve(&mut s);
        assert_eq!(sol.unsatisfiable_constraints, 1);
    }
}
