use super::IncrementalLayout;

impl IncrementalLayout<'_> {
    /// Brings the layout to a configuration that satisfies the constraints of every level up to
    /// `target`, one level at a time, so that structural constraints and overlap constraints
    /// never meet in a cyclic first solve.
    pub(super) fn enforce_feasibility(&mut self, target: usize) {
        for c in self.constraints.iter().filter(|c| c.is_lock()) {
            c.project(&mut self.nodes);
        }
        for level in 0..=target {
            self.solve_axis(true, level);
            self.settle_nodes();
            self.solve_axis(false, level);
            self.settle_nodes();
        }
        tracing::debug!(level = target, "enforced feasibility");
    }

    fn settle_nodes(&mut self) {
        for n in &mut self.nodes {
            n.settle();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::algo::IncrementalLayoutSettings;
    use crate::algo::incremental::{Axis, IncrementalLayout};
    use crate::geom::point;
    use crate::graph::{Graph, Node};

    #[test]
    fn raising_the_level_activates_its_constraints() {
        let mut graph = Graph {
            nodes: vec![
                Node::new("a", point(0.0, 0.0), 10.0, 10.0),
                Node::new("b", point(1.0, 0.0), 10.0, 10.0),
            ],
            ..Default::default()
        };
        let settings = IncrementalLayoutSettings {
            apply_forces: false,
            avoid_overlaps: false,
            ..Default::default()
        };
        let mut layout = IncrementalLayout::new(&mut graph, settings).unwrap();
        layout
            .add_separation_constraint("a", "b", Axis::Horizontal, 40.0, false, 1)
            .unwrap();
        layout.initialize();
        assert_eq!(layout.graph().nodes[1].center.x, 1.0);

        layout.set_current_constraint_level(1);
        let nodes = &layout.graph().nodes;
        assert!(nodes[1].center.x - nodes[0].center.x >= 40.0 - 1e-6);
        assert!(!layout.converged());
    }
}
