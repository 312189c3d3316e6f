use crate::graph::{BorderInfo, RectangularBoundary};

/// One border of a cluster along the generator's axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderSpec {
    pub margin: f64,
    /// Present only when the boundary is fixed and fixed-constraint generation is enabled.
    pub fixed_position: Option<f64>,
    pub weight: f64,
}

impl BorderSpec {
    fn from_info(info: &BorderInfo, generate_fixed: bool) -> Self {
        Self {
            margin: info.margin,
            fixed_position: info.fixed_position.filter(|_| generate_fixed),
            weight: info.weight,
        }
    }

    /// Weight of the border variable in the projection solver.
    pub fn solver_weight(&self) -> f64 {
        if self.fixed_position.is_some() {
            self.weight
        } else {
            BorderInfo::FREE_WEIGHT
        }
    }
}

/// Per-axis view of a cluster boundary: borders along the primary axis, margins along the
/// perpendicular one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSpec {
    pub open: BorderSpec,
    pub close: BorderSpec,
    pub open_margin_p: f64,
    pub close_margin_p: f64,
    pub min_size: f64,
    pub min_size_p: f64,
}

impl ClusterSpec {
    pub fn from_boundary(boundary: &RectangularBoundary, horizontal: bool) -> Self {
        let generate_fixed = boundary.generate_fixed_constraints;
        let (open, close) = boundary.borders(horizontal);
        let (open_p, close_p) = boundary.borders(!horizontal);
        Self {
            open: BorderSpec::from_info(open, generate_fixed),
            close: BorderSpec::from_info(close, generate_fixed),
            open_margin_p: open_p.margin,
            close_margin_p: close_p.margin,
            min_size: boundary.min_size(horizontal),
            min_size_p: boundary.min_size(!horizontal),
        }
    }
}

/// Tight interval around `children` plus margins, widened symmetrically to `min_size`.
/// `None` when there are no children.
pub fn tight_interval(
    children: impl IntoIterator<Item = (f64, f64)>,
    open_margin: f64,
    close_margin: f64,
    min_size: f64,
) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (a, b) in children {
        lo = lo.min(a);
        hi = hi.max(b);
    }
    if lo > hi {
        return None;
    }
    let (mut open, mut close) = (lo - open_margin, hi + close_margin);
    let size = close - open;
    if size < min_size {
        let grow = (min_size - size) / 2.0;
        open -= grow;
        close += grow;
    }
    Some((open, close))
}

/// Extends a content interval to cover fixed border positions.
pub(super) fn with_fixed(
    interval: (f64, f64),
    open: &BorderSpec,
    close: &BorderSpec,
) -> (f64, f64) {
    let (mut lo, mut hi) = interval;
    if let Some(f) = open.fixed_position {
        lo = lo.min(f);
    }
    if let Some(f) = close.fixed_position {
        hi = hi.max(f);
    }
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tight_interval_applies_margins_and_min_size() {
        assert_eq!(
            tight_interval([(0.0, 10.0), (5.0, 20.0)], 2.0, 3.0, 0.0),
            Some((-2.0, 23.0))
        );
        assert_eq!(tight_interval([(0.0, 10.0)], 0.0, 0.0, 30.0), Some((-10.0, 20.0)));
        assert_eq!(tight_interval(std::iter::empty(), 1.0, 1.0, 5.0), None);
    }

    #[test]
    fn fixed_borders_are_ignored_when_generation_is_disabled() {
        let mut b = RectangularBoundary::with_margin(4.0);
        b.lock(0.0, 0.0, 100.0, 50.0, 1e6);
        let spec = ClusterSpec::from_boundary(&b, true);
        assert_eq!(spec.open.fixed_position, Some(0.0));
        assert_eq!(spec.close.solver_weight(), 1e6);

        b.generate_fixed_constraints = false;
        let spec = ClusterSpec::from_boundary(&b, false);
        assert_eq!(spec.open.fixed_position, None);
        assert_eq!(spec.open.solver_weight(), BorderInfo::FREE_WEIGHT);
        assert_eq!(spec.open_margin_p, 4.0);
    }
}
