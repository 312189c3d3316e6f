use serde::{Deserialize, Serialize};

/// One side of a cluster boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BorderInfo {
    /// Gap kept between the border and the cluster contents.
    pub margin: f64,
    /// When set, the overlap solver pulls this border towards the given coordinate.
    pub fixed_position: Option<f64>,
    /// Weight of the pull towards `fixed_position`.
    pub weight: f64,
}

impl BorderInfo {
    pub const DEFAULT_FIXED_WEIGHT: f64 = 1e5;
    pub const FREE_WEIGHT: f64 = 1e-6;

    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin,
            ..Self::default()
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_position.is_some()
    }
}

impl Default for BorderInfo {
    fn default() -> Self {
        Self {
            margin: 0.0,
            fixed_position: None,
            weight: Self::DEFAULT_FIXED_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RectangularBoundary {
    pub left: BorderInfo,
    pub right: BorderInfo,
    pub top: BorderInfo,
    pub bottom: BorderInfo,
    pub min_width: f64,
    pub min_height: f64,
    /// Whether fixed border positions are turned into solver goals. The layout engine switches
    /// this off in its own copy for ancestors of a lock, so the locked region can still move.
    pub generate_fixed_constraints: bool,
}

impl Default for RectangularBoundary {
    fn default() -> Self {
        Self {
            left: BorderInfo::default(),
            right: BorderInfo::default(),
            top: BorderInfo::default(),
            bottom: BorderInfo::default(),
            min_width: 0.0,
            min_height: 0.0,
            generate_fixed_constraints: true,
        }
    }
}

impl RectangularBoundary {
    pub fn with_margin(margin: f64) -> Self {
        let b = BorderInfo::with_margin(margin);
        Self {
            left: b,
            right: b,
            top: b,
            bottom: b,
            ..Self::default()
        }
    }

    /// `(open, close)` borders for an axis: left/right when horizontal, top/bottom otherwise.
    pub fn borders(&self, horizontal: bool) -> (&BorderInfo, &BorderInfo) {
        if horizontal {
            (&self.left, &self.right)
        } else {
            (&self.top, &self.bottom)
        }
    }

    pub fn min_size(&self, horizontal: bool) -> f64 {
        if horizontal {
            self.min_width
        } else {
            self.min_height
        }
    }

    /// First problem that makes the boundary unusable for layout, if any.
    pub(crate) fn defect(&self) -> Option<&'static str> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        for b in [&self.left, &self.right, &self.top, &self.bottom] {
            if !non_negative(b.margin) {
                return Some("margins must be finite and non-negative");
            }
            if !(b.weight.is_finite() && b.weight > 0.0) {
                return Some("border weights must be finite and positive");
            }
            if b.fixed_position.is_some_and(|p| !p.is_finite()) {
                return Some("fixed border positions must be finite");
            }
        }
        if !non_negative(self.min_width) || !non_negative(self.min_height) {
            return Some("minimum sizes must be finite and non-negative");
        }
        None
    }

    pub fn lock(&mut self, left: f64, top: f64, right: f64, bottom: f64, weight: f64) {
        self.left.fixed_position = Some(left);
        self.right.fixed_position = Some(right);
        self.top.fixed_position = Some(top);
        self.bottom.fixed_position = Some(bottom);
        for b in [
            &mut self.left,
            &mut self.right,
            &mut self.top,
            &mut self.bottom,
        ] {
            b.weight = weight;
        }
    }
}
