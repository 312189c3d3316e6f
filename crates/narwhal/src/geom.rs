pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Vector = euclid::Vector2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
/// Axis-aligned rectangle stored as min/max corners (y grows downwards).
pub type Rect = euclid::Box2D<f64, Unit>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn vector(x: f64, y: f64) -> Vector {
    euclid::vec2(x, y)
}

pub fn rect(left: f64, top: f64, right: f64, bottom: f64) -> Rect {
    Rect::new(point(left, top), point(right, bottom))
}

pub fn rect_from_center(center: Point, width: f64, height: f64) -> Rect {
    let half = vector(width / 2.0, height / 2.0);
    Rect::new(center - half, center + half)
}

pub fn is_finite_point(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

/// Either x or y, selected by an axis flag. Keeps per-axis code paths shared.
pub(crate) fn coord(p: Point, horizontal: bool) -> f64 {
    if horizontal { p.x } else { p.y }
}

pub(crate) fn set_coord(p: &mut Point, horizontal: bool, v: f64) {
    if horizontal {
        p.x = v;
    } else {
        p.y = v;
    }
}
