use crate::geom::{Point, point};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disc {
    pub center: Point,
    pub radius: f64,
}

impl Disc {
    pub fn at(center: Point) -> Self {
        Self {
            center,
            radius: 0.0,
        }
    }

    fn diameter(a: Point, b: Point) -> Self {
        Self {
            center: a.lerp(b, 0.5),
            radius: (b - a).length() / 2.0,
        }
    }

    /// Circumscribed disc of three points; falls back to the widest pair when they are collinear.
    fn circumscribed(a: Point, b: Point, c: Point) -> Self {
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < EPS {
            let candidates = [Self::diameter(a, b), Self::diameter(a, c), Self::diameter(b, c)];
            return candidates
                .into_iter()
                .fold(Self::diameter(a, b), |best, cand| {
                    if cand.radius > best.radius { cand } else { best }
                });
        }
        let a2 = a.to_vector().square_length();
        let b2 = b.to_vector().square_length();
        let c2 = c.to_vector().square_length();
        let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
        let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
        let center = point(ux, uy);
        Self {
            center,
            radius: (a - center).length(),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        (p - self.center).length() <= self.radius + EPS * (1.0 + self.radius)
    }

    pub fn intersects(&self, other: &Disc) -> bool {
        (other.center - self.center).length() <= self.radius + other.radius
    }

    /// Smallest disc enclosing both discs.
    pub fn enclosing(a: &Disc, b: &Disc) -> Disc {
        let dist = (b.center - a.center).length();
        if dist + b.radius <= a.radius {
            return *a;
        }
        if dist + a.radius <= b.radius {
            return *b;
        }
        let radius = (dist + a.radius + b.radius) / 2.0;
        let t = (radius - a.radius) / dist;
        Disc {
            center: a.center.lerp(b.center, t),
            radius,
        }
    }
}

/// Minimal enclosing disc (Welzl's incremental form, expected linear time).
pub fn min_enclosing_disc(points: &[Point]) -> Disc {
    let Some(&first) = points.first() else {
        return Disc::at(Point::origin());
    };
    let mut disc = Disc::at(first);
    for i in 1..points.len() {
        if disc.contains(points[i]) {
            continue;
        }
        disc = Disc::at(points[i]);
        for j in 0..i {
            if disc.contains(points[j]) {
                continue;
            }
            disc = Disc::diameter(points[i], points[j]);
            for k in 0..j {
                if !disc.contains(points[k]) {
                    disc = Disc::circumscribed(points[i], points[j], points[k]);
                }
            }
        }
    }
    disc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_corners_share_circumscribed_disc() {
        let ps = [
            point(0.0, 0.0),
            point(2.0, 0.0),
            point(2.0, 2.0),
            point(0.0, 2.0),
            point(1.0, 1.0),
        ];
        let d = min_enclosing_disc(&ps);
        assert!((d.center - point(1.0, 1.0)).length() < 1e-9);
        assert!((d.radius - 2f64.sqrt()).abs() < 1e-9);
        assert!(ps.iter().all(|&p| d.contains(p)));
    }

    #[test]
    fn collinear_points_use_widest_pair() {
        let ps = [point(0.0, 0.0), point(5.0, 0.0), point(10.0, 0.0)];
        let d = min_enclosing_disc(&ps);
        assert!((d.center - point(5.0, 0.0)).length() < 1e-9);
        assert!((d.radius - 5.0).abs() < 1e-9);
    }

    #[test]
    fn enclosing_disc_covers_both_inputs() {
        let a = Disc {
            center: point(0.0, 0.0),
            radius: 1.0,
        };
        let b = Disc {
            center: point(10.0, 0.0),
            radius: 3.0,
        };
        let e = Disc::enclosing(&a, &b);
        assert!((e.radius - 7.0).abs() < 1e-9);
        assert!((e.center - point(6.0, 0.0)).length() < 1e-9);
        assert!(!a.intersects(&b));
        assert!(e.intersects(&a));
    }
}
