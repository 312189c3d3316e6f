//! Multipole approximation of pairwise `1/r` repulsion.
//!
//! Particles are split recursively along the wider axis until each leaf holds at most
//! `bucket_size` particles. Every tree node carries a minimal enclosing disc and the complex
//! multipole coefficients `a_k = Σ (q − z0)^k` about the disc center, so that the field of all
//! particles below the node at a point `z` outside the disc is `Σ_k a_k / (z − z0)^{k+1}`.

use crate::geom::{Point, Vector, vector};
use nalgebra::Complex;

mod disc;

pub use disc::{Disc, min_enclosing_disc};

/// Jitter radius applied before building; small enough to be invisible in any layout.
const JITTER: f64 = 1e-7;
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Exact repulsion of `v` on `u`: `(u − v)/|u − v|²`, softened below a squared distance of 0.1.
pub fn repulsion(u: Point, v: Point) -> Vector {
    let duv = u - v;
    let l = duv.square_length();
    if l < 0.1 {
        if l != 0.0 {
            return duv / 0.1;
        }
        return vector(1.0, 0.0);
    }
    duv / l
}

/// O(n²) repulsion sums, one entry per point.
pub fn exact_repulsion(points: &[Point]) -> Vec<Vector> {
    let mut forces = vec![Vector::zero(); points.len()];
    for (i, &u) in points.iter().enumerate() {
        for (j, &v) in points.iter().enumerate() {
            if i != j {
                forces[i] += repulsion(u, v);
            }
        }
    }
    forces
}

#[derive(Debug, Clone)]
pub struct MultipoleCoefficients {
    center: Complex<f64>,
    a: Vec<Complex<f64>>,
}

impl MultipoleCoefficients {
    pub fn from_points(
        center: Point,
        precision: usize,
        points: impl Iterator<Item = Point>,
    ) -> Self {
        let z0 = to_complex(center);
        let mut a = vec![Complex::new(0.0, 0.0); precision];
        for p in points {
            let q = to_complex(p) - z0;
            let mut qk = Complex::new(1.0, 0.0);
            for ak in a.iter_mut() {
                *ak += qk;
                qk *= q;
            }
        }
        Self { center: z0, a }
    }

    /// Combines two expansions into one about `center` using the binomial shift.
    pub fn combine(center: Point, m1: &Self, m2: &Self) -> Self {
        let z1 = to_complex(center);
        let precision = m1.a.len();
        let mut a = vec![Complex::new(0.0, 0.0); precision];
        for m in [m1, m2] {
            let shift = m.center - z1;
            for (k, ak) in a.iter_mut().enumerate() {
                let mut binom = 1.0;
                for j in (0..=k).rev() {
                    // C(k, j) (z0 − z1)^{k−j} a_j
                    *ak += m.a[j] * shift.powu((k - j) as u32) * binom;
                    binom = binom * (j as f64) / ((k - j + 1) as f64);
                }
            }
        }
        Self { center: z1, a }
    }

    /// Approximate `Σ (v − q)/|v − q|²` over the expanded particles.
    pub fn far_field(&self, v: Point) -> Vector {
        let z = to_complex(v) - self.center;
        let mut zk = z;
        let mut sum = Complex::new(0.0, 0.0);
        for ak in &self.a {
            sum += ak / zk;
            zk *= z;
        }
        vector(sum.re, -sum.im)
    }
}

fn to_complex(p: Point) -> Complex<f64> {
    Complex::new(p.x, p.y)
}

#[derive(Debug, Clone)]
enum KdNode {
    Leaf {
        particles: Vec<usize>,
        disc: Disc,
        coefficients: MultipoleCoefficients,
    },
    Internal {
        left: usize,
        right: usize,
        disc: Disc,
        coefficients: MultipoleCoefficients,
    },
}

impl KdNode {
    fn disc(&self) -> &Disc {
        match self {
            KdNode::Leaf { disc, .. } | KdNode::Internal { disc, .. } => disc,
        }
    }

    fn coefficients(&self) -> &MultipoleCoefficients {
        match self {
            KdNode::Leaf { coefficients, .. } | KdNode::Internal { coefficients, .. } => {
                coefficients
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<Point>,
    nodes: Vec<KdNode>,
    leaves: Vec<usize>,
    root: usize,
    precision: usize,
}

impl KdTree {
    pub fn new(points: &[Point], bucket_size: usize, precision: usize) -> Self {
        let bucket_size = bucket_size.max(1);
        let precision = precision.max(1);
        let points: Vec<Point> = points
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let angle = i as f64 * GOLDEN_ANGLE;
                p + vector(angle.cos(), angle.sin()) * JITTER
            })
            .collect();
        let mut tree = Self {
            points,
            nodes: Vec::new(),
            leaves: Vec::new(),
            root: 0,
            precision,
        };
        if !tree.points.is_empty() {
            let indices: Vec<usize> = (0..tree.points.len()).collect();
            tree.root = tree.build(indices, bucket_size);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn build(&mut self, mut indices: Vec<usize>, bucket_size: usize) -> usize {
        if indices.len() <= bucket_size {
            let pts: Vec<Point> = indices.iter().map(|&i| self.points[i]).collect();
            let disc = min_enclosing_disc(&pts);
            let coefficients =
                MultipoleCoefficients::from_points(disc.center, self.precision, pts.into_iter());
            let id = self.nodes.len();
            self.nodes.push(KdNode::Leaf {
                particles: indices,
                disc,
                coefficients,
            });
            self.leaves.push(id);
            return id;
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &i in &indices {
            let p = self.points[i];
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let split_x = max_x - min_x >= max_y - min_y;
        let mid = indices.len() / 2;
        let points = &self.points;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            let (pa, pb) = (points[a], points[b]);
            let ord = if split_x {
                pa.x.total_cmp(&pb.x)
            } else {
                pa.y.total_cmp(&pb.y)
            };
            ord.then(a.cmp(&b))
        });
        let right_indices = indices.split_off(mid);

        let left = self.build(indices, bucket_size);
        let right = self.build(right_indices, bucket_size);
        let disc = Disc::enclosing(self.nodes[left].disc(), self.nodes[right].disc());
        let coefficients = MultipoleCoefficients::combine(
            disc.center,
            self.nodes[left].coefficients(),
            self.nodes[right].coefficients(),
        );
        let id = self.nodes.len();
        self.nodes.push(KdNode::Internal {
            left,
            right,
            disc,
            coefficients,
        });
        id
    }

    /// Approximate repulsion sums, indexed like the input points.
    pub fn compute_forces(&self) -> Vec<Vector> {
        let mut forces = vec![Vector::zero(); self.points.len()];
        if self.nodes.is_empty() {
            return forces;
        }
        let mut stack: Vec<usize> = Vec::new();
        for &leaf in &self.leaves {
            let KdNode::Leaf {
                particles: targets,
                disc: leaf_disc,
                ..
            } = &self.nodes[leaf]
            else {
                continue;
            };
            stack.clear();
            stack.push(self.root);
            while let Some(n) = stack.pop() {
                let node = &self.nodes[n];
                if !node.disc().intersects(leaf_disc) {
                    let coefficients = node.coefficients();
                    for &t in targets {
                        forces[t] += coefficients.far_field(self.points[t]);
                    }
                    continue;
                }
                match node {
                    KdNode::Leaf { particles, .. } => {
                        for &t in targets {
                            let u = self.points[t];
                            for &s in particles {
                                if s != t {
                                    forces[t] += repulsion(u, self.points[s]);
                                }
                            }
                        }
                    }
                    KdNode::Internal { left, right, .. } => {
                        stack.push(*right);
                        stack.push(*left);
                    }
                }
            }
        }
        forces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::point;

    fn blob(origin: Point) -> Vec<Point> {
        let mut out = Vec::new();
        for i in 0..5 {
            for j in 0..2 {
                out.push(point(origin.x + i as f64, origin.y + j as f64));
            }
        }
        out
    }

    #[test]
    fn far_field_matches_direct_sum() {
        let pts = [point(0.0, 0.0), point(1.0, 0.5), point(-0.5, 1.0)];
        let m = MultipoleCoefficients::from_points(point(0.2, 0.5), 8, pts.iter().copied());
        let z = point(40.0, -25.0);
        let exact = pts
            .iter()
            .fold(Vector::zero(), |acc, &q| acc + repulsion(z, q));
        let approx = m.far_field(z);
        assert!((approx - exact).length() < 1e-9 * exact.length().max(1.0));
    }

    #[test]
    fn combined_coefficients_match_direct_expansion() {
        let a = [point(0.0, 0.0), point(1.0, 1.0)];
        let b = [point(5.0, 0.0), point(6.0, -1.0)];
        let ma = MultipoleCoefficients::from_points(point(0.5, 0.5), 5, a.iter().copied());
        let mb = MultipoleCoefficients::from_points(point(5.5, -0.5), 5, b.iter().copied());
        let center = point(3.0, 0.0);
        let combined = MultipoleCoefficients::combine(center, &ma, &mb);
        let direct =
            MultipoleCoefficients::from_points(center, 5, a.iter().chain(b.iter()).copied());
        for (x, y) in combined.a.iter().zip(direct.a.iter()) {
            assert!((x - y).norm() < 1e-9, "{x} vs {y}");
        }
    }

    #[test]
    fn separated_blobs_match_exact_forces() {
        let mut pts = blob(point(0.0, 0.0));
        pts.extend(blob(point(500.0, 0.0)));
        let tree = KdTree::new(&pts, 8, 5);
        assert_eq!(tree.leaf_count(), 4);
        let approx = tree.compute_forces();
        let exact = exact_repulsion(&pts);
        for (i, (a, e)) in approx.iter().zip(exact.iter()).enumerate() {
            let err = (*a - *e).length();
            assert!(err < 1e-4 * e.length().max(1e-3), "particle {i}: {a:?} vs {e:?}");
        }
    }

    #[test]
    fn coincident_points_build_a_tree() {
        let pts = vec![point(3.0, 3.0); 40];
        let tree = KdTree::new(&pts, 8, 5);
        assert_eq!(tree.len(), 40);
        let forces = tree.compute_forces();
        assert!(forces.iter().all(|f| f.x.is_finite() && f.y.is_finite()));
    }

    #[test]
    fn construction_is_deterministic() {
        let pts: Vec<Point> = (0..64)
            .map(|i| point((i * 37 % 101) as f64, (i * 53 % 97) as f64))
            .collect();
        let a = KdTree::new(&pts, 8, 5).compute_forces();
        let b = KdTree::new(&pts, 8, 5).compute_forces();
        assert_eq!(a, b);
    }
}
