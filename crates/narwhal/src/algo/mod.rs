pub mod incremental;
pub mod multipole;
pub mod overlap;

use crate::error::{Result, check_range};
use overlap::OverlapRemovalParameters;
use serde::{Deserialize, Serialize};

/// Preferred placement of an edge's target relative to its source (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeDirection {
    #[default]
    None,
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdealEdgeLength {
    /// Spring rest length for edges without their own `length`.
    pub length: f64,
    pub direction: EdgeDirection,
    /// Minimum gap between the facing sides of source and target when `direction` is set.
    pub separation: f64,
}

impl Default for IdealEdgeLength {
    fn default() -> Self {
        Self {
            length: 40.0,
            direction: EdgeDirection::None,
            separation: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncrementalLayoutSettings {
    pub attractive_force_constant: f64,
    pub repulsive_force_constant: f64,
    pub gravity_constant: f64,
    /// Pull of a cluster's direct child nodes towards the cluster barycenter.
    pub cluster_gravity: f64,
    /// Pull between the two endpoint clusters of every cluster edge.
    pub inter_cluster_attraction: f64,
    /// Use the logarithmic spring law instead of the squared one.
    pub log_scale_edge_forces: bool,
    pub ideal_edge_length: IdealEdgeLength,

    pub initial_step_size: f64,
    pub decay: f64,
    pub friction: f64,
    /// Integrate with 4-stage Runge–Kutta instead of Verlet.
    pub runge_kutta_integration: bool,
    /// Upper bound on the force magnitude within a component; larger forces are scaled down
    /// component-wide.
    pub max_force: f64,

    /// Cap on `run` calls per constraint level.
    pub max_iterations: usize,
    pub minor_iterations: usize,
    pub projection_iterations: usize,
    pub displacement_threshold: f64,

    pub apply_forces: bool,
    /// When off, each connected component feels only its own repulsion and gravity.
    pub inter_component_forces: bool,
    pub approximate_repulsion: bool,
    pub multipole_bucket_size: usize,
    pub multipole_precision: usize,

    pub avoid_overlaps: bool,
    pub node_separation: f64,
    pub cluster_separation: f64,
    pub overlap_removal: OverlapRemovalParameters,

    pub min_constraint_level: usize,
    pub max_constraint_level: usize,
}

impl Default for IncrementalLayoutSettings {
    fn default() -> Self {
        Self {
            attractive_force_constant: 1.0,
            repulsive_force_constant: 1.0,
            gravity_constant: 1.0,
            cluster_gravity: 1.0,
            inter_cluster_attraction: 1.0,
            log_scale_edge_forces: false,
            ideal_edge_length: IdealEdgeLength::default(),
            initial_step_size: 1.4,
            decay: 0.9,
            friction: 0.8,
            runge_kutta_integration: false,
            max_force: 100.0,
            max_iterations: 100,
            minor_iterations: 3,
            projection_iterations: 5,
            displacement_threshold: 0.1,
            apply_forces: true,
            inter_component_forces: true,
            approximate_repulsion: true,
            multipole_bucket_size: 8,
            multipole_precision: 5,
            avoid_overlaps: true,
            node_separation: 10.0,
            cluster_separation: 10.0,
            overlap_removal: OverlapRemovalParameters::default(),
            min_constraint_level: 0,
            max_constraint_level: 2,
        }
    }
}

impl IncrementalLayoutSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("attractiveForceConstant", self.attractive_force_constant),
            ("repulsiveForceConstant", self.repulsive_force_constant),
            ("gravityConstant", self.gravity_constant),
            ("clusterGravity", self.cluster_gravity),
            ("interClusterAttraction", self.inter_cluster_attraction),
        ] {
            check_range(name, value, value.is_finite(), "a finite number")?;
        }
        let s = self.initial_step_size;
        check_range("initialStepSize", s, s > 0.0 && s <= 2.0, "a value in (0, 2]")?;
        let d = self.decay;
        check_range("decay", d, (0.1..=1.0).contains(&d), "a value in [0.1, 1]")?;
        let f = self.friction;
        check_range("friction", f, (0.0..=1.0).contains(&f), "a value in [0, 1]")?;
        let m = self.max_force;
        check_range("maxForce", m, m > 0.0 && m.is_finite(), "a positive number")?;
        for (name, value) in [
            ("nodeSeparation", self.node_separation),
            ("clusterSeparation", self.cluster_separation),
            ("displacementThreshold", self.displacement_threshold),
            ("idealEdgeLength.length", self.ideal_edge_length.length),
            ("idealEdgeLength.separation", self.ideal_edge_length.separation),
        ] {
            check_range(
                name,
                value,
                value >= 0.0 && value.is_finite(),
                "a non-negative number",
            )?;
        }
        let n = self.minor_iterations;
        check_range("minorIterations", n as f64, n > 0, "at least 1")?;
        let b = self.multipole_bucket_size;
        check_range("multipoleBucketSize", b as f64, b > 0, "at least 1")?;
        let p = self.multipole_precision;
        check_range(
            "multipolePrecision",
            p as f64,
            (1..=32).contains(&p),
            "a value in 1..=32",
        )?;
        let t = self.overlap_removal.gap_tolerance;
        check_range(
            "overlapRemoval.gapTolerance",
            t,
            t > 0.0 && t.is_finite(),
            "a positive number",
        )?;
        check_range(
            "maxConstraintLevel",
            self.max_constraint_level as f64,
            self.max_constraint_level >= self.min_constraint_level,
            "at least minConstraintLevel",
        )
    }
}
