//! Configuration types for the particle solver.
//!
//! [`SolverConfig`] controls the fixed-step integration loop: gravity,
//! substeps, damping, sleeping and collision tolerances. Every constraint
//! family gets its own [`ConstraintParameters`] (iterations, evaluation
//! order, SOR factor), indexed by [`ConstraintKind`].

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::StrandError;

/// Constraint families, listed in the order the solver processes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintKind {
    /// Rope segment length.
    Distance,
    /// Rope three-particle bending.
    Bending,
    /// Particle-collider penetration.
    Collision,
    /// Particle-collider friction.
    Friction,
    /// Rod stretch and shear.
    StretchShear,
    /// Rod bend and twist.
    BendTwist,
    /// Inextensible chain limiter.
    Chain,
    /// Stitches between actors.
    Stitch,
    /// Attachments to colliders.
    Pin,
}

impl ConstraintKind {
    /// Number of constraint kinds.
    pub const COUNT: usize = 9;

    /// Every kind, in solve order.
    pub const ORDER: [Self; Self::COUNT] = [
        Self::Distance,
        Self::Bending,
        Self::Collision,
        Self::Friction,
        Self::StretchShear,
        Self::BendTwist,
        Self::Chain,
        Self::Stitch,
        Self::Pin,
    ];

    /// Position of this kind in [`ORDER`](Self::ORDER).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Bending => "bending",
            Self::Collision => "collision",
            Self::Friction => "friction",
            Self::StretchShear => "stretch-shear",
            Self::BendTwist => "bend-twist",
            Self::Chain => "chain",
            Self::Stitch => "stitch",
            Self::Pin => "pin",
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the batches of one constraint kind are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EvaluationOrder {
    /// Gauss-Seidel: each batch is applied before the next one is evaluated.
    #[default]
    Sequential,
    /// Jacobi: every batch is evaluated against the same positions, then the
    /// averaged corrections are applied once, scaled by the SOR factor.
    Parallel,
}

/// Execution backend, chosen once when a solver is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolverBackend {
    /// Single-threaded kernels.
    #[default]
    Serial,
    /// Constraints inside a batch and simplices in contact generation are
    /// processed on the rayon thread pool.
    Parallel,
}

/// Per-kind solver parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintParameters {
    /// Whether the phase runs at all.
    pub enabled: bool,
    /// Batch combination strategy.
    pub evaluation_order: EvaluationOrder,
    /// Iterations per substep.
    pub iterations: u32,
    /// Successive over-relaxation factor applied to averaged corrections.
    pub sor_factor: f64,
}

impl Default for ConstraintParameters {
    fn default() -> Self {
        Self::sequential(4)
    }
}

impl ConstraintParameters {
    /// Gauss-Seidel parameters with the given iteration count.
    #[must_use]
    pub const fn sequential(iterations: u32) -> Self {
        Self {
            enabled: true,
            evaluation_order: EvaluationOrder::Sequential,
            iterations,
            sor_factor: 1.0,
        }
    }

    /// Jacobi parameters with the given iteration count and SOR factor.
    #[must_use]
    pub const fn parallel(iterations: u32, sor_factor: f64) -> Self {
        Self {
            enabled: true,
            evaluation_order: EvaluationOrder::Parallel,
            iterations,
            sor_factor,
        }
    }

    /// A disabled phase.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::sequential(0)
        }
    }

    /// Whether the phase does any work.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.iterations > 0
    }
}

/// Configuration for the particle solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Gravity acceleration in solver space (m/s²).
    pub gravity: Vector3<f64>,
    /// Substeps per step. Lambdas are reset every substep.
    pub substeps: u32,
    /// Fraction of velocity lost per second.
    pub damping: f64,
    /// Linear speed clamp. `f64::INFINITY` disables it.
    pub max_velocity: f64,
    /// Angular speed clamp. `f64::INFINITY` disables it.
    pub max_angular_velocity: f64,
    /// Kinetic energy per unit mass below which a particle is put to sleep.
    /// Zero disables sleeping.
    pub sleep_threshold: f64,
    /// Extra distance at which contacts are generated ahead of time.
    pub collision_margin: f64,
    /// Maximum depenetration speed (m/s) used to resolve initial overlaps.
    pub max_depenetration: f64,
    /// Fraction of the step's motion used to expand simplex bounds (0..1).
    pub continuous_collision_detection: f64,
    /// Iterations of the local simplex optimization.
    pub surface_collision_iterations: u32,
    /// Convergence tolerance of the local simplex optimization.
    pub surface_collision_tolerance: f64,
    /// Ambient air velocity used for aerodynamic drag.
    pub wind: Vector3<f64>,
    /// Drag coefficient applied to the velocity relative to `wind`.
    pub drag: f64,
    /// Kernel backend.
    pub backend: SolverBackend,
    /// Per-kind parameters, indexed by [`ConstraintKind::index`].
    pub constraints: [ConstraintParameters; ConstraintKind::COUNT],
}

impl Default for SolverConfig {
    fn default() -> Self {
        let mut constraints = [ConstraintParameters::sequential(4); ConstraintKind::COUNT];
        constraints[ConstraintKind::Collision.index()] = ConstraintParameters::sequential(1);
        constraints[ConstraintKind::Friction.index()] = ConstraintParameters::sequential(1);
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            substeps: 1,
            damping: 0.0,
            max_velocity: f64::INFINITY,
            max_angular_velocity: f64::INFINITY,
            sleep_threshold: 0.0005,
            collision_margin: 0.02,
            max_depenetration: 10.0,
            continuous_collision_detection: 1.0,
            surface_collision_iterations: 8,
            surface_collision_tolerance: 0.005,
            wind: Vector3::zeros(),
            drag: 0.0,
            backend: SolverBackend::Serial,
            constraints,
        }
    }
}

impl SolverConfig {
    /// Configuration tuned for interactive frame rates.
    #[must_use]
    pub fn realtime() -> Self {
        let mut config = Self {
            sleep_threshold: 0.001,
            backend: SolverBackend::Parallel,
            ..Default::default()
        };
        config.set_iterations_all(2);
        config
    }

    /// Configuration tuned for accuracy over speed.
    #[must_use]
    pub fn accurate() -> Self {
        let mut config = Self {
            substeps: 4,
            sleep_threshold: 0.0,
            surface_collision_iterations: 16,
            surface_collision_tolerance: 0.001,
            ..Default::default()
        };
        config.set_iterations_all(10);
        config
    }

    /// Set the gravity vector.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Vector3::zeros();
        self
    }

    /// Set the substep count.
    #[must_use]
    pub fn with_substeps(mut self, substeps: u32) -> Self {
        self.substeps = substeps;
        self
    }

    /// Set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Disable sleeping.
    #[must_use]
    pub fn no_sleeping(mut self) -> Self {
        self.sleep_threshold = 0.0;
        self
    }

    /// Replace the parameters of one kind.
    #[must_use]
    pub fn with_parameters(mut self, kind: ConstraintKind, parameters: ConstraintParameters) -> Self {
        self.constraints[kind.index()] = parameters;
        self
    }

    /// Set the iteration count of one kind.
    #[must_use]
    pub fn with_iterations(mut self, kind: ConstraintKind, iterations: u32) -> Self {
        self.constraints[kind.index()].iterations = iterations;
        self
    }

    /// Parameters of one kind.
    #[must_use]
    pub fn parameters(&self, kind: ConstraintKind) -> &ConstraintParameters {
        &self.constraints[kind.index()]
    }

    /// Set the iteration count of every non-contact kind.
    pub fn set_iterations_all(&mut self, iterations: u32) {
        for kind in ConstraintKind::ORDER {
            if !matches!(kind, ConstraintKind::Collision | ConstraintKind::Friction) {
                self.constraints[kind.index()].iterations = iterations;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StrandError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.substeps == 0 {
            return Err(StrandError::invalid_config("substeps must be at least 1"));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(StrandError::invalid_config("gravity must be finite"));
        }
        if self.damping < 0.0 || !self.damping.is_finite() {
            return Err(StrandError::invalid_config(
                "damping must be finite and non-negative",
            ));
        }
        if self.sleep_threshold < 0.0 {
            return Err(StrandError::invalid_config(
                "sleep_threshold cannot be negative",
            ));
        }
        if self.collision_margin < 0.0 || self.max_depenetration < 0.0 {
            return Err(StrandError::invalid_config(
                "collision_margin and max_depenetration cannot be negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.continuous_collision_detection) {
            return Err(StrandError::invalid_config(
                "continuous_collision_detection must lie in [0, 1]",
            ));
        }
        if self.max_velocity <= 0.0 || self.max_angular_velocity <= 0.0 {
            return Err(StrandError::invalid_config(
                "velocity clamps must be positive",
            ));
        }
        for kind in ConstraintKind::ORDER {
            let sor = self.parameters(kind).sor_factor;
            if !(sor > 0.0 && sor <= 2.0) {
                return Err(StrandError::invalid_config(format!(
                    "{kind} SOR factor {sor} outside (0, 2]"
                )));
            }
        }
        Ok(())
    }
}
