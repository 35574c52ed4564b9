//! Position and orientation corrections.
//!
//! Constraints never write particle state directly. Each projection returns
//! a [`Correction`]; the solver gathers them into a [`CorrectionBuffer`] and
//! applies the sum, divided by the number of contributions per particle and
//! scaled by the successive over-relaxation factor.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use smallvec::SmallVec;
use strand_types::ParticleArrays;

/// Deltas produced by projecting one constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correction {
    /// Position deltas per particle.
    pub positions: SmallVec<[(usize, Vector3<f64>); 4]>,
    /// Additive orientation deltas per particle.
    pub orientations: SmallVec<[(usize, Quaternion<f64>); 2]>,
    /// Magnitude of the constraint violation before projection.
    pub error: f64,
}

impl Correction {
    /// An empty correction carrying only an error value.
    #[must_use]
    pub fn with_error(error: f64) -> Self {
        Self {
            error,
            ..Self::default()
        }
    }

    /// Add a position delta.
    pub fn push_position(&mut self, particle: usize, delta: Vector3<f64>) {
        self.positions.push((particle, delta));
    }

    /// Add an orientation delta.
    pub fn push_orientation(&mut self, particle: usize, delta: Quaternion<f64>) {
        self.orientations.push((particle, delta));
    }

    /// Whether the correction moves nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.orientations.is_empty()
    }
}

/// Per-particle accumulation of corrections.
#[derive(Debug, Clone, Default)]
pub struct CorrectionBuffer {
    position_deltas: Vec<Vector3<f64>>,
    position_counts: Vec<u32>,
    orientation_deltas: Vec<Quaternion<f64>>,
    orientation_counts: Vec<u32>,
    touched: Vec<usize>,
    max_error: f64,
}

impl CorrectionBuffer {
    /// Buffer for `len` particles.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut buffer = Self::default();
        buffer.resize(len);
        buffer
    }

    /// Resize to `len` particles, discarding pending deltas.
    pub fn resize(&mut self, len: usize) {
        self.position_deltas.clear();
        self.position_deltas.resize(len, Vector3::zeros());
        self.position_counts.clear();
        self.position_counts.resize(len, 0);
        self.orientation_deltas.clear();
        self.orientation_deltas.resize(len, Quaternion::new(0.0, 0.0, 0.0, 0.0));
        self.orientation_counts.clear();
        self.orientation_counts.resize(len, 0);
        self.touched.clear();
    }

    /// Number of particle slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.position_deltas.len()
    }

    /// Whether the buffer has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position_deltas.is_empty()
    }

    /// Whether no delta is pending.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.touched.is_empty()
    }

    /// Largest constraint error seen since the last [`Self::take_max_error`].
    #[must_use]
    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    /// Return and reset the largest recorded error.
    pub fn take_max_error(&mut self) -> f64 {
        std::mem::take(&mut self.max_error)
    }

    /// Record an error without any delta.
    pub fn record_error(&mut self, error: f64) {
        self.max_error = self.max_error.max(error);
    }

    fn touch(&mut self, particle: usize) {
        if self.position_counts[particle] == 0 && self.orientation_counts[particle] == 0 {
            self.touched.push(particle);
        }
    }

    /// Add a single position delta. Out-of-range particles are ignored.
    pub fn add_position(&mut self, particle: usize, delta: &Vector3<f64>) {
        if particle >= self.len() {
            return;
        }
        self.touch(particle);
        self.position_deltas[particle] += delta;
        self.position_counts[particle] += 1;
    }

    /// Add a single orientation delta. Out-of-range particles are ignored.
    pub fn add_orientation(&mut self, particle: usize, delta: &Quaternion<f64>) {
        if particle >= self.len() {
            return;
        }
        self.touch(particle);
        self.orientation_deltas[particle] += delta;
        self.orientation_counts[particle] += 1;
    }

    /// Add every delta of a correction.
    pub fn accumulate(&mut self, correction: &Correction) {
        self.record_error(correction.error);
        for (particle, delta) in &correction.positions {
            self.add_position(*particle, delta);
        }
        for (particle, delta) in &correction.orientations {
            self.add_orientation(*particle, delta);
        }
    }

    /// Apply pending deltas and clear them.
    ///
    /// Each particle moves by `sor_factor * sum / count`. Orientations are
    /// renormalized after the update.
    pub fn apply(&mut self, particles: &mut ParticleArrays, sor_factor: f64) {
        for &i in &self.touched {
            if i >= particles.len() {
                continue;
            }
            let count = self.position_counts[i];
            if count > 0 {
                particles.positions[i] += self.position_deltas[i] * (sor_factor / f64::from(count));
            }
            let count = self.orientation_counts[i];
            if count > 0 {
                let q = particles.orientations[i].into_inner()
                    + self.orientation_deltas[i] * (sor_factor / f64::from(count));
                if q.norm_squared() > 0.0 {
                    particles.orientations[i] = UnitQuaternion::from_quaternion(q);
                }
            }
            self.position_deltas[i] = Vector3::zeros();
            self.position_counts[i] = 0;
            self.orientation_deltas[i] = Quaternion::new(0.0, 0.0, 0.0, 0.0);
            self.orientation_counts[i] = 0;
        }
        self.touched.clear();
    }

    /// Drop pending deltas without applying them.
    pub fn discard(&mut self) {
        for &i in &self.touched {
            self.position_deltas[i] = Vector3::zeros();
            self.position_counts[i] = 0;
            self.orientation_deltas[i] = Quaternion::new(0.0, 0.0, 0.0, 0.0);
            self.orientation_counts[i] = 0;
        }
        self.touched.clear();
    }
}
