//! Per-step solver statistics.

/// Statistics from the last [`crate::Solver::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    /// Steps taken since creation.
    pub steps: u64,
    /// Substeps in the last step.
    pub substeps: u32,
    /// Substep length of the last step.
    pub substep_dt: f64,
    /// Contacts generated for the last step.
    pub contacts: usize,
    /// Kinetic energy after the step.
    pub kinetic_energy: f64,
    /// Largest constraint error seen during the last iteration of each phase.
    pub max_error: f64,
    /// Active particles.
    pub active_particles: usize,
    /// Particles put to sleep at the end of the step.
    pub sleeping: usize,
}
