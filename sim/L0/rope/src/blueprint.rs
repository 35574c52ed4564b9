//! Rope and rod blueprints.
//!
//! A blueprint samples a [`Path`] into particles and builds the rest state
//! an actor is instantiated from: particles, structural elements, collision
//! simplices and colored constraints.
//!
//! # Sampling
//!
//! Each span gets `1 + floor(span_length / thickness · resolution)`
//! particles, evenly spaced by arc length. Open paths add one particle at
//! the start; on closed paths the last particle of the last span sits on
//! the first control point.
//!
//! Construction reports [`Progress`] to a callback every
//! [`PARTICLE_CHUNK`] particles and every [`CONSTRAINT_CHUNK`]
//! constraints. Returning [`ControlFlow::Break`] aborts with
//! [`RopeError::Cancelled`].

use std::borrow::Cow;
use std::ops::ControlFlow;

use nalgebra::{Point3, Quaternion, UnitQuaternion};
use strand_constraint::{
    Batch, BendConstraint, BendTwistConstraint, ChainConstraint, DistanceConstraint, ProjectConstraint,
    StretchShearConstraint, bend_vector, color_path, into_batches, rope_bend_triples,
};
use strand_types::math::{look_rotation, rest_darboux};
use strand_types::{Particle, Simplex};
use tracing::{debug, error, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::element::StructuralElement;
use crate::error::{Result, RopeError};
use crate::path::Path;

/// Particles generated between progress reports.
pub const PARTICLE_CHUNK: usize = 100;

/// Constraints generated between progress reports.
pub const CONSTRAINT_CHUNK: usize = 500;

/// Blueprint construction progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// What is being generated.
    pub stage: &'static str,
    /// Completed fraction of the stage, in `[0, 1]`.
    pub fraction: f64,
}

/// Sampling settings shared by rope and rod blueprints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlueprintSettings {
    /// Particle radius before the per-point thickness multiplier.
    pub thickness: f64,
    /// Particles per thickness of path length.
    pub resolution: f64,
    /// Spare particles reserved for tearing.
    pub pooled_particles: usize,
    /// Whether rods rest at their initial shape instead of straight.
    pub keep_initial_shape: bool,
}

impl Default for BlueprintSettings {
    fn default() -> Self {
        Self {
            thickness: 0.1,
            resolution: 1.0,
            pooled_particles: 100,
            keep_initial_shape: true,
        }
    }
}

impl BlueprintSettings {
    /// Settings with a given thickness and resolution.
    #[must_use]
    pub fn new(thickness: f64, resolution: f64) -> Self {
        Self {
            thickness,
            resolution,
            ..Self::default()
        }
    }

    /// Set the pool size.
    #[must_use]
    pub const fn with_pool(mut self, pooled_particles: usize) -> Self {
        self.pooled_particles = pooled_particles;
        self
    }

    /// Make rods rest straight.
    #[must_use]
    pub const fn straight_rest_shape(mut self) -> Self {
        self.keep_initial_shape = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.thickness.is_finite() && self.thickness > 0.0) {
            return Err(RopeError::invalid(format!("thickness must be positive, got {}", self.thickness)));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(RopeError::invalid(format!("resolution must be positive, got {}", self.resolution)));
        }
        Ok(())
    }
}

/// Constraints with a precomputed batch coloring.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColoredConstraints<C> {
    /// Constraints in actor-local indices.
    pub constraints: Vec<C>,
    /// Batch index of each constraint.
    pub colors: Vec<usize>,
}

impl<C: ProjectConstraint> ColoredConstraints<C> {
    /// Color `open` greedily and give each `closing` constraint its own batch.
    fn path(open: Vec<C>, closing: Vec<C>) -> Result<Self> {
        let open_sets: Vec<_> = open.iter().map(ProjectConstraint::particles).collect();
        let closing_sets: Vec<_> = closing.iter().map(ProjectConstraint::particles).collect();
        let colors = color_path(&open_sets, &closing_sets)?;
        let mut constraints = open;
        constraints.extend(closing);
        Ok(Self { constraints, colors })
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether there are no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Split into batches after applying `configure` to every constraint.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::Constraint`] if the coloring is inconsistent.
    pub fn batches(&self, configure: impl Fn(C) -> C) -> Result<Vec<Batch<C>>>
    where
        C: Clone,
    {
        let constraints = self.constraints.iter().cloned().map(configure).collect();
        Ok(into_batches(constraints, &self.colors)?)
    }
}

fn report(progress: &mut impl FnMut(Progress) -> ControlFlow<()>, stage: &'static str, done: usize, total: usize) -> Result<()> {
    let fraction = if total > 0 { done as f64 / total as f64 } else { 1.0 };
    match progress(Progress { stage, fraction }) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => {
            debug!(stage, fraction, "blueprint construction cancelled");
            Err(RopeError::Cancelled)
        }
    }
}

fn usable_path(path: &Path) -> Cow<'_, Path> {
    if path.control_point_count() < 2 {
        warn!(
            control_points = path.control_point_count(),
            "path needs at least two control points, using the default segment"
        );
        Cow::Owned(Path::default_segment())
    } else {
        Cow::Borrowed(path)
    }
}

/// Path parameters of the particles, plus the particle sitting on each
/// control point.
fn sample_path(
    path: &Path,
    settings: &BlueprintSettings,
    progress: &mut impl FnMut(Progress) -> ControlFlow<()>,
) -> Result<(Vec<f64>, Vec<usize>)> {
    let mut mus = Vec::new();
    let mut groups = Vec::with_capacity(path.control_point_count());
    if !path.is_closed() {
        mus.push(0.0);
        groups.push(0);
    }

    let spans = path.span_count();
    for span in 0..spans {
        let start = path.span_start_length(span);
        let length = path.span_length(span);
        let count = 1 + (length / settings.thickness * settings.resolution).floor() as usize;
        let spacing = length / count as f64;
        mus.extend((1..=count).map(|j| path.mu_at_length(start + spacing * j as f64)));
        groups.push(mus.len() - 1);

        if span % PARTICLE_CHUNK == 0 {
            report(progress, "generating particles", span, spans)?;
        }
    }
    if path.is_closed() {
        // The last particle lies on the first control point.
        groups.rotate_right(1);
        groups.truncate(path.control_point_count());
    }
    Ok((mus, groups))
}

fn sample_particle(path: &Path, settings: &BlueprintSettings, mu: f64) -> Particle {
    Particle::new(path.position_at_mu(mu), path.mass_at_mu(mu))
        .with_radius(path.thickness_at_mu(mu) * settings.thickness)
        .with_filter(path.filter_at_mu(mu))
        .with_color(path.color_at_mu(mu))
}

/// Consecutive elements, closing back to particle 0 for closed paths.
fn path_elements(positions: &[Point3<f64>], closed: bool) -> Vec<StructuralElement> {
    let n = positions.len();
    let mut elements: Vec<_> = (0..n.saturating_sub(1))
        .map(|i| StructuralElement::new(i, i + 1, (positions[i + 1] - positions[i]).norm()))
        .collect();
    if closed && n > 2 {
        elements.push(StructuralElement::new(n - 1, 0, (positions[0] - positions[n - 1]).norm()));
    }
    elements
}

fn edge_simplices(elements: &[StructuralElement]) -> Vec<Simplex> {
    elements
        .iter()
        .map(|e| Simplex::from_slice(&[e.particle1, e.particle2]))
        .collect()
}

/// Rest state of a rope.
#[derive(Debug, Clone)]
pub struct RopeBlueprint {
    particles: Vec<Particle>,
    pooled_particles: usize,
    closed: bool,
    elements: Vec<StructuralElement>,
    simplices: Vec<Simplex>,
    distances: ColoredConstraints<DistanceConstraint>,
    bends: ColoredConstraints<BendConstraint>,
    control_point_particles: Vec<usize>,
    thickness: f64,
}

impl RopeBlueprint {
    /// Build a rope blueprint without progress reporting.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub fn new(path: &Path, settings: &BlueprintSettings) -> Result<Self> {
        Self::build(path, settings, |_| ControlFlow::Continue(()))
    }

    /// Build a rope blueprint from a path.
    ///
    /// Paths with fewer than two control points are replaced by
    /// [`Path::default_segment`].
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::InvalidParameter`] for non-positive thickness
    /// or resolution and [`RopeError::Cancelled`] if `progress` breaks.
    pub fn build(
        path: &Path,
        settings: &BlueprintSettings,
        mut progress: impl FnMut(Progress) -> ControlFlow<()>,
    ) -> Result<Self> {
        settings
            .validate()
            .inspect_err(|e| error!(%e, "invalid rope blueprint settings"))?;
        let path = usable_path(path);
        let closed = path.is_closed();

        let (mus, control_point_particles) = sample_path(&path, settings, &mut progress)?;
        let mut particles = Vec::with_capacity(mus.len());
        for (i, &mu) in mus.iter().enumerate() {
            particles.push(sample_particle(&path, settings, mu));
            if i % PARTICLE_CHUNK == 0 {
                report(&mut progress, "generating particles", i, mus.len())?;
            }
        }
        let positions: Vec<_> = particles.iter().map(|p| p.position).collect();

        let elements = path_elements(&positions, closed);
        let mut open = Vec::with_capacity(elements.len());
        let mut closing = Vec::new();
        for (i, e) in elements.iter().enumerate() {
            let constraint = DistanceConstraint::new([e.particle1, e.particle2], e.rest_length);
            if closed && i + 1 == elements.len() {
                closing.push(constraint);
            } else {
                open.push(constraint);
            }
            if i % CONSTRAINT_CHUNK == 0 {
                report(&mut progress, "generating structural constraints", i, elements.len())?;
            }
        }
        let distances = ColoredConstraints::path(open, closing)?;

        let n = positions.len();
        let rest_bend = |[a, b, c]: [usize; 3]| bend_vector(&positions[a], &positions[b], &positions[c]).norm();
        let triples = rope_bend_triples(n, closed);
        let open_count = n.saturating_sub(2);
        let mut open = Vec::with_capacity(open_count);
        let mut closing = Vec::new();
        for (i, &triple) in triples.iter().enumerate() {
            let constraint = BendConstraint::new(triple, rest_bend(triple));
            if i < open_count {
                open.push(constraint);
            } else {
                closing.push(constraint);
            }
            if i % CONSTRAINT_CHUNK == 0 {
                report(&mut progress, "generating bending constraints", i, triples.len())?;
            }
        }
        let bends = ColoredConstraints::path(open, closing)?;

        debug!(
            particles = particles.len(),
            elements = elements.len(),
            closed,
            "rope blueprint built"
        );
        Ok(Self {
            simplices: edge_simplices(&elements),
            particles,
            pooled_particles: settings.pooled_particles,
            closed,
            elements,
            distances,
            bends,
            control_point_particles,
            thickness: settings.thickness,
        })
    }

    /// Active particles, in rest state.
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Spare particles reserved for tearing.
    #[must_use]
    pub const fn pooled_particles(&self) -> usize {
        self.pooled_particles
    }

    /// Whether the rope is a loop.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Structural elements in local indices.
    #[must_use]
    pub fn elements(&self) -> &[StructuralElement] {
        &self.elements
    }

    /// Edge collision simplices.
    #[must_use]
    pub fn simplices(&self) -> &[Simplex] {
        &self.simplices
    }

    /// Distance constraints.
    #[must_use]
    pub const fn distance_constraints(&self) -> &ColoredConstraints<DistanceConstraint> {
        &self.distances
    }

    /// Bend constraints.
    #[must_use]
    pub const fn bend_constraints(&self) -> &ColoredConstraints<BendConstraint> {
        &self.bends
    }

    /// Index of the particle generated at each control point.
    #[must_use]
    pub fn control_point_particles(&self) -> &[usize] {
        &self.control_point_particles
    }

    /// Base particle radius.
    #[must_use]
    pub const fn thickness(&self) -> f64 {
        self.thickness
    }

    /// Sum of element rest lengths.
    #[must_use]
    pub fn rest_length(&self) -> f64 {
        self.elements.iter().map(|e| e.rest_length).sum()
    }

    /// Average element rest length.
    #[must_use]
    pub fn interparticle_distance(&self) -> f64 {
        if self.elements.is_empty() {
            0.0
        } else {
            self.rest_length() / self.elements.len() as f64
        }
    }
}

/// Rest state of a rod.
#[derive(Debug, Clone)]
pub struct RodBlueprint {
    particles: Vec<Particle>,
    closed: bool,
    elements: Vec<StructuralElement>,
    simplices: Vec<Simplex>,
    stretch_shear: ColoredConstraints<StretchShearConstraint>,
    bend_twist: ColoredConstraints<BendTwistConstraint>,
    chain: Option<ChainConstraint>,
    control_point_particles: Vec<usize>,
    thickness: f64,
}

impl RodBlueprint {
    /// Build a rod blueprint without progress reporting.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    pub fn new(path: &Path, settings: &BlueprintSettings) -> Result<Self> {
        Self::build(path, settings, |_| ControlFlow::Continue(()))
    }

    /// Build a rod blueprint from a path.
    ///
    /// Particle orientations look down the next segment with the path
    /// normal as up vector. Bend/twist rests at the initial relative
    /// rotations, or at the identity when
    /// [`BlueprintSettings::keep_initial_shape`] is off.
    ///
    /// # Errors
    ///
    /// Returns [`RopeError::InvalidParameter`] for non-positive thickness
    /// or resolution and [`RopeError::Cancelled`] if `progress` breaks.
    pub fn build(
        path: &Path,
        settings: &BlueprintSettings,
        mut progress: impl FnMut(Progress) -> ControlFlow<()>,
    ) -> Result<Self> {
        settings
            .validate()
            .inspect_err(|e| error!(%e, "invalid rod blueprint settings"))?;
        let path = usable_path(path);
        let closed = path.is_closed();

        let (mus, control_point_particles) = sample_path(&path, settings, &mut progress)?;
        let positions: Vec<_> = mus.iter().map(|&mu| path.position_at_mu(mu)).collect();
        let n = positions.len();

        let mut orientations: Vec<UnitQuaternion<f64>> = Vec::with_capacity(n);
        let mut particles = Vec::with_capacity(n);
        for (i, &mu) in mus.iter().enumerate() {
            let next = if i + 1 < n {
                Some(i + 1)
            } else if closed && n > 1 {
                Some(0)
            } else {
                None
            };
            let q = match next {
                Some(j) => look_rotation(&(positions[j] - positions[i]), &path.normal_at_mu(mu)),
                None => orientations.last().copied().unwrap_or_else(UnitQuaternion::identity),
            };
            orientations.push(q);
            particles.push(sample_particle(&path, settings, mu).with_orientation(q, path.rotational_mass_at_mu(mu)));
            if i % PARTICLE_CHUNK == 0 {
                report(&mut progress, "generating particles", i, n)?;
            }
        }

        let elements = path_elements(&positions, closed);
        let mut open = Vec::with_capacity(elements.len());
        let mut closing = Vec::new();
        for (i, e) in elements.iter().enumerate() {
            let constraint = StretchShearConstraint::new([e.particle1, e.particle2], e.rest_length);
            if closed && i + 1 == elements.len() {
                closing.push(constraint);
            } else {
                open.push(constraint);
            }
            if i % CONSTRAINT_CHUNK == 0 {
                report(&mut progress, "generating structural constraints", i, elements.len())?;
            }
        }
        let stretch_shear = ColoredConstraints::path(open, closing)?;

        let darboux = |a: usize, b: usize| {
            if settings.keep_initial_shape {
                rest_darboux(&orientations[a], &orientations[b])
            } else {
                Quaternion::identity()
            }
        };
        let mut open = Vec::with_capacity(elements.len());
        let mut closing = Vec::new();
        for (i, e) in elements.iter().enumerate() {
            let constraint = BendTwistConstraint::new([e.particle1, e.particle2], darboux(e.particle1, e.particle2));
            if closed && i + 1 == elements.len() {
                closing.push(constraint);
            } else {
                open.push(constraint);
            }
            if i % CONSTRAINT_CHUNK == 0 {
                report(&mut progress, "generating bend-twist constraints", i, elements.len())?;
            }
        }
        let bend_twist = ColoredConstraints::path(open, closing)?;

        let chain = if elements.is_empty() {
            None
        } else {
            let mut indices: Vec<usize> = (0..n).collect();
            if closed && n > 2 {
                indices.push(0);
            }
            let rest_lengths = elements.iter().map(|e| e.rest_length).collect();
            Some(ChainConstraint::new(indices, rest_lengths, 1.0)?)
        };

        debug!(
            particles = particles.len(),
            elements = elements.len(),
            closed,
            "rod blueprint built"
        );
        Ok(Self {
            simplices: edge_simplices(&elements),
            particles,
            closed,
            elements,
            stretch_shear,
            bend_twist,
            chain,
            control_point_particles,
            thickness: settings.thickness,
        })
    }

    /// Particles, in rest state.
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Whether the rod is a loop.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Structural elements in local indices.
    #[must_use]
    pub fn elements(&self) -> &[StructuralElement] {
        &self.elements
    }

    /// Edge collision simplices.
    #[must_use]
    pub fn simplices(&self) -> &[Simplex] {
        &self.simplices
    }

    /// Stretch-shear constraints.
    #[must_use]
    pub const fn stretch_shear_constraints(&self) -> &ColoredConstraints<StretchShearConstraint> {
        &self.stretch_shear
    }

    /// Bend-twist constraints.
    #[must_use]
    pub const fn bend_twist_constraints(&self) -> &ColoredConstraints<BendTwistConstraint> {
        &self.bend_twist
    }

    /// Chain over every particle, if the rod has any element.
    #[must_use]
    pub const fn chain_constraint(&self) -> Option<&ChainConstraint> {
        self.chain.as_ref()
    }

    /// Index of the particle generated at each control point.
    #[must_use]
    pub fn control_point_particles(&self) -> &[usize] {
        &self.control_point_particles
    }

    /// Base particle radius.
    #[must_use]
    pub const fn thickness(&self) -> f64 {
        self.thickness
    }

    /// Sum of element rest lengths.
    #[must_use]
    pub fn rest_length(&self) -> f64 {
        self.elements.iter().map(|e| e.rest_length).sum()
    }
}
