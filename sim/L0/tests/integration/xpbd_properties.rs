//! XPBD properties: compliance scaling, mass weighting, batch disjointness
//! and stitch convergence.

use approx::assert_relative_eq;
use nalgebra::Point3;
use proptest::prelude::*;
use strand_constraint::{
    Batch, ConstraintBatch, DistanceConstraint, ProjectConstraint, color_constraints, partition,
};
use strand_rope::{BlueprintSettings, Path, RopeActor, RopeBlueprint, RopeMaterial, Stitcher};
use strand_solver::{ActorId, Solver};
use strand_types::{Particle, SolverConfig};

const DT: f64 = 1.0 / 60.0;

fn weightless() -> SolverConfig {
    SolverConfig::default().zero_gravity().no_sleeping()
}

/// Two particles two units apart joined by a unit-length constraint.
fn stretched_pair(solver: &mut Solver, mass_a: f64, mass_b: f64, compliance: f64) -> ActorId {
    let actor = solver
        .add_actor(
            &[
                Particle::new(Point3::origin(), mass_a),
                Particle::new(Point3::new(2.0, 0.0, 0.0), mass_b),
            ],
            0,
        )
        .unwrap();
    let constraint = DistanceConstraint::new([0, 1], 1.0).with_compliance(compliance);
    let batch: ConstraintBatch = Batch::from_constraints([constraint]).unwrap().into();
    solver.add_batches(actor, vec![batch]).unwrap();
    actor
}

fn separation(solver: &Solver, actor: ActorId) -> f64 {
    let a = solver.actor_particle(actor, 0).unwrap().position;
    let b = solver.actor_particle(actor, 1).unwrap().position;
    (b - a).norm()
}

// ============================================================================
// Compliance
// ============================================================================

#[test]
fn test_zero_compliance_reaches_rest() {
    let mut solver = Solver::new(weightless()).unwrap();
    let actor = stretched_pair(&mut solver, 1.0, 0.0, 0.0);
    solver.step(DT).unwrap();
    assert_relative_eq!(separation(&solver, actor), 1.0, epsilon = 1e-9);
}

#[test]
fn test_huge_compliance_leaves_prediction() {
    let mut solver = Solver::new(weightless()).unwrap();
    let actor = stretched_pair(&mut solver, 1.0, 0.0, 1e12);
    solver.step(DT).unwrap();
    assert_relative_eq!(separation(&solver, actor), 2.0, epsilon = 1e-6);
}

#[test]
fn test_compliance_is_monotonic() {
    let separations: Vec<f64> = [0.0, 1e-4, 1e-2, 1.0]
        .iter()
        .map(|&compliance| {
            let mut solver = Solver::new(weightless()).unwrap();
            let actor = stretched_pair(&mut solver, 1.0, 0.0, compliance);
            solver.step(DT).unwrap();
            separation(&solver, actor)
        })
        .collect();
    assert!(separations.windows(2).all(|w| w[0] <= w[1] + 1e-12), "{separations:?}");
}

// ============================================================================
// Mass weighting
// ============================================================================

#[test]
fn test_lighter_particle_moves_twice_as_far() {
    let mut solver = Solver::new(weightless()).unwrap();
    let actor = stretched_pair(&mut solver, 1.0, 2.0, 0.0);
    solver.step(DT).unwrap();

    let a = solver.actor_particle(actor, 0).unwrap().position;
    let b = solver.actor_particle(actor, 1).unwrap().position;
    let moved_a = (a - Point3::origin()).norm();
    let moved_b = (b - Point3::new(2.0, 0.0, 0.0)).norm();
    assert_relative_eq!(moved_a, 2.0 * moved_b, epsilon = 1e-9);
    assert_relative_eq!(moved_a + moved_b, 1.0, epsilon = 1e-9);
}

// ============================================================================
// Batch disjointness
// ============================================================================

proptest! {
    #[test]
    fn prop_partitioned_batches_are_disjoint(
        edges in prop::collection::vec((0usize..40, 0usize..40), 1..120)
    ) {
        let constraints: Vec<DistanceConstraint> = edges
            .iter()
            .filter(|(a, b)| a != b)
            .map(|&(a, b)| DistanceConstraint::new([a, b], 1.0))
            .collect();
        let total = constraints.len();
        let batches = partition(constraints).unwrap();

        prop_assert_eq!(batches.iter().map(|b| b.constraints().len()).sum::<usize>(), total);
        for batch in &batches {
            let mut seen = Vec::new();
            for constraint in batch.constraints() {
                for particle in constraint.particles() {
                    prop_assert!(!seen.contains(&particle), "particle {} shared within a batch", particle);
                    seen.push(particle);
                }
            }
        }
    }

    #[test]
    fn prop_coloring_respects_shared_particles(
        sets in prop::collection::vec(prop::collection::vec(0usize..25, 1..4), 1..50)
    ) {
        let colors = color_constraints(&sets).unwrap();
        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                if sets[i].iter().any(|p| sets[j].contains(p)) {
                    prop_assert_ne!(colors[i], colors[j]);
                }
            }
        }
    }
}

// ============================================================================
// Stitches
// ============================================================================

fn rope_at(y: f64) -> RopeActor {
    let path = Path::polyline(&[Point3::new(0.0, y, 0.0), Point3::new(1.05, y, 0.0)]);
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0).with_pool(0)).unwrap();
    RopeActor::new(blueprint, RopeMaterial::rope())
}

#[test]
fn test_stitch_pulls_ropes_together() {
    let mut solver = Solver::new(weightless()).unwrap();
    let (mut lower, mut upper) = (rope_at(0.0), rope_at(0.3));
    let a = lower.add_to_solver(&mut solver).unwrap();
    let b = upper.add_to_solver(&mut solver).unwrap();

    let mut stitcher = Stitcher::new();
    stitcher.add_stitch(11, 11);
    stitcher.add_to_solver(&mut solver, &lower, &upper).unwrap();

    for _ in 0..60 {
        solver.step(DT).unwrap();
    }
    let end_a = solver.actor_particle(a, 11).unwrap().position;
    let end_b = solver.actor_particle(b, 11).unwrap().position;
    assert!((end_a - end_b).norm() < 1e-3, "stitched ends {end_a} and {end_b}");

    // Removing the stitcher lets the ends drift apart freely again.
    stitcher.remove_from_solver(&mut solver).unwrap();
    assert!(stitcher.handle().is_none());
}
