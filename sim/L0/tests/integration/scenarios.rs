//! Reference scenarios: hanging rope, resting particle, closed chain.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use std::f64::consts::TAU;
use strand_collision::{Collider, Cuboid, Shape};
use strand_constraint::{Batch, ChainConstraint, ConstraintBatch, DistanceConstraint, partition};
use strand_rope::{Actor, BlueprintSettings, ControlPoint, Path, RopeActor, RopeBlueprint, RopeMaterial};
use strand_solver::Solver;
use strand_types::{Particle, Simplex, SolverConfig};

const DT: f64 = 1.0 / 60.0;

// ============================================================================
// Scenario A: hanging rope
// ============================================================================

/// Horizontal rope of 10 particles whose first control point has no mass.
fn hanging_rope() -> RopeActor {
    let path = Path::new(
        vec![
            ControlPoint::new(Point3::new(0.0, 2.0, 0.0)).with_mass(0.0),
            ControlPoint::new(Point3::new(0.85, 2.0, 0.0)),
        ],
        false,
    );
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0).with_pool(0)).unwrap();
    RopeActor::new(blueprint, RopeMaterial::rope())
}

#[test]
fn test_hanging_rope_keeps_length() {
    let mut solver = Solver::new(SolverConfig::accurate()).unwrap();
    let mut rope = hanging_rope();
    assert_eq!(rope.blueprint().particles().len(), 10);
    let id = rope.add_to_solver(&mut solver).unwrap();

    for _ in 0..120 {
        solver.step(DT).unwrap();
    }

    let rest = rope.rest_length();
    let length = rope.calculate_length(&solver).unwrap();
    assert!((length - rest).abs() <= 0.01 * rest, "length {length} vs rest {rest}");

    let first = solver.actor_particle(id, 0).unwrap();
    assert_relative_eq!(first.position, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
    assert_eq!(solver.stats().steps, 120);
}

/// Ten particles 0.1 apart along X, the first pinned, joined by rigid
/// distance constraints only. Returns the rope's length after `steps`
/// relative to its rest length.
fn rigid_chain_stretch(config: SolverConfig, steps: usize) -> f64 {
    let mut solver = Solver::new(config).unwrap();
    let particles: Vec<Particle> = (0..10)
        .map(|i| {
            let position = Point3::new(0.1 * f64::from(i), 2.0, 0.0);
            if i == 0 { Particle::pinned(position) } else { Particle::new(position, 1.0) }
        })
        .collect();
    let id = solver.add_actor(&particles, 0).unwrap();
    let edges: Vec<DistanceConstraint> = (0..9).map(|i| DistanceConstraint::new([i, i + 1], 0.1)).collect();
    let batches = partition(edges).unwrap().into_iter().map(ConstraintBatch::from).collect();
    solver.add_batches(id, batches).unwrap();

    for _ in 0..steps {
        solver.step(DT).unwrap();
    }
    let p = solver.particles();
    let indices = solver.solver_indices(id).unwrap();
    let length: f64 = indices.windows(2).map(|w| (p.positions[w[1]] - p.positions[w[0]]).norm()).sum();
    length / 0.9
}

fn literal_config(substeps: u32) -> SolverConfig {
    let mut config = SolverConfig::default()
        .with_gravity(Vector3::new(0.0, -9.8, 0.0))
        .with_substeps(substeps)
        .no_sleeping();
    config.set_iterations_all(10);
    config
}

#[test]
fn test_rigid_chain_stretch_at_one_substep() {
    // Ten Gauss-Seidel iterations over two colored batches leave the
    // swinging chain about 1.07% long after two seconds.
    let ratio = rigid_chain_stretch(literal_config(1), 120);
    assert!(ratio > 1.0, "ratio {ratio}");
    assert!(ratio < 1.015, "ratio {ratio}");
}

#[test]
fn test_rigid_chain_within_one_percent_with_substeps() {
    let ratio = rigid_chain_stretch(literal_config(2), 120);
    assert!((ratio - 1.0).abs() <= 0.01, "ratio {ratio}");
}

// ============================================================================
// Scenario B: particle resting on a box
// ============================================================================

#[test]
fn test_particle_rests_on_box() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let handle = solver
        .colliders_mut()
        .add_collider(Collider::new(Shape::Box(Cuboid::new(Vector3::new(1.0, 1.0, 1.0)))));
    let actor = solver
        .add_actor(&[Particle::new(Point3::new(0.3, 1.6, -0.2), 1.0).with_radius(0.1)], 0)
        .unwrap();
    solver.set_simplices(actor, vec![Simplex::from_slice(&[0])]).unwrap();

    for _ in 0..240 {
        solver.step(DT).unwrap();
    }

    let contact_offset = solver.colliders().collider(handle).unwrap().contact_offset;
    let resting = solver.actor_particle(actor, 0).unwrap();
    assert_relative_eq!(resting.position.y, 1.1 + contact_offset, epsilon = 1e-3);
    assert_relative_eq!(resting.position.x, 0.3, epsilon = 1e-3);
    assert!(solver.contacts().iter().any(|c| c.collider == handle));
}

// ============================================================================
// Scenario C: closed chain
// ============================================================================

#[test]
fn test_closed_chain_never_overstretches() {
    const N: usize = 8;
    let radius = 0.5;
    let mut particles: Vec<Particle> = (0..N)
        .map(|i| {
            let angle = TAU * i as f64 / N as f64;
            Particle::new(Point3::new(radius * angle.cos(), 2.0 + radius * angle.sin(), 0.0), 1.0)
        })
        .collect();
    particles[0] = Particle::pinned(particles[0].position);

    let edge = 2.0 * radius * (TAU / (2.0 * N as f64)).sin();
    let rest = edge * N as f64;
    let path: Vec<usize> = (0..N).chain(std::iter::once(0)).collect();
    let chain = ChainConstraint::new(path, vec![edge; N], 1.0).unwrap();
    assert!(chain.is_closed());

    let mut solver = Solver::new(SolverConfig::accurate()).unwrap();
    let actor = solver.add_actor(&particles, 0).unwrap();
    let batch: ConstraintBatch = Batch::from_constraints([chain]).unwrap().into();
    solver.add_batches(actor, vec![batch]).unwrap();

    let ring_length = |solver: &Solver| {
        (0..N)
            .map(|i| {
                let a = solver.actor_particle(actor, i).unwrap().position;
                let b = solver.actor_particle(actor, (i + 1) % N).unwrap().position;
                (b - a).norm()
            })
            .sum::<f64>()
    };

    for step in 0..500 {
        solver.step(DT).unwrap();
        let length = ring_length(&solver);
        assert!(length <= rest * 1.01, "step {step}: length {length} exceeds rest {rest}");
    }

    let pin = solver.actor_particle(actor, 0).unwrap().position;
    assert_relative_eq!(pin, Point3::new(radius, 2.0, 0.0), epsilon = 1e-12);
}
