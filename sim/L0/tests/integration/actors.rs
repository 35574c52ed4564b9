//! Actor lifecycle: blueprints, tearing, attachments and particle ranges.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::ControlFlow;
use strand_collision::{Collider, Cuboid, Shape};
use strand_rope::{
    Actor, Attachment, BlueprintSettings, ControlPoint, Path, RodActor, RodBlueprint, RodMaterial, RopeActor,
    RopeBlueprint, RopeError, RopeMaterial,
};
use strand_solver::{ActorId, Solver};
use strand_types::{AffineTransform, Particle, SolverConfig};

const DT: f64 = 1.0 / 60.0;

fn pinned_path(length: f64) -> Path {
    Path::new(
        vec![
            ControlPoint::new(Point3::new(0.0, 2.0, 0.0)).with_mass(0.0),
            ControlPoint::new(Point3::new(length, 2.0, 0.0)),
        ],
        false,
    )
}

// ============================================================================
// Blueprints
// ============================================================================

#[test]
fn test_default_path_synthesized() {
    let single = Path::new(vec![ControlPoint::new(Point3::new(5.0, 5.0, 5.0))], false);
    let blueprint = RopeBlueprint::new(&single, &BlueprintSettings::new(0.1, 1.0)).unwrap();
    let particles = blueprint.particles();
    assert_relative_eq!(particles[0].position, Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(
        particles[particles.len() - 1].position,
        Point3::new(1.0, 0.0, 0.0),
        epsilon = 1e-6
    );
    assert!(blueprint.rest_length() > 1.99);

    let empty = RopeBlueprint::new(&Path::default(), &BlueprintSettings::new(0.1, 1.0)).unwrap();
    assert_eq!(empty.particles().len(), particles.len());
}

#[test]
fn test_cancelled_construction_builds_nothing() {
    let path = pinned_path(3.0);
    let settings = BlueprintSettings::new(0.01, 1.0);

    let mut calls = 0;
    let result = RopeBlueprint::build(&path, &settings, |progress| {
        calls += 1;
        assert!((0.0..=1.0).contains(&progress.fraction));
        if calls > 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    });
    assert!(matches!(result, Err(RopeError::Cancelled)));
    assert_eq!(calls, 3);

    let result = RodBlueprint::build(&path, &settings, |_| ControlFlow::Break(()));
    assert!(matches!(result, Err(RopeError::Cancelled)));

    let mut stages = Vec::new();
    RopeBlueprint::build(&path, &settings, |progress| {
        if stages.last() != Some(&progress.stage) {
            stages.push(progress.stage);
        }
        ControlFlow::Continue(())
    })
    .unwrap();
    assert!(stages.len() >= 2);
}

// ============================================================================
// Tearing
// ============================================================================

#[test]
fn test_overloaded_rope_tears() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let blueprint = RopeBlueprint::new(&pinned_path(1.05), &BlueprintSettings::new(0.1, 1.0).with_pool(4)).unwrap();
    let material = RopeMaterial::rope().with_tearing(0.5, 4);
    let mut rope = RopeActor::new(blueprint, material);
    let id = rope.add_to_solver(&mut solver).unwrap();
    let initial = rope.active_particle_count();

    let mut events = Vec::new();
    for _ in 0..60 {
        solver.step(DT).unwrap();
        events.extend(rope.apply_tearing(&mut solver).unwrap());
        if !events.is_empty() {
            break;
        }
    }

    assert!(!events.is_empty(), "rope never tore");
    let event = events[0];
    assert!(event.force < -0.5);
    assert_eq!(rope.active_particle_count(), initial + events.len());
    assert_eq!(rope.path_chunks().len(), 1 + events.len());
    assert!(solver.particles().is_active(event.new_particle));
    assert!(solver.solver_indices(id).unwrap().contains(&event.new_particle));

    // The torn piece falls away from the pinned part.
    for _ in 0..30 {
        solver.step(DT).unwrap();
    }
    let pinned = solver.particles().positions[event.particle];
    let loose = solver.particles().positions[event.new_particle];
    assert!((pinned - loose).norm() > 0.05);
}

#[test]
fn test_tearing_disabled_by_default() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let blueprint = RopeBlueprint::new(&pinned_path(1.05), &BlueprintSettings::new(0.1, 1.0)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    rope.add_to_solver(&mut solver).unwrap();
    for _ in 0..30 {
        solver.step(DT).unwrap();
        assert!(rope.apply_tearing(&mut solver).unwrap().is_empty());
    }
    assert_eq!(rope.path_chunks().len(), 1);
}

// ============================================================================
// Attachments
// ============================================================================

#[test]
fn test_rope_carried_by_moving_collider() {
    let mut solver = Solver::new(SolverConfig::accurate()).unwrap();
    let mut handle_box = Collider::new(Shape::Box(Cuboid::new(Vector3::new(0.05, 0.05, 0.05))))
        .with_transform(AffineTransform::from_translation(Vector3::new(0.0, 2.0, 0.0)));
    handle_box.enabled = false;
    let handle = solver.colliders_mut().add_collider(handle_box);

    let path = Path::polyline(&[Point3::new(0.0, 2.0, 0.0), Point3::new(0.0, 1.0, 0.0)]);
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0).with_pool(0)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    let id = rope.add_to_solver(&mut solver).unwrap();

    let mut attachment = Attachment::new(vec![0], handle);
    attachment.attach(&mut solver, &rope).unwrap();

    for frame in 1..=120 {
        let x = f64::from(frame) / 120.0;
        let moved = AffineTransform::from_translation(Vector3::new(x, 2.0, 0.0));
        assert!(solver.colliders_mut().set_transform(handle, moved));
        solver.step(DT).unwrap();
    }

    let top = solver.actor_particle(id, 0).unwrap().position;
    assert_relative_eq!(top, Point3::new(1.0, 2.0, 0.0), epsilon = 1e-2);
    let rest = rope.rest_length();
    assert!((rope.calculate_length(&solver).unwrap() - rest).abs() < 0.05 * rest);

    attachment.detach(&mut solver).unwrap();
    for _ in 0..30 {
        solver.step(DT).unwrap();
    }
    assert!(solver.actor_particle(id, 0).unwrap().position.y < 1.9);
}

// ============================================================================
// Rods
// ============================================================================

#[test]
fn test_hanging_rod_keeps_length() {
    let mut solver = Solver::new(SolverConfig::accurate()).unwrap();
    let blueprint = RodBlueprint::new(&pinned_path(0.85), &BlueprintSettings::new(0.1, 1.0)).unwrap();
    let mut rod = RodActor::new(blueprint, RodMaterial::hose());
    rod.add_to_solver(&mut solver).unwrap();

    for _ in 0..120 {
        solver.step(DT).unwrap();
        let strain = rod.strain(&solver).unwrap();
        assert!(strain <= 0.01, "strain {strain}");
    }
    assert!(rod.uses_oriented_particles());
}

// ============================================================================
// Particle ranges
// ============================================================================

#[test]
fn test_actor_ranges_never_overlap() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(1234);
    let mut actors: Vec<ActorId> = Vec::new();

    for round in 0..200 {
        if actors.is_empty() || rng.gen_bool(0.6) {
            let count: u32 = rng.gen_range(1..12);
            let particles: Vec<Particle> = (0..count)
                .map(|i| Particle::new(Point3::new(f64::from(i), 0.0, 0.0), 1.0))
                .collect();
            let pool = rng.gen_range(0..4);
            actors.push(solver.add_actor(&particles, pool).unwrap());
        } else {
            let victim = actors.swap_remove(rng.gen_range(0..actors.len()));
            solver.remove_actor(victim).unwrap();
        }

        let mut owner = vec![None; solver.particles().len()];
        for &actor in &actors {
            for &slot in solver.solver_indices(actor).unwrap() {
                assert!(slot < owner.len(), "round {round}: slot {slot} outside the particle store");
                assert_eq!(owner[slot], None, "round {round}: slot {slot} shared");
                owner[slot] = Some(actor);
            }
        }
    }
    assert_eq!(solver.actor_count(), actors.len());
}
