//! Resting contact against height fields and boxes.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use strand_collision::{Collider, ColliderHandle, Cuboid, HeightFieldData, Shape};
use strand_rope::{BlueprintSettings, Path, RopeActor, RopeBlueprint, RopeMaterial};
use strand_solver::Solver;
use strand_types::{AffineTransform, Particle, Simplex, SolverConfig};

const DT: f64 = 1.0 / 60.0;

/// A 4 × 4 terrain centered on the origin whose samples come from `height`.
fn terrain(solver: &mut Solver, height: impl Fn(usize, usize) -> f64) -> ColliderHandle {
    let data = HeightFieldData::from_fn(9, 9, height).unwrap();
    let data = solver.colliders_mut().add_height_field(data);
    solver.colliders_mut().add_collider(
        Collider::new(Shape::HeightField {
            data: Some(data),
            size: Vector3::new(4.0, 1.0, 4.0),
        })
        .with_transform(AffineTransform::from_translation(Vector3::new(-2.0, 0.0, -2.0))),
    )
}

#[test]
fn test_particle_rests_on_flat_height_field() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let handle = terrain(&mut solver, |_, _| 0.5);
    let actor = solver
        .add_actor(&[Particle::new(Point3::new(0.1, 1.0, 0.3), 1.0).with_radius(0.1)], 0)
        .unwrap();
    solver.set_simplices(actor, vec![Simplex::from_slice(&[0])]).unwrap();

    for _ in 0..240 {
        solver.step(DT).unwrap();
    }

    let resting = solver.actor_particle(actor, 0).unwrap();
    assert_relative_eq!(resting.position.y, 0.6, epsilon = 5e-3);
    assert!(solver.contacts().iter().any(|c| c.collider == handle));
}

#[test]
fn test_particle_settles_in_valley() {
    // Heights rise away from the center row, forming a trough along Z.
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    terrain(&mut solver, |u, _| (u as f64 - 4.0).abs() * 0.1);
    let actor = solver
        .add_actor(&[Particle::new(Point3::new(0.3, 1.0, 0.0), 1.0).with_radius(0.05)], 0)
        .unwrap();
    solver.set_simplices(actor, vec![Simplex::from_slice(&[0])]).unwrap();

    for _ in 0..600 {
        solver.step(DT).unwrap();
    }

    let resting = solver.actor_particle(actor, 0).unwrap();
    assert!(resting.position.y > 0.0, "fell through the terrain: {}", resting.position);
    assert!(resting.position.y < 0.3);
}

#[test]
fn test_rope_drapes_over_box() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    solver
        .colliders_mut()
        .add_collider(Collider::new(Shape::Box(Cuboid::new(Vector3::new(1.0, 1.0, 1.0)))));
    let path = Path::polyline(&[Point3::new(-0.5, 1.3, 0.0), Point3::new(0.5, 1.3, 0.0)]);
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.05, 1.0).with_pool(0)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    let id = rope.add_to_solver(&mut solver).unwrap();

    for _ in 0..180 {
        solver.step(DT).unwrap();
    }

    let count = rope.blueprint().particles().len();
    for i in 0..count {
        let particle = solver.actor_particle(id, i).unwrap();
        assert!(particle.position.y > 1.0 + 0.05 - 0.01, "particle {i} sank to {}", particle.position);
        assert!(particle.position.y < 1.1);
    }
}
