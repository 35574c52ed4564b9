//! Benchmarks for solver stepping.
//!
//! Run with: cargo bench -p strand-solver
//!
//! Measures step cost for a hanging chain of varying length, with serial
//! and parallel kernels, resting on a box collider.

#![allow(
    missing_docs,
    clippy::unwrap_used,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::ignored_unit_patterns
)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strand_collision::{Collider, Cuboid, Shape};
use strand_constraint::{ConstraintBatch, DistanceConstraint, partition};
use strand_solver::Solver;
use strand_types::{AffineTransform, Particle, Simplex, SolverBackend, SolverConfig};

/// A chain of `n` particles pinned at its first end, slightly jittered so
/// that contacts do not all line up.
fn chain_solver(n: usize, backend: SolverBackend) -> Solver {
    let mut rng = StdRng::seed_from_u64(7);
    let spacing = 0.05;
    let mut solver = Solver::new(SolverConfig::default().with_backend(backend).no_sleeping()).unwrap();
    solver.colliders_mut().add_collider(
        Collider::new(Shape::Box(Cuboid::new(Vector3::new(10.0, 0.5, 10.0))))
            .with_transform(AffineTransform::from_translation(Vector3::new(0.0, -2.0, 0.0))),
    );

    let particles: Vec<Particle> = (0..n)
        .map(|i| {
            let jitter = rng.gen_range(-0.001..0.001);
            let position = Point3::new(i as f64 * spacing, jitter, 0.0);
            if i == 0 {
                Particle::pinned(position)
            } else {
                Particle::new(position, 0.1).with_radius(spacing * 0.5)
            }
        })
        .collect();
    let actor = solver.add_actor(&particles, 0).unwrap();

    let constraints: Vec<_> = (0..n - 1)
        .map(|i| DistanceConstraint::new([i, i + 1], spacing))
        .collect();
    let batches = partition(constraints)
        .unwrap()
        .into_iter()
        .map(ConstraintBatch::from)
        .collect();
    solver.add_batches(actor, batches).unwrap();
    let simplices = (0..n).map(|i| Simplex::from_slice(&[i])).collect();
    solver.set_simplices(actor, simplices).unwrap();
    solver
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_step");

    for backend in [SolverBackend::Serial, SolverBackend::Parallel] {
        for &n in &[16, 128, 1024] {
            group.bench_with_input(BenchmarkId::new(format!("{backend:?}"), n), &n, |b, &n| {
                let mut solver = chain_solver(n, backend);
                b.iter(|| solver.step(1.0 / 60.0).unwrap());
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
