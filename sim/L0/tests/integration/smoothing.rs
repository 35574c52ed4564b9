//! Path smoothing: decimation and Chaikin subdivision on simulated ropes.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strand_rope::{
    BlueprintSettings, ControlPoint, Path, PathFrame, PathSmoother, RopeActor, RopeBlueprint, RopeMaterial,
    chaikin, decimate, polyline_length,
};
use strand_solver::Solver;
use strand_types::SolverConfig;

fn random_walk(rng: &mut StdRng, n: usize) -> Vec<PathFrame> {
    let mut position = Point3::origin();
    (0..n)
        .map(|_| {
            position += Vector3::new(
                rng.gen_range(0.5..1.0),
                rng.gen_range(-0.3..0.3),
                rng.gen_range(-0.3..0.3),
            );
            PathFrame {
                position,
                ..PathFrame::default()
            }
        })
        .collect()
}

/// `level` rounds of quarter/three-quarter corner cutting, endpoints
/// restored at the end.
fn corner_cutting(frames: &[PathFrame], level: u32) -> Vec<Point3<f64>> {
    let mut points: Vec<Point3<f64>> = frames.iter().map(|f| f.position).collect();
    for _ in 0..level {
        points = points
            .windows(2)
            .flat_map(|w| [w[0] + (w[1] - w[0]) * 0.25, w[0] + (w[1] - w[0]) * 0.75])
            .collect();
    }
    if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
        points[0] = first.position;
        let end = points.len() - 1;
        points[end] = last.position;
    }
    points
}

#[test]
fn test_decimation_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(3);
    for threshold in [0.05, 0.2, 1.0, 3.0] {
        let frames = random_walk(&mut rng, 60);
        let once = decimate(&frames, threshold);
        let twice = decimate(&once, threshold);
        assert_eq!(once, twice, "threshold {threshold}");
        assert!(once.len() <= frames.len());
    }
}

#[test]
fn test_chaikin_matches_corner_cutting() {
    let mut rng = StdRng::seed_from_u64(11);
    let frames = random_walk(&mut rng, 9);
    for level in 1..=3 {
        let direct = chaikin(&frames, level);
        let iterative = corner_cutting(&frames, level);
        assert_eq!(direct.len(), iterative.len());
        for (a, b) in direct.iter().zip(&iterative) {
            assert_relative_eq!(a.position, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_smoother_follows_simulated_rope() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let path = Path::polyline(&[
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.5, 1.2, 0.0),
        Point3::new(1.0, 1.0, 0.0),
    ]);
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.05, 1.0)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    rope.add_to_solver(&mut solver).unwrap();
    for _ in 0..20 {
        solver.step(1.0 / 60.0).unwrap();
    }

    let mut smoother = PathSmoother::new(0.01, 2);
    smoother.generate(&solver, &rope);
    assert_eq!(smoother.raw_chunks().len(), 1);
    let raw = &smoother.raw_chunks()[0];
    let smooth = &smoother.smooth_chunks()[0];
    assert_eq!(raw.len(), rope.blueprint().particles().len());
    assert!(smooth.len() >= 4);
    assert_eq!(smooth[0].position, raw[0].position);
    assert!(smoother.smooth_length() <= polyline_length(raw) + 1e-9);

    // Transported frames stay orthonormal.
    for frame in raw {
        assert_relative_eq!(frame.tangent.norm(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(frame.tangent.dot(&frame.normal), 0.0, epsilon = 1e-9);
    }
    let mid = smoother.section_at(0.5).unwrap();
    assert!(mid.position.x > 0.2 && mid.position.x < 0.8);
}

#[test]
fn test_section_at_reaches_torn_tail() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let path = Path::new(
        vec![
            ControlPoint::new(Point3::new(0.0, 2.0, 0.0)).with_mass(0.0),
            ControlPoint::new(Point3::new(1.05, 2.0, 0.0)),
        ],
        false,
    );
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0).with_pool(4)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    rope.add_to_solver(&mut solver).unwrap();
    assert!(rope.tear(&mut solver, 2).unwrap().is_some());
    solver.step(1.0 / 60.0).unwrap();

    let mut smoother = PathSmoother::new(0.0, 0);
    smoother.generate(&solver, &rope);
    let chunks = smoother.smooth_chunks();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].len(), 3);

    let last = &chunks[1];
    let section = smoother.section_at(0.9).unwrap();
    let on_last = last.windows(2).any(|w| {
        let (a, b) = (w[0].position, w[1].position);
        let t = ((section.position - a).dot(&(b - a)) / (b - a).norm_squared().max(1e-12)).clamp(0.0, 1.0);
        (section.position - (a + (b - a) * t)).norm() < 1e-9
    });
    assert!(on_last, "section {} is not on the torn tail", section.position);

    let head = smoother.section_at(0.05).unwrap();
    assert_relative_eq!(head.position, chunks[0][0].position.lerp(&chunks[0][1].position, 0.65), epsilon = 1e-9);
}
