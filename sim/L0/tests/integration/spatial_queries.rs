//! Signed distance queries through the BIH, and ray picking.

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strand_collision::Ray;
use strand_rope::{BlueprintSettings, Path, RopeActor, RopeBlueprint, RopeMaterial};
use strand_solver::Solver;
use strand_spatial::TriangleMesh;
use strand_types::{CollisionFilter, SolverConfig};

/// Exact signed distance to an axis-aligned box centered at the origin.
fn box_distance(point: &Point3<f64>, half: &Vector3<f64>) -> f64 {
    let q = point.coords.abs() - half;
    let outside = q.map(|v| v.max(0.0)).norm();
    let inside = q.x.max(q.y).max(q.z).min(0.0);
    outside + inside
}

/// Signed distance by visiting every triangle.
fn brute_force(mesh: &TriangleMesh, point: &Point3<f64>) -> f64 {
    mesh.bih()
        .elements()
        .iter()
        .map(|t| mesh.triangle_distance(t, point).0)
        .min_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(f64::MAX)
}

#[test]
fn test_bih_matches_brute_force() {
    let half = Vector3::new(1.0, 0.5, 0.75);
    let mesh = TriangleMesh::cuboid(half);
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..1000 {
        let point = Point3::new(
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
        );
        let fast = mesh.signed_distance(&point);
        let slow = brute_force(&mesh, &point);
        let exact = box_distance(&point, &half);

        assert_relative_eq!(fast.abs(), slow.abs(), epsilon = 1e-9);
        assert_eq!(fast >= 0.0, slow >= 0.0, "sign mismatch at {point}");
        assert_eq!(fast >= 0.0, exact >= 0.0, "wrong side at {point}");
        assert_relative_eq!(fast, exact, epsilon = 1e-9);
    }
}

#[test]
fn test_empty_mesh_is_far_away() {
    let mesh = TriangleMesh::new(Vec::new(), &[]);
    assert_eq!(mesh.signed_distance(&Point3::origin()), f64::MAX);
    assert!(mesh.query(&Point3::origin()).is_none());
}

#[test]
fn test_ray_picks_nearest_rope_particle() {
    let mut solver = Solver::new(SolverConfig::default()).unwrap();
    let path = Path::polyline(&[Point3::new(0.0, 0.0, 0.0), Point3::new(1.05, 0.0, 0.0)]);
    let blueprint = RopeBlueprint::new(&path, &BlueprintSettings::new(0.1, 1.0)).unwrap();
    let mut rope = RopeActor::new(blueprint, RopeMaterial::rope());
    let id = rope.add_to_solver(&mut solver).unwrap();
    let indices = solver.solver_indices(id).unwrap().to_vec();

    // Along the rope: the first particle is hit first.
    let along = Ray::new(Point3::new(-1.0, 0.0, 0.0), Vector3::x());
    let hits = solver.raycast(&along, 5.0, CollisionFilter::EVERYTHING);
    assert_eq!(hits.first().map(|h| h.particle), Some(indices[0]));
    assert!(hits.windows(2).all(|w| w[0].ray_distance <= w[1].ray_distance));
    // Pooled particles are inactive and never picked.
    assert_eq!(hits.len(), rope.active_particle_count());

    // From above: the particle under the ray origin wins.
    let target = rope.blueprint().particles()[5].position;
    let down = Ray::new(target + Vector3::new(0.0, 1.0, 0.0), -Vector3::y());
    let hits = solver.raycast(&down, 5.0, CollisionFilter::EVERYTHING);
    assert_eq!(hits.first().map(|h| h.particle), Some(indices[5]));
    assert_relative_eq!(hits[0].ray_distance, 1.0 - 0.1, epsilon = 1e-9);
}
