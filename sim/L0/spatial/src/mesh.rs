//! Indexed triangle meshes with signed distance queries.

use nalgebra::{Point3, Vector3};
use strand_types::Aabb;
use strand_types::math::{EPSILON, nearest_point_on_triangle, pure_sign, safe_normalize};

use crate::bih::{Bih, Bounded};

/// A mesh triangle stored in the BIH.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTriangle {
    /// Vertex indices, counter-clockwise seen from outside.
    pub indices: [usize; 3],
    /// Index of the triangle in the source list.
    pub index: usize,
    bounds: Aabb,
}

impl Bounded for MeshTriangle {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}

/// Result of a nearest-surface query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceQuery {
    /// Closest point on the surface.
    pub point: Point3<f64>,
    /// Unit direction along which the distance grows.
    pub normal: Vector3<f64>,
    /// Signed distance, positive outside.
    pub distance: f64,
    /// Index of the closest triangle.
    pub triangle: usize,
}

/// A triangle mesh with per-vertex normals and a BIH.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    bih: Bih<MeshTriangle>,
}

impl TriangleMesh {
    /// Build a mesh. Triangles referencing missing vertices are dropped.
    ///
    /// Vertex normals are the area-weighted average of the adjacent face
    /// normals.
    #[must_use]
    pub fn new(vertices: Vec<Point3<f64>>, triangles: &[[usize; 3]]) -> Self {
        let mut normals = vec![Vector3::zeros(); vertices.len()];
        let mut elements = Vec::with_capacity(triangles.len());

        for (index, tri) in triangles.iter().enumerate() {
            if tri.iter().any(|&i| i >= vertices.len()) {
                tracing::warn!(triangle = index, "triangle references a missing vertex, dropped");
                continue;
            }
            let [a, b, c] = tri.map(|i| vertices[i]);
            // Unnormalized: length is twice the area.
            let face = (b - a).cross(&(c - a));
            for &i in tri {
                normals[i] += face;
            }
            elements.push(MeshTriangle {
                indices: *tri,
                index,
                bounds: Aabb::from_points([&a, &b, &c]),
            });
        }

        for n in &mut normals {
            *n = safe_normalize(n);
        }

        Self {
            vertices,
            normals,
            bih: Bih::build(elements),
        }
    }

    /// Closed box centered at the origin.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        let vertices = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 == 0 { -half_extents.x } else { half_extents.x },
                    if i & 2 == 0 { -half_extents.y } else { half_extents.y },
                    if i & 4 == 0 { -half_extents.z } else { half_extents.z },
                )
            })
            .collect();
        let triangles = [
            [0, 4, 6],
            [0, 6, 2],
            [1, 3, 7],
            [1, 7, 5],
            [0, 1, 5],
            [0, 5, 4],
            [2, 6, 7],
            [2, 7, 3],
            [0, 2, 3],
            [0, 3, 1],
            [4, 5, 7],
            [4, 7, 6],
        ];
        Self::new(vertices, &triangles)
    }

    /// Vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// Unit vertex normals.
    #[must_use]
    pub fn vertex_normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// Number of valid triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.bih.len()
    }

    /// The hierarchy built over the triangles.
    #[must_use]
    pub fn bih(&self) -> &Bih<MeshTriangle> {
        &self.bih
    }

    /// Bounds of all vertices.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    /// Signed distance from `point` to one triangle, with the closest point
    /// and interpolated vertex normal.
    #[must_use]
    pub fn triangle_distance(
        &self,
        triangle: &MeshTriangle,
        point: &Point3<f64>,
    ) -> (f64, Point3<f64>, Vector3<f64>) {
        let [a, b, c] = triangle.indices;
        let (nearest, bary) = nearest_point_on_triangle(
            &self.vertices[a],
            &self.vertices[b],
            &self.vertices[c],
            point,
        );
        let normal = self.normals[a] * bary.x + self.normals[b] * bary.y + self.normals[c] * bary.z;
        let offset = point - nearest;
        let distance = offset.norm() * pure_sign(offset.dot(&normal));
        (distance, nearest, normal)
    }

    /// Nearest surface point, or `None` for a mesh without triangles.
    #[must_use]
    pub fn query(&self, point: &Point3<f64>) -> Option<SurfaceQuery> {
        let (distance, (nearest, interpolated, triangle)) = self.bih.nearest_by(point, |t| {
            let (d, nearest, normal) = self.triangle_distance(t, point);
            (d, (nearest, normal, t.index))
        })?;

        let offset = point - nearest;
        let normal = if offset.norm() > EPSILON {
            offset.normalize() * pure_sign(distance)
        } else {
            safe_normalize(&interpolated)
        };

        Some(SurfaceQuery {
            point: nearest,
            normal,
            distance,
            triangle,
        })
    }

    /// Signed distance to the surface; `f64::MAX` for a mesh without triangles.
    #[must_use]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.bih
            .signed_distance_by(point, |t| self.triangle_distance(t, point).0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_normals_point_outward() {
        let mesh = TriangleMesh::cuboid(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.triangle_count(), 12);
        for (v, n) in mesh.vertices().iter().zip(mesh.vertex_normals()) {
            assert!(v.coords.dot(n) > 0.0);
        }
    }

    #[test]
    fn test_signed_distance_inside_outside() {
        let mesh = TriangleMesh::cuboid(Vector3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(
            mesh.signed_distance(&Point3::new(0.0, 0.0, 2.5)),
            1.5,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            mesh.signed_distance(&Point3::new(0.0, 0.75, 0.0)),
            -0.25,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_query_normal_and_point() {
        let mesh = TriangleMesh::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let q = mesh
            .query(&Point3::new(0.2, -0.9, 0.1))
            .unwrap();
        assert_relative_eq!(q.point, Point3::new(0.2, -1.0, 0.1), epsilon = 1e-12);
        assert_relative_eq!(q.normal, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
        assert!(q.distance < 0.0);
    }

    #[test]
    fn test_surface_point_counts_as_outside() {
        let mesh = TriangleMesh::cuboid(Vector3::new(1.0, 1.0, 1.0));
        let d = mesh.signed_distance(&Point3::new(1.0, 1.0, 1.0));
        assert_eq!(d.abs(), 0.0);
        assert!(d.is_sign_positive());
    }

    #[test]
    fn test_invalid_triangles_dropped() {
        let mesh = TriangleMesh::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            &[[0, 1, 2], [0, 1, 9]],
        );
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = TriangleMesh::new(Vec::new(), &[]);
        assert_eq!(mesh.signed_distance(&Point3::origin()), f64::MAX);
        assert!(mesh.query(&Point3::origin()).is_none());
    }
}
