//! Triangle mesh colliders.

use nalgebra::Point3;
use strand_spatial::TriangleMesh;

use crate::distance::{DistanceFunction, SurfacePoint};

/// Distance function over a closed triangle mesh.
#[derive(Debug, Clone, Copy)]
pub struct MeshShape<'a> {
    mesh: &'a TriangleMesh,
}

impl<'a> MeshShape<'a> {
    /// Wrap a mesh. Returns `None` for a mesh without triangles.
    #[must_use]
    pub fn new(mesh: &'a TriangleMesh) -> Option<Self> {
        (mesh.triangle_count() > 0).then_some(Self { mesh })
    }
}

impl DistanceFunction for MeshShape<'_> {
    fn project(&self, point: &Point3<f64>) -> SurfacePoint {
        self.mesh
            .query(point)
            .map_or_else(|| SurfacePoint::unreachable(point), |q| SurfacePoint {
                point: q.point,
                normal: q.normal,
            })
    }
}
