//! Collider storage and contact generation.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use strand_spatial::TriangleMesh;
use strand_types::{Aabb, AffineTransform, ParticleArrays, Simplex, SolverBackend, SolverConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::contact::Contact;
use crate::distance::{DistanceFunction, Transformed};
use crate::heightfield::{HeightField, HeightFieldData};
use crate::mesh::MeshShape;
use crate::optimize::{OptimizationParams, optimize};
use crate::shape::{Collider, Shape};

/// Handle to a collider in a [`ColliderWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColliderHandle(pub usize);

/// Handle to stored height field samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeightFieldHandle(pub usize);

/// Handle to a stored triangle mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshHandle(pub usize);

fn insert<T>(slots: &mut Vec<Option<T>>, value: T) -> usize {
    if let Some(index) = slots.iter().position(Option::is_none) {
        slots[index] = Some(value);
        index
    } else {
        slots.push(Some(value));
        slots.len() - 1
    }
}

/// Colliders plus the shared data they reference.
///
/// Handles stay valid until the item is removed; freed slots are reused.
#[derive(Debug, Clone, Default)]
pub struct ColliderWorld {
    colliders: Vec<Option<Collider>>,
    height_fields: Vec<Option<HeightFieldData>>,
    meshes: Vec<Option<Arc<TriangleMesh>>>,
}

impl ColliderWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collider.
    pub fn add_collider(&mut self, collider: Collider) -> ColliderHandle {
        ColliderHandle(insert(&mut self.colliders, collider))
    }

    /// Remove a collider.
    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.colliders.get_mut(handle.0).and_then(Option::take)
    }

    /// Look up a collider.
    #[must_use]
    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle.0).and_then(Option::as_ref)
    }

    /// Look up a collider mutably.
    pub fn collider_mut(&mut self, handle: ColliderHandle) -> Option<&mut Collider> {
        self.colliders.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Move a collider. Returns `false` for a stale handle.
    pub fn set_transform(&mut self, handle: ColliderHandle, transform: AffineTransform) -> bool {
        if let Some(collider) = self.collider_mut(handle) {
            collider.transform = transform;
            true
        } else {
            false
        }
    }

    /// Live colliders with their handles.
    pub fn colliders(&self) -> impl Iterator<Item = (ColliderHandle, &Collider)> {
        self.colliders
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ColliderHandle(i), c)))
    }

    /// Number of live colliders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colliders.iter().flatten().count()
    }

    /// Whether there are no live colliders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store height field samples.
    pub fn add_height_field(&mut self, data: HeightFieldData) -> HeightFieldHandle {
        HeightFieldHandle(insert(&mut self.height_fields, data))
    }

    /// Drop height field samples. Colliders using them stop producing contacts.
    pub fn remove_height_field(&mut self, handle: HeightFieldHandle) -> Option<HeightFieldData> {
        self.height_fields.get_mut(handle.0).and_then(Option::take)
    }

    /// Look up height field samples.
    #[must_use]
    pub fn height_field(&self, handle: HeightFieldHandle) -> Option<&HeightFieldData> {
        self.height_fields.get(handle.0).and_then(Option::as_ref)
    }

    /// Store a triangle mesh.
    pub fn add_mesh(&mut self, mesh: Arc<TriangleMesh>) -> MeshHandle {
        MeshHandle(insert(&mut self.meshes, mesh))
    }

    /// Drop a triangle mesh. Colliders using it stop producing contacts.
    pub fn remove_mesh(&mut self, handle: MeshHandle) -> Option<Arc<TriangleMesh>> {
        self.meshes.get_mut(handle.0).and_then(Option::take)
    }

    /// Look up a triangle mesh.
    #[must_use]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&TriangleMesh> {
        self.meshes
            .get(handle.0)
            .and_then(Option::as_ref)
            .map(AsRef::as_ref)
    }

    /// Transform of one collider, enabled or not.
    #[must_use]
    pub fn frame(&self, handle: ColliderHandle) -> Option<AffineTransform> {
        self.collider(handle).map(|c| c.transform)
    }

    /// Transforms of every slot, indexed by handle.
    #[must_use]
    pub fn frames(&self) -> Vec<Option<AffineTransform>> {
        self.colliders
            .iter()
            .map(|c| c.as_ref().map(|c| c.transform))
            .collect()
    }

    /// Solver-space bounds of a collider including its contact offset, or
    /// `None` when its data is missing.
    #[must_use]
    pub fn collider_bounds(&self, collider: &Collider) -> Option<Aabb> {
        let local = match collider.shape {
            Shape::Sphere(s) => s.local_bounds(),
            Shape::Box(b) => b.local_bounds(),
            Shape::Capsule(c) => c.local_bounds(),
            Shape::HeightField { data, size } => {
                HeightField::new(self.height_field(data?)?, size).local_bounds()
            }
            Shape::TriangleMesh { data } => {
                let mesh = self.mesh(data?)?;
                if mesh.triangle_count() == 0 {
                    return None;
                }
                mesh.bounds()
            }
        };
        Some(
            local
                .transformed(&collider.transform)
                .expanded(collider.contact_offset),
        )
    }

    /// Generate contacts between simplices and colliders for a step of
    /// length `dt`.
    ///
    /// Uses the current positions and velocities. Simplices with an inactive
    /// particle are skipped; the first particle's filter stands for the whole
    /// simplex.
    #[must_use]
    pub fn generate_contacts(
        &self,
        particles: &ParticleArrays,
        simplices: &[Simplex],
        config: &SolverConfig,
        dt: f64,
    ) -> Vec<Contact> {
        let candidates: Vec<(ColliderHandle, &Collider, Aabb)> = self
            .colliders()
            .filter(|(_, c)| c.enabled)
            .filter_map(|(handle, c)| {
                let bounds = self.collider_bounds(c);
                if bounds.is_none() {
                    tracing::trace!(collider = handle.0, "collider data not ready, skipped");
                }
                bounds.map(|b| (handle, c, b))
            })
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let params = OptimizationParams::from(config);
        let per_simplex = |(index, simplex): (usize, &Simplex)| -> Vec<Contact> {
            let mut contacts = Vec::new();
            if simplex.is_empty() || !simplex.iter().all(|&p| particles.is_active(p)) {
                return contacts;
            }
            let bounds = simplex_bounds(particles, simplex, dt, config);
            let filter = particles.filters[simplex[0]];
            for (handle, collider, collider_bounds) in &candidates {
                if filter.collides_with(collider.filter) && bounds.overlaps(collider_bounds) {
                    self.collide(
                        &SimplexQuery {
                            index,
                            simplex,
                            bounds: &bounds,
                        },
                        *handle,
                        collider,
                        particles,
                        &params,
                        config,
                        dt,
                        &mut contacts,
                    );
                }
            }
            contacts
        };

        match config.backend {
            SolverBackend::Serial => simplices.iter().enumerate().flat_map(per_simplex).collect(),
            SolverBackend::Parallel => simplices
                .par_iter()
                .enumerate()
                .flat_map_iter(per_simplex)
                .collect(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collide(
        &self,
        query: &SimplexQuery<'_>,
        handle: ColliderHandle,
        collider: &Collider,
        particles: &ParticleArrays,
        params: &OptimizationParams,
        config: &SolverConfig,
        dt: f64,
        out: &mut Vec<Contact>,
    ) {
        let convex = |shape: &dyn DistanceFunction, out: &mut Vec<Contact>| {
            if let Some(contact) =
                convex_contact(shape, query, handle, collider, particles, params, config, dt)
            {
                out.push(contact);
            }
        };

        let transform = &collider.transform;
        match collider.shape {
            Shape::Sphere(s) => convex(&Transformed::new(&s, transform), out),
            Shape::Box(b) => convex(&Transformed::new(&b, transform), out),
            Shape::Capsule(c) => convex(&Transformed::new(&c, transform), out),
            Shape::TriangleMesh { data } => {
                let Some(shape) = data.and_then(|h| self.mesh(h)).and_then(MeshShape::new) else {
                    tracing::trace!(collider = handle.0, "mesh data missing");
                    return;
                };
                convex(&Transformed::new(&shape, transform), out);
            }
            Shape::HeightField { data, size } => {
                let Some(samples) = data.and_then(|h| self.height_field(h)) else {
                    tracing::trace!(collider = handle.0, "height field data missing");
                    return;
                };
                let field = HeightField::new(samples, size);
                let local_bounds = query.bounds.inverse_transformed(transform);
                for triangle in field.triangles_in(&local_bounds) {
                    convex(&Transformed::new(&triangle, transform), out);
                }
            }
        }
    }
}

struct SimplexQuery<'a> {
    index: usize,
    simplex: &'a [usize],
    bounds: &'a Aabb,
}

/// Bounds of a simplex swept by its velocity and grown by the collision margin.
#[must_use]
fn simplex_bounds(
    particles: &ParticleArrays,
    simplex: &[usize],
    dt: f64,
    config: &SolverConfig,
) -> Aabb {
    let mut bounds = Aabb::empty();
    for &p in simplex {
        let sweep = particles.velocities[p] * dt * config.continuous_collision_detection;
        bounds.encapsulate(
            &Aabb::from_sphere(particles.positions[p], particles.max_radius(p)).swept(&sweep),
        );
    }
    bounds.expanded(config.collision_margin)
}

#[allow(clippy::too_many_arguments)]
fn convex_contact(
    shape: &dyn DistanceFunction,
    query: &SimplexQuery<'_>,
    handle: ColliderHandle,
    collider: &Collider,
    particles: &ParticleArrays,
    params: &OptimizationParams,
    config: &SolverConfig,
    dt: f64,
) -> Option<Contact> {
    let positions: SmallVec<[Point3<f64>; 4]> = query
        .simplex
        .iter()
        .map(|&p| particles.positions[p])
        .collect();
    let radii: SmallVec<[f64; 4]> = query
        .simplex
        .iter()
        .map(|&p| particles.principal_radii[p].x)
        .collect();

    let closest = optimize(shape, &positions, &radii, params);
    let normal = closest.surface.normal;
    if normal == Vector3::zeros() {
        return None;
    }

    let velocity: Vector3<f64> = query
        .simplex
        .iter()
        .zip(&closest.bary)
        .map(|(&p, &b)| particles.velocities[p] * b)
        .sum();
    let d_ab = closest.surface.signed_distance(&closest.position);
    let reach = closest.radius + collider.contact_offset + config.collision_margin;
    if velocity.dot(&normal) * dt + d_ab > reach {
        return None;
    }

    Some(Contact::new(
        query.index,
        handle,
        closest.bary,
        closest.surface.point + normal * collider.contact_offset,
        normal,
        d_ab - closest.radius - collider.contact_offset,
    ))
}
