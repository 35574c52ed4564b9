//! Collider descriptions.

use nalgebra::Vector3;
use strand_types::{AffineTransform, CollisionFilter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::world::{HeightFieldHandle, MeshHandle};
use crate::{Capsule, Cuboid, Sphere};

/// Surface response parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColliderMaterial {
    /// Friction coefficient while sticking.
    pub static_friction: f64,
    /// Friction coefficient while sliding.
    pub dynamic_friction: f64,
    /// Adhesion strength. Zero disables adhesion.
    pub stickiness: f64,
    /// Distance below which adhesion acts.
    pub stick_distance: f64,
}

impl Default for ColliderMaterial {
    fn default() -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
            stickiness: 0.0,
            stick_distance: 0.0,
        }
    }
}

impl ColliderMaterial {
    /// Frictionless, non-sticky.
    #[must_use]
    pub const fn frictionless() -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
            stickiness: 0.0,
            stick_distance: 0.0,
        }
    }

    /// Rough material.
    #[must_use]
    pub const fn rough() -> Self {
        Self {
            static_friction: 0.8,
            dynamic_friction: 0.6,
            stickiness: 0.0,
            stick_distance: 0.0,
        }
    }

    /// Sticky material.
    #[must_use]
    pub const fn sticky(stickiness: f64, stick_distance: f64) -> Self {
        Self {
            static_friction: 0.5,
            dynamic_friction: 0.4,
            stickiness,
            stick_distance,
        }
    }
}

/// Collider geometry in collider-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Sphere.
    Sphere(Sphere),
    /// Box.
    Box(Cuboid),
    /// Capsule.
    Capsule(Capsule),
    /// Height field. `None` data, or data that is no longer stored, yields
    /// no contacts.
    HeightField {
        /// Sample grid.
        data: Option<HeightFieldHandle>,
        /// Width, maximum height and depth.
        size: Vector3<f64>,
    },
    /// Closed triangle mesh.
    TriangleMesh {
        /// Mesh data.
        data: Option<MeshHandle>,
    },
}

/// A collider: shape, placement and contact parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Collider {
    /// Geometry.
    pub shape: Shape,
    /// Collider-local to solver space.
    pub transform: AffineTransform,
    /// Skin thickness added around the surface.
    pub contact_offset: f64,
    /// Collision filter.
    pub filter: CollisionFilter,
    /// Surface response.
    pub material: ColliderMaterial,
    /// Disabled colliders produce no contacts but keep their frame for pins.
    pub enabled: bool,
}

impl Collider {
    /// Create an enabled collider at the origin.
    #[must_use]
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            transform: AffineTransform::identity(),
            contact_offset: 0.0,
            filter: CollisionFilter::EVERYTHING,
            material: ColliderMaterial::default(),
            enabled: true,
        }
    }

    /// Set the transform.
    #[must_use]
    pub const fn with_transform(mut self, transform: AffineTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Set the contact offset.
    #[must_use]
    pub const fn with_contact_offset(mut self, contact_offset: f64) -> Self {
        self.contact_offset = contact_offset;
        self
    }

    /// Set the filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the material.
    #[must_use]
    pub const fn with_material(mut self, material: ColliderMaterial) -> Self {
        self.material = material;
        self
    }
}
