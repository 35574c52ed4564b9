//! Rope and rod materials.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Constraint parameters of a rope.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RopeMaterial {
    /// Distance compliance (0 = inextensible).
    pub stretch_compliance: f64,
    /// Compression tolerated before distance constraints push back, as a
    /// fraction of the segment rest length.
    pub max_compression: f64,
    /// Bend compliance.
    pub bend_compliance: f64,
    /// Bend dead zone.
    pub max_bending: f64,
    /// Bend deviation above which the rest shape creeps.
    pub plastic_yield: f64,
    /// Plastic creep rate. Zero is purely elastic.
    pub plastic_creep: f64,
    /// Whether stretched segments may tear.
    pub tearing_enabled: bool,
    /// Force an element must exceed to tear, scaled by its own resistance.
    pub tear_resistance_multiplier: f64,
    /// Maximum number of elements torn per step.
    pub tear_rate: usize,
}

impl Default for RopeMaterial {
    fn default() -> Self {
        Self::rope()
    }
}

impl RopeMaterial {
    /// General purpose rope: nearly inextensible, flexible.
    #[must_use]
    pub const fn rope() -> Self {
        Self {
            stretch_compliance: 0.0,
            max_compression: 0.0,
            bend_compliance: 0.0,
            max_bending: 0.025,
            plastic_yield: 0.0,
            plastic_creep: 0.0,
            tearing_enabled: false,
            tear_resistance_multiplier: 1000.0,
            tear_rate: 1,
        }
    }

    /// Elastic cord that stretches and buckles freely.
    #[must_use]
    pub const fn elastic() -> Self {
        Self {
            stretch_compliance: 1e-3,
            max_compression: 0.5,
            bend_compliance: 0.1,
            ..Self::rope()
        }
    }

    /// Stiff cable.
    #[must_use]
    pub const fn cable() -> Self {
        Self {
            bend_compliance: 1e-4,
            max_bending: 0.0,
            ..Self::rope()
        }
    }

    /// Wire that keeps the shape it is bent into.
    #[must_use]
    pub const fn wire() -> Self {
        Self {
            bend_compliance: 1e-4,
            max_bending: 0.0,
            plastic_yield: 0.005,
            plastic_creep: 0.5,
            ..Self::rope()
        }
    }

    /// Enable tearing above a force threshold.
    #[must_use]
    pub const fn with_tearing(mut self, resistance: f64, rate: usize) -> Self {
        self.tearing_enabled = true;
        self.tear_resistance_multiplier = resistance;
        self.tear_rate = rate;
        self
    }
}

/// Constraint parameters of a rod.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RodMaterial {
    /// Stretch compliance along the rod.
    pub stretch_compliance: f64,
    /// Shear compliance around local X.
    pub shear_compliance_x: f64,
    /// Shear compliance around local Y.
    pub shear_compliance_y: f64,
    /// Bend compliance around local X.
    pub bend_compliance_x: f64,
    /// Bend compliance around local Y.
    pub bend_compliance_y: f64,
    /// Torsion compliance.
    pub torsion_compliance: f64,
    /// Bend/twist deviation above which the rest shape creeps.
    pub plastic_yield: f64,
    /// Plastic creep rate.
    pub plastic_creep: f64,
    /// Whether to add a chain constraint over the whole rod.
    pub chain_constraints: bool,
    /// Fraction of the rest length each chain edge may reach.
    pub tightness: f64,
}

impl Default for RodMaterial {
    fn default() -> Self {
        Self::rod()
    }
}

impl RodMaterial {
    /// Straight, rigid rod.
    #[must_use]
    pub const fn rod() -> Self {
        Self {
            stretch_compliance: 0.0,
            shear_compliance_x: 0.0,
            shear_compliance_y: 0.0,
            bend_compliance_x: 0.0,
            bend_compliance_y: 0.0,
            torsion_compliance: 0.0,
            plastic_yield: 0.0,
            plastic_creep: 0.0,
            chain_constraints: true,
            tightness: 1.0,
        }
    }

    /// Soft hose that bends easily but resists twisting.
    #[must_use]
    pub const fn hose() -> Self {
        Self {
            bend_compliance_x: 0.05,
            bend_compliance_y: 0.05,
            torsion_compliance: 1e-3,
            ..Self::rod()
        }
    }

    /// Spring steel that bends under load and springs back.
    #[must_use]
    pub const fn spring() -> Self {
        Self {
            bend_compliance_x: 1e-3,
            bend_compliance_y: 1e-3,
            torsion_compliance: 1e-3,
            ..Self::rod()
        }
    }

    /// Loose chain links: no bend or twist resistance to speak of.
    #[must_use]
    pub const fn chain() -> Self {
        Self {
            bend_compliance_x: 10.0,
            bend_compliance_y: 10.0,
            torsion_compliance: 10.0,
            ..Self::rod()
        }
    }

    /// Set the chain tightness.
    #[must_use]
    pub const fn with_tightness(mut self, tightness: f64) -> Self {
        self.tightness = tightness;
        self
    }
}
