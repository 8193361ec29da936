//! # Scattering
//!
//! The pluggable scattering mechanisms and their registry. A mechanism is
//! polymorphic over its capability class: elastic and inelastic mechanisms are
//! evaluated point-by-point over iso-surface cross sections by the kernel,
//! while basic mechanisms provide closed-form rates directly. Mechanisms are
//! constructed once from the material settings and are stateless afterwards,
//! so they are safe to invoke from every worker.

pub mod basic;
pub mod elastic;
pub mod inelastic;
mod registry;

pub use registry::{resolve_mechanisms, MechanismDescriptor, MECHANISM_TABLE};

use crate::bandstructure::{BandStructure, Spin};
use ndarray::{Array2, Array3, ArrayView2};

/// The capability class of a mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismKind {
    /// Closed-form rates, no iso-surface integration
    Basic,
    /// Energy-conserving transitions on the source iso-surface
    Elastic,
    /// Phonon emission and absorption at the shifted iso-surfaces
    Inelastic,
}

/// Operations common to every mechanism
pub trait MechanismCore: Send + Sync {
    /// The registry name of the mechanism
    fn name(&self) -> &'static str;

    /// The part of the rate formula constant over one band, per
    /// (doping, temperature) pair, in 1 / s up to the factor normalisation
    fn prefactor(&self, spin: Spin, band: usize) -> Array2<f64>;
}

/// A mechanism whose transitions conserve energy
pub trait ElasticMechanism: MechanismCore {
    /// The momentum-dependent part of the rate formula, evaluated at each
    /// squared momentum transfer (in 1 / m²); shape
    /// (doping, temperature, point)
    fn factor(&self, momentum_transfer_sq: &[f64]) -> Array3<f64>;
}

/// A mechanism exchanging a fixed phonon energy with the lattice
pub trait InelasticMechanism: MechanismCore {
    /// The phonon energy ħω in eV
    fn phonon_energy(&self) -> f64;

    /// The momentum-dependent part of the rate formula for emission or
    /// absorption; `occupation` is the Fermi-Dirac occupation of the final
    /// state per (doping, temperature) pair. Shape (doping, temperature, point).
    fn factor(
        &self,
        momentum_transfer_sq: &[f64],
        emission: bool,
        occupation: ArrayView2<f64>,
    ) -> Array3<f64>;
}

/// A mechanism with closed-form rates
pub trait BasicMechanism: MechanismCore {
    /// The rate of every k-point of one band, shape
    /// (doping, temperature, k-point), in 1 / s
    fn rates(&self, spin: Spin, band: usize, band_structure: &dyn BandStructure) -> Array3<f64>;
}

/// A constructed mechanism, tagged by capability class
pub enum ScatteringMechanism {
    /// Evaluated on the source iso-surface
    Elastic(Box<dyn ElasticMechanism>),
    /// Evaluated on the emission and absorption iso-surfaces
    Inelastic(Box<dyn InelasticMechanism>),
    /// Filled directly from closed-form rates
    Basic(Box<dyn BasicMechanism>),
}

impl ScatteringMechanism {
    /// The registry name of the mechanism
    pub fn name(&self) -> &'static str {
        match self {
            ScatteringMechanism::Elastic(mechanism) => mechanism.name(),
            ScatteringMechanism::Inelastic(mechanism) => mechanism.name(),
            ScatteringMechanism::Basic(mechanism) => mechanism.name(),
        }
    }

    /// The capability class of the mechanism
    pub fn kind(&self) -> MechanismKind {
        match self {
            ScatteringMechanism::Elastic(_) => MechanismKind::Elastic,
            ScatteringMechanism::Inelastic(_) => MechanismKind::Inelastic,
            ScatteringMechanism::Basic(_) => MechanismKind::Basic,
        }
    }

    /// The per-band prefactor of the mechanism
    pub fn prefactor(&self, spin: Spin, band: usize) -> Array2<f64> {
        match self {
            ScatteringMechanism::Elastic(mechanism) => mechanism.prefactor(spin, band),
            ScatteringMechanism::Inelastic(mechanism) => mechanism.prefactor(spin, band),
            ScatteringMechanism::Basic(mechanism) => mechanism.prefactor(spin, band),
        }
    }
}
