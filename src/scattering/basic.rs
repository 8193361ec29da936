//! Basic mechanisms with closed-form rates: constant relaxation time and mean
//! free path

use super::{BasicMechanism, MechanismCore};
use crate::bandstructure::{BandStructure, Spin};
use crate::error::ConfigurationError;
use crate::scattering::elastic::require;
use crate::settings::MaterialSettings;
use ndarray::{Array2, Array3};

/// A single lifetime applied to every state
pub struct ConstantRelaxationTime {
    num_doping: usize,
    num_temperatures: usize,
    /// The lifetime in seconds
    lifetime: f64,
}

impl ConstantRelaxationTime {
    /// Registry name
    pub const NAME: &'static str = "CRT";

    /// Build from the `constant_relaxation_time` property, in seconds
    pub fn new(settings: &MaterialSettings) -> Result<Self, ConfigurationError> {
        let lifetime = require(settings, Self::NAME, "constant_relaxation_time")?;
        Ok(Self::with_lifetime(settings, lifetime))
    }

    /// Build with an explicit lifetime, as requested by a numeric mechanism
    /// selection
    pub fn with_lifetime(settings: &MaterialSettings, lifetime: f64) -> Self {
        Self {
            num_doping: settings.num_doping(),
            num_temperatures: settings.num_temperatures(),
            lifetime,
        }
    }
}

impl MechanismCore for ConstantRelaxationTime {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn prefactor(&self, _spin: Spin, _band: usize) -> Array2<f64> {
        Array2::ones((self.num_doping, self.num_temperatures))
    }
}

impl BasicMechanism for ConstantRelaxationTime {
    fn rates(&self, _spin: Spin, _band: usize, band_structure: &dyn BandStructure) -> Array3<f64> {
        Array3::from_elem(
            (
                self.num_doping,
                self.num_temperatures,
                band_structure.num_kpoints(),
            ),
            1.0 / self.lifetime,
        )
    }
}

/// A fixed mean free path: the rate is the group speed over the path length
pub struct MeanFreePath {
    num_doping: usize,
    num_temperatures: usize,
    /// The path length in metres
    path_length: f64,
}

impl MeanFreePath {
    /// Registry name
    pub const NAME: &'static str = "MFP";

    /// Build from the `mean_free_path` property, in nanometres
    pub fn new(settings: &MaterialSettings) -> Result<Self, ConfigurationError> {
        Ok(Self {
            num_doping: settings.num_doping(),
            num_temperatures: settings.num_temperatures(),
            path_length: require(settings, Self::NAME, "mean_free_path")? * 1e-9,
        })
    }
}

impl MechanismCore for MeanFreePath {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn prefactor(&self, _spin: Spin, _band: usize) -> Array2<f64> {
        Array2::ones((self.num_doping, self.num_temperatures))
    }
}

impl BasicMechanism for MeanFreePath {
    fn rates(&self, spin: Spin, band: usize, band_structure: &dyn BandStructure) -> Array3<f64> {
        let velocities = band_structure.velocities(spin);
        let num_kpoints = band_structure.num_kpoints();
        let mut rates = Array3::zeros((self.num_doping, self.num_temperatures, num_kpoints));
        for kpoint in 0..num_kpoints {
            let speed = (0..3)
                .map(|axis| velocities[(band, kpoint, axis)].powi(2))
                .sum::<f64>()
                .sqrt();
            let rate = speed / self.path_length;
            rates
                .index_axis_mut(ndarray::Axis(2), kpoint)
                .fill(rate);
        }
        rates
    }
}
