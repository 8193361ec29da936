//! Inelastic mechanisms: polar optical phonon emission and absorption

use super::{InelasticMechanism, MechanismCore};
use crate::bandstructure::Spin;
use crate::constants::{BOLTZMANN_EV, ELECTRON_CHARGE, EPSILON_0, HBAR_EV};
use crate::error::ConfigurationError;
use crate::scattering::elastic::require;
use crate::settings::MaterialSettings;
use ndarray::{Array2, Array3, ArrayView2};

/// Fröhlich coupling to the dominant longitudinal optical phonon.
///
/// Emission weights transitions by (1 + n₀ - f'), absorption by (n₀ + f'),
/// where n₀ is the Bose occupation of the phonon mode and f' the Fermi-Dirac
/// occupation of the final state; the matrix element carries the polar 1 / q²
/// divergence.
pub struct PolarOptical {
    temperatures: Vec<f64>,
    num_doping: usize,
    /// ħω in eV
    phonon_energy: f64,
    /// Bose occupation of the phonon mode per temperature
    phonon_occupation: Vec<f64>,
    static_dielectric: f64,
    high_frequency_dielectric: f64,
}

impl PolarOptical {
    /// Registry name
    pub const NAME: &'static str = "POP";

    /// Build from `pop_frequency` (THz), `static_dielectric` and
    /// `high_frequency_dielectric`
    pub fn new(settings: &MaterialSettings) -> Result<Self, ConfigurationError> {
        let frequency = require(settings, Self::NAME, "pop_frequency")?;
        let phonon_energy = HBAR_EV * 2.0 * std::f64::consts::PI * frequency * 1e12;
        let phonon_occupation = settings
            .temperatures
            .iter()
            .map(|&temperature| 1.0 / ((phonon_energy / (BOLTZMANN_EV * temperature)).exp() - 1.0))
            .collect();
        Ok(Self {
            temperatures: settings.temperatures.clone(),
            num_doping: settings.num_doping(),
            phonon_energy,
            phonon_occupation,
            static_dielectric: require(settings, Self::NAME, "static_dielectric")?,
            high_frequency_dielectric: require(settings, Self::NAME, "high_frequency_dielectric")?,
        })
    }
}

impl MechanismCore for PolarOptical {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn prefactor(&self, _spin: Spin, _band: usize) -> Array2<f64> {
        // The Fröhlich coupling weighted by the inverse effective dielectric
        // response, constant over bands and doping
        let omega = self.phonon_energy / HBAR_EV;
        let inverse_response =
            1.0 / self.high_frequency_dielectric - 1.0 / self.static_dielectric;
        let value = ELECTRON_CHARGE.powi(2) * omega * inverse_response
            / (8.0 * std::f64::consts::PI * EPSILON_0 * ELECTRON_CHARGE);
        Array2::from_elem((self.num_doping, self.temperatures.len()), value.abs())
    }
}

impl InelasticMechanism for PolarOptical {
    fn phonon_energy(&self) -> f64 {
        self.phonon_energy
    }

    fn factor(
        &self,
        momentum_transfer_sq: &[f64],
        emission: bool,
        occupation: ArrayView2<f64>,
    ) -> Array3<f64> {
        let mut factor = Array3::zeros((
            self.num_doping,
            self.temperatures.len(),
            momentum_transfer_sq.len(),
        ));
        for d in 0..self.num_doping {
            for (t, &bose) in self.phonon_occupation.iter().enumerate() {
                let weight = if emission {
                    1.0 + bose - occupation[(d, t)]
                } else {
                    bose + occupation[(d, t)]
                };
                for (p, &transfer_sq) in momentum_transfer_sq.iter().enumerate() {
                    factor[(d, t, p)] = weight / transfer_sq;
                }
            }
        }
        factor
    }
}
