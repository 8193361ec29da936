//! Elastic mechanisms: acoustic deformation potential and ionized impurity
//! scattering

use super::{ElasticMechanism, MechanismCore};
use crate::bandstructure::Spin;
use crate::constants::{BOLTZMANN, ELECTRON_CHARGE, EPSILON_0, HBAR};
use crate::error::ConfigurationError;
use crate::settings::MaterialSettings;
use ndarray::{Array2, Array3};

pub(crate) fn require(
    settings: &MaterialSettings,
    mechanism: &'static str,
    property: &'static str,
) -> Result<f64, ConfigurationError> {
    settings
        .property(property)
        .ok_or_else(|| ConfigurationError::MissingProperty {
            mechanism: mechanism.into(),
            property: property.into(),
        })
}

/// Acoustic deformation potential scattering.
///
/// The matrix element of a long-wavelength acoustic phonon is independent of
/// the momentum transfer, so the factor is flat and the whole temperature
/// dependence sits in the prefactor.
pub struct AcousticDeformation {
    temperatures: Vec<f64>,
    num_doping: usize,
    deformation_potential: f64,
    elastic_constant: f64,
}

impl AcousticDeformation {
    /// Registry name
    pub const NAME: &'static str = "ADP";

    /// Build from `deformation_potential` (eV) and `elastic_constant` (GPa)
    pub fn new(settings: &MaterialSettings) -> Result<Self, ConfigurationError> {
        Ok(Self {
            temperatures: settings.temperatures.clone(),
            num_doping: settings.num_doping(),
            deformation_potential: require(settings, Self::NAME, "deformation_potential")?,
            elastic_constant: require(settings, Self::NAME, "elastic_constant")?,
        })
    }
}

impl MechanismCore for AcousticDeformation {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn prefactor(&self, _spin: Spin, _band: usize) -> Array2<f64> {
        let coupling = (self.deformation_potential * ELECTRON_CHARGE).powi(2)
            / (4.0 * std::f64::consts::PI.powi(2) * HBAR * self.elastic_constant * 1e9);
        let mut prefactor = Array2::zeros((self.num_doping, self.temperatures.len()));
        for (t, &temperature) in self.temperatures.iter().enumerate() {
            let value = coupling * BOLTZMANN * temperature / ELECTRON_CHARGE;
            prefactor.column_mut(t).fill(value);
        }
        prefactor
    }
}

impl ElasticMechanism for AcousticDeformation {
    fn factor(&self, momentum_transfer_sq: &[f64]) -> Array3<f64> {
        Array3::ones((
            self.num_doping,
            self.temperatures.len(),
            momentum_transfer_sq.len(),
        ))
    }
}

/// Ionized impurity scattering with Brooks-Herring screening
#[derive(Debug)]
pub struct IonizedImpurity {
    temperatures: Vec<f64>,
    doping: Vec<f64>,
    static_dielectric: f64,
    /// Inverse screening length squared per (doping, temperature), in 1 / m²
    inverse_screening_length_sq: Array2<f64>,
}

impl IonizedImpurity {
    /// Registry name
    pub const NAME: &'static str = "IMP";

    /// Build from `static_dielectric`; the impurity concentration is read from
    /// the doping table
    pub fn new(settings: &MaterialSettings) -> Result<Self, ConfigurationError> {
        let static_dielectric = require(settings, Self::NAME, "static_dielectric")?;
        let mut inverse_screening_length_sq =
            Array2::zeros((settings.num_doping(), settings.num_temperatures()));
        for (d, &concentration) in settings.doping.iter().enumerate() {
            for (t, &temperature) in settings.temperatures.iter().enumerate() {
                inverse_screening_length_sq[(d, t)] = concentration.abs()
                    * ELECTRON_CHARGE.powi(2)
                    / (static_dielectric * EPSILON_0 * BOLTZMANN * temperature);
            }
        }
        Ok(Self {
            temperatures: settings.temperatures.clone(),
            doping: settings.doping.clone(),
            static_dielectric,
            inverse_screening_length_sq,
        })
    }
}

impl MechanismCore for IonizedImpurity {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn prefactor(&self, _spin: Spin, _band: usize) -> Array2<f64> {
        let coulomb = ELECTRON_CHARGE.powi(2)
            / (4.0 * std::f64::consts::PI * self.static_dielectric * EPSILON_0);
        let value = 2.0 * std::f64::consts::PI * coulomb.powi(2) / HBAR;
        Array2::from_elem((self.doping.len(), self.temperatures.len()), value)
    }
}

impl ElasticMechanism for IonizedImpurity {
    fn factor(&self, momentum_transfer_sq: &[f64]) -> Array3<f64> {
        let mut factor = Array3::zeros((
            self.doping.len(),
            self.temperatures.len(),
            momentum_transfer_sq.len(),
        ));
        for (d, &concentration) in self.doping.iter().enumerate() {
            for t in 0..self.temperatures.len() {
                let screening = self.inverse_screening_length_sq[(d, t)];
                for (p, &transfer_sq) in momentum_transfer_sq.iter().enumerate() {
                    factor[(d, t, p)] = concentration.abs() / (transfer_sq + screening).powi(2);
                }
            }
        }
        factor
    }
}
