//! # Settings
//!
//! Material and engine settings supplied by the caller. The settings are
//! immutable for the lifetime of a calculation and are shared read-only with
//! every worker.

use crate::constants::DEFAULT_RATE_FLOOR;
use crate::error::ConfigurationError;
use config::{Config, File};
use ndarray::Array2;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Which scattering mechanisms to activate
#[derive(Debug, Clone, PartialEq)]
pub enum MechanismSelection {
    /// Activate every mechanism whose required material properties are all set
    Auto,
    /// Activate exactly the named mechanisms, failing if any cannot be built
    Explicit(Vec<String>),
    /// Activate a single constant-relaxation-time mechanism with this lifetime
    /// in seconds
    ConstantRate(f64),
}

impl Default for MechanismSelection {
    fn default() -> Self {
        MechanismSelection::Auto
    }
}

// Accepts `"auto"`, a list of names, or a bare number in the settings file.
impl<'de> Deserialize<'de> for MechanismSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Rate(f64),
            Names(Vec<String>),
            Keyword(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Rate(tau) => Ok(MechanismSelection::ConstantRate(tau)),
            Raw::Names(names) => Ok(MechanismSelection::Explicit(names)),
            Raw::Keyword(word) if word == "auto" => Ok(MechanismSelection::Auto),
            Raw::Keyword(word) => Ok(MechanismSelection::Explicit(vec![word])),
        }
    }
}

/// Material properties and engine options, read-only to the engine
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialSettings {
    /// Mechanism selection: `"auto"`, a list of names, or a constant lifetime
    #[serde(default)]
    pub mechanisms: MechanismSelection,
    /// Number of worker threads; defaults to the available hardware parallelism
    #[serde(default)]
    pub nworkers: Option<usize>,
    /// Whether to precompute wavefunction coefficients for the states reachable
    /// from the energy window
    #[serde(default = "default_true")]
    pub cache_wavefunction: bool,
    /// Whether to draw a progress bar while collecting per-band results
    #[serde(default)]
    pub progress_bar: bool,
    /// Upper bound, in bytes, on the size of the coefficient cache; exceeding
    /// it disables the cache rather than failing the calculation
    #[serde(default)]
    pub cache_memory_limit: Option<usize>,
    /// In-window rates below this floor (in 1 / s) are treated as
    /// under-sampled by the post-processor
    #[serde(default = "default_rate_floor")]
    pub rate_floor: f64,
    /// Doping concentrations in 1 / m^3; negative values are n-type
    pub doping: Vec<f64>,
    /// Temperatures in K
    pub temperatures: Vec<f64>,
    /// Fermi level in eV for each (doping, temperature) pair
    pub fermi_levels: Vec<Vec<f64>>,
    /// Mechanism-specific physical parameters, keyed by property name.
    /// A property absent from the map is "not set" for mechanism resolution.
    #[serde(default)]
    pub properties: HashMap<String, f64>,
}

fn default_true() -> bool {
    true
}

fn default_rate_floor() -> f64 {
    DEFAULT_RATE_FLOOR
}

impl MaterialSettings {
    /// Load settings from a TOML file, with an optional `local` override file
    /// next to it in the manner of layered run configurations
    pub fn from_file<P: AsRef<Path>>(path: P) -> color_eyre::Result<Self> {
        let path = path.as_ref();
        let s = Config::builder()
            .add_source(File::from(path))
            .add_source(File::from(path.with_extension("local.toml")).required(false))
            .build()?;
        let settings: MaterialSettings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Confirm the doping / temperature / Fermi-level tables are consistent
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.doping.is_empty() || self.temperatures.is_empty() {
            return Err(ConfigurationError::InvalidSettings(
                "at least one doping concentration and one temperature are required".into(),
            ));
        }
        if self.fermi_levels.len() != self.doping.len()
            || self
                .fermi_levels
                .iter()
                .any(|row| row.len() != self.temperatures.len())
        {
            return Err(ConfigurationError::InvalidSettings(format!(
                "fermi_levels must be a {} x {} table matching doping x temperatures",
                self.doping.len(),
                self.temperatures.len()
            )));
        }
        Ok(())
    }

    /// The number of (doping, temperature) pairs
    pub fn num_doping(&self) -> usize {
        self.doping.len()
    }

    /// The number of temperatures
    pub fn num_temperatures(&self) -> usize {
        self.temperatures.len()
    }

    /// The Fermi levels as a dense (doping, temperature) array in eV
    pub fn fermi_level_table(&self) -> Array2<f64> {
        let mut table = Array2::zeros((self.doping.len(), self.temperatures.len()));
        for (d, row) in self.fermi_levels.iter().enumerate() {
            for (t, &level) in row.iter().enumerate() {
                table[(d, t)] = level;
            }
        }
        table
    }

    /// Look up a material property, `None` if it is not set
    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// The worker count to use, falling back to the hardware parallelism
    pub fn worker_count(&self) -> usize {
        self.nworkers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod test {
    use super::{MaterialSettings, MechanismSelection};

    fn minimal_toml(selection: &str) -> String {
        format!(
            r#"
            mechanisms = {selection}
            doping = [1e22]
            temperatures = [300.0]
            fermi_levels = [[0.1]]
            [properties]
            pop_frequency = 8.16
            "#
        )
    }

    fn parse(selection: &str) -> MaterialSettings {
        let settings: MaterialSettings = config::Config::builder()
            .add_source(config::File::from_str(
                &minimal_toml(selection),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        settings
    }

    #[test]
    fn auto_keyword_parses_to_auto_selection() {
        let settings = parse("\"auto\"");
        assert_eq!(settings.mechanisms, MechanismSelection::Auto);
        assert!(settings.cache_wavefunction);
    }

    #[test]
    fn name_list_parses_to_explicit_selection() {
        let settings = parse("[\"ADP\", \"POP\"]");
        assert_eq!(
            settings.mechanisms,
            MechanismSelection::Explicit(vec!["ADP".into(), "POP".into()])
        );
    }

    #[test]
    fn bare_number_parses_to_constant_rate() {
        let settings = parse("1e-14");
        assert_eq!(settings.mechanisms, MechanismSelection::ConstantRate(1e-14));
    }

    #[test]
    fn mismatched_fermi_level_table_is_rejected() {
        let mut settings = parse("\"auto\"");
        settings.fermi_levels = vec![vec![0.1, 0.2]];
        assert!(settings.validate().is_err());
    }
}
