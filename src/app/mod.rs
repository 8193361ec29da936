//! The command line application. Loads the material settings, generates a
//! parabolic-band demonstration band structure and runs the full rate
//! calculation over it.

mod telemetry;

use crate::assembler::compute_all_rates;
use crate::bandstructure::tetrahedra::{gamma_centered_kpoints, mesh_tetrahedra};
use crate::bandstructure::{BandStructure, DenseBandStructure, EnergyWindow, Spin};
use crate::constants::{BOLTZMANN_EV, ELECTRON_CHARGE, ELECTRON_MASS, HBAR, SENTINEL_RATE};
use crate::overlap::{VelocityMrta, WavefunctionOverlap};
use crate::settings::MaterialSettings;
use clap::{ArgEnum, Parser};
use color_eyre::eyre::eyre;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct App {
    /// Path to the material settings file
    file_path: Option<PathBuf>,
    #[clap(arg_enum, short, long)]
    log_level: LogLevel,
    /// Linear dimension of the demonstration k-point mesh
    #[clap(short, long, default_value_t = 24)]
    mesh: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
enum LogLevel {
    Trace,
    Info,
    Debug,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
        };
        write!(f, "{level}")
    }
}

/// Entry point of the binary
pub fn run() -> color_eyre::Result<()> {
    let cli = App::parse();
    let (subscriber, _guard) = telemetry::get_subscriber(cli.log_level);
    telemetry::init_subscriber(subscriber);

    let path = cli
        .file_path
        .ok_or(eyre!("A settings file path needs to be passed."))?;
    let settings = Arc::new(MaterialSettings::from_file(path)?);

    let band_structure: Arc<dyn BandStructure> =
        Arc::new(parabolic_band_structure(cli.mesh, &settings));
    let overlap = Arc::new(free_carrier_overlap(band_structure.as_ref()));
    let momentum_relaxation = Arc::new(VelocityMrta::new(Arc::clone(&band_structure)));

    let tensor = compute_all_rates(
        Arc::clone(&settings),
        band_structure,
        overlap,
        Some(momentum_relaxation),
    )?;

    for (&spin, rates) in &tensor.rates {
        for (row, name) in tensor.mechanisms.iter().enumerate() {
            for (d, &doping) in settings.doping.iter().enumerate() {
                for (t, &temperature) in settings.temperatures.iter().enumerate() {
                    let computed: Vec<f64> = rates
                        .index_axis(ndarray::Axis(0), row)
                        .index_axis(ndarray::Axis(0), d)
                        .index_axis(ndarray::Axis(0), t)
                        .iter()
                        .copied()
                        .filter(|&rate| rate < SENTINEL_RATE)
                        .collect();
                    let mean = computed.iter().sum::<f64>() / computed.len().max(1) as f64;
                    tracing::info!(
                        "{name} ({spin:?}) at n = {doping:.2e} 1 / m^3, T = {temperature} K: \
                         mean in-window rate {mean:.3e} 1 / s"
                    );
                }
            }
        }
    }
    Ok(())
}

/// A single isotropic parabolic conduction band on a Γ-centred cubic mesh.
///
/// The band mass comes from the `effective_mass` property (in units of the
/// bare electron mass) and the cell size from `lattice_constant` (in nm). The
/// cutoff window spans every Fermi level padded by 9 kT at the hottest
/// temperature.
fn parabolic_band_structure(mesh_dimension: usize, settings: &MaterialSettings) -> DenseBandStructure {
    let mesh = [mesh_dimension, mesh_dimension, mesh_dimension];
    let kpoints = gamma_centered_kpoints(mesh);
    let num_kpoints = kpoints.nrows();

    let effective_mass = settings.property("effective_mass").unwrap_or(0.067) * ELECTRON_MASS;
    let lattice_constant = settings.property("lattice_constant").unwrap_or(0.565) * 1e-9;
    let reciprocal =
        Matrix3::identity() * (2.0 * std::f64::consts::PI / lattice_constant);

    let mut energies = Array2::zeros((1, num_kpoints));
    let mut velocities = Array3::zeros((1, num_kpoints, 3));
    for kpoint in 0..num_kpoints {
        let cartesian = reciprocal
            * Vector3::new(
                kpoints[(kpoint, 0)],
                kpoints[(kpoint, 1)],
                kpoints[(kpoint, 2)],
            );
        energies[(0, kpoint)] =
            (HBAR * cartesian.norm()).powi(2) / (2.0 * effective_mass) / ELECTRON_CHARGE;
        for axis in 0..3 {
            velocities[(0, kpoint, axis)] = HBAR * cartesian[axis] / effective_mass;
        }
    }

    let hottest = settings
        .temperatures
        .iter()
        .fold(0.0_f64, |hottest, &temperature| hottest.max(temperature));
    let fermi_levels: Vec<f64> = settings.fermi_levels.iter().flatten().copied().collect();
    let pad = 9.0 * BOLTZMANN_EV * hottest;
    let window = EnergyWindow {
        low: fermi_levels.iter().fold(f64::INFINITY, |low, &f| low.min(f)) - pad,
        high: fermi_levels
            .iter()
            .fold(f64::NEG_INFINITY, |high, &f| high.max(f))
            + pad,
    };

    DenseBandStructure::new(
        HashMap::from([(Spin::Up, energies)]),
        HashMap::from([(Spin::Up, velocities)]),
        kpoints,
        reciprocal,
        mesh,
        mesh_tetrahedra(mesh),
        (0..num_kpoints).collect(),
        (0..num_kpoints).collect(),
        window,
    )
}

// A plane-wave-like carrier: a single coefficient, so every overlap is unity
fn free_carrier_overlap(band_structure: &dyn BandStructure) -> WavefunctionOverlap {
    let mut coefficients = Array3::zeros((band_structure.num_bands(), band_structure.num_kpoints(), 1));
    coefficients.fill(Complex64::new(1.0, 0.0));
    WavefunctionOverlap::new(HashMap::from([(Spin::Up, coefficients)]))
}
