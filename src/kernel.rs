//! # Kernel
//!
//! The per-job rate evaluation. For one (spin, band, k-point) state the kernel
//! locates the iso-surface of the target energy, resolves the wavefunction
//! overlap with every state on it, projects the momentum transfer onto a fine
//! quadrature mesh over each cross section and reduces the mechanism factors
//! to one partial rate per mechanism and (doping, temperature) pair. The
//! mechanism prefactors are applied once per band by the assembler, not here.
//!
//! Physically degenerate configurations - no intersecting tetrahedra,
//! zero-measure cross sections, NaN from an infinitesimal polygon - are valid
//! zero-rate outcomes and never produce an error.

use crate::bandstructure::nearest_image;
use crate::constants::BOLTZMANN_EV;
use crate::error::KernelError;
use crate::pool::{Job, SharedState};
use crate::quadrature::{sample_cross_section, select_tier};
use crate::scattering::ScatteringMechanism;
use crate::settings::MaterialSettings;
use ndarray::{Array2, Array3};
use std::collections::HashMap;

/// Evaluate one job into partial rates with shape
/// (mechanism, doping, temperature).
///
/// Elastic mechanisms contribute only to jobs without an energy shift,
/// inelastic mechanisms only to shifted jobs; rows of the other class are
/// left at zero. Basic mechanisms never pass through the kernel.
pub fn evaluate(state: &SharedState, job: &Job) -> Result<Array3<f64>, KernelError> {
    let settings = state.settings.as_ref();
    let num_doping = settings.num_doping();
    let num_temperatures = settings.num_temperatures();
    let mut rates = Array3::zeros((state.mechanisms.len(), num_doping, num_temperatures));

    let band_structure = state.band_structure.as_ref();
    let energy = band_structure.energies(job.spin)[(job.band, job.kpoint)]
        + job.energy_shift.unwrap_or(0.0);

    let sections = match band_structure.tetrahedron_cross_sections(job.spin, energy) {
        Some(sections) => sections,
        // No tetrahedron straddles the target energy: the rate is zero
        None => return Ok(rates),
    };

    let pairs = sections.band_kpoint_pairs();
    let overlaps = match &state.coefficients {
        Some(table) => table.overlap(job.spin, job.band, job.kpoint, &pairs)?,
        None => state
            .overlap
            .overlap(job.spin, job.band, job.kpoint, &pairs),
    };
    let momentum_relaxation = match (job.energy_shift, &state.momentum_relaxation) {
        (None, Some(provider)) => {
            Some(provider.mrta_factor(job.spin, job.band, job.kpoint, &pairs))
        }
        _ => None,
    };
    let slots: HashMap<(usize, usize), usize> = pairs
        .iter()
        .copied()
        .enumerate()
        .map(|(slot, pair)| (pair, slot))
        .collect();

    // Occupation of the final states, shared by every cross section of the
    // iso-surface
    let occupation = fermi_occupation(settings, energy);

    let reciprocal = band_structure.reciprocal_lattice();
    let reciprocal_scale = (0..3)
        .map(|axis| reciprocal.column(axis).norm())
        .fold(f64::INFINITY, f64::min);
    let source = {
        let kpoints = band_structure.kpoints();
        nalgebra::Vector3::new(
            kpoints[(job.kpoint, 0)],
            kpoints[(job.kpoint, 1)],
            kpoints[(job.kpoint, 2)],
        )
    };

    for section in &sections.sections {
        // Interpolate overlap (and momentum-relaxation weight) from the
        // tetrahedron vertices onto the cross-section centroid
        let mut overlap_centroid = 0.0;
        let mut relaxation_centroid = 0.0;
        for (vertex, &kpoint) in section.tetrahedron.iter().enumerate() {
            let slot = slots[&(section.band, kpoint)];
            overlap_centroid += section.vertex_weights[vertex] * overlaps[slot];
            if let Some(factors) = &momentum_relaxation {
                relaxation_centroid += section.vertex_weights[vertex] * factors[slot];
            }
        }
        let weighting = match &momentum_relaxation {
            Some(_) => overlap_centroid * relaxation_centroid,
            None => overlap_centroid,
        };

        // The polygon corners are mutually aligned already; shift the whole
        // polygon to the periodic image nearest the source before differencing
        let span = section.centroid() - source;
        let image_offset = nearest_image(span) - span;

        let corner_distances = section
            .corners
            .iter()
            .map(|corner| (reciprocal * (corner + image_offset - source)).norm())
            .fold(f64::INFINITY, f64::min);
        let tier = select_tier(corner_distances, reciprocal_scale);

        let (points, weights) = sample_cross_section(section, tier);
        let momentum_transfer_sq: Vec<f64> = points
            .iter()
            .map(|point| (reciprocal * (point + image_offset - source)).norm_squared())
            .collect();

        for (row, mechanism) in state.mechanisms.iter().enumerate() {
            let factor = match (mechanism, job.energy_shift) {
                (ScatteringMechanism::Elastic(mechanism), None) => {
                    mechanism.factor(&momentum_transfer_sq)
                }
                (ScatteringMechanism::Inelastic(mechanism), Some(shift)) => {
                    // A shifted job targets the iso-surface of one phonon
                    // energy; other inelastic mechanisms have their own jobs
                    if (mechanism.phonon_energy() - shift.abs()).abs() > f64::EPSILON {
                        continue;
                    }
                    mechanism.factor(&momentum_transfer_sq, shift < 0.0, occupation.view())
                }
                _ => continue,
            };
            for d in 0..num_doping {
                for t in 0..num_temperatures {
                    let reduced: f64 = weights
                        .iter()
                        .enumerate()
                        .map(|(point, &weight)| weight * factor[(d, t, point)])
                        .sum();
                    rates[(row, d, t)] += reduced * weighting * section.weight;
                }
            }
        }
    }

    // An infinitesimal cross-section measure can carry a NaN through the
    // reduction; resolve it to a zero rate
    rates.mapv_inplace(|rate| if rate.is_finite() { rate.max(0.0) } else { 0.0 });
    Ok(rates)
}

/// Fermi-Dirac occupation of `energy` per (doping, temperature) pair
pub fn fermi_occupation(settings: &MaterialSettings, energy: f64) -> Array2<f64> {
    let fermi_levels = settings.fermi_level_table();
    let mut occupation = Array2::zeros((settings.num_doping(), settings.num_temperatures()));
    for d in 0..settings.num_doping() {
        for (t, &temperature) in settings.temperatures.iter().enumerate() {
            let reduced = (energy - fermi_levels[(d, t)]) / (BOLTZMANN_EV * temperature);
            occupation[(d, t)] = 1.0 / (1.0 + reduced.exp());
        }
    }
    occupation
}
