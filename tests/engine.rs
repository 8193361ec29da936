//! End-to-end properties of the rate engine on a parabolic conduction band.

use kscatter::assembler::compute_all_rates;
use kscatter::bandstructure::tetrahedra::{gamma_centered_kpoints, mesh_tetrahedra};
use kscatter::bandstructure::{BandStructure, DenseBandStructure, EnergyWindow, Spin};
use kscatter::constants::{ELECTRON_CHARGE, ELECTRON_MASS, HBAR, SENTINEL_RATE};
use kscatter::error::{ConfigurationError, Error};
use kscatter::overlap::WavefunctionOverlap;
use kscatter::settings::{MaterialSettings, MechanismSelection};
use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use std::collections::HashMap;
use std::sync::Arc;

fn settings(selection: MechanismSelection, nworkers: usize) -> MaterialSettings {
    MaterialSettings {
        mechanisms: selection,
        nworkers: Some(nworkers),
        cache_wavefunction: true,
        progress_bar: false,
        cache_memory_limit: None,
        rate_floor: 1e7,
        doping: vec![-1e23, -1e24],
        temperatures: vec![300.0],
        fermi_levels: vec![vec![0.1], vec![0.12]],
        properties: HashMap::from([
            ("deformation_potential".to_string(), 8.6),
            ("elastic_constant".to_string(), 139.7),
            ("static_dielectric".to_string(), 12.9),
            ("high_frequency_dielectric".to_string(), 10.9),
            ("pop_frequency".to_string(), 8.16),
        ]),
    }
}

/// Fold a mesh index onto its inversion partner, per axis
fn inversion_partner(index: usize, mesh: usize) -> usize {
    let iz = index % mesh;
    let iy = (index / mesh) % mesh;
    let ix = index / (mesh * mesh);
    let fold = |i: usize| (mesh - i) % mesh;
    (fold(ix) * mesh + fold(iy)) * mesh + fold(iz)
}

/// A parabolic band on an n x n x n mesh; with `inversion` the irreducible set
/// keeps one point of each (k, -k) orbit, otherwise every point is its own
/// representative.
fn parabolic_band(mesh_dimension: usize, inversion: bool) -> Arc<DenseBandStructure> {
    let mesh = [mesh_dimension; 3];
    let kpoints = gamma_centered_kpoints(mesh);
    let num_kpoints = kpoints.nrows();
    let reciprocal = Matrix3::identity() * (2.0 * std::f64::consts::PI / 5.65e-10);
    // A heavy band keeps a healthy share of the mesh inside the window
    let effective_mass = ELECTRON_MASS;

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

    let (ir_kpoints_idx, ir_to_full_idx) = if inversion {
        let representatives: Vec<usize> = (0..num_kpoints)
            .map(|kpoint| kpoint.min(inversion_partner(kpoint, mesh_dimension)))
            .collect();
        let mut ir_kpoints_idx: Vec<usize> = representatives.clone();
        ir_kpoints_idx.sort_unstable();
        ir_kpoints_idx.dedup();
        let ir_to_full_idx = representatives
            .iter()
            .map(|representative| {
                ir_kpoints_idx
                    .binary_search(representative)
                    .expect("every representative is in the irreducible list")
            })
            .collect();
        (ir_kpoints_idx, ir_to_full_idx)
    } else {
        ((0..num_kpoints).collect(), (0..num_kpoints).collect())
    };

    Arc::new(DenseBandStructure::new(
        HashMap::from([(Spin::Up, energies)]),
        HashMap::from([(Spin::Up, velocities)]),
        kpoints,
        reciprocal,
        mesh,
        mesh_tetrahedra(mesh),
        ir_kpoints_idx,
        ir_to_full_idx,
        EnergyWindow {
            low: 0.0,
            high: 0.5,
        },
    ))
}

fn unit_overlap(band_structure: &dyn BandStructure) -> Arc<WavefunctionOverlap> {
    let mut coefficients = Array3::zeros((
        band_structure.num_bands(),
        band_structure.num_kpoints(),
        2,
    ));
    coefficients
        .index_axis_mut(ndarray::Axis(2), 0)
        .fill(Complex64::new(1.0, 0.0));
    Arc::new(WavefunctionOverlap::new(HashMap::from([(
        Spin::Up,
        coefficients,
    )])))
}

#[test]
fn rates_are_finite_and_non_negative_with_exact_sentinels_outside_the_window() {
    let band_structure = parabolic_band(6, false);
    let tensor = compute_all_rates(
        Arc::new(settings(MechanismSelection::Auto, 2)),
        band_structure.clone(),
        unit_overlap(band_structure.as_ref()),
        None,
    )
    .unwrap();
    assert_eq!(tensor.mechanisms, vec!["ADP", "IMP", "POP"]);

    let rates = &tensor.rates[&Spin::Up];
    let energies = band_structure.energies(Spin::Up);
    let window = band_structure.energy_window();
    let mut in_window = 0;
    for ((row, _, _, band, kpoint), &rate) in rates.indexed_iter() {
        assert!(rate.is_finite() && rate >= 0.0, "negative rate in row {row}");
        if window.contains(energies[(band, kpoint)]) {
            in_window += 1;
        } else {
            assert_eq!(rate, SENTINEL_RATE);
        }
    }
    assert!(in_window > 0, "the window must cover part of the band");

    // The mechanism-summed total keeps one sentinel per mechanism outside the
    // window, so excluded states stay effectively infinite downstream
    let total = tensor.total(Spin::Up);
    for ((d, t, band, kpoint), &value) in total.indexed_iter() {
        let summed: f64 = (0..rates.dim().0)
            .map(|row| rates[(row, d, t, band, kpoint)])
            .sum();
        assert_relative_eq!(value, summed, max_relative = 1e-12);
        if !window.contains(energies[(band, kpoint)]) {
            assert_eq!(value, rates.dim().0 as f64 * SENTINEL_RATE);
        }
    }
}

#[test]
fn the_tensor_does_not_depend_on_worker_count_or_completion_order() {
    let band_structure = parabolic_band(6, false);
    let overlap = unit_overlap(band_structure.as_ref());
    let serial = compute_all_rates(
        Arc::new(settings(MechanismSelection::Auto, 1)),
        band_structure.clone(),
        overlap.clone(),
        None,
    )
    .unwrap();
    let pooled = compute_all_rates(
        Arc::new(settings(MechanismSelection::Auto, 3)),
        band_structure,
        overlap,
        None,
    )
    .unwrap();

    let serial = &serial.rates[&Spin::Up];
    let pooled = &pooled.rates[&Spin::Up];
    assert_eq!(serial.dim(), pooled.dim());
    // Each (mechanism, column) entry is filled by exactly one job, so the
    // tensors agree bitwise whatever the completion order
    for (serial, pooled) in serial.iter().zip(pooled.iter()) {
        assert_eq!(serial, pooled);
    }
}

#[test]
fn every_kpoint_carries_the_rate_of_its_symmetry_representative() {
    let band_structure = parabolic_band(4, true);
    assert!(band_structure.ir_kpoints_idx().len() < band_structure.num_kpoints());
    let tensor = compute_all_rates(
        Arc::new(settings(MechanismSelection::Auto, 2)),
        band_structure.clone(),
        unit_overlap(band_structure.as_ref()),
        None,
    )
    .unwrap();

    let rates = &tensor.rates[&Spin::Up];
    let ir_kpoints_idx = band_structure.ir_kpoints_idx();
    let ir_to_full_idx = band_structure.ir_to_full_idx();
    for kpoint in 0..band_structure.num_kpoints() {
        let representative = ir_kpoints_idx[ir_to_full_idx[kpoint]];
        for row in 0..rates.dim().0 {
            for d in 0..rates.dim().1 {
                for t in 0..rates.dim().2 {
                    for band in 0..rates.dim().3 {
                        assert_eq!(
                            rates[(row, d, t, band, kpoint)],
                            rates[(row, d, t, band, representative)]
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn a_missing_property_fails_the_whole_calculation_with_its_name() {
    let band_structure = parabolic_band(4, false);
    let mut settings = settings(MechanismSelection::Explicit(vec!["POP".into()]), 1);
    settings.properties.remove("pop_frequency");
    match compute_all_rates(
        Arc::new(settings),
        band_structure.clone(),
        unit_overlap(band_structure.as_ref()),
        None,
    ) {
        Err(Error::Configuration(ConfigurationError::MissingProperty {
            mechanism,
            property,
        })) => {
            assert_eq!(mechanism, "POP");
            assert_eq!(property, "pop_frequency");
        }
        Err(other) => panic!("expected MissingProperty, got {other:?}"),
        Ok(_) => panic!("expected MissingProperty, got a rate tensor"),
    }
}
