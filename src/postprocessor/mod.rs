//! # Post-processor
//!
//! Cleanup passes over the assembled rate tensor. Quadrature over a coarse
//! tetrahedron mesh can under-sample an iso-surface and leave an in-window
//! rate orders of magnitude too small; such rates are repaired from the
//! nearest well-sampled neighbour in the k-mesh. Once every irreducible
//! column is final the tensor is expanded to the full mesh through the
//! symmetry mapping.
//!
//! Both passes are idempotent: repairing an already repaired tensor changes
//! nothing, and expansion overwrites each reducible column with the same
//! representative every time.

use crate::bandstructure::{BandStructure, Spin};
use ndarray::{Array5, Axis};
use nalgebra::Vector3;

/// Repair in-window irreducible rates below `floor` (in 1 / s), in place.
///
/// Each (mechanism, doping, temperature, band) slice is treated independently.
/// A below-floor rate is replaced by the rate of the nearest well-sampled
/// irreducible k-point, with distance measured in the fractional frame folded
/// to [0, 1). When every in-window rate of a slice sits below the floor there
/// is no donor to copy from and the floor is added to the whole slice instead.
///
/// Returns the number of repaired entries.
pub fn repair_low_rates(
    rates: &mut Array5<f64>,
    band_structure: &dyn BandStructure,
    spin: Spin,
    floor: f64,
) -> usize {
    let (num_mechanisms, num_doping, num_temperatures, num_bands, num_kpoints) = rates.dim();
    let energies = band_structure.energies(spin);
    let window = band_structure.energy_window();
    let kpoints = band_structure.kpoints();

    let mut irreducible = vec![false; num_kpoints];
    for &kpoint in band_structure.ir_kpoints_idx() {
        irreducible[kpoint] = true;
    }
    // Fold the fractional coordinates from [-1/2, 1/2) to [0, 1) so the
    // distance search runs in a single contiguous frame
    let folded: Vec<Vector3<f64>> = (0..num_kpoints)
        .map(|kpoint| {
            Vector3::new(
                kpoints[(kpoint, 0)] + 0.5,
                kpoints[(kpoint, 1)] + 0.5,
                kpoints[(kpoint, 2)] + 0.5,
            )
        })
        .collect();

    let mut repaired = 0;
    for mechanism in 0..num_mechanisms {
        for d in 0..num_doping {
            for t in 0..num_temperatures {
                for band in 0..num_bands {
                    let eligible: Vec<usize> = (0..num_kpoints)
                        .filter(|&kpoint| {
                            irreducible[kpoint] && window.contains(energies[(band, kpoint)])
                        })
                        .collect();
                    let mut slice =
                        rates.slice_mut(ndarray::s![mechanism, d, t, band, ..]);
                    let sources: Vec<usize> = eligible
                        .iter()
                        .copied()
                        .filter(|&kpoint| slice[kpoint] >= floor)
                        .collect();
                    let targets: Vec<usize> = eligible
                        .iter()
                        .copied()
                        .filter(|&kpoint| slice[kpoint] < floor)
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    if sources.is_empty() {
                        // Nothing to copy from; lift the whole slice above the
                        // floor instead
                        for &kpoint in &eligible {
                            slice[kpoint] += floor;
                        }
                        repaired += targets.len();
                        continue;
                    }
                    for &target in &targets {
                        let mut nearest = sources[0];
                        let mut nearest_distance = f64::INFINITY;
                        for &source in &sources {
                            let distance = (folded[target] - folded[source]).norm_squared();
                            if distance < nearest_distance {
                                nearest_distance = distance;
                                nearest = source;
                            }
                        }
                        slice[target] = slice[nearest];
                        repaired += 1;
                    }
                }
            }
        }
    }
    if repaired > 0 {
        tracing::warn!(
            "repaired {repaired} under-sampled rates below {floor:.1e} 1 / s; \
             consider a denser k-mesh"
        );
    }
    repaired
}

/// Copy every irreducible column onto the full-mesh columns it represents,
/// in place. After expansion the rate of any k-point equals the rate of its
/// symmetry representative.
pub fn expand_symmetry(rates: &mut Array5<f64>, band_structure: &dyn BandStructure) {
    let ir_kpoints_idx = band_structure.ir_kpoints_idx();
    let ir_to_full_idx = band_structure.ir_to_full_idx();
    for (kpoint, &ir_position) in ir_to_full_idx.iter().enumerate() {
        let representative = ir_kpoints_idx[ir_position];
        if representative == kpoint {
            continue;
        }
        let column = rates.index_axis(Axis(4), representative).to_owned();
        rates.index_axis_mut(Axis(4), kpoint).assign(&column);
    }
}

#[cfg(test)]
mod test {
    use super::{expand_symmetry, repair_low_rates};
    use crate::bandstructure::tetrahedra::{gamma_centered_kpoints, mesh_tetrahedra};
    use crate::bandstructure::{DenseBandStructure, EnergyWindow, Spin};
    use crate::constants::SENTINEL_RATE;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;
    use ndarray::{Array2, Array3, Array5};
    use std::collections::HashMap;

    fn band_structure(
        ir_kpoints_idx: Vec<usize>,
        ir_to_full_idx: Vec<usize>,
        out_of_window: &[usize],
    ) -> DenseBandStructure {
        let mesh = [4, 1, 1];
        let kpoints = gamma_centered_kpoints(mesh);
        let num_kpoints = kpoints.nrows();
        let mut energies = Array2::zeros((1, num_kpoints));
        for &kpoint in out_of_window {
            energies[(0, kpoint)] = 10.0;
        }
        DenseBandStructure::new(
            HashMap::from([(Spin::Up, energies)]),
            HashMap::from([(Spin::Up, Array3::zeros((1, num_kpoints, 3)))]),
            kpoints,
            Matrix3::identity() * 1e10,
            mesh,
            mesh_tetrahedra(mesh),
            ir_kpoints_idx,
            ir_to_full_idx,
            EnergyWindow {
                low: -1.0,
                high: 1.0,
            },
        )
    }

    #[test]
    fn a_low_rate_is_copied_from_the_nearest_well_sampled_point() {
        // Fractional x coordinates on the 4 x 1 x 1 mesh: 0, 1/4, -1/2, -1/4
        let band_structure = band_structure((0..4).collect(), (0..4).collect(), &[]);
        let mut rates = Array5::from_elem((1, 1, 1, 1, 4), 1e9);
        rates[(0, 0, 0, 0, 1)] = 1.0;
        rates[(0, 0, 0, 0, 2)] = 4e9;
        let repaired = repair_low_rates(&mut rates, &band_structure, Spin::Up, 1e7);
        assert_eq!(repaired, 1);
        // x = 1/4 is closer to x = 0 than to x = -1/2 in the folded frame
        assert_relative_eq!(rates[(0, 0, 0, 0, 1)], 1e9);
    }

    #[test]
    fn a_slice_entirely_below_the_floor_is_lifted_uniformly() {
        let band_structure = band_structure((0..4).collect(), (0..4).collect(), &[]);
        let mut rates = Array5::from_elem((1, 1, 1, 1, 4), 100.0);
        let repaired = repair_low_rates(&mut rates, &band_structure, Spin::Up, 1e7);
        assert_eq!(repaired, 4);
        for kpoint in 0..4 {
            assert_relative_eq!(rates[(0, 0, 0, 0, kpoint)], 100.0 + 1e7);
        }
        // A second pass finds nothing left to repair
        assert_eq!(
            repair_low_rates(&mut rates, &band_structure, Spin::Up, 1e7),
            0
        );
    }

    #[test]
    fn out_of_window_sentinels_are_left_alone() {
        let band_structure = band_structure((0..4).collect(), (0..4).collect(), &[2]);
        let mut rates = Array5::from_elem((1, 1, 1, 1, 4), 1e9);
        rates[(0, 0, 0, 0, 2)] = SENTINEL_RATE;
        rates[(0, 0, 0, 0, 3)] = 1.0;
        repair_low_rates(&mut rates, &band_structure, Spin::Up, 1e7);
        assert_relative_eq!(rates[(0, 0, 0, 0, 2)], SENTINEL_RATE);
        assert!(rates[(0, 0, 0, 0, 3)] >= 1e7);
    }

    #[test]
    fn expansion_copies_each_representative_onto_its_orbit() {
        // k-points 1 and 3 map onto the representative at 1; 0 and 2 are
        // their own representatives
        let band_structure = band_structure(vec![0, 1, 2], vec![0, 1, 2, 1], &[]);
        let mut rates = Array5::zeros((1, 1, 1, 1, 4));
        for kpoint in 0..4 {
            rates[(0, 0, 0, 0, kpoint)] = (kpoint + 1) as f64;
        }
        expand_symmetry(&mut rates, &band_structure);
        assert_relative_eq!(rates[(0, 0, 0, 0, 0)], 1.0);
        assert_relative_eq!(rates[(0, 0, 0, 0, 1)], 2.0);
        assert_relative_eq!(rates[(0, 0, 0, 0, 2)], 3.0);
        assert_relative_eq!(rates[(0, 0, 0, 0, 3)], 2.0);
    }
}
