//! # Cache
//!
//! Optional precomputation of wavefunction coefficients. The cache holds one
//! dense coefficient block per spin, restricted to exactly the (band, k-point)
//! pairs reachable from the padded energy window through the tetrahedron mesh,
//! plus an index table mapping (band, k-point) to the block row. Building the
//! cache is a performance feature: any failure disables it and the engine
//! falls back to resolving overlaps on demand.

use crate::bandstructure::{BandStructure, EnergyWindow, Spin};
use crate::error::KernelError;
use crate::overlap::{squared_inner_product, OverlapCapability, OverlapProvider};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use std::collections::HashMap;

/// The dense coefficient block of one spin channel
pub struct CoefficientBlock {
    /// One row per cached (band, k-point) pair
    coefficients: Array2<Complex64>,
    /// Row index per (band, k-point); `None` marks a pair outside the cached
    /// set, for which lookup is a hard error rather than a silent read
    index: Array2<Option<u32>>,
}

/// Cached wavefunction coefficients for every spin channel
pub struct CoefficientTable {
    blocks: HashMap<Spin, CoefficientBlock>,
}

impl CoefficientTable {
    /// |⟨ψ(band, kpoint)|ψ'⟩|² against every requested pair, from the cached
    /// coefficients only
    pub fn overlap(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Result<Array1<f64>, KernelError> {
        let block = &self.blocks[&spin];
        let bra = block.row(band, kpoint)?;
        let mut overlaps = Array1::zeros(pairs.len());
        for (slot, &(other_band, other_kpoint)) in pairs.iter().enumerate() {
            let ket = block.row(other_band, other_kpoint)?;
            overlaps[slot] = squared_inner_product(bra, ket);
        }
        Ok(overlaps)
    }
}

impl CoefficientBlock {
    fn row(
        &self,
        band: usize,
        kpoint: usize,
    ) -> Result<ndarray::ArrayView1<'_, Complex64>, KernelError> {
        match self.index[(band, kpoint)] {
            Some(row) => Ok(self.coefficients.row(row as usize)),
            None => Err(KernelError::MissingCoefficients { band, kpoint }),
        }
    }
}

/// Build the coefficient table for the states reachable from the padded
/// window, or `None` when caching is unsupported or would exceed the memory
/// limit.
pub fn build_coefficient_table(
    band_structure: &dyn BandStructure,
    overlap: &dyn OverlapProvider,
    window: EnergyWindow,
    pad: f64,
    memory_limit: Option<usize>,
) -> Option<CoefficientTable> {
    if overlap.capability() != OverlapCapability::Wavefunction {
        tracing::debug!("overlap provider exposes projections only; wavefunction cache disabled");
        return None;
    }

    let padded = window.padded(pad);
    let num_bands = band_structure.num_bands();
    let num_kpoints = band_structure.num_kpoints();

    let mut blocks = HashMap::new();
    for &spin in band_structure.spins() {
        let energies = band_structure.energies(spin);
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for band in 0..num_bands {
            let in_window: Vec<usize> = (0..num_kpoints)
                .filter(|&kpoint| padded.contains(energies[(band, kpoint)]))
                .collect();
            if in_window.is_empty() {
                continue;
            }
            // Cross-section interpolation reads the neighbouring tetrahedron
            // vertices, so the reachable set includes the connected k-points
            for kpoint in band_structure.get_connected_kpoints(&in_window) {
                pairs.push((band, kpoint));
            }
        }

        if let Some(limit) = memory_limit {
            let estimate = estimated_block_bytes(overlap, spin, &pairs);
            if estimate > limit {
                tracing::warn!(
                    "wavefunction cache would need {estimate} bytes against a limit of {limit}; \
                     falling back to on-demand overlaps"
                );
                return None;
            }
        }

        let coefficients = match overlap.coefficients(spin, &pairs) {
            Some(coefficients) => coefficients,
            None => {
                tracing::warn!("overlap provider failed to supply coefficients; cache disabled");
                return None;
            }
        };

        let mut index = Array2::from_elem((num_bands, num_kpoints), None);
        for (row, &(band, kpoint)) in pairs.iter().enumerate() {
            index[(band, kpoint)] = Some(row as u32);
        }
        blocks.insert(
            spin,
            CoefficientBlock {
                coefficients,
                index,
            },
        );
    }

    let cached: usize = blocks
        .values()
        .map(|block| block.coefficients.nrows())
        .sum();
    tracing::info!("cached wavefunction coefficients for {cached} (band, k-point) pairs");
    Some(CoefficientTable { blocks })
}

fn estimated_block_bytes(
    overlap: &dyn OverlapProvider,
    spin: Spin,
    pairs: &[(usize, usize)],
) -> usize {
    // A probe row tells us the coefficient width without fetching the block
    let width = pairs
        .first()
        .and_then(|&pair| overlap.coefficients(spin, &[pair]))
        .map(|row| row.ncols())
        .unwrap_or(0);
    pairs.len() * width * std::mem::size_of::<Complex64>()
}

#[cfg(test)]
mod test {
    use super::build_coefficient_table;
    use crate::bandstructure::tetrahedra::{gamma_centered_kpoints, mesh_tetrahedra};
    use crate::bandstructure::{DenseBandStructure, EnergyWindow, Spin};
    use crate::overlap::{OverlapProvider, ProjectionOverlap, WavefunctionOverlap};
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;
    use ndarray::{Array2, Array3};
    use num_complex::Complex64;
    use std::collections::HashMap;

    fn band_structure() -> DenseBandStructure {
        let mesh = [4, 4, 4];
        let kpoints = gamma_centered_kpoints(mesh);
        let num_kpoints = kpoints.nrows();
        let mut energies = Array2::zeros((2, num_kpoints));
        for kpoint in 0..num_kpoints {
            // One band inside the window, one far above it
            energies[(0, kpoint)] = 0.1 * kpoints[(kpoint, 0)];
            energies[(1, kpoint)] = 5.0;
        }
        DenseBandStructure::new(
            HashMap::from([(Spin::Up, energies)]),
            HashMap::from([(Spin::Up, Array3::zeros((2, num_kpoints, 3)))]),
            kpoints,
            Matrix3::identity() * 1e10,
            mesh,
            mesh_tetrahedra(mesh),
            (0..num_kpoints).collect(),
            (0..num_kpoints).collect(),
            EnergyWindow {
                low: -1.0,
                high: 1.0,
            },
        )
    }

    fn wavefunctions(num_kpoints: usize) -> WavefunctionOverlap {
        let mut coefficients = Array3::zeros((2, num_kpoints, 4));
        for band in 0..2 {
            for kpoint in 0..num_kpoints {
                coefficients[(band, kpoint, band)] = Complex64::new(1.0, 0.0);
                coefficients[(band, kpoint, 2)] =
                    Complex64::new(0.1 * kpoint as f64, 0.3);
            }
        }
        WavefunctionOverlap::new(HashMap::from([(Spin::Up, coefficients)]))
    }

    #[test]
    fn cached_overlaps_match_the_direct_provider() {
        let band_structure = band_structure();
        let provider = wavefunctions(64);
        let table = build_coefficient_table(
            &band_structure,
            &provider,
            EnergyWindow {
                low: -1.0,
                high: 1.0,
            },
            0.0,
            None,
        )
        .expect("wavefunction provider must be cacheable");

        let pairs = [(0, 0), (0, 17), (0, 63)];
        let cached = table.overlap(Spin::Up, 0, 5, &pairs).unwrap();
        let direct = provider.overlap(Spin::Up, 0, 5, &pairs);
        for (cached, direct) in cached.iter().zip(direct.iter()) {
            assert_relative_eq!(cached, direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn out_of_window_band_is_not_cached_and_fails_loudly() {
        let band_structure = band_structure();
        let provider = wavefunctions(64);
        let table = build_coefficient_table(
            &band_structure,
            &provider,
            EnergyWindow {
                low: -1.0,
                high: 1.0,
            },
            0.0,
            None,
        )
        .unwrap();
        assert!(table.overlap(Spin::Up, 1, 0, &[(0, 0)]).is_err());
    }

    #[test]
    fn projection_capability_disables_the_cache() {
        let band_structure = band_structure();
        let provider = ProjectionOverlap::new(HashMap::from([(
            Spin::Up,
            Array3::from_elem((2, 64, 4), 0.5),
        )]));
        assert!(build_coefficient_table(
            &band_structure,
            &provider,
            EnergyWindow {
                low: -1.0,
                high: 1.0
            },
            0.0,
            None,
        )
        .is_none());
    }

    #[test]
    fn exceeding_the_memory_limit_disables_the_cache() {
        let band_structure = band_structure();
        let provider = wavefunctions(64);
        assert!(build_coefficient_table(
            &band_structure,
            &provider,
            EnergyWindow {
                low: -1.0,
                high: 1.0
            },
            0.0,
            Some(128),
        )
        .is_none());
    }
}
