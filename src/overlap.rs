//! # Overlap
//!
//! Wavefunction overlap and momentum-relaxation providers. The engine consumes
//! both through capability traits: a [`Wavefunction`](OverlapCapability)
//! provider exposes plane-wave coefficients which may be cached up front, while
//! a [`Projection`](OverlapCapability) provider can only resolve overlaps on
//! demand.

use crate::bandstructure::{BandStructure, Spin};
use ndarray::{Array1, Array2, Array3, ArrayView1};
use num_complex::Complex64;
use std::collections::HashMap;
use std::sync::Arc;

/// How a provider resolves overlaps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapCapability {
    /// Plane-wave coefficients are available per state; coefficients may be
    /// fetched and cached
    Wavefunction,
    /// Only per-orbital projections are available; caching is unsupported
    Projection,
}

/// Capability contract for overlap resolution, shared read-only across workers
pub trait OverlapProvider: Send + Sync {
    /// Which resolution strategy this provider supports
    fn capability(&self) -> OverlapCapability;

    /// The normalised coefficient vectors for the requested (band, k-point)
    /// pairs, one row per pair. `None` for providers without the
    /// [`Wavefunction`](OverlapCapability::Wavefunction) capability.
    fn coefficients(&self, spin: Spin, pairs: &[(usize, usize)]) -> Option<Array2<Complex64>>;

    /// |⟨ψ(band, kpoint)|ψ(band', kpoint')⟩|² against every requested pair
    fn overlap(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Array1<f64>;
}

/// Overlaps from plane-wave coefficient vectors, |⟨c|c'⟩|²
pub struct WavefunctionOverlap {
    coefficients: HashMap<Spin, Array3<Complex64>>,
}

impl WavefunctionOverlap {
    /// Build from raw coefficients with shape (bands, k-points, n_coefficients)
    /// per spin; each state vector is normalised on construction
    pub fn new(mut coefficients: HashMap<Spin, Array3<Complex64>>) -> Self {
        for block in coefficients.values_mut() {
            for mut state in block.rows_mut() {
                let norm = state.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
                if norm > 0.0 {
                    state.mapv_inplace(|c| c / norm);
                }
            }
        }
        Self { coefficients }
    }

    /// The number of coefficients per state
    pub fn num_coefficients(&self) -> usize {
        self.coefficients
            .values()
            .next()
            .map(|block| block.shape()[2])
            .unwrap_or(0)
    }

    fn state(&self, spin: Spin, band: usize, kpoint: usize) -> ArrayView1<'_, Complex64> {
        self.coefficients[&spin].index_axis(ndarray::Axis(0), band).index_axis_move(ndarray::Axis(0), kpoint)
    }
}

/// The squared inner product of two normalised coefficient vectors
pub fn squared_inner_product(
    bra: ArrayView1<'_, Complex64>,
    ket: ArrayView1<'_, Complex64>,
) -> f64 {
    bra.iter()
        .zip(ket.iter())
        .map(|(b, k)| b.conj() * k)
        .sum::<Complex64>()
        .norm_sqr()
}

impl OverlapProvider for WavefunctionOverlap {
    fn capability(&self) -> OverlapCapability {
        OverlapCapability::Wavefunction
    }

    fn coefficients(&self, spin: Spin, pairs: &[(usize, usize)]) -> Option<Array2<Complex64>> {
        let width = self.num_coefficients();
        let mut rows = Array2::zeros((pairs.len(), width));
        for (row, &(band, kpoint)) in pairs.iter().enumerate() {
            rows.row_mut(row).assign(&self.state(spin, band, kpoint));
        }
        Some(rows)
    }

    fn overlap(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Array1<f64> {
        let bra = self.state(spin, band, kpoint);
        Array1::from_iter(pairs.iter().map(|&(other_band, other_kpoint)| {
            squared_inner_product(bra, self.state(spin, other_band, other_kpoint))
        }))
    }
}

/// Overlaps from per-orbital projections; cannot expose coefficient vectors
pub struct ProjectionOverlap {
    projections: HashMap<Spin, Array3<f64>>,
}

impl ProjectionOverlap {
    /// Build from orbital projections with shape (bands, k-points, n_orbitals)
    /// per spin; each projection row is normalised on construction
    pub fn new(mut projections: HashMap<Spin, Array3<f64>>) -> Self {
        for block in projections.values_mut() {
            for mut state in block.rows_mut() {
                let norm = state.iter().map(|p| p * p).sum::<f64>().sqrt();
                if norm > 0.0 {
                    state.mapv_inplace(|p| p / norm);
                }
            }
        }
        Self { projections }
    }
}

impl OverlapProvider for ProjectionOverlap {
    fn capability(&self) -> OverlapCapability {
        OverlapCapability::Projection
    }

    fn coefficients(&self, _spin: Spin, _pairs: &[(usize, usize)]) -> Option<Array2<Complex64>> {
        None
    }

    fn overlap(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Array1<f64> {
        let block = &self.projections[&spin];
        let bra = block
            .index_axis(ndarray::Axis(0), band)
            .index_axis_move(ndarray::Axis(0), kpoint);
        Array1::from_iter(pairs.iter().map(|&(other_band, other_kpoint)| {
            let ket = block
                .index_axis(ndarray::Axis(0), other_band)
                .index_axis_move(ndarray::Axis(0), other_kpoint);
            let product = bra.iter().zip(ket.iter()).map(|(b, k)| b * k).sum::<f64>();
            product * product
        }))
    }
}

/// Capability contract for the momentum-relaxation weighting of elastic rates
pub trait MomentumRelaxationProvider: Send + Sync {
    /// The 1 - cos θ weighting between the source state and each requested
    /// (band, k-point) pair
    fn mrta_factor(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Array1<f64>;
}

/// Momentum-relaxation factors from the angle between group velocities
pub struct VelocityMrta {
    band_structure: Arc<dyn BandStructure>,
}

impl VelocityMrta {
    /// Weight transitions by the velocity misalignment of the two states
    pub fn new(band_structure: Arc<dyn BandStructure>) -> Self {
        Self { band_structure }
    }

    fn velocity(&self, spin: Spin, band: usize, kpoint: usize) -> [f64; 3] {
        let velocities = self.band_structure.velocities(spin);
        [
            velocities[(band, kpoint, 0)],
            velocities[(band, kpoint, 1)],
            velocities[(band, kpoint, 2)],
        ]
    }
}

impl MomentumRelaxationProvider for VelocityMrta {
    fn mrta_factor(
        &self,
        spin: Spin,
        band: usize,
        kpoint: usize,
        pairs: &[(usize, usize)],
    ) -> Array1<f64> {
        let source = self.velocity(spin, band, kpoint);
        let source_norm = (source.iter().map(|v| v * v).sum::<f64>()).sqrt();
        Array1::from_iter(pairs.iter().map(|&(other_band, other_kpoint)| {
            let target = self.velocity(spin, other_band, other_kpoint);
            let target_norm = (target.iter().map(|v| v * v).sum::<f64>()).sqrt();
            if source_norm == 0.0 || target_norm == 0.0 {
                return 1.0;
            }
            let cosine = source
                .iter()
                .zip(target.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / source_norm
                / target_norm;
            1.0 - cosine
        }))
    }
}
