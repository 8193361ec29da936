//! # Band structure
//!
//! The view of the electronic structure consumed by the rate engine. The engine
//! never constructs a band structure itself: it reads dense energies and
//! velocities, the irreducible k-point bookkeeping and the tetrahedron
//! connectivity through the [`BandStructure`] trait. [`DenseBandStructure`] is
//! the concrete in-memory view used by the demo binary and the test suite.

pub mod tetrahedra;

pub use tetrahedra::{CrossSection, CrossSectionShape, CrossSections};

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use std::collections::HashMap;

/// A spin channel of the band structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Spin {
    /// The majority channel, or the only channel of a non-spin-polarised
    /// calculation
    Up,
    /// The minority channel
    Down,
}

/// The Fermi-Dirac cutoff window in eV.
///
/// States outside the window carry negligible occupation and their rates are
/// filled with the sentinel instead of being computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyWindow {
    /// Lower cutoff in eV
    pub low: f64,
    /// Upper cutoff in eV
    pub high: f64,
}

impl EnergyWindow {
    /// Whether `energy` lies inside the window
    pub fn contains(&self, energy: f64) -> bool {
        energy >= self.low && energy <= self.high
    }

    /// The window widened by `pad` on both sides
    pub fn padded(&self, pad: f64) -> EnergyWindow {
        EnergyWindow {
            low: self.low - pad,
            high: self.high + pad,
        }
    }
}

/// Capability contract for the band structure consumed by the engine.
///
/// Implementations are shared read-only across all workers, so every method
/// borrows immutably and the trait requires `Send + Sync`.
pub trait BandStructure: Send + Sync {
    /// The spin channels present
    fn spins(&self) -> &[Spin];
    /// Number of bands per spin channel
    fn num_bands(&self) -> usize;
    /// Number of k-points in the full mesh
    fn num_kpoints(&self) -> usize;
    /// Band energies in eV, shape (bands, k-points)
    fn energies(&self, spin: Spin) -> ArrayView2<'_, f64>;
    /// Group velocities in m / s, shape (bands, k-points, 3)
    fn velocities(&self, spin: Spin) -> ArrayView3<'_, f64>;
    /// Fractional k-point coordinates in [-1/2, 1/2), shape (k-points, 3)
    fn kpoints(&self) -> ArrayView2<'_, f64>;
    /// Reciprocal lattice vectors as columns, in 1 / m
    fn reciprocal_lattice(&self) -> &Matrix3<f64>;
    /// Dimensions of the regular k-point mesh
    fn kpoint_mesh(&self) -> [usize; 3];
    /// Indices of the irreducible k-points in the full mesh
    fn ir_kpoints_idx(&self) -> &[usize];
    /// For each full-mesh k-point, the position of its representative in the
    /// irreducible list
    fn ir_to_full_idx(&self) -> &[usize];
    /// The Fermi-Dirac cutoff window
    fn energy_window(&self) -> EnergyWindow;
    /// All k-points sharing a tetrahedron with any of `indices`, including the
    /// input points themselves
    fn get_connected_kpoints(&self, indices: &[usize]) -> Vec<usize>;
    /// The cross sections where the `energy` iso-surface cuts the tetrahedron
    /// mesh, or `None` when no tetrahedron straddles the energy
    fn tetrahedron_cross_sections(&self, spin: Spin, energy: f64) -> Option<CrossSections>;
}

/// A dense in-memory band structure on a regular Γ-centred k-mesh
pub struct DenseBandStructure {
    spins: Vec<Spin>,
    energies: HashMap<Spin, Array2<f64>>,
    velocities: HashMap<Spin, Array3<f64>>,
    kpoints: Array2<f64>,
    reciprocal_lattice: Matrix3<f64>,
    mesh: [usize; 3],
    tetrahedra: Vec<[usize; 4]>,
    kpoint_tetrahedra: Vec<Vec<usize>>,
    ir_kpoints_idx: Vec<usize>,
    ir_to_full_idx: Vec<usize>,
    window: EnergyWindow,
}

impl DenseBandStructure {
    /// Assemble a dense view from externally computed data.
    ///
    /// `energies` and `velocities` must hold one entry per spin channel with
    /// shapes (bands, k-points) and (bands, k-points, 3); `tetrahedra` indexes
    /// into the k-point list; `ir_to_full_idx` maps every full-mesh k-point to
    /// the position of its symmetry representative in `ir_kpoints_idx`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        energies: HashMap<Spin, Array2<f64>>,
        velocities: HashMap<Spin, Array3<f64>>,
        kpoints: Array2<f64>,
        reciprocal_lattice: Matrix3<f64>,
        mesh: [usize; 3],
        tetrahedra: Vec<[usize; 4]>,
        ir_kpoints_idx: Vec<usize>,
        ir_to_full_idx: Vec<usize>,
        window: EnergyWindow,
    ) -> Self {
        let mut spins: Vec<Spin> = energies.keys().copied().collect();
        spins.sort_unstable();
        let num_kpoints = kpoints.nrows();
        let mut kpoint_tetrahedra = vec![Vec::new(); num_kpoints];
        for (tetrahedron_index, tetrahedron) in tetrahedra.iter().enumerate() {
            for &vertex in tetrahedron {
                kpoint_tetrahedra[vertex].push(tetrahedron_index);
            }
        }
        Self {
            spins,
            energies,
            velocities,
            kpoints,
            reciprocal_lattice,
            mesh,
            tetrahedra,
            kpoint_tetrahedra,
            ir_kpoints_idx,
            ir_to_full_idx,
            window,
        }
    }

    pub(crate) fn tetrahedra(&self) -> &[[usize; 4]] {
        &self.tetrahedra
    }

    /// The fractional coordinate of a single k-point
    pub fn kpoint(&self, index: usize) -> Vector3<f64> {
        Vector3::new(
            self.kpoints[(index, 0)],
            self.kpoints[(index, 1)],
            self.kpoints[(index, 2)],
        )
    }
}

impl BandStructure for DenseBandStructure {
    fn spins(&self) -> &[Spin] {
        &self.spins
    }

    fn num_bands(&self) -> usize {
        self.energies[&self.spins[0]].nrows()
    }

    fn num_kpoints(&self) -> usize {
        self.kpoints.nrows()
    }

    fn energies(&self, spin: Spin) -> ArrayView2<'_, f64> {
        self.energies[&spin].view()
    }

    fn velocities(&self, spin: Spin) -> ArrayView3<'_, f64> {
        self.velocities[&spin].view()
    }

    fn kpoints(&self) -> ArrayView2<'_, f64> {
        self.kpoints.view()
    }

    fn reciprocal_lattice(&self) -> &Matrix3<f64> {
        &self.reciprocal_lattice
    }

    fn kpoint_mesh(&self) -> [usize; 3] {
        self.mesh
    }

    fn ir_kpoints_idx(&self) -> &[usize] {
        &self.ir_kpoints_idx
    }

    fn ir_to_full_idx(&self) -> &[usize] {
        &self.ir_to_full_idx
    }

    fn energy_window(&self) -> EnergyWindow {
        self.window
    }

    fn get_connected_kpoints(&self, indices: &[usize]) -> Vec<usize> {
        let mut connected: Vec<usize> = indices
            .iter()
            .flat_map(|&kpoint| {
                self.kpoint_tetrahedra[kpoint]
                    .iter()
                    .flat_map(|&tetrahedron| self.tetrahedra[tetrahedron])
            })
            .chain(indices.iter().copied())
            .collect();
        connected.sort_unstable();
        connected.dedup();
        connected
    }

    fn tetrahedron_cross_sections(&self, spin: Spin, energy: f64) -> Option<CrossSections> {
        tetrahedra::extract_cross_sections(self, spin, energy)
    }
}

/// Shift `delta` into the periodic image nearest the origin, component-wise in
/// fractional coordinates
pub fn nearest_image(delta: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        delta.x - delta.x.round(),
        delta.y - delta.y.round(),
        delta.z - delta.z.round(),
    )
}
