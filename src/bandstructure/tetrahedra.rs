//! # Tetrahedra
//!
//! Linear-tetrahedron iso-surface construction. The regular k-mesh is split
//! into six tetrahedra per cell along the main diagonal; a target energy which
//! straddles a tetrahedron's vertex energies cuts it in a triangle (near the
//! lowest or highest vertex) or a quadrilateral (in the middle band). Each
//! cross section carries its density-of-states weight, the interpolation
//! weights from the tetrahedron vertices onto its centroid, and the polygon
//! corners in mutually aligned fractional coordinates.

use super::{nearest_image, BandStructure, DenseBandStructure, Spin};
use nalgebra::{Matrix3, RowVector3, Vector3};
use ndarray::Array2;
use rayon::prelude::*;

/// The polygon shape of an iso-surface cross section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSectionShape {
    /// Three corners, cut near the lowest or highest vertex
    Triangle,
    /// Four corners, cut through the middle energy band
    Quadrilateral,
}

/// One polygon where the energy iso-surface cuts a tetrahedron
#[derive(Debug, Clone)]
pub struct CrossSection {
    /// The band the cross section belongs to
    pub band: usize,
    /// Full-mesh k-point indices at the tetrahedron vertices
    pub tetrahedron: [usize; 4],
    /// Polygon corners in fractional coordinates, aligned to a single periodic
    /// image of the tetrahedron
    pub corners: Vec<Vector3<f64>>,
    /// Linear interpolation weights from the tetrahedron vertices onto the
    /// polygon centroid; sums to one
    pub vertex_weights: [f64; 4],
    /// Density-of-states weight, area / |∇E| normalised per tetrahedron
    pub weight: f64,
    /// Triangle or quadrilateral
    pub shape: CrossSectionShape,
}

impl CrossSection {
    /// The polygon centroid in fractional coordinates
    pub fn centroid(&self) -> Vector3<f64> {
        self.corners.iter().sum::<Vector3<f64>>() / self.corners.len() as f64
    }
}

/// All cross sections of an energy iso-surface, with the (band, k-point) pairs
/// they touch
#[derive(Debug, Clone)]
pub struct CrossSections {
    /// The individual polygons
    pub sections: Vec<CrossSection>,
    /// True for every (band, k-point) pair appearing as a tetrahedron vertex of
    /// some cross section
    pub band_kpoint_mask: Array2<bool>,
}

impl CrossSections {
    /// The masked (band, k-point) pairs in lexicographic order
    pub fn band_kpoint_pairs(&self) -> Vec<(usize, usize)> {
        self.band_kpoint_mask
            .indexed_iter()
            .filter(|(_, &hit)| hit)
            .map(|((band, kpoint), _)| (band, kpoint))
            .collect()
    }

    /// True for every band touched by some cross section
    pub fn band_mask(&self) -> Vec<bool> {
        self.band_kpoint_mask
            .rows()
            .into_iter()
            .map(|row| row.iter().any(|&hit| hit))
            .collect()
    }

    /// True for every k-point touched by some cross section
    pub fn kpoint_mask(&self) -> Vec<bool> {
        self.band_kpoint_mask
            .columns()
            .into_iter()
            .map(|column| column.iter().any(|&hit| hit))
            .collect()
    }
}

pub(crate) fn extract_cross_sections(
    band_structure: &DenseBandStructure,
    spin: Spin,
    energy: f64,
) -> Option<CrossSections> {
    let energies = band_structure.energies(spin);
    let (num_bands, num_kpoints) = energies.dim();
    let num_tetrahedra = band_structure.tetrahedra().len();

    let sections: Vec<CrossSection> = (0..num_bands)
        .into_par_iter()
        .flat_map_iter(|band| {
            let band_energies = energies.row(band);
            band_structure
                .tetrahedra()
                .iter()
                .filter_map(move |&tetrahedron| {
                    cut_tetrahedron(
                        band_structure,
                        band,
                        tetrahedron,
                        |kpoint| band_energies[kpoint],
                        energy,
                        num_tetrahedra,
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();

    if sections.is_empty() {
        return None;
    }

    let mut band_kpoint_mask = Array2::from_elem((num_bands, num_kpoints), false);
    for section in &sections {
        for &kpoint in &section.tetrahedron {
            band_kpoint_mask[(section.band, kpoint)] = true;
        }
    }

    Some(CrossSections {
        sections,
        band_kpoint_mask,
    })
}

fn cut_tetrahedron(
    band_structure: &DenseBandStructure,
    band: usize,
    tetrahedron: [usize; 4],
    energy_at: impl Fn(usize) -> f64,
    energy: f64,
    num_tetrahedra: usize,
) -> Option<CrossSection> {
    let vertex_energies = tetrahedron.map(&energy_at);
    let minimum = vertex_energies.iter().cloned().fold(f64::INFINITY, f64::min);
    let maximum = vertex_energies
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    if energy <= minimum || energy >= maximum {
        return None;
    }

    // Sort the vertices by energy; the cut topology depends only on where the
    // target falls among the sorted vertex energies.
    let mut order = [0_usize, 1, 2, 3];
    order.sort_by(|&a, &b| vertex_energies[a].total_cmp(&vertex_energies[b]));
    let sorted_energies = order.map(|slot| vertex_energies[slot]);

    // Align every vertex to the periodic image nearest the lowest-energy one
    // so positions interpolate without wraparound jumps.
    let base = band_structure.kpoint(tetrahedron[order[0]]);
    let positions =
        order.map(|slot| base + nearest_image(band_structure.kpoint(tetrahedron[slot]) - base));

    let mut corners: Vec<Vector3<f64>> = Vec::with_capacity(4);
    let mut barycentric: Vec<[f64; 4]> = Vec::with_capacity(4);
    let mut degenerate = false;
    {
        let mut cut_edge = |low: usize, high: usize| {
            let span = sorted_energies[high] - sorted_energies[low];
            if span.abs() < f64::EPSILON {
                degenerate = true;
                return;
            }
            let fraction = (energy - sorted_energies[low]) / span;
            corners.push(positions[low] + (positions[high] - positions[low]) * fraction);
            let mut weights = [0.0; 4];
            weights[order[low]] = 1.0 - fraction;
            weights[order[high]] = fraction;
            barycentric.push(weights);
        };

        if energy < sorted_energies[1] {
            cut_edge(0, 1);
            cut_edge(0, 2);
            cut_edge(0, 3);
        } else if energy < sorted_energies[2] {
            // Cyclic corner order keeps the quadrilateral non-self-intersecting
            cut_edge(0, 2);
            cut_edge(0, 3);
            cut_edge(1, 3);
            cut_edge(1, 2);
        } else {
            cut_edge(0, 3);
            cut_edge(1, 3);
            cut_edge(2, 3);
        }
    }
    if degenerate {
        return None;
    }

    let reciprocal = band_structure.reciprocal_lattice();
    let cartesian: Vec<Vector3<f64>> = corners.iter().map(|corner| reciprocal * corner).collect();
    let area = polygon_area(&cartesian);

    // Cartesian gradient of the linear interpolant over the tetrahedron
    let rows: Vec<RowVector3<f64>> = (1..4)
        .map(|vertex| (reciprocal * (positions[vertex] - positions[0])).transpose())
        .collect();
    let geometry = Matrix3::from_rows(&rows);
    let differences = Vector3::new(
        sorted_energies[1] - sorted_energies[0],
        sorted_energies[2] - sorted_energies[0],
        sorted_energies[3] - sorted_energies[0],
    );
    let gradient = geometry.try_inverse()? * differences;
    let gradient_norm = gradient.norm();

    let weight = area / gradient_norm / num_tetrahedra as f64;
    if !weight.is_finite() || weight <= 0.0 {
        // Zero-measure or flat-band tetrahedron: a valid non-contribution
        return None;
    }

    let mut vertex_weights = [0.0; 4];
    for weights in &barycentric {
        for (accumulated, &weight) in vertex_weights.iter_mut().zip(weights) {
            *accumulated += weight / barycentric.len() as f64;
        }
    }

    let shape = if corners.len() == 3 {
        CrossSectionShape::Triangle
    } else {
        CrossSectionShape::Quadrilateral
    };

    Some(CrossSection {
        band,
        tetrahedron,
        corners,
        vertex_weights,
        weight,
        shape,
    })
}

fn polygon_area(corners: &[Vector3<f64>]) -> f64 {
    // Fan triangulation from the first corner; the polygon is planar by
    // construction
    (1..corners.len() - 1)
        .map(|index| {
            (corners[index] - corners[0])
                .cross(&(corners[index + 1] - corners[0]))
                .norm()
                / 2.0
        })
        .sum()
}

/// Fractional coordinates of a Γ-centred regular mesh, folded into [-1/2, 1/2)
pub fn gamma_centered_kpoints(mesh: [usize; 3]) -> Array2<f64> {
    let num_kpoints = mesh[0] * mesh[1] * mesh[2];
    let mut kpoints = Array2::zeros((num_kpoints, 3));
    for i in 0..mesh[0] {
        for j in 0..mesh[1] {
            for k in 0..mesh[2] {
                let row = (i * mesh[1] + j) * mesh[2] + k;
                for (axis, index) in [i, j, k].into_iter().enumerate() {
                    let mut fraction = index as f64 / mesh[axis] as f64;
                    if fraction >= 0.5 {
                        fraction -= 1.0;
                    }
                    kpoints[(row, axis)] = fraction;
                }
            }
        }
    }
    kpoints
}

/// Six-tetrahedra-per-cell decomposition of a periodic regular mesh along the
/// main cell diagonal
pub fn mesh_tetrahedra(mesh: [usize; 3]) -> Vec<[usize; 4]> {
    // Kuhn split: each tetrahedron is a monotone path of cube corners from
    // (0,0,0) to (1,1,1)
    const PATHS: [[usize; 4]; 6] = [
        [0b000, 0b001, 0b011, 0b111],
        [0b000, 0b001, 0b101, 0b111],
        [0b000, 0b010, 0b011, 0b111],
        [0b000, 0b010, 0b110, 0b111],
        [0b000, 0b100, 0b101, 0b111],
        [0b000, 0b100, 0b110, 0b111],
    ];
    let index = |i: usize, j: usize, k: usize| {
        ((i % mesh[0]) * mesh[1] + (j % mesh[1])) * mesh[2] + (k % mesh[2])
    };
    let mut tetrahedra = Vec::with_capacity(6 * mesh[0] * mesh[1] * mesh[2]);
    for i in 0..mesh[0] {
        for j in 0..mesh[1] {
            for k in 0..mesh[2] {
                for path in PATHS {
                    let mut tetrahedron = [0_usize; 4];
                    for (vertex, corner) in path.into_iter().enumerate() {
                        tetrahedron[vertex] =
                            index(i + (corner >> 2), j + ((corner >> 1) & 1), k + (corner & 1));
                    }
                    tetrahedra.push(tetrahedron);
                }
            }
        }
    }
    tetrahedra
}
