//! # Quadrature
//!
//! Fixed-order integration schemes over iso-surface cross sections. The tier
//! is chosen adaptively from the cross section's minimum distance to the zone
//! centre: polar matrix elements vary fastest near q = 0, so close cross
//! sections are integrated with the highest-order scheme. Weights are
//! normalised to sum to one; the polygon measure is carried by the cross
//! section's density-of-states weight.

use crate::bandstructure::{CrossSection, CrossSectionShape};
use nalgebra::Vector3;

/// Distance below which the highest-order scheme is used, as a fraction of the
/// shortest reciprocal lattice vector
pub const HIGH_TIER_TOLERANCE: f64 = 0.02;
/// Distance below which the medium-order scheme is used
pub const MEDIUM_TIER_TOLERANCE: f64 = 0.10;

/// The precision tier of a quadrature scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadratureTier {
    /// Single-point scheme for cross sections far from the zone centre
    Low,
    /// Intermediate scheme
    Medium,
    /// Highest-order scheme for cross sections close to the zone centre
    High,
}

/// Choose the tier from the minimum distance (in 1 / m) between the cross
/// section and the zone centre, scaled by the shortest reciprocal lattice
/// vector length
pub fn select_tier(minimum_distance: f64, reciprocal_scale: f64) -> QuadratureTier {
    if minimum_distance < HIGH_TIER_TOLERANCE * reciprocal_scale {
        QuadratureTier::High
    } else if minimum_distance < MEDIUM_TIER_TOLERANCE * reciprocal_scale {
        QuadratureTier::Medium
    } else {
        QuadratureTier::Low
    }
}

// Symmetric triangle rules in barycentric coordinates, exact to degree 1, 2
// and 5 respectively.
const TRIANGLE_LOW: ([[f64; 3]; 1], [f64; 1]) = ([[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]], [1.0]);

const TRIANGLE_MEDIUM: ([[f64; 3]; 3], [f64; 3]) = (
    [
        [2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0],
        [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
        [1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0],
    ],
    [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
);

const TRIANGLE_HIGH: ([[f64; 3]; 7], [f64; 7]) = {
    const A1: f64 = 0.059_715_871_789_77;
    const B1: f64 = 0.470_142_064_105_115;
    const W1: f64 = 0.132_394_152_788_506;
    const A2: f64 = 0.797_426_985_353_087;
    const B2: f64 = 0.101_286_507_323_456;
    const W2: f64 = 0.125_939_180_544_827;
    (
        [
            [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            [A1, B1, B1],
            [B1, A1, B1],
            [B1, B1, A1],
            [A2, B2, B2],
            [B2, A2, B2],
            [B2, B2, A2],
        ],
        [0.225, W1, W1, W1, W2, W2, W2],
    )
};

// Tensor Gauss-Legendre rules on [-1, 1]^2, weights normalised to unit sum.
const GAUSS_1: ([f64; 1], [f64; 1]) = ([0.0], [1.0]);
const GAUSS_2: ([f64; 2], [f64; 2]) = ([-0.577_350_269_189_626, 0.577_350_269_189_626], [0.5, 0.5]);
const GAUSS_3: ([f64; 3], [f64; 3]) = (
    [-0.774_596_669_241_483, 0.0, 0.774_596_669_241_483],
    [5.0 / 18.0, 4.0 / 9.0, 5.0 / 18.0],
);

fn triangle_rule(tier: QuadratureTier) -> (&'static [[f64; 3]], &'static [f64]) {
    match tier {
        QuadratureTier::Low => (&TRIANGLE_LOW.0, &TRIANGLE_LOW.1),
        QuadratureTier::Medium => (&TRIANGLE_MEDIUM.0, &TRIANGLE_MEDIUM.1),
        QuadratureTier::High => (&TRIANGLE_HIGH.0, &TRIANGLE_HIGH.1),
    }
}

fn gauss_rule(tier: QuadratureTier) -> (&'static [f64], &'static [f64]) {
    match tier {
        QuadratureTier::Low => (&GAUSS_1.0, &GAUSS_1.1),
        QuadratureTier::Medium => (&GAUSS_2.0, &GAUSS_2.1),
        QuadratureTier::High => (&GAUSS_3.0, &GAUSS_3.1),
    }
}

/// Generate the fine integration mesh over a cross section, in the same
/// fractional frame as its corners, together with the normalised weights
pub fn sample_cross_section(
    section: &CrossSection,
    tier: QuadratureTier,
) -> (Vec<Vector3<f64>>, Vec<f64>) {
    match section.shape {
        CrossSectionShape::Triangle => {
            let (nodes, weights) = triangle_rule(tier);
            let points = nodes
                .iter()
                .map(|node| {
                    section.corners[0] * node[0]
                        + section.corners[1] * node[1]
                        + section.corners[2] * node[2]
                })
                .collect();
            (points, weights.to_vec())
        }
        CrossSectionShape::Quadrilateral => {
            let (nodes, node_weights) = gauss_rule(tier);
            let mut points = Vec::with_capacity(nodes.len() * nodes.len());
            let mut weights = Vec::with_capacity(nodes.len() * nodes.len());
            for (&u, &weight_u) in nodes.iter().zip(node_weights) {
                for (&v, &weight_v) in nodes.iter().zip(node_weights) {
                    // Bilinear map onto the cyclically ordered corners
                    let shape = [
                        (1.0 - u) * (1.0 - v) / 4.0,
                        (1.0 + u) * (1.0 - v) / 4.0,
                        (1.0 + u) * (1.0 + v) / 4.0,
                        (1.0 - u) * (1.0 + v) / 4.0,
                    ];
                    let point = section
                        .corners
                        .iter()
                        .zip(shape)
                        .map(|(corner, factor)| corner * factor)
                        .sum();
                    points.push(point);
                    weights.push(weight_u * weight_v);
                }
            }
            (points, weights)
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        sample_cross_section, select_tier, QuadratureTier, HIGH_TIER_TOLERANCE,
        MEDIUM_TIER_TOLERANCE,
    };
    use crate::bandstructure::{CrossSection, CrossSectionShape};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn triangle() -> CrossSection {
        CrossSection {
            band: 0,
            tetrahedron: [0, 1, 2, 3],
            corners: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.3, 0.0, 0.0),
                Vector3::new(0.0, 0.3, 0.0),
            ],
            vertex_weights: [0.25; 4],
            weight: 1.0,
            shape: CrossSectionShape::Triangle,
        }
    }

    fn quadrilateral() -> CrossSection {
        CrossSection {
            corners: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.4, 0.0, 0.0),
                Vector3::new(0.4, 0.4, 0.0),
                Vector3::new(0.0, 0.4, 0.0),
            ],
            shape: CrossSectionShape::Quadrilateral,
            ..triangle()
        }
    }

    #[test]
    fn tier_selection_respects_both_tolerances() {
        let scale = 1e10;
        assert_eq!(
            select_tier(0.5 * HIGH_TIER_TOLERANCE * scale, scale),
            QuadratureTier::High
        );
        assert_eq!(
            select_tier(0.5 * MEDIUM_TIER_TOLERANCE * scale, scale),
            QuadratureTier::Medium
        );
        assert_eq!(
            select_tier(2.0 * MEDIUM_TIER_TOLERANCE * scale, scale),
            QuadratureTier::Low
        );
    }

    #[test]
    fn weights_are_normalised_for_every_tier_and_shape() {
        for tier in [
            QuadratureTier::Low,
            QuadratureTier::Medium,
            QuadratureTier::High,
        ] {
            let (_, weights) = sample_cross_section(&triangle(), tier);
            assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            let (_, weights) = sample_cross_section(&quadrilateral(), tier);
            assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn sample_points_stay_inside_the_polygon() {
        for tier in [
            QuadratureTier::Low,
            QuadratureTier::Medium,
            QuadratureTier::High,
        ] {
            let (points, _) = sample_cross_section(&quadrilateral(), tier);
            for point in points {
                assert!(point.x >= 0.0 && point.x <= 0.4);
                assert!(point.y >= 0.0 && point.y <= 0.4);
                assert_relative_eq!(point.z, 0.0);
            }
        }
    }

    #[test]
    fn centroid_rule_integrates_a_linear_function_exactly() {
        let (points, weights) = sample_cross_section(&triangle(), QuadratureTier::Medium);
        let integral: f64 = points
            .iter()
            .zip(&weights)
            .map(|(point, weight)| (point.x + 2.0 * point.y) * weight)
            .sum();
        // Mean of x + 2y over the triangle is (0.1 + 0.2)
        assert_relative_eq!(integral, 0.3, epsilon = 1e-12);
    }
}
