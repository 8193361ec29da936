// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # Constants
//!
//! Defines physical constants used in the calculation, and the numeric policy
//! constants of the rate engine

/// The Boltzmann constant in m^2 kg / s^2 K
pub const BOLTZMANN: f64 = 1.38064852e-23;
/// The Boltzmann constant in eV / K
pub const BOLTZMANN_EV: f64 = 8.6173324e-5;
/// Single electron charge in C
pub const ELECTRON_CHARGE: f64 = 1.60217662e-19;
/// Single electron mass in kg
pub const ELECTRON_MASS: f64 = 9.10938356e-31;
/// Permitivitty of free space in F / m
pub const EPSILON_0: f64 = 8.85418782e-12;
/// Reduced Planck constant in J s
pub const HBAR: f64 = 1.0545718e-34;
/// Reduced Planck constant in eV s
pub const HBAR_EV: f64 = 6.582119569e-16;

/// The rate assigned to states outside the Fermi-Dirac cutoff window, in 1 / s.
///
/// States outside the window carry negligible occupation so their scattering
/// rate is never evaluated; the sentinel stands in for "effectively infinite
/// scattering" when the tensor is consumed downstream.
pub const SENTINEL_RATE: f64 = 1e14;

/// The default floor, in 1 / s, below which an in-window rate is treated as
/// under-sampled and repaired by the post-processor. Overridable through
/// [`MaterialSettings::rate_floor`](crate::settings::MaterialSettings).
pub const DEFAULT_RATE_FLOOR: f64 = 1e7;
