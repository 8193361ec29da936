// Copyright 2022 Chris Gubbin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Kscatter computes charge-carrier scattering rates on a reciprocal-space mesh
//!
//! # Overview
//! Kscatter evaluates the electron-scattering rate at every band and k-point of a
//! semiconductor band structure, for use in downstream Boltzmann transport
//! calculations. For each state inside the Fermi-Dirac cutoff window the rate is
//! assembled from a set of pluggable scattering mechanisms: elastic processes
//! (acoustic deformation potential, ionized impurities), inelastic processes
//! (polar optical phonon emission and absorption) and basic processes whose rates
//! are known in closed form (constant relaxation time, mean free path).
//!
//! The scattering integral over the energy iso-surface is carried out with the
//! linear tetrahedron method: each tetrahedron of the k-mesh which straddles the
//! target energy contributes a triangular or quadrilateral cross section, over
//! which the mechanism matrix elements are integrated with a fixed-order
//! quadrature scheme chosen from the cross section's distance to the zone centre.
//! Jobs are distributed over a pool of long-lived worker threads which share the
//! band structure, the wavefunction overlap data and the mechanism list
//! read-only; results are collected through a channel and may arrive in any
//! order.
//!
//! # Usage
//! Rates are computed through [`compute_all_rates`](assembler::compute_all_rates),
//! which takes the material settings, a band-structure view and an overlap
//! provider, and returns the dense rate tensor indexed by
//! (mechanism, doping, temperature, band, k-point) for each spin channel.

#![warn(missing_docs)]
#![allow(clippy::type_complexity)]

/// The command line application, settings loading and tracing primitives
pub mod app;

/// Orchestration of per-band job submission and assembly of the rate tensor
pub mod assembler;

/// The band-structure view consumed by the engine, and the tetrahedron
/// iso-surface construction
pub mod bandstructure;

/// Optional precomputation of wavefunction coefficients for the states
/// reachable from the energy window
pub mod cache;

/// Physical constants and numeric policy constants
pub mod constants;

/// Error handling
pub mod error;

/// The per-job rate evaluation
pub mod kernel;

/// Wavefunction overlap and momentum-relaxation providers
pub mod overlap;

/// Repair of under-sampled rates and symmetry expansion to the full mesh
pub mod postprocessor;

/// The worker pool and its job/result protocol
pub mod pool;

/// Fixed-order quadrature schemes over iso-surface cross sections
pub mod quadrature;

/// Scattering mechanisms and their registry
pub mod scattering;

/// Material settings supplied by the caller
pub mod settings;

pub use assembler::compute_all_rates;
pub use error::{ConfigurationError, Error};
