//! # Error
//!
//! The error taxonomy of the rate engine. Configuration and worker failures are
//! fatal to the whole calculation; cache-build failures are recovered locally by
//! the cache module and never surface here; numerically degenerate cross
//! sections are resolved to zero rates inside the kernel and are not errors.

use miette::Diagnostic;

/// A fatal misconfiguration detected before any worker starts
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum ConfigurationError {
    /// A mechanism was requested by name but a material property it requires is
    /// absent from the settings
    #[error("scattering mechanism `{mechanism}` requires the material property `{property}`, which is not set")]
    MissingProperty {
        /// Name of the requested mechanism
        mechanism: String,
        /// Name of the absent property
        property: String,
    },
    /// A mechanism was requested by a name not present in the registry
    #[error("unknown scattering mechanism `{0}`")]
    UnknownMechanism(String),
    /// Automatic resolution found no mechanism whose required properties are all
    /// present
    #[error("no scattering mechanism is possible with the supplied material properties")]
    NoMechanism,
    /// The settings are internally inconsistent
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Top-level error for the rate calculation
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum Error {
    /// The requested mechanisms cannot be built from the supplied settings
    #[error(transparent)]
    #[diagnostic(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A worker thread exited without being told to stop
    #[error("a scattering worker exited unexpectedly ({context}); this usually means a worker was killed by memory exhaustion")]
    #[diagnostic(help("try re-running with a smaller `nworkers`"))]
    WorkerFailure {
        /// What the pool observed when it detected the failure
        context: String,
    },
    /// A worker reported a failure while evaluating a job; the original message
    /// and trace are transported through the result queue
    #[error("a worker failed while evaluating a scattering job: {message}")]
    RemoteComputation {
        /// Display form of the original error or panic payload
        message: String,
    },
}

/// An internal failure inside the per-job evaluation.
///
/// These are programming or caching errors, not physical degeneracies: a
/// degenerate cross section yields a zero rate, never a `KernelError`.
#[derive(thiserror::Error, Debug)]
pub enum KernelError {
    /// A (band, k-point) pair on a cross section was expected in the
    /// coefficient table but is not present
    #[error("no cached wavefunction coefficients for band {band}, k-point {kpoint}")]
    MissingCoefficients {
        /// Band index of the missing pair
        band: usize,
        /// k-point index of the missing pair
        kpoint: usize,
    },
}
