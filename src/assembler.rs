//! # Assembler
//!
//! Orchestration of the calculation. The assembler resolves the mechanisms,
//! builds the shared worker state, submits one job per (state, iso-surface)
//! combination and places the collected results into the dense rate tensor.
//! Out-of-window states are never submitted: their entries keep the sentinel
//! rate. Results may arrive in any order; each is placed by the irreducible
//! index echoed through the result queue, so the assembled tensor does not
//! depend on completion order.

use crate::bandstructure::{BandStructure, Spin};
use crate::cache::build_coefficient_table;
use crate::constants::SENTINEL_RATE;
use crate::error::Error;
use crate::overlap::{MomentumRelaxationProvider, OverlapProvider};
use crate::pool::{Job, SharedState, WorkerPool};
use crate::postprocessor::{expand_symmetry, repair_low_rates};
use crate::scattering::{resolve_mechanisms, MechanismKind, ScatteringMechanism};
use crate::settings::MaterialSettings;
use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::{s, Array4, Array5, Axis};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The assembled scattering rates of every state
pub struct RateTensor {
    /// Registry names of the mechanisms, in tensor order along the first axis
    pub mechanisms: Vec<&'static str>,
    /// Rates in 1 / s per spin channel, indexed by
    /// (mechanism, doping, temperature, band, k-point)
    pub rates: HashMap<Spin, Array5<f64>>,
}

impl RateTensor {
    /// The total rate per state, summed over mechanisms.
    ///
    /// Out-of-window states accumulate one sentinel per mechanism, so their
    /// totals remain "effectively infinite" for downstream consumers.
    pub fn total(&self, spin: Spin) -> Array4<f64> {
        self.rates[&spin].sum_axis(Axis(0))
    }
}

/// Assembles the rate tensor one band at a time from pooled job results
pub struct BandRateAssembler {
    shared: Arc<SharedState>,
}

impl BandRateAssembler {
    /// Wrap the shared worker state
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Compute the block of one band: submit a job per in-window irreducible
    /// k-point and iso-surface, collect in completion order and place by the
    /// echoed irreducible index. Returns the block indexed by
    /// (mechanism, doping, temperature, k-point); columns which received no
    /// job keep the sentinel rate.
    pub fn compute_band(
        &self,
        mut pool: Option<&mut WorkerPool>,
        spin: Spin,
        band: usize,
    ) -> Result<Array4<f64>, Error> {
        let started = Instant::now();
        let shared = self.shared.as_ref();
        let settings = shared.settings.as_ref();
        let band_structure = shared.band_structure.as_ref();
        let num_mechanisms = shared.mechanisms.len();
        let num_doping = settings.num_doping();
        let num_temperatures = settings.num_temperatures();
        let num_kpoints = band_structure.num_kpoints();

        let mut block = Array4::from_elem(
            (num_mechanisms, num_doping, num_temperatures, num_kpoints),
            SENTINEL_RATE,
        );

        let window = band_structure.energy_window();
        let energies = band_structure.energies(spin);
        let in_window: Vec<(usize, usize)> = band_structure
            .ir_kpoints_idx()
            .iter()
            .enumerate()
            .filter(|&(_, &kpoint)| window.contains(energies[(band, kpoint)]))
            .map(|(ir_idx, &kpoint)| (ir_idx, kpoint))
            .collect();

        let has_elastic = shared
            .mechanisms
            .iter()
            .any(|mechanism| mechanism.kind() == MechanismKind::Elastic);
        // One pair of shifted jobs per distinct phonon energy; mechanisms
        // sharing an energy are evaluated together inside the kernel
        let mut shifts: Vec<f64> = shared
            .mechanisms
            .iter()
            .filter_map(|mechanism| match mechanism {
                ScatteringMechanism::Inelastic(mechanism) => Some(mechanism.phonon_energy()),
                _ => None,
            })
            .collect();
        shifts.sort_by(|a, b| a.total_cmp(b));
        shifts.dedup();

        let jobs_per_state = usize::from(has_elastic) + 2 * shifts.len();
        let expected = in_window.len() * jobs_per_state;

        let progress = band_progress(settings, band, expected as u64);
        if expected > 0 {
            let pool = match pool.as_deref_mut() {
                Some(pool) => pool,
                None => {
                    return Err(Error::WorkerFailure {
                        context: "no worker pool for a band with pooled jobs".into(),
                    })
                }
            };
            for &(ir_idx, kpoint) in &in_window {
                if has_elastic {
                    pool.submit(Job {
                        spin,
                        band,
                        kpoint,
                        energy_shift: None,
                        ir_idx,
                    })?;
                }
                for &phonon_energy in &shifts {
                    for shift in [-phonon_energy, phonon_energy] {
                        pool.submit(Job {
                            spin,
                            band,
                            kpoint,
                            energy_shift: Some(shift),
                            ir_idx,
                        })?;
                    }
                }
            }

            let mut accumulator =
                Array4::zeros((num_mechanisms, num_doping, num_temperatures, num_kpoints));
            for _ in 0..expected {
                let (ir_idx, rates) = pool.collect()?;
                let kpoint = band_structure.ir_kpoints_idx()[ir_idx];
                accumulator
                    .slice_mut(s![.., .., .., kpoint])
                    .scaled_add(1.0, &rates);
                progress.inc(1);
            }

            for (row, mechanism) in shared.mechanisms.iter().enumerate() {
                if mechanism.kind() == MechanismKind::Basic {
                    continue;
                }
                let prefactor = mechanism.prefactor(spin, band);
                for &(_, kpoint) in &in_window {
                    for d in 0..num_doping {
                        for t in 0..num_temperatures {
                            block[(row, d, t, kpoint)] =
                                accumulator[(row, d, t, kpoint)] * prefactor[(d, t)];
                        }
                    }
                }
            }
        }
        progress.finish_and_clear();

        for (row, mechanism) in shared.mechanisms.iter().enumerate() {
            if let ScatteringMechanism::Basic(mechanism) = mechanism {
                let rates = mechanism.rates(spin, band, band_structure);
                for &(_, kpoint) in &in_window {
                    for d in 0..num_doping {
                        for t in 0..num_temperatures {
                            block[(row, d, t, kpoint)] = rates[(d, t, kpoint)];
                        }
                    }
                }
            }
        }

        let mut minimum = f64::INFINITY;
        let mut maximum = f64::NEG_INFINITY;
        for &(_, kpoint) in &in_window {
            for rate in block.slice(s![.., .., .., kpoint]) {
                minimum = minimum.min(*rate);
                maximum = maximum.max(*rate);
            }
        }
        tracing::info!(
            "band {band} ({spin:?}): {} in-window k-points, rates in [{minimum:.3e}, {maximum:.3e}] 1 / s, assembled in {:.2?}",
            in_window.len(),
            started.elapsed()
        );
        Ok(block)
    }
}

fn band_progress(settings: &MaterialSettings, band: usize, expected: u64) -> ProgressBar {
    if !settings.progress_bar {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{prefix:.bold.dim} {spinner} {msg} [{wide_bar:.cyan/blue}] {percent}% ({eta})");
    let progress =
        ProgressBar::with_draw_target(expected, ProgressDrawTarget::term(Term::stdout(), 60));
    progress.set_style(style);
    progress.set_message(format!("band {band}"));
    progress
}

/// Compute the scattering rate of every state of the band structure.
///
/// This is the public entry point of the engine: it resolves the mechanism
/// selection, optionally precomputes the wavefunction coefficient cache,
/// spawns the worker pool, assembles every band of every spin channel and
/// runs the post-processing passes. The returned tensor is dense over the
/// full k-mesh, with the sentinel rate at every out-of-window state.
pub fn compute_all_rates(
    settings: Arc<MaterialSettings>,
    band_structure: Arc<dyn BandStructure>,
    overlap: Arc<dyn OverlapProvider>,
    momentum_relaxation: Option<Arc<dyn MomentumRelaxationProvider>>,
) -> Result<RateTensor, Error> {
    settings.validate()?;
    let mechanisms = Arc::new(resolve_mechanisms(&settings)?);

    // Shifted iso-surfaces reach beyond the window by one phonon energy, so
    // the cache must be padded by the largest
    let pad = mechanisms
        .iter()
        .filter_map(|mechanism| match mechanism {
            ScatteringMechanism::Inelastic(mechanism) => Some(mechanism.phonon_energy()),
            _ => None,
        })
        .fold(0.0, f64::max);
    let coefficients = if settings.cache_wavefunction {
        build_coefficient_table(
            band_structure.as_ref(),
            overlap.as_ref(),
            band_structure.energy_window(),
            pad,
            settings.cache_memory_limit,
        )
        .map(Arc::new)
    } else {
        None
    };

    let shared = Arc::new(SharedState {
        settings: Arc::clone(&settings),
        band_structure: Arc::clone(&band_structure),
        overlap,
        momentum_relaxation,
        mechanisms: Arc::clone(&mechanisms),
        coefficients,
    });

    let pooled = mechanisms
        .iter()
        .any(|mechanism| mechanism.kind() != MechanismKind::Basic);
    let mut pool = pooled.then(|| WorkerPool::spawn(settings.worker_count(), Arc::clone(&shared)));

    let assembler = BandRateAssembler::new(Arc::clone(&shared));
    let num_bands = band_structure.num_bands();
    let num_kpoints = band_structure.num_kpoints();
    let mut rates = HashMap::new();
    for &spin in band_structure.spins() {
        let mut tensor = Array5::from_elem(
            (
                mechanisms.len(),
                settings.num_doping(),
                settings.num_temperatures(),
                num_bands,
                num_kpoints,
            ),
            SENTINEL_RATE,
        );
        for band in 0..num_bands {
            let block = assembler.compute_band(pool.as_mut(), spin, band)?;
            tensor.slice_mut(s![.., .., .., band, ..]).assign(&block);
        }
        rates.insert(spin, tensor);
    }
    if let Some(mut pool) = pool.take() {
        pool.shutdown();
    }

    for &spin in band_structure.spins() {
        let tensor = rates
            .get_mut(&spin)
            .ok_or_else(|| Error::WorkerFailure {
                context: "a spin channel vanished during assembly".into(),
            })?;
        repair_low_rates(tensor, band_structure.as_ref(), spin, settings.rate_floor);
        expand_symmetry(tensor, band_structure.as_ref());
    }

    Ok(RateTensor {
        mechanisms: mechanisms.iter().map(|mechanism| mechanism.name()).collect(),
        rates,
    })
}

#[cfg(test)]
mod test {
    use super::compute_all_rates;
    use crate::bandstructure::tetrahedra::{gamma_centered_kpoints, mesh_tetrahedra};
    use crate::bandstructure::{BandStructure, DenseBandStructure, EnergyWindow, Spin};
    use crate::constants::SENTINEL_RATE;
    use crate::overlap::WavefunctionOverlap;
    use crate::settings::{MaterialSettings, MechanismSelection};
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;
    use ndarray::{Array2, Array3};
    use num_complex::Complex64;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn settings(selection: MechanismSelection) -> MaterialSettings {
        MaterialSettings {
            mechanisms: selection,
            nworkers: Some(2),
            cache_wavefunction: true,
            progress_bar: false,
            cache_memory_limit: None,
            rate_floor: 1e-30,
            doping: vec![-1e24],
            temperatures: vec![300.0],
            fermi_levels: vec![vec![0.1]],
            properties: HashMap::from([
                ("deformation_potential".to_string(), 8.6),
                ("elastic_constant".to_string(), 139.7),
            ]),
        }
    }

    /// A linear band with half the mesh inside the window
    fn band_structure() -> Arc<DenseBandStructure> {
        let mesh = [4, 4, 4];
        let kpoints = gamma_centered_kpoints(mesh);
        let num_kpoints = kpoints.nrows();
        let mut energies = Array2::zeros((1, num_kpoints));
        let mut velocities = Array3::zeros((1, num_kpoints, 3));
        for kpoint in 0..num_kpoints {
            energies[(0, kpoint)] = kpoints[(kpoint, 0)];
            velocities[(0, kpoint, 0)] = 1e5;
        }
        Arc::new(DenseBandStructure::new(
            HashMap::from([(Spin::Up, energies)]),
            HashMap::from([(Spin::Up, velocities)]),
            kpoints,
            Matrix3::identity() * 1e10,
            mesh,
            mesh_tetrahedra(mesh),
            (0..num_kpoints).collect(),
            (0..num_kpoints).collect(),
            EnergyWindow {
                low: 0.0,
                high: 0.3,
            },
        ))
    }

    fn overlap(num_kpoints: usize) -> Arc<WavefunctionOverlap> {
        let mut coefficients = Array3::zeros((1, num_kpoints, 2));
        coefficients
            .index_axis_mut(ndarray::Axis(2), 0)
            .fill(Complex64::new(1.0, 0.0));
        Arc::new(WavefunctionOverlap::new(HashMap::from([(
            Spin::Up,
            coefficients,
        )])))
    }

    #[test]
    fn constant_rate_fills_the_window_and_sentinels_the_rest() {
        let band_structure = band_structure();
        let tensor = compute_all_rates(
            Arc::new(settings(MechanismSelection::ConstantRate(1e-13))),
            band_structure.clone(),
            overlap(64),
            None,
        )
        .unwrap();
        assert_eq!(tensor.mechanisms, vec!["CRT"]);
        let rates = &tensor.rates[&Spin::Up];
        let energies = band_structure.energies(Spin::Up);
        for kpoint in 0..64 {
            if (0.0..=0.3).contains(&energies[(0, kpoint)]) {
                assert_relative_eq!(rates[(0, 0, 0, 0, kpoint)], 1e13);
            } else {
                assert_relative_eq!(rates[(0, 0, 0, 0, kpoint)], SENTINEL_RATE);
            }
        }
    }

    #[test]
    fn elastic_rates_are_finite_and_non_negative_in_the_window() {
        let band_structure = band_structure();
        let tensor = compute_all_rates(
            Arc::new(settings(MechanismSelection::Auto)),
            band_structure,
            overlap(64),
            None,
        )
        .unwrap();
        assert_eq!(tensor.mechanisms, vec!["ADP"]);
        let rates = &tensor.rates[&Spin::Up];
        assert!(rates.iter().all(|rate| rate.is_finite() && *rate >= 0.0));
    }
}
