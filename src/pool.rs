//! # Pool
//!
//! The manager/worker fabric of the engine. A fixed set of long-lived worker
//! threads pulls jobs from a shared channel, evaluates them against the
//! read-only [`SharedState`] and pushes tagged outcomes back through a result
//! channel. Results arrive in completion order; every outcome carries the
//! originating irreducible k-point index so the assembler can place it
//! regardless of ordering. A worker never crashes on a failed job: panics and
//! kernel errors are captured and shipped through the result queue, and the
//! manager re-surfaces them after tearing the pool down.

use crate::bandstructure::{BandStructure, Spin};
use crate::cache::CoefficientTable;
use crate::error::Error;
use crate::kernel;
use crate::overlap::{MomentumRelaxationProvider, OverlapProvider};
use crate::scattering::ScatteringMechanism;
use crate::settings::MaterialSettings;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use ndarray::Array3;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a single `collect` waits before checking worker liveness
pub const COLLECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a worker reads while evaluating jobs. Shared by reference across
/// the pool and immutable for its lifetime.
pub struct SharedState {
    /// The caller's material settings
    pub settings: Arc<MaterialSettings>,
    /// The band-structure view
    pub band_structure: Arc<dyn BandStructure>,
    /// The overlap provider, used directly when no coefficient table exists
    pub overlap: Arc<dyn OverlapProvider>,
    /// Optional momentum-relaxation weighting applied to elastic rates
    pub momentum_relaxation: Option<Arc<dyn MomentumRelaxationProvider>>,
    /// The resolved mechanisms, in tensor order
    pub mechanisms: Arc<Vec<ScatteringMechanism>>,
    /// The wavefunction coefficient table, if caching succeeded
    pub coefficients: Option<Arc<CoefficientTable>>,
}

/// One unit of work: evaluate the scattering rate of a single state
#[derive(Debug, Clone)]
pub struct Job {
    /// Spin channel
    pub spin: Spin,
    /// Band index
    pub band: usize,
    /// Full-mesh k-point index of the state
    pub kpoint: usize,
    /// `None` for elastic evaluation; ±ħω for inelastic emission / absorption
    pub energy_shift: Option<f64>,
    /// Position of the k-point in the irreducible list, echoed in the outcome
    pub ir_idx: usize,
}

/// The tagged result of one job
pub enum JobOutcome {
    /// Successful evaluation
    Rates {
        /// The irreducible index the job was submitted with
        ir_idx: usize,
        /// Per-(mechanism, doping, temperature) rate contributions
        rates: Array3<f64>,
    },
    /// The job failed; the pool is no longer usable
    Failure {
        /// Display form of the error or panic payload
        message: String,
        /// Captured backtrace or error chain for the log
        trace: String,
    },
}

enum WorkerMessage {
    Job(Job),
    Stop,
}

/// A fixed set of long-lived workers and the two queues connecting them to the
/// manager
pub struct WorkerPool {
    job_tx: Option<Sender<WorkerMessage>>,
    result_rx: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    collect_timeout: Duration,
}

impl WorkerPool {
    /// Start `nworkers` workers sharing `state` read-only
    pub fn spawn(nworkers: usize, state: Arc<SharedState>) -> Self {
        let (job_tx, job_rx) = unbounded::<WorkerMessage>();
        let (result_tx, result_rx) = unbounded::<JobOutcome>();
        let workers = (0..nworkers.max(1))
            .map(|worker| {
                let state = Arc::clone(&state);
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("kscatter-worker-{worker}"))
                    .spawn(move || worker_loop(state, job_rx, result_tx))
                    .expect("failed to spawn a scattering worker")
            })
            .collect();
        tracing::debug!("started {} scattering workers", nworkers.max(1));
        Self {
            job_tx: Some(job_tx),
            result_rx,
            workers,
            collect_timeout: COLLECT_TIMEOUT,
        }
    }

    /// Override the liveness-check timeout; used to shorten failure detection
    /// in tests
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    /// Enqueue a job without blocking
    pub fn submit(&self, job: Job) -> Result<(), Error> {
        match &self.job_tx {
            Some(sender) => sender
                .send(WorkerMessage::Job(job))
                .map_err(|_| Error::WorkerFailure {
                    context: "the job queue is closed".into(),
                }),
            None => Err(Error::WorkerFailure {
                context: "the pool has been shut down".into(),
            }),
        }
    }

    /// Block until one result is available.
    ///
    /// A timeout triggers a liveness check: if every worker is alive the wait
    /// is retried, since a job is allowed to be slow; if any worker has exited
    /// the pool is torn down and the calculation fails.
    pub fn collect(&mut self) -> Result<(usize, Array3<f64>), Error> {
        loop {
            match self.result_rx.recv_timeout(self.collect_timeout) {
                Ok(JobOutcome::Rates { ir_idx, rates }) => return Ok((ir_idx, rates)),
                Ok(JobOutcome::Failure { message, trace }) => {
                    tracing::error!("worker-side failure:\n{trace}");
                    self.shutdown();
                    return Err(Error::RemoteComputation { message });
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.workers.iter().any(|worker| worker.is_finished()) {
                        self.shutdown();
                        return Err(Error::WorkerFailure {
                            context: "a worker stopped responding during collect".into(),
                        });
                    }
                    tracing::debug!("collect timed out with all workers alive; retrying");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown();
                    return Err(Error::WorkerFailure {
                        context: "the result queue disconnected".into(),
                    });
                }
            }
        }
    }

    /// Stop and join every worker and close both queues. Idempotent, and a
    /// no-op when the pool was already torn down.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.job_tx.take() {
            for _ in &self.workers {
                // A worker which already exited cannot receive; ignore it
                let _ = sender.send(WorkerMessage::Stop);
            }
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }

    /// The number of workers still running
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|worker| !worker.is_finished())
            .count()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    state: Arc<SharedState>,
    job_rx: Receiver<WorkerMessage>,
    result_tx: Sender<JobOutcome>,
) {
    while let Ok(message) = job_rx.recv() {
        let job = match message {
            WorkerMessage::Job(job) => job,
            WorkerMessage::Stop => break,
        };
        let outcome = match catch_unwind(AssertUnwindSafe(|| kernel::evaluate(&state, &job))) {
            Ok(Ok(rates)) => JobOutcome::Rates {
                ir_idx: job.ir_idx,
                rates,
            },
            Ok(Err(error)) => JobOutcome::Failure {
                message: error.to_string(),
                trace: format!("{error:?}"),
            },
            Err(panic) => JobOutcome::Failure {
                message: panic_message(&panic),
                trace: std::backtrace::Backtrace::force_capture().to_string(),
            },
        };
        if result_tx.send(outcome).is_err() {
            // The manager is gone; nothing left to do
            break;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
