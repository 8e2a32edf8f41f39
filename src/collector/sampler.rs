//! Parallel per-tick sampling of the fleet.
//!
//! A fixed pool of worker threads receives one job per server per tick and
//! sends back that server's status, its classified operations and, when
//! enabled, its replication state. The control thread collects the answers,
//! in server order, until the tick deadline; servers that did not answer in
//! time are reported as [`AdapterError::Timeout`]. Answers that arrive after
//! their tick was given up are discarded.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::traits::{AdapterError, ReplicaMember, ReplicationSource, ServerStatus};
use crate::fleet::Server;
use crate::models::OperationRow;
use crate::operations;

/// Default number of sampling threads.
pub const DEFAULT_WORKERS: usize = 4;

/// What a job reads besides status and operations.
#[derive(Debug, Clone, Copy, Default)]
struct ReadOptions {
    hide_replication: bool,
    replication: bool,
}

/// Replica set view of one server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicationSample {
    pub members: Vec<ReplicaMember>,
    pub source: Option<ReplicationSource>,
}

/// Everything read from one server in one tick.
#[derive(Debug, Clone)]
pub struct ServerSample {
    pub status: Result<ServerStatus, AdapterError>,
    pub operations: Result<Vec<OperationRow>, AdapterError>,
    /// Operations reported without a numeric opid.
    pub skipped: usize,
    /// `None` unless replication sampling is enabled.
    pub replication: Option<Result<ReplicationSample, AdapterError>>,
}

impl ServerSample {
    fn timed_out(options: ReadOptions) -> Self {
        Self {
            status: Err(AdapterError::Timeout),
            operations: Err(AdapterError::Timeout),
            skipped: 0,
            replication: options.replication.then_some(Err(AdapterError::Timeout)),
        }
    }

    fn read(server: &Server, options: ReadOptions) -> Self {
        let status = server.adapter().status();
        let listed = operations::list_operations(server, options.hide_replication);
        let (operations, skipped) = match listed {
            Ok(listed) => {
                let skipped = listed.skipped();
                (Ok(listed.collect()), skipped)
            }
            Err(e) => (Err(e), 0),
        };
        let replication = options.replication.then(|| read_replication(server));
        Self {
            status,
            operations,
            skipped,
            replication,
        }
    }
}

fn read_replication(server: &Server) -> Result<ReplicationSample, AdapterError> {
    let adapter = server.adapter();
    Ok(ReplicationSample {
        members: adapter.replica_set_members()?,
        source: adapter.replication_info()?,
    })
}

struct Job {
    generation: u64,
    index: usize,
    server: Server,
    options: ReadOptions,
}

struct JobResult {
    generation: u64,
    index: usize,
    sample: ServerSample,
}

/// Worker pool sampling servers with a per-server deadline.
pub struct Sampler {
    jobs: Sender<Job>,
    results: Receiver<JobResult>,
    workers: usize,
    timeout: Duration,
    options: ReadOptions,
    generation: u64,
}

impl Sampler {
    /// Starts `workers` sampling threads (at least one).
    pub fn new(workers: usize, timeout: Duration) -> Self {
        let workers = workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<JobResult>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("motop-sampler-{}", id))
                .spawn(move || worker_loop(job_rx, result_tx));
            if let Err(e) = spawned {
                warn!(error = %e, "failed to start sampler thread");
            }
        }

        Self {
            jobs: job_tx,
            results: result_rx,
            workers,
            timeout,
            options: ReadOptions::default(),
            generation: 0,
        }
    }

    /// Drops replication traffic from the operation listings.
    pub fn with_hide_replication(mut self, hide: bool) -> Self {
        self.options.hide_replication = hide;
        self
    }

    /// Also reads replica set members and the replication source.
    pub fn with_replication(mut self, enabled: bool) -> Self {
        self.options.replication = enabled;
        self
    }

    /// Samples every server once; the result has one entry per server, in
    /// the same order.
    pub fn sample(&mut self, servers: &[Server]) -> Vec<ServerSample> {
        self.generation += 1;
        let generation = self.generation;
        let options = self.options;
        let mut samples: Vec<Option<ServerSample>> = vec![None; servers.len()];

        for (index, server) in servers.iter().enumerate() {
            let job = Job {
                generation,
                index,
                server: server.clone(),
                options,
            };
            if self.jobs.send(job).is_err() {
                warn!("sampler threads are gone, sampling inline");
                samples[index] = Some(ServerSample::read(server, options));
            }
        }

        // Jobs queue behind each other when there are more servers than
        // workers, so the budget grows with the number of waves.
        let waves = servers.len().div_ceil(self.workers).max(1) as u32;
        let deadline = Instant::now() + self.timeout * waves;

        while samples.iter().any(Option::is_none) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) if result.generation == generation => {
                    samples[result.index] = Some(result.sample);
                }
                Ok(result) => {
                    debug!(
                        generation = result.generation,
                        index = result.index,
                        "dropping late sample"
                    );
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        samples
            .into_iter()
            .enumerate()
            .map(|(index, sample)| {
                sample.unwrap_or_else(|| {
                    warn!(server = servers[index].name(), "sampling timed out");
                    ServerSample::timed_out(options)
                })
            })
            .collect()
    }
}

fn worker_loop(jobs: Arc<Mutex<Receiver<Job>>>, results: Sender<JobResult>) {
    loop {
        let job = {
            let Ok(rx) = jobs.lock() else {
                return;
            };
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };

        let sample = ServerSample::read(&job.server, job.options);
        let result = JobResult {
            generation: job.generation,
            index: job.index,
            sample,
        };
        if results.send(result).is_err() {
            return;
        }
    }
}
