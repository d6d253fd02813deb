//! Pool coordinator: owns the workspace, runs the workers, times the call.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

use shm_workspace::{Granularity, RegionName, SharedWorkspace};
use tracing::{debug, info, warn};

use crate::error::WorkerFailure;
use crate::matrix::{Matrix, Operands};
use crate::worker::{self, WORKER_COMMAND};
use crate::{Config, Error, Product};

/// How workers are started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Launcher {
    /// Scoped threads inside the coordinator process, sharing its mapping.
    #[default]
    Threads,
    /// Execute `program worker <region> <id>`; `program` must dispatch the
    /// `worker` command to [`worker::run_process`].
    Process { program: PathBuf },
    /// Re-execute the running binary as `<exe> worker <region> <id>`.
    ///
    /// Only for binaries whose `main` handles the `worker` command before
    /// anything else, as the `matrix-mul` binary does. Any other host would
    /// start its own `main` again in every worker.
    CurrentExe,
}

/// Spawns workers against a fresh shared workspace per call.
#[derive(Debug, Clone)]
pub struct Pool {
    shm_dir: PathBuf,
    launcher: Launcher,
}

impl Pool {
    pub fn new(shm_dir: impl Into<PathBuf>, launcher: Launcher) -> Self {
        Self {
            shm_dir: shm_dir.into(),
            launcher,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.shm_dir.clone(), config.launcher.clone())
    }

    pub fn shm_dir(&self) -> &Path {
        &self.shm_dir
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    /// Multiplies `operands` with `workers` workers splitting C by
    /// `granularity`.
    ///
    /// The elapsed time covers spawning and joining the workers, not
    /// workspace setup or teardown. With zero workers the coordinator drains
    /// the cursor itself. The workspace is released on every path.
    pub fn multiply(
        &self,
        granularity: Granularity,
        operands: Operands,
        workers: usize,
    ) -> Result<Product, Error> {
        let size = operands.size();
        let name = RegionName::unique();
        let mut ws =
            SharedWorkspace::create(&self.shm_dir, &name, size, granularity, workers.max(1))?;
        {
            let (a, b) = ws.operands_mut();
            a.copy_from_slice(operands.a.as_slice());
            b.copy_from_slice(operands.b.as_slice());
        }
        ws.mutex().init()?;

        let start = Instant::now();
        let failures = if workers == 0 {
            worker::run(&ws, 0)?;
            Vec::new()
        } else {
            match &self.launcher {
                Launcher::CurrentExe => {
                    let program = std::env::current_exe()
                        .map_err(|source| Error::Spawn { worker: 0, source })?;
                    run_processes(&program, &ws, workers)?
                }
                Launcher::Process { program } => run_processes(program, &ws, workers)?,
                Launcher::Threads => run_threads(&ws, workers)?,
            }
        };
        let elapsed = start.elapsed();

        let audit = ws.audit();
        if !failures.is_empty() {
            for failure in &failures {
                warn!(region = %name, %failure, "worker terminated abnormally");
            }
            return Err(Error::PartialFailure {
                abandoned: failures.iter().map(|f| f.abandoned).sum(),
                unclaimed: audit.unclaimed,
                failures,
            });
        }
        if !audit.is_exact() {
            return Err(Error::Partition(audit));
        }

        let tallies = ws.tallies_snapshot();
        let result = Matrix::from_vec(size, ws.result().to_vec())?;
        ws.destroy()?;

        info!(
            granularity = %granularity,
            size,
            workers,
            busy = tallies.iter().filter(|t| t.claimed > 0).count(),
            elapsed_us = elapsed.as_micros() as u64,
            "parallel multiply finished"
        );

        Ok(Product {
            operands,
            result,
            elapsed,
            tallies,
        })
    }
}

fn failure(ws: &SharedWorkspace, worker: usize, reason: String) -> WorkerFailure {
    WorkerFailure {
        worker,
        reason,
        abandoned: ws.tally(worker).map_or(0, |t| t.abandoned()),
    }
}

fn run_processes(
    program: &Path,
    ws: &SharedWorkspace,
    workers: usize,
) -> Result<Vec<WorkerFailure>, Error> {
    let mut children: Vec<Child> = Vec::with_capacity(workers);
    for worker in 0..workers {
        let spawned = Command::new(program)
            .arg(WORKER_COMMAND)
            .arg(ws.path())
            .arg(worker.to_string())
            .stdin(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => children.push(child),
            Err(source) => {
                abort(&mut children);
                return Err(Error::Spawn { worker, source });
            }
        }
    }
    debug!(region = ws.name(), workers, "spawned worker processes");

    let mut failures = Vec::new();
    let mut wait_error = None;
    for (worker, child) in children.iter_mut().enumerate() {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => failures.push(failure(ws, worker, status.to_string())),
            Err(source) => {
                wait_error.get_or_insert(Error::Wait { worker, source });
            }
        }
    }

    match wait_error {
        Some(e) => Err(e),
        None => Ok(failures),
    }
}

/// Kills and reaps workers started before a spawn failure.
fn abort(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn run_threads(ws: &SharedWorkspace, workers: usize) -> Result<Vec<WorkerFailure>, Error> {
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let handle = thread::Builder::new()
                .name(format!("matmul-worker-{worker}"))
                .spawn_scoped(s, move || worker::run(ws, worker))
                .map_err(|source| Error::Spawn { worker, source })?;
            handles.push((worker, handle));
        }

        let failures = handles
            .into_iter()
            .filter_map(|(worker, handle)| {
                let reason = match handle.join() {
                    Ok(Ok(_)) => return None,
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "worker thread panicked".to_string(),
                };
                Some(failure(ws, worker, reason))
            })
            .collect();
        Ok(failures)
    })
}
