use anyhow::{anyhow, Result};
use log::{error, info};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc},
    thread,
};

use crate::{
    build::Build,
    models::BuildRequest,
    orchestrator::{BuildOutcome, Orchestrator},
    services::ConfigFrontend,
    settings::Settings,
};

/// Resolves requests into builds and runs them.
pub struct Worker {
    frontend: Box<dyn ConfigFrontend + Send>,
    orchestrator: Orchestrator,
    settings: Arc<Settings>,
}

impl Worker {
    pub fn new<F>(frontend: F, orchestrator: Orchestrator, settings: Arc<Settings>) -> Worker
    where
        F: 'static + ConfigFrontend + Send,
    {
        Worker {
            frontend: Box::new(frontend),
            orchestrator,
            settings,
        }
    }

    /// `Ok(None)` when the branch has no configuration.
    pub fn process(&mut self, request: BuildRequest) -> Result<Option<BuildOutcome>> {
        let configuration = self
            .frontend
            .configuration(&request.branch, &request.commit_id)?;

        let mut configuration = match configuration {
            Some(configuration) => configuration,
            None => {
                info!("no configuration for branch {}, ignoring", request.branch);
                return Ok(None);
            }
        };
        configuration.dry_run |= request.dry_run;

        let mut build = Build::new(configuration, &self.settings)?;
        info!(
            "build {} for {}/{} logging to {:?}",
            build.id,
            request.branch,
            request.commit_id,
            build.log_path()
        );

        let outcome = self.orchestrator.run(&mut build)?;
        Ok(Some(outcome))
    }
}

/// Handle for admitting requests. Cloning it is cheap and submitting never
/// blocks.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<BuildRequest>,
}

impl QueueHandle {
    /// Wraps the sending side of a request channel. Whoever holds the
    /// receiver is the worker.
    pub fn new(sender: mpsc::Sender<BuildRequest>) -> QueueHandle {
        QueueHandle { sender }
    }

    pub fn submit(&self, request: BuildRequest) -> Result<()> {
        info!("queueing build for {}/{}", request.branch, request.commit_id);
        self.sender
            .send(request)
            .map_err(|_| anyhow!("the build worker has stopped"))
    }
}

/// Unbounded FIFO queue drained by a single worker thread, so builds run one
/// at a time in admission order.
pub struct BuildQueue {
    handle: QueueHandle,
    worker: thread::JoinHandle<()>,
}

impl BuildQueue {
    pub fn spawn(worker: Worker) -> Result<BuildQueue> {
        BuildQueue::spawn_with(worker, |_, _| ())
    }

    /// Like `spawn`, calling `finished` after every processed request.
    pub fn spawn_with<F>(mut worker: Worker, mut finished: F) -> Result<BuildQueue>
    where
        F: 'static + FnMut(&BuildRequest, &Result<Option<BuildOutcome>>) + Send,
    {
        let (sender, requests) = mpsc::channel::<BuildRequest>();

        let worker = thread::Builder::new()
            .name("build-worker".into())
            .spawn(move || {
                for request in requests {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| worker.process(request.clone())))
                        .unwrap_or_else(|_| Err(anyhow!("build worker panicked")));

                    match &result {
                        Ok(Some(outcome)) => info!(
                            "build for {}/{} finished: {:?}",
                            request.branch, request.commit_id, outcome
                        ),
                        Ok(None) => (),
                        Err(err) => error!(
                            "build for {}/{} failed: {:#}",
                            request.branch, request.commit_id, err
                        ),
                    }

                    finished(&request, &result);
                }
            })?;

        Ok(BuildQueue {
            handle: QueueHandle::new(sender),
            worker,
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn submit(&self, request: BuildRequest) -> Result<()> {
        self.handle.submit(request)
    }

    /// Stops admitting, lets the worker drain what's queued, and waits for it.
    /// Outstanding `QueueHandle` clones keep the worker alive.
    pub fn shutdown(self) -> Result<()> {
        drop(self.handle);
        self.worker
            .join()
            .map_err(|_| anyhow!("the build worker panicked"))
    }
}
