use log::{info, warn};
use std::{
    any::Any,
    fs, io,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
};

use crate::{
    acquirer,
    artifacts::{self, plan_copies},
    build::{Build, BuildState},
    error::PipelineError,
    executor::{BuildExecutor, FailureDetector, MarkerDetector},
    models::{ArtifactResult, DeploymentState, DeploymentStatus},
    services::{ContainerBackend, DeploymentNotifier, SourceProvider},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded {
        url: String,
        artifacts: ArtifactResult,
    },
    /// Nothing was built or copied; `planned` lists the copies a real run
    /// would have made.
    DryRun {
        version: String,
        planned: Vec<(PathBuf, PathBuf)>,
    },
    /// Tags mode, but no tag points at the commit.
    NotApplicable,
}

/// Drives one build at a time from checkout to published manifest.
pub struct Orchestrator {
    source: Box<dyn SourceProvider + Send>,
    backend: Box<dyn ContainerBackend + Send>,
    notifier: Box<dyn DeploymentNotifier + Send>,
    detector: Box<dyn FailureDetector>,
}

impl Orchestrator {
    pub fn new<S, B, N>(source: S, backend: B, notifier: N) -> Orchestrator
    where
        S: 'static + SourceProvider + Send,
        B: 'static + ContainerBackend + Send,
        N: 'static + DeploymentNotifier + Send,
    {
        Orchestrator {
            source: Box::new(source),
            backend: Box::new(backend),
            notifier: Box::new(notifier),
            detector: Box::new(MarkerDetector::default()),
        }
    }

    pub fn with_detector<D: 'static + FailureDetector>(mut self, detector: D) -> Orchestrator {
        self.detector = Box::new(detector);
        self
    }

    /// Runs the build. Fatal errors, panics included, are logged, the checkout
    /// is removed and the deployment is marked as errored before the error is
    /// returned.
    pub fn run(&mut self, build: &mut Build) -> Result<BuildOutcome, PipelineError> {
        build.log(&format!(
            "[runner] Starting build (build id: {}, env: {})",
            build.id,
            build.configuration().environment
        ));
        build.transition(BuildState::Started);
        self.notify_started(build);

        // Never delete a directory this build didn't create.
        let owns_checkout = !build.source_path.exists();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(build)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                build.transition(BuildState::Failed);
                if owns_checkout {
                    cleanup(build);
                }
                build.log(&err.to_string());
                self.notify(build, DeploymentState::Error, "", "Build error");
                Err(err)
            }
        }
    }

    fn run_stages(&mut self, build: &mut Build) -> Result<BuildOutcome, PipelineError> {
        let repo = acquirer::acquire(&mut *self.source, build)?;
        build.transition(BuildState::Acquired);

        let conf = build.configuration();
        let version = match artifacts::resolve_version(conf.mode, &repo) {
            Some(version) => version,
            None => {
                build.log("[runner] No tag found for git ref, aborting");
                build.transition(BuildState::AbortedNoTag);
                cleanup(build);
                self.notify(
                    build,
                    DeploymentState::Inactive,
                    "",
                    "Build skipped: no tag for commit",
                );
                return Ok(BuildOutcome::NotApplicable);
            }
        };
        build.log(&format!("[runner] version {}", version));

        if conf.dry_run {
            let planned = plan_copies(&conf.artifacts, &repo.path, &conf.output_path, &version);
            build.transition(BuildState::SkippedDryRun);
            build.log("[runner] dry_run, skipping build and artifacts");

            for (from, to) in planned.iter() {
                build.log(&format!("[runner] would copy {:?} to {:?}", from, to));
            }

            self.notify(build, DeploymentState::Success, "", "Dry run completed");
            build.transition(BuildState::Succeeded);
            return Ok(BuildOutcome::DryRun { version, planned });
        }

        let mut executor = BuildExecutor::new(&mut *self.backend, &*self.detector);
        let image = executor.setup(build)?;
        executor.run(build, image)?;
        build.transition(BuildState::Built);

        let conf = build.configuration();
        let result = artifacts::copy_artifacts(conf, &repo, &version).map_err(|err| {
            build.log("BUILD FAILED, NO ARTIFACTS");
            err
        })?;
        let url = artifacts::write_manifest(conf, &repo, &version)?;
        build.transition(BuildState::ArtifactsWritten);

        self.notify(build, DeploymentState::Success, &url, "Build succeeded");
        build.transition(BuildState::Succeeded);
        build.log(&format!("[runner] Build succeeded, published {}", url));

        Ok(BuildOutcome::Succeeded {
            url,
            artifacts: result,
        })
    }

    fn notify_started(&mut self, build: &mut Build) {
        let conf = build.configuration();
        let description = format!("{} deployment", conf.environment);

        match self
            .notifier
            .create_deployment(&conf.commit_id, &description, &conf.environment)
        {
            Ok(id) => build.deployment = Some(id),
            Err(err) => warn!("[{}] couldn't create deployment: {:#}", build.id, err),
        }

        self.notify(build, DeploymentState::InProgress, "", "Build started");
    }

    /// Notifier failures never change the build's own result.
    fn notify(&mut self, build: &Build, state: DeploymentState, environment_url: &str, description: &str) {
        let id = match build.deployment {
            Some(id) => id,
            None => {
                warn!("[{}] no deployment to mark as {:?}", build.id, state);
                return;
            }
        };

        let status = DeploymentStatus {
            state,
            log_url: build.log_url.clone(),
            environment_url: environment_url.to_owned(),
            description: description.to_owned(),
        };

        if let Err(err) = self.notifier.set_status(id, &status) {
            warn!("[{}] couldn't update deployment {}: {:#}", build.id, id.0, err);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}

/// Best effort: a checkout that can't be removed is logged and left behind.
fn cleanup(build: &Build) {
    info!("[runner] cleaning up repo {:?}", build.source_path);

    match fs::remove_dir_all(&build.source_path) {
        Ok(()) => (),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => warn!("couldn't remove {:?}: {}", build.source_path, err),
    }
}
