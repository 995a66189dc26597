use anyhow::{anyhow, Result};
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    io::{stdout, Write},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};
use structopt::StructOpt;

use hookbuild::{
    backends::{DockerCli, GitCli, GithubNotifier},
    executor::MarkerDetector,
    frontends::YamlConfigFrontend,
    models::BuildRequest,
    orchestrator::{BuildOutcome, Orchestrator},
    queue::{BuildQueue, Worker},
    server,
    settings::Settings,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "hookbuild",
    about = "Builds pushed commits in a container and publishes the artifacts."
)]
struct Opt {
    #[structopt(short, long, default_value = "config.yml", parse(from_os_str))]
    /// Configuration file.
    config: PathBuf,

    #[structopt(subcommand)]
    command: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Builds one commit of a configured branch and waits for the result.
    Build {
        #[structopt(long)]
        /// Skip the container build and the artifact copies.
        dry_run: bool,

        branch: String,

        commit_id: String,
    },
    /// Listens for GitHub webhooks and builds every push.
    Serve,
}

fn worker(config: &Path, settings: &Arc<Settings>) -> Result<Worker> {
    let orchestrator = Orchestrator::new(
        GitCli::new(settings.clone_depth, settings.timeouts.stall()),
        DockerCli::new(settings.engine, &settings.timeouts),
        GithubNotifier::new(&settings.github)?,
    )
    .with_detector(MarkerDetector::new(settings.failure_marker.clone()));

    Ok(Worker::new(
        YamlConfigFrontend::new(config),
        orchestrator,
        settings.clone(),
    ))
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    let settings = Arc::new(Settings::from_file(&opt.config)?);
    info!("loaded configuration from {:?}", opt.config);

    let worker = worker(&opt.config, &settings)?;

    match opt.command {
        Cmd::Build {
            dry_run,
            branch,
            commit_id,
        } => {
            let (sender, results) = mpsc::channel();
            let queue = BuildQueue::spawn_with(worker, move |_, result| {
                let summary = match result {
                    Ok(Some(outcome)) => Ok(Some(outcome.clone())),
                    Ok(None) => Ok(None),
                    Err(err) => Err(format!("{:#}", err)),
                };
                let _ = sender.send(summary);
            })?;

            queue.submit(BuildRequest {
                branch,
                commit_id,
                dry_run,
            })?;
            queue.shutdown()?;

            let result = results
                .recv()
                .map_err(|_| anyhow!("the build worker exited without a result"))?;
            report(result)
        }
        Cmd::Serve => {
            let queue = BuildQueue::spawn(worker)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(settings.clone(), queue.handle()))?;
            queue.shutdown()
        }
    }
}

fn report(result: std::result::Result<Option<BuildOutcome>, String>) -> Result<()> {
    let mut stdout = stdout();

    let (label, text) = match &result {
        Ok(Some(BuildOutcome::Succeeded { url, .. })) => ("SUCCESS: ".green().bold(), url.clone()),
        Ok(Some(BuildOutcome::DryRun { version, planned })) => (
            "DRY RUN: ".cyan().bold(),
            format!("version {}, {} artifact(s) planned", version, planned.len()),
        ),
        Ok(Some(BuildOutcome::NotApplicable)) => {
            ("SKIPPED: ".yellow().bold(), "no tag for this commit".into())
        }
        Ok(None) => ("SKIPPED: ".yellow().bold(), "no configuration for this branch".into()),
        Err(err) => ("FAILED: ".red().bold(), err.clone()),
    };

    stdout
        .queue(style::PrintStyledContent(label))?
        .queue(style::Print(format!("{}\n", text)))?
        .flush()?;

    result.map(|_| ()).map_err(|err| anyhow!(err))
}
