use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::{
    env,
    path::Path,
    process::{Command, Output},
    str,
    time::Duration,
};

use crate::{models::RepoContext, services::SourceProvider};

/// Drives the `git` command line tool.
pub struct GitCli {
    depth: u32,
    stall_timeout: Option<Duration>,
}

impl GitCli {
    pub fn new(depth: u32, stall_timeout: Option<Duration>) -> GitCli {
        GitCli {
            depth: depth.max(1),
            stall_timeout,
        }
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut command = Command::new("git");
        if let Some(timeout) = self.stall_timeout {
            command
                .arg("-c")
                .arg("http.lowSpeedLimit=1000")
                .arg("-c")
                .arg(format!("http.lowSpeedTime={}", timeout.as_secs().max(1)));

            // An ssh command the operator set up is left alone.
            if env::var_os("GIT_SSH_COMMAND").is_none() {
                command.env("GIT_SSH_COMMAND", ssh_command(timeout));
            }
        }
        if let Some(cwd) = cwd {
            command.arg("-C").arg(cwd);
        }
        command.env("GIT_TERMINAL_PROMPT", "0");
        command
    }

    /// Runs git and returns its stdout, or an error carrying everything git
    /// printed.
    fn exec(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        debug!("git {}", args.join(" "));

        let Output {
            status,
            stdout,
            stderr,
        } = self
            .command(cwd)
            .args(args)
            .output()
            .context("couldn't run git")?;

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        if !status.success() {
            return Err(anyhow!(
                "`git {}` failed with {}: {} {}",
                args.join(" "),
                status,
                stdout.trim(),
                String::from_utf8_lossy(&stderr).trim()
            ));
        }

        Ok(stdout)
    }

    fn checkout_commit(&self, path: &Path, commit_id: &str) -> Result<()> {
        let depth = self.depth.to_string();

        if let Err(err) = self.exec(Some(path), &["checkout", "--detach", commit_id]) {
            // The commit is older than the shallow history, ask for it directly.
            warn!("{:#}, fetching {} explicitly", err, commit_id);
            self.exec(Some(path), &["fetch", "--depth", &depth, "origin", commit_id])?;
            self.exec(Some(path), &["checkout", "--detach", commit_id])?;
        }

        Ok(())
    }
}

impl SourceProvider for GitCli {
    fn checkout(&mut self, git_url: &str, commit_id: &str, path: &Path) -> Result<RepoContext> {
        let target = path
            .to_str()
            .ok_or_else(|| anyhow!("checkout path {:?} is not valid utf-8", path))?;
        let depth = self.depth.to_string();

        self.exec(
            None,
            &["clone", "--depth", &depth, "--no-single-branch", git_url, target],
        )?;
        self.checkout_commit(path, commit_id)?;

        let head = self.exec(Some(path), &["rev-parse", "HEAD"])?;
        let tags = self.exec(Some(path), &["tag", "--points-at", "HEAD", "--sort=refname"])?;
        let message = self.exec(Some(path), &["log", "-1", "--format=%B", "HEAD"])?;

        Ok(RepoContext {
            path: path.to_path_buf(),
            commit_id: head.trim().to_owned(),
            tag: first_tag(&tags),
            message,
        })
    }
}

/// ssh ignores the `http.lowSpeed*` options. These keepalives drop a
/// connection whose peer stops answering.
fn ssh_command(timeout: Duration) -> String {
    let secs = timeout.as_secs().max(1);
    format!(
        "ssh -o BatchMode=yes -o ConnectTimeout={0} -o ServerAliveInterval={0} -o ServerAliveCountMax=1",
        secs
    )
}

/// Tags come sorted by name, so picking the first keeps the choice stable
/// when several tags point at the same commit.
fn first_tag(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}
