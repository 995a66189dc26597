use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::{
    io::{BufRead, BufReader, Read, Write},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use crate::{
    models::{ContainerRunSpec, ImageName, ImageSpec},
    services::ContainerBackend,
    settings::{Engine, Timeouts},
};

const LABEL_HASH: &str = "io.hookbuild.hash";

/// Talks to docker (or podman, which accepts the same arguments) through its
/// command line interface.
pub struct DockerCli {
    program: &'static str,
    build_timeout: Option<Duration>,
    run_timeout: Option<Duration>,
}

impl DockerCli {
    pub fn new(engine: Engine, timeouts: &Timeouts) -> DockerCli {
        DockerCli {
            program: engine.program(),
            build_timeout: timeouts.build(),
            run_timeout: timeouts.run(),
        }
    }

    fn command(&self) -> Command {
        Command::new(self.program)
    }
}

impl ContainerBackend for DockerCli {
    fn image_hash(&mut self, name: &ImageName) -> Result<Option<String>> {
        let format = format!("{{{{ index .Config.Labels \"{}\" }}}}", LABEL_HASH);
        let output = self
            .command()
            .args(&["image", "inspect", "--format", &format, &name.0])
            .output()
            .with_context(|| format!("couldn't run {}", self.program))?;

        if !output.status.success() {
            debug!("image {} not found", name.0);
            return Ok(None);
        }

        let hash = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if hash == "<no value>" {
            return Ok(Some(String::new()));
        }

        Ok(Some(hash))
    }

    fn build_image(
        &mut self,
        spec: &ImageSpec,
        hash: &str,
        output: &mut dyn FnMut(&str),
    ) -> Result<()> {
        info!("docker image setup for {}", spec.name.0);

        let mut child = self
            .command()
            .arg("build")
            .arg("--rm")
            .arg("--tag")
            .arg(&spec.name.0)
            .arg("--label")
            .arg(format!("{}={}", LABEL_HASH, hash))
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("couldn't run {}", self.program))?;

        let mut stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("image build has no stdin"));
            }
        };
        let dockerfile = spec.dockerfile.clone();
        let writer = thread::spawn(move || stdin.write_all(dockerfile.as_bytes()));

        // Stopping the client aborts the build on the daemon side.
        let streamed = stream_output(&mut child, output, self.build_timeout, &mut |child| {
            if let Err(err) = child.kill() {
                warn!("couldn't stop the image build: {}", err);
            }
        });

        let written = writer
            .join()
            .map_err(|_| anyhow!("build file writer panicked"))
            .and_then(|result| result.context("couldn't send the build file"));

        let streamed = streamed?;
        if streamed.timed_out {
            return Err(anyhow!(
                "image build for {} timed out after {:?}",
                spec.name.0,
                self.build_timeout.unwrap_or_default()
            ));
        }
        if !streamed.status.success() {
            return Err(anyhow!("image build for {} failed with {}", spec.name.0, streamed.status));
        }
        written?;

        Ok(())
    }

    fn run_container(&mut self, spec: &ContainerRunSpec, output: &mut dyn FnMut(&str)) -> Result<i64> {
        let mount_source = spec
            .mount_source
            .to_str()
            .ok_or_else(|| anyhow!("mount path {:?} is not valid utf-8", spec.mount_source))?;

        let mut child = self
            .command()
            .arg("run")
            .arg("--rm")
            .arg("--name")
            .arg(&spec.name.0)
            .arg("--volume")
            .arg(format!("{}:{}:rw", mount_source, spec.mount_target))
            .arg("--workdir")
            .arg(&spec.working_dir)
            .arg(&spec.image.0)
            .args(&spec.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("couldn't run {}", self.program))?;

        // Killing the attached client would leave the container running, so
        // the container itself is killed.
        let program = self.program;
        let name = &spec.name.0;
        let streamed = stream_output(&mut child, output, self.run_timeout, &mut |_| {
            if let Err(err) = Command::new(program).arg("kill").arg(name).output() {
                warn!("couldn't kill container {}: {}", name, err);
            }
        })?;

        if streamed.timed_out {
            return Err(anyhow!(
                "container {} timed out after {:?}",
                spec.name.0,
                self.run_timeout.unwrap_or_default()
            ));
        }

        Ok(streamed.status.code().map(i64::from).unwrap_or(-1))
    }
}

struct Streamed {
    status: ExitStatus,
    timed_out: bool,
}

/// Forwards stdout and stderr line by line, in arrival order, until both are
/// closed, then waits for the process. Once `timeout` has passed, `expire` is
/// called a single time and the remaining output is still drained. The child
/// is always waited for, even when reading its output failed.
fn stream_output(
    child: &mut Child,
    output: &mut dyn FnMut(&str),
    timeout: Option<Duration>,
    expire: &mut dyn FnMut(&mut Child),
) -> Result<Streamed> {
    let (sender, lines) = mpsc::channel();

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, sender.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, sender.clone()));
    }
    drop(sender);

    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut timed_out = false;

    loop {
        let line = match deadline {
            Some(deadline) if !timed_out => {
                match lines.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(line) => line,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("process {} exceeded {:?}, stopping it", child.id(), timeout.unwrap_or_default());
                        timed_out = true;
                        expire(child);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            _ => match lines.recv() {
                Ok(line) => line,
                Err(_) => break,
            },
        };

        output(&line);
    }

    let mut read_error = None;
    for reader in readers {
        let result = reader
            .join()
            .map_err(|_| anyhow!("output reader panicked"))
            .and_then(|result| result.context("couldn't read process output"));

        if let Err(err) = result {
            read_error.get_or_insert(err);
        }
    }

    let status = child.wait()?;
    if let Some(err) = read_error {
        return Err(err);
    }

    Ok(Streamed { status, timed_out })
}

fn forward_lines<R>(stream: R, sender: mpsc::Sender<String>) -> thread::JoinHandle<std::io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf).into_owned();
            if sender.send(line).is_err() {
                return Ok(());
            }
        }
    })
}
