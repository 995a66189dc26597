use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use uuid::Uuid;

use crate::{
    models::{BuildConfiguration, DeploymentId},
    settings::Settings,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildState {
    Created,
    Started,
    Acquired,
    AbortedNoTag,
    Built,
    SkippedDryRun,
    ArtifactsWritten,
    Succeeded,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Created => "created",
            BuildState::Started => "started",
            BuildState::Acquired => "acquired",
            BuildState::AbortedNoTag => "aborted (no tag)",
            BuildState::Built => "built",
            BuildState::SkippedDryRun => "skipped (dry run)",
            BuildState::ArtifactsWritten => "artifacts written",
            BuildState::Succeeded => "succeeded",
            BuildState::Failed => "failed",
        };

        f.write_str(name)
    }
}

/// Append-only log file for one build, named after the build id.
pub struct BuildLog {
    path: PathBuf,
    file: File,
}

impl BuildLog {
    pub fn open<P: AsRef<Path>>(directory: P, build_id: &str) -> Result<BuildLog> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)
            .with_context(|| format!("couldn't create log directory {:?}", directory))?;

        let path = directory.join(build_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("couldn't open build log {:?}", path))?;

        Ok(BuildLog { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, value: &str) {
        let mut line = value.to_owned();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        if let Err(err) = (&self.file).write_all(line.as_bytes()) {
            warn!("couldn't write to build log {:?}: {}", self.path, err);
        }
    }
}

/// One attempt at turning a commit into artifacts.
pub struct Build {
    pub id: String,
    configuration: BuildConfiguration,
    pub source_path: PathBuf,
    pub log_url: String,
    pub deployment: Option<DeploymentId>,
    state: BuildState,
    log: BuildLog,
}

impl Build {
    pub fn new(configuration: BuildConfiguration, settings: &Settings) -> Result<Build> {
        Build::with_id(new_build_id(), configuration, settings)
    }

    pub fn with_id<I: Into<String>>(
        id: I,
        configuration: BuildConfiguration,
        settings: &Settings,
    ) -> Result<Build> {
        let id = id.into();
        let log = BuildLog::open(&settings.log.path, &id)?;

        Ok(Build {
            source_path: settings.data_path.join(&id),
            log_url: settings.log_url(&id),
            deployment: None,
            state: BuildState::Created,
            id,
            configuration,
            log,
        })
    }

    pub fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn transition(&mut self, state: BuildState) {
        debug!("[{}] {} -> {}", self.id, self.state, state);
        self.state = state;
    }

    pub fn log(&self, value: &str) {
        info!("[{}] {}", self.id, value.trim_end());
        self.log.append(value);
    }

    /// Container output goes to the build log at full volume but only to
    /// the process log at debug level.
    pub fn log_output(&self, line: &str) {
        debug!("[{}] {}", self.id, line.trim_end());
        self.log.append(line);
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }
}

/// 32 lowercase hex characters, safe to use as a file name.
pub fn new_build_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn build_ids_are_unique_and_path_safe() {
        let ids = (0..1000).map(|_| new_build_id()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 1000);

        for id in ids {
            assert_eq!(id.len(), 32);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn log_lines_are_appended_with_newlines() {
        let dir = TempDir::new().unwrap();
        let log = BuildLog::open(dir.path().join("logs"), "abc").unwrap();

        log.append("first");
        log.append("second\n");

        let content = fs::read_to_string(dir.path().join("logs").join("abc")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
