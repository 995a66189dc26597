#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use hookbuild::{
    models::{
        ArtifactMapping, BuildConfiguration, ContainerRunSpec, DeploymentId, DeploymentState,
        DeploymentStatus, ImageName, ImageSpec, RepoContext, VersionMode,
    },
    services::{ConfigFrontend, ContainerBackend, DeploymentNotifier, SourceProvider},
    settings::Settings,
};

pub const COMMIT: &str = "abcdef1234567890";

/// Shared, ordered record of what the fakes were asked to do.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push<S: Into<String>>(&self, event: S) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.all().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub fn settings(dir: &Path) -> Settings {
    Settings::parse(&format!(
        "log:\n  url: https://ci.example.com/logs/\n  path: {:?}\ndata_path: {:?}\n",
        dir.join("logs"),
        dir.join("data"),
    ))
    .unwrap()
}

pub fn configuration(dir: &Path, mode: VersionMode) -> BuildConfiguration {
    fs::write(dir.join("Dockerfile"), "FROM alpine\n").unwrap();

    BuildConfiguration {
        name: "Clover".into(),
        git_url: "https://example.com/clover.git".into(),
        commit_id: COMMIT.into(),
        mode,
        environment: "staging".into(),
        dry_run: false,
        docker_file: dir.join("Dockerfile"),
        docker_tag: "clover-build".into(),
        docker_data_path: "/data".into(),
        command: vec!["make".into()],
        command_path: "app".into(),
        keys: Vec::new(),
        artifacts: vec![ArtifactMapping {
            from: "build/app.bin".into(),
            to: "app-%v.bin".into(),
        }],
        output_path: dir.join("out"),
        version_out: dir.join("out/version.json"),
        version_url: "https://example.com/app-%v.bin".into(),
        version_flavor: "dev".into(),
    }
}

/// Creates a checkout containing `files` instead of talking to git.
pub struct FakeSource {
    pub events: Events,
    pub tag: Option<String>,
    pub message: String,
    pub files: Vec<(String, String)>,
    pub fail: bool,
}

impl FakeSource {
    pub fn new(events: &Events) -> FakeSource {
        FakeSource {
            events: events.clone(),
            tag: None,
            message: "Fix\n\nCHANGELOG:\nfix bug\n\n".into(),
            files: vec![("build/app.bin".into(), "binary".into())],
            fail: false,
        }
    }
}

impl SourceProvider for FakeSource {
    fn checkout(&mut self, _git_url: &str, commit_id: &str, path: &Path) -> Result<RepoContext> {
        self.events.push(format!("checkout {}", commit_id));
        if self.fail {
            return Err(anyhow!("fatal: reference is not a tree: {}", commit_id));
        }

        for (name, content) in self.files.iter() {
            let file = path.join(name);
            fs::create_dir_all(file.parent().unwrap())?;
            fs::write(file, content)?;
        }
        fs::create_dir_all(path)?;

        Ok(RepoContext {
            path: path.to_path_buf(),
            commit_id: commit_id.into(),
            tag: self.tag.clone(),
            message: self.message.clone(),
        })
    }
}

/// Replays canned output instead of running a container.
pub struct FakeBackend {
    pub events: Events,
    pub current_hash: Option<String>,
    pub lines: Vec<String>,
    pub exit_code: i64,
    pub runs: Arc<Mutex<Vec<ContainerRunSpec>>>,
}

impl FakeBackend {
    pub fn new(events: &Events) -> FakeBackend {
        FakeBackend {
            events: events.clone(),
            current_hash: None,
            lines: vec!["Compiling\n".into(), "BUILD SUCCESSFUL\n".into()],
            exit_code: 0,
            runs: Default::default(),
        }
    }
}

impl ContainerBackend for FakeBackend {
    fn image_hash(&mut self, _name: &ImageName) -> Result<Option<String>> {
        Ok(self.current_hash.clone())
    }

    fn build_image(&mut self, spec: &ImageSpec, hash: &str, output: &mut dyn FnMut(&str)) -> Result<()> {
        self.events.push(format!("build image {}", spec.name.0));
        self.current_hash = Some(hash.to_owned());
        output("Step 1/1 : FROM alpine\n");
        Ok(())
    }

    fn run_container(&mut self, spec: &ContainerRunSpec, output: &mut dyn FnMut(&str)) -> Result<i64> {
        self.events.push(format!("run {}", spec.mount_source.display()));
        self.runs.lock().unwrap().push(spec.clone());
        for line in self.lines.iter() {
            output(line);
        }
        Ok(self.exit_code)
    }
}

/// Records every call. Can be told to fail all of them.
pub struct RecordingNotifier {
    pub events: Events,
    pub fail: bool,
    pub statuses: Arc<Mutex<Vec<DeploymentStatus>>>,
}

impl RecordingNotifier {
    pub fn new(events: &Events) -> RecordingNotifier {
        RecordingNotifier {
            events: events.clone(),
            fail: false,
            statuses: Default::default(),
        }
    }
}

impl DeploymentNotifier for RecordingNotifier {
    fn create_deployment(&mut self, reference: &str, description: &str, environment: &str) -> Result<DeploymentId> {
        self.events
            .push(format!("deployment {} {} {}", reference, description, environment));
        if self.fail {
            return Err(anyhow!("502 Bad Gateway"));
        }
        Ok(DeploymentId(7))
    }

    fn set_status(&mut self, id: DeploymentId, status: &DeploymentStatus) -> Result<()> {
        self.events.push(format!("status {} {}", id.0, state_name(status.state)));
        self.statuses.lock().unwrap().push(status.clone());
        if self.fail {
            return Err(anyhow!("502 Bad Gateway"));
        }
        Ok(())
    }
}

pub fn state_name(state: DeploymentState) -> &'static str {
    match state {
        DeploymentState::InProgress => "in_progress",
        DeploymentState::Success => "success",
        DeploymentState::Error => "error",
        DeploymentState::Inactive => "inactive",
    }
}

/// Resolves only `master`, using the given configuration as a template.
pub struct StaticFrontend {
    pub template: BuildConfiguration,
}

impl ConfigFrontend for StaticFrontend {
    fn configuration(&mut self, branch: &str, commit_id: &str) -> Result<Option<BuildConfiguration>> {
        if branch != "master" {
            return Ok(None);
        }

        let mut conf = self.template.clone();
        conf.commit_id = commit_id.into();
        Ok(Some(conf))
    }
}

pub fn checkouts(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir.join("data")) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
