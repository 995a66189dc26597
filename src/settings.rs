use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, path::Path, path::PathBuf, time::Duration};

/// Host configuration, loaded once at startup and shared by reference.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub hook_secret: String,

    #[serde(default)]
    pub github: GithubSettings,

    pub log: LogSettings,

    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default)]
    pub engine: Engine,

    #[serde(default = "default_clone_depth")]
    pub clone_depth: u32,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,

    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GithubSettings {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub repo_path: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        GithubSettings {
            token: String::new(),
            repo_path: String::new(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub url: String,
    pub path: PathBuf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Docker,
    Podman,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::Docker
    }
}

impl Engine {
    pub fn program(self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Timeouts {
    /// Upper bound for one image build.
    pub build_secs: Option<u64>,

    /// Upper bound for one container run.
    pub run_secs: Option<u64>,

    /// Abort git transfers that make no progress for this long.
    pub stall_secs: Option<u64>,
}

impl Timeouts {
    pub fn build(&self) -> Option<Duration> {
        self.build_secs.map(Duration::from_secs)
    }

    pub fn run(&self) -> Option<Duration> {
        self.run_secs.map(Duration::from_secs)
    }

    pub fn stall(&self) -> Option<Duration> {
        self.stall_secs.map(Duration::from_secs)
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/git")
}

fn default_clone_depth() -> u32 {
    10
}

fn default_failure_marker() -> String {
    "BUILD FAILED".into()
}

fn default_listen() -> String {
    "127.0.0.1:5000".into()
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("couldn't open {:?}", path))?;
        let settings = serde_yaml::from_reader(file)
            .with_context(|| format!("{:?} is not a valid configuration file", path))?;

        Ok(settings)
    }

    pub fn parse(yaml: &str) -> Result<Settings> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn log_url(&self, build_id: &str) -> String {
        format!("{}{}", self.log.url, build_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_optional_settings() {
        let settings = Settings::parse("log:\n  path: logs\n").unwrap();

        assert_eq!(settings.data_path, PathBuf::from("data/git"));
        assert_eq!(settings.engine, Engine::Docker);
        assert_eq!(settings.clone_depth, 10);
        assert_eq!(settings.failure_marker, "BUILD FAILED");
        assert_eq!(settings.github.api_url, "https://api.github.com");
        assert!(settings.timeouts.run().is_none());
        assert!(settings.timeouts.build().is_none());
    }

    #[test]
    fn log_url_appends_build_id() {
        let settings = Settings::parse(
            "log:\n  url: https://ci.example.com/logs/\n  path: logs\nengine: podman\ntimeouts:\n  run_secs: 60\n",
        )
        .unwrap();

        assert_eq!(settings.log_url("abc"), "https://ci.example.com/logs/abc");
        assert_eq!(settings.engine.program(), "podman");
        assert_eq!(settings.timeouts.run(), Some(Duration::from_secs(60)));
    }
}
