use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap as Map,
    fs::File,
    path::PathBuf,
};

use crate::{
    models::{ArtifactMapping, BuildConfiguration, SecretInjection, VersionMode},
    services::ConfigFrontend,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ProjectFile {
    pub name: String,
    pub repo: String,

    #[serde(default)]
    pub dry_run: bool,

    pub output: Output,
    pub docker: Docker,
    pub branches: Map<String, Branch>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Output {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Docker {
    pub file: PathBuf,
    pub tag: String,
    pub data_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Branch {
    pub mode: VersionMode,
    pub environment: String,
    pub command: Command,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub keys: Vec<SecretInjection>,

    #[serde(default)]
    pub artifacts: Vec<ArtifactMapping>,

    pub version_out: PathBuf,
    pub version_url: String,
    pub version_flavor: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Command {
    Short(String),
    List(Vec<String>),
}

impl Command {
    pub fn into_args(self) -> Vec<String> {
        match self {
            Command::Short(command) => command.split_whitespace().map(String::from).collect(),
            Command::List(args) => args,
        }
    }
}

/// Reads the project section of `config.yml` on every request, so edits to
/// the file apply to the next build without a restart.
pub struct YamlConfigFrontend {
    path: PathBuf,
}

impl YamlConfigFrontend {
    pub fn new<P: Into<PathBuf>>(path: P) -> YamlConfigFrontend {
        YamlConfigFrontend { path: path.into() }
    }

    fn load(&self) -> Result<ProjectFile> {
        let file = File::open(&self.path).with_context(|| format!("couldn't open {:?}", self.path))?;
        let project = serde_yaml::from_reader(file)
            .with_context(|| format!("{:?} is not a valid project configuration", self.path))?;

        Ok(project)
    }
}

impl ConfigFrontend for YamlConfigFrontend {
    fn configuration(&mut self, branch: &str, commit_id: &str) -> Result<Option<BuildConfiguration>> {
        let project = self.load()?;
        Ok(resolve(project, branch, commit_id))
    }
}

fn resolve(mut project: ProjectFile, branch: &str, commit_id: &str) -> Option<BuildConfiguration> {
    let branch = project.branches.remove(branch)?;

    Some(BuildConfiguration {
        name: project.name,
        git_url: project.repo,
        commit_id: commit_id.into(),
        mode: branch.mode,
        environment: branch.environment,
        dry_run: project.dry_run,
        docker_file: project.docker.file,
        docker_tag: project.docker.tag,
        docker_data_path: project.docker.data_path,
        command: branch.command.into_args(),
        command_path: branch.path,
        keys: branch.keys,
        artifacts: branch.artifacts,
        output_path: project.output.path,
        version_out: branch.version_out,
        version_url: branch.version_url,
        version_flavor: branch.version_flavor,
    })
}

pub fn parse_configuration(yaml: &str, branch: &str, commit_id: &str) -> Result<Option<BuildConfiguration>> {
    let project: ProjectFile = serde_yaml::from_str(yaml)?;
    Ok(resolve(project, branch, commit_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
name: Clover
repo: https://github.com/example/clover.git
output:
  path: out
docker:
  file: Dockerfile
  tag: clover-build
  data_path: /data
branches:
  master:
    mode: hash
    environment: staging
    command: ./gradlew assembleRelease
    path: app
    keys:
      - from: secrets/keystore.jks
        to: app/keystore.jks
    artifacts:
      - from: app/build/app.apk
        to: clover-%v.apk
    version_out: out/version.json
    version_url: https://example.com/clover-%v.apk
    version_flavor: dev
  release:
    mode: tags
    environment: production
    command: ["sh", "-c", "make release"]
    version_out: out/release.json
    version_url: https://example.com/release-%v.apk
    version_flavor: stable
"#;

    #[test]
    fn resolves_configured_branch() {
        let conf = parse_configuration(CONFIG, "master", "abcdef1234567890")
            .unwrap()
            .unwrap();

        assert_eq!(conf.name, "Clover");
        assert_eq!(conf.commit_id, "abcdef1234567890");
        assert_eq!(conf.mode, VersionMode::Hash);
        assert_eq!(conf.command, vec!["./gradlew", "assembleRelease"]);
        assert_eq!(conf.command_path, "app");
        assert_eq!(conf.keys[0].to, PathBuf::from("app/keystore.jks"));
        assert_eq!(conf.artifacts[0].to, "clover-%v.apk");
        assert!(!conf.dry_run);
    }

    #[test]
    fn list_command_is_kept_verbatim() {
        let conf = parse_configuration(CONFIG, "release", "abc").unwrap().unwrap();

        assert_eq!(conf.mode, VersionMode::Tags);
        assert_eq!(conf.command, vec!["sh", "-c", "make release"]);
        assert!(conf.keys.is_empty());
        assert!(conf.artifacts.is_empty());
    }

    #[test]
    fn unknown_branch_is_a_no_op() {
        assert!(parse_configuration(CONFIG, "feature/x", "abc").unwrap().is_none());
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let config = CONFIG.replace("mode: hash", "mode: semver");
        assert!(parse_configuration(&config, "master", "abc").is_err());
    }
}
