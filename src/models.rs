use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionMode {
    Hash,
    Tags,
}

/// A host file copied into the checkout before the build runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInjection {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// A build output copied into the output directory. `to` may contain `%v`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMapping {
    pub from: PathBuf,
    pub to: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub name: String,
    pub git_url: String,
    pub commit_id: String,
    pub mode: VersionMode,
    pub environment: String,
    pub dry_run: bool,

    pub docker_file: PathBuf,
    pub docker_tag: String,
    pub docker_data_path: String,

    pub command: Vec<String>,
    pub command_path: String,

    pub keys: Vec<SecretInjection>,
    pub artifacts: Vec<ArtifactMapping>,
    pub output_path: PathBuf,

    pub version_out: PathBuf,
    pub version_url: String,
    pub version_flavor: String,
}

/// One push event admitted into the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRequest {
    pub branch: String,
    pub commit_id: String,
    pub dry_run: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoContext {
    pub path: PathBuf,
    pub commit_id: String,
    pub tag: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactResult {
    pub version: String,
    pub copies: Vec<(PathBuf, PathBuf)>,
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

#[derive(Clone, Debug, Hash)]
pub struct ImageSpec {
    pub name: ImageName,
    pub dockerfile: String,
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerName(pub String);

#[derive(Clone, Debug)]
pub struct ContainerRunSpec {
    pub name: ContainerName,
    pub image: ImageName,
    pub mount_source: PathBuf,
    pub mount_target: String,
    pub command: Vec<String>,
    pub working_dir: String,
}

#[derive(Copy, Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentId(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    InProgress,
    Success,
    Error,
    Inactive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentStatus {
    pub state: DeploymentState,
    pub log_url: String,
    pub environment_url: String,
    pub description: String,
}
