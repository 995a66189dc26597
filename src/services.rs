use anyhow::Result;
use std::path::Path;

use crate::models::{
    BuildConfiguration, ContainerRunSpec, DeploymentId, DeploymentStatus, ImageName, ImageSpec,
    RepoContext,
};

/// Resolves a branch/commit pair into a build configuration. `None` means the
/// branch is not configured and the request is a no-op.
pub trait ConfigFrontend {
    fn configuration(&mut self, branch: &str, commit_id: &str) -> Result<Option<BuildConfiguration>>;
}

pub trait SourceProvider {
    /// Checks out `commit_id` of `git_url` into `path`, which must not exist yet.
    fn checkout(&mut self, git_url: &str, commit_id: &str, path: &Path) -> Result<RepoContext>;
}

pub trait ContainerBackend {
    /// Returns the content hash label of the image, `None` when the image
    /// doesn't exist.
    fn image_hash(&mut self, name: &ImageName) -> Result<Option<String>>;

    fn build_image(
        &mut self,
        spec: &ImageSpec,
        hash: &str,
        output: &mut dyn FnMut(&str),
    ) -> Result<()>;

    /// Runs the container to completion, handing every output line to
    /// `output` as it arrives. Returns the exit code.
    fn run_container(&mut self, spec: &ContainerRunSpec, output: &mut dyn FnMut(&str)) -> Result<i64>;
}

pub trait DeploymentNotifier {
    fn create_deployment(
        &mut self,
        reference: &str,
        description: &str,
        environment: &str,
    ) -> Result<DeploymentId>;

    fn set_status(&mut self, id: DeploymentId, status: &DeploymentStatus) -> Result<()>;
}
