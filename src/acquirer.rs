use anyhow::{anyhow, Context, Result};
use log::info;
use std::{fs, path::Path};

use crate::{
    build::Build,
    error::PipelineError,
    models::{RepoContext, SecretInjection},
    services::SourceProvider,
};

/// Checks out the build's commit into its private source path and injects
/// the configured secrets.
pub fn acquire(provider: &mut dyn SourceProvider, build: &Build) -> Result<RepoContext, PipelineError> {
    let conf = build.configuration();
    let path = &build.source_path;

    info!("[{}] fetching code for commit {}", build.id, conf.commit_id);

    if path.exists() {
        return Err(PipelineError::Acquisition(anyhow!(
            "checkout path {:?} already exists",
            path
        )));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create {:?}", parent))
            .map_err(PipelineError::Acquisition)?;
    }

    let repo = provider
        .checkout(&conf.git_url, &conf.commit_id, path)
        .map_err(PipelineError::Acquisition)?;

    build.log(&format!(
        "checked out {} (tag: {})",
        repo.commit_id,
        repo.tag.as_deref().unwrap_or("none")
    ));

    inject_secrets(&conf.keys, &repo.path).map_err(PipelineError::Acquisition)?;

    Ok(repo)
}

/// Copies every host file into the checkout, replacing what's there.
pub fn inject_secrets(keys: &[SecretInjection], checkout: &Path) -> Result<()> {
    for key in keys {
        let destination = checkout.join(&key.to);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).with_context(|| format!("couldn't create {:?}", parent))?;
        }

        fs::copy(&key.from, &destination)
            .with_context(|| format!("couldn't copy {:?} to {:?}", key.from, destination))?;
    }

    Ok(())
}
