use chrono::Local;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap as Map,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::{
    commit_message,
    error::PipelineError,
    models::{ArtifactMapping, ArtifactResult, BuildConfiguration, RepoContext, VersionMode},
};

pub const VERSION_PLACEHOLDER: &str = "%v";
pub const API_VERSION: u32 = 1;
pub const CHECK_INTERVAL: u64 = 432_000_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub api_version: u32,
    pub messages: Vec<UpdateMessage>,
    pub check_interval: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    pub message_html: String,
    pub apk: Map<String, Download>,

    #[serde(flatten)]
    pub version: VersionField,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Download {
    pub url: String,
}

/// Hash mode publishes the commit prefix, tags mode the numeric version code
/// from the commit message, which may be missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionField {
    Hash { hash: String },
    Code { code: Option<u64> },
}

/// `None` in tags mode when the commit carries no tag.
pub fn resolve_version(mode: VersionMode, repo: &RepoContext) -> Option<String> {
    match mode {
        VersionMode::Hash => Some(commit_prefix(&repo.commit_id)),
        VersionMode::Tags => repo.tag.clone(),
    }
}

pub fn commit_prefix(commit_id: &str) -> String {
    commit_id.chars().take(8).collect::<String>().to_lowercase()
}

pub fn substitute_version(template: &str, version: &str) -> String {
    template.replace(VERSION_PLACEHOLDER, version)
}

/// Destinations for every mapping, without touching the filesystem.
pub fn plan_copies(
    artifacts: &[ArtifactMapping],
    checkout: &Path,
    output: &Path,
    version: &str,
) -> Vec<(PathBuf, PathBuf)> {
    artifacts
        .iter()
        .map(|artifact| {
            (
                checkout.join(&artifact.from),
                output.join(substitute_version(&artifact.to, version)),
            )
        })
        .collect()
}

/// Copies the build outputs. Copies that already happened stay in place if a
/// later one fails.
pub fn copy_artifacts(
    conf: &BuildConfiguration,
    repo: &RepoContext,
    version: &str,
) -> Result<ArtifactResult, PipelineError> {
    fs::create_dir_all(&conf.output_path).map_err(|err| {
        PipelineError::io(format!("couldn't create {:?}", conf.output_path), err)
    })?;

    let mut copies = Vec::new();
    for (from, to) in plan_copies(&conf.artifacts, &repo.path, &conf.output_path, version) {
        if !from.is_file() {
            return Err(PipelineError::Artifact {
                path: from,
                source: std::io::ErrorKind::NotFound.into(),
            });
        }

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| PipelineError::io(format!("couldn't create {:?}", parent), err))?;
        }

        fs::copy(&from, &to).map_err(|source| PipelineError::Artifact {
            path: from.clone(),
            source,
        })?;
        info!("copied {:?} to {:?}", from, to);
        copies.push((from, to));
    }

    Ok(ArtifactResult {
        version: version.to_owned(),
        copies,
    })
}

pub fn message_html(product: &str, changelog: &str) -> String {
    let mut message = format!("A new {} version is available.", product);
    if !changelog.is_empty() {
        message.push_str("\n\nChangelog:\n");
        message.push_str(changelog);
    }

    message.replace('\n', "<br>")
}

pub fn manifest(conf: &BuildConfiguration, repo: &RepoContext, version: &str) -> VersionManifest {
    let commit = commit_message::parse(&repo.message);

    let version_field = match conf.mode {
        VersionMode::Hash => VersionField::Hash {
            hash: commit_prefix(&repo.commit_id),
        },
        VersionMode::Tags => VersionField::Code {
            code: commit.version_code,
        },
    };

    let mut apk = Map::new();
    apk.insert(
        conf.version_flavor.clone(),
        Download {
            url: substitute_version(&conf.version_url, version),
        },
    );

    VersionManifest {
        api_version: API_VERSION,
        messages: vec![UpdateMessage {
            kind: "update".into(),
            date: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            message_html: message_html(&conf.name, &commit.changelog),
            apk,
            version: version_field,
        }],
        check_interval: CHECK_INTERVAL,
    }
}

/// Writes the manifest over any previous one and returns the public download
/// URL.
pub fn write_manifest(
    conf: &BuildConfiguration,
    repo: &RepoContext,
    version: &str,
) -> Result<String, PipelineError> {
    let manifest = manifest(conf, repo, version);
    let path = &conf.version_out;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory)
        .map_err(|err| PipelineError::io(format!("couldn't create {:?}", directory), err))?;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    manifest
        .serialize(&mut serializer)
        .map_err(|err| PipelineError::io("couldn't serialize the version manifest", err.into()))?;

    let write = || -> std::io::Result<()> {
        let mut file = NamedTempFile::new_in(&directory)?;
        file.write_all(&buf)?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    };
    write().map_err(|err| PipelineError::io(format!("couldn't write {:?}", path), err))?;

    let url = substitute_version(&conf.version_url, version);
    info!("wrote version manifest {:?} for {}", path, url);

    Ok(url)
}
