use std::{io, path::PathBuf};
use thiserror::Error;

/// Fatal failures of a single build. Each one triggers cleanup and an error
/// notification before it is handed back to the queue worker.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("error gathering code: {0:#}")]
    Acquisition(anyhow::Error),

    #[error("build failed: {0}")]
    Build(String),

    #[error("build panicked: {0}")]
    Panicked(String),

    #[error("BUILD FAILED, NO ARTIFACTS: {path:?}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn io<C: Into<String>>(context: C, source: io::Error) -> PipelineError {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}
