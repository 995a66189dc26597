use log::info;
use std::fs;

use crate::{
    build::Build,
    error::PipelineError,
    hasher::image_hash,
    models::{ContainerName, ContainerRunSpec, ImageName, ImageSpec},
    services::ContainerBackend,
};

/// Decides from a single output line whether the build failed. Some
/// toolchains exit with status 0 even when the build broke.
pub trait FailureDetector: Send {
    fn is_failure(&self, line: &str) -> bool;
}

impl<F> FailureDetector for F
where
    F: Fn(&str) -> bool + Send,
{
    fn is_failure(&self, line: &str) -> bool {
        self(line)
    }
}

pub struct MarkerDetector {
    marker: String,
}

impl MarkerDetector {
    pub fn new<M: Into<String>>(marker: M) -> MarkerDetector {
        MarkerDetector {
            marker: marker.into(),
        }
    }
}

impl Default for MarkerDetector {
    fn default() -> Self {
        MarkerDetector::new("BUILD FAILED")
    }
}

impl FailureDetector for MarkerDetector {
    fn is_failure(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }
}

pub struct BuildExecutor<'a> {
    backend: &'a mut dyn ContainerBackend,
    detector: &'a dyn FailureDetector,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(
        backend: &'a mut dyn ContainerBackend,
        detector: &'a dyn FailureDetector,
    ) -> BuildExecutor<'a> {
        BuildExecutor { backend, detector }
    }

    pub fn setup(&mut self, build: &Build) -> Result<ImageName, PipelineError> {
        let conf = build.configuration();
        info!("[{}] running build for {}", build.id, conf.commit_id);

        let dockerfile = fs::read_to_string(&conf.docker_file)
            .map_err(|err| PipelineError::io(format!("couldn't read {:?}", conf.docker_file), err))?;

        let spec = ImageSpec {
            name: ImageName(conf.docker_tag.clone()),
            dockerfile,
        };
        let hash = image_hash(&spec);

        let current = self.backend.image_hash(&spec.name).map_err(backend_error)?;
        if current.as_deref() == Some(hash.as_str()) {
            build.log(&format!("image {} is up to date", spec.name.0));
            return Ok(spec.name);
        }

        build.log(&format!("building image {}", spec.name.0));
        self.backend
            .build_image(&spec, &hash, &mut |line| build.log_output(line))
            .map_err(backend_error)?;

        Ok(spec.name)
    }

    /// Runs the container and fails if either the exit status is non-zero or
    /// any output line trips the failure detector. The output is always read
    /// to the end before deciding.
    pub fn run(&mut self, build: &Build, image: ImageName) -> Result<(), PipelineError> {
        let conf = build.configuration();

        let mount_source = fs::canonicalize(&build.source_path).map_err(|err| {
            PipelineError::io(format!("couldn't resolve {:?}", build.source_path), err)
        })?;

        let spec = ContainerRunSpec {
            name: ContainerName(format!("hookbuild-{}", build.id)),
            image,
            mount_source,
            mount_target: conf.docker_data_path.clone(),
            command: conf.command.clone(),
            working_dir: container_path(&conf.docker_data_path, &conf.command_path),
        };

        let detector = self.detector;
        let mut marker_seen = false;
        let status = self
            .backend
            .run_container(&spec, &mut |line| {
                if detector.is_failure(line) {
                    marker_seen = true;
                }
                build.log_output(line);
            })
            .map_err(backend_error)?;

        if status != 0 {
            return Err(PipelineError::Build(format!(
                "container exited with status {}",
                status
            )));
        }

        if marker_seen {
            return Err(PipelineError::Build("build output reported a failure, see log".into()));
        }

        Ok(())
    }
}

fn backend_error(err: anyhow::Error) -> PipelineError {
    PipelineError::Build(format!("{:#}", err))
}

/// Joins paths inside the container, which are always `/` separated.
fn container_path(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        base.to_owned()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_detector_matches_substring() {
        let detector = MarkerDetector::default();
        assert!(detector.is_failure("> Task :app:lint BUILD FAILED in 3s"));
        assert!(!detector.is_failure("BUILD SUCCESSFUL"));
    }

    #[test]
    fn closures_are_detectors() {
        let detector = |line: &str| line.starts_with("error:");
        assert!(detector.is_failure("error: linker failed"));
        assert!(!detector.is_failure("warning: unused"));
    }

    #[test]
    fn container_paths_join_with_slashes() {
        assert_eq!(container_path("/data", ""), "/data");
        assert_eq!(container_path("/data/", "app"), "/data/app");
        assert_eq!(container_path("/data", "/app/sub"), "/data/app/sub");
    }
}
