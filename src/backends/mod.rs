mod docker;
mod git;
mod github;

pub use docker::DockerCli;
pub use git::GitCli;
pub use github::GithubNotifier;
