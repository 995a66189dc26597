use anyhow::{Context, Result};
use log::debug;
use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    models::{DeploymentId, DeploymentState, DeploymentStatus},
    services::DeploymentNotifier,
    settings::GithubSettings,
};

const PREVIEW_MEDIA_TYPES: &str =
    "application/vnd.github.flash-preview+json, application/vnd.github.ant-man-preview+json";

#[derive(Debug, Serialize)]
struct CreateDeployment<'a> {
    #[serde(rename = "ref")]
    reference: &'a str,
    auto_merge: bool,
    payload: Value,
    description: &'a str,
    environment: &'a str,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    id: u64,
}

#[derive(Debug, Serialize)]
struct CreateStatus<'a> {
    state: DeploymentState,
    log_url: &'a str,
    description: &'a str,
    environment_url: &'a str,
    auto_inactive: bool,
}

/// Deployment records through the GitHub REST API.
pub struct GithubNotifier {
    client: Client,
    base: String,
    repo_path: String,
}

impl GithubNotifier {
    pub fn new(settings: &GithubSettings) -> Result<GithubNotifier> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", settings.token))
                .context("the github token is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(PREVIEW_MEDIA_TYPES));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("hookbuild/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(GithubNotifier {
            client,
            base: settings.api_url.trim_end_matches('/').to_owned(),
            repo_path: settings.repo_path.clone(),
        })
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let url = format!("{}/repos/{}{}", self.base, self.repo_path, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?;

        Ok(response.json()?)
    }
}

impl DeploymentNotifier for GithubNotifier {
    fn create_deployment(
        &mut self,
        reference: &str,
        description: &str,
        environment: &str,
    ) -> Result<DeploymentId> {
        let body = CreateDeployment {
            reference,
            auto_merge: false,
            payload: json!({}),
            description,
            environment,
        };

        let deployment: Deployment = serde_json::from_value(self.post("/deployments", &body)?)
            .context("unexpected deployment response")?;

        Ok(DeploymentId(deployment.id))
    }

    fn set_status(&mut self, id: DeploymentId, status: &DeploymentStatus) -> Result<()> {
        let body = CreateStatus {
            state: status.state,
            log_url: &status.log_url,
            description: &status.description,
            environment_url: &status.environment_url,
            auto_inactive: false,
        };

        self.post(&format!("/deployments/{}/statuses", id.0), &body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_uses_api_state_names() {
        let body = CreateStatus {
            state: DeploymentState::InProgress,
            log_url: "https://ci/logs/1",
            description: "Build started",
            environment_url: "",
            auto_inactive: false,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["state"], "in_progress");
        assert_eq!(value["auto_inactive"], false);
    }

    #[test]
    fn deployment_body_renames_ref() {
        let body = CreateDeployment {
            reference: "abcdef",
            auto_merge: false,
            payload: json!({}),
            description: "staging deployment",
            environment: "staging",
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["ref"], "abcdef");
        assert_eq!(value["environment"], "staging");
    }
}
