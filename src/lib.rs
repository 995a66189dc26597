//! Webhook-triggered build pipeline: checks out a pushed commit, builds it in
//! a container, publishes the artifacts and a version manifest, and reports
//! the deployment back to GitHub.

pub mod acquirer;
pub mod artifacts;
pub mod backends;
pub mod build;
pub mod commit_message;
pub mod error;
pub mod executor;
pub mod frontends;
pub mod hasher;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod server;
pub mod services;
pub mod settings;
pub mod webhook;
