//! GitHub webhook payload handling.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use sha2::Sha256;

use crate::models::BuildRequest;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
pub const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";
pub const EVENT_HEADER: &str = "X-GitHub-Event";

const BRANCH_PREFIX: &str = "refs/heads/";
const DELETED_COMMIT: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    Missing,
    UnsupportedDigest(String),
    Mismatch,
}

/// Checks a `<digest>=<hex hmac>` signature header against the raw body.
pub fn verify_signature(secret: &[u8], header: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    let header = header.filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;

    let (digest, signature) = match header.find('=') {
        Some(index) => (&header[..index], &header[index + 1..]),
        None => return Err(SignatureError::Mismatch),
    };
    let signature = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;

    let verified = match digest {
        "sha1" => verify::<Hmac<Sha1>>(secret, body, &signature),
        "sha256" => verify::<Hmac<Sha256>>(secret, body, &signature),
        other => return Err(SignatureError::UnsupportedDigest(other.into())),
    };

    if verified {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn verify<M: Mac + hmac::digest::KeyInit>(secret: &[u8], body: &[u8], signature: &[u8]) -> bool {
    let mut mac = match <M as hmac::digest::KeyInit>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(signature).is_ok()
}

#[derive(Clone, Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub reference: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
}

impl PushEvent {
    /// `None` for tag pushes and branch deletions, which never build.
    pub fn build_request(&self) -> Option<BuildRequest> {
        let branch = self.reference.strip_prefix(BRANCH_PREFIX)?;
        if self.deleted || self.after == DELETED_COMMIT || self.after.is_empty() {
            return None;
        }

        Some(BuildRequest {
            branch: branch.to_owned(),
            commit_id: self.after.clone(),
            dry_run: false,
        })
    }
}
