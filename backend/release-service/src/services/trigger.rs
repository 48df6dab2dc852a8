//! Push-event release trigger
//!
//! Fires once per push to the production branch. Redelivered events are
//! recognised by delivery id (or commit when no delivery id is sent) and
//! ignored.

use crate::error::{ReleaseError, Result};
use crate::models::ReleaseRequest;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

const SIGNATURE_PREFIX: &str = "sha256=";
const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// How long a delivery id is remembered for redelivery detection
pub const DEFAULT_DEDUPE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on remembered deliveries; the oldest is evicted first
pub const MAX_TRACKED_DELIVERIES: usize = 1024;

/// The fields of a push webhook the trigger needs
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit the branch points at after the push
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
}

impl PushEvent {
    pub fn new(branch: &str, commit: &str) -> Self {
        Self {
            git_ref: format!("{}{}", BRANCH_REF_PREFIX, branch),
            after: commit.to_string(),
            deleted: false,
        }
    }

    /// Branch name; `None` for tag pushes
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix(BRANCH_REF_PREFIX)
    }
}

/// A delivery that already produced a release
#[derive(Debug, Clone)]
struct SeenDelivery {
    run_id: Uuid,
    seen_at: Instant,
}

impl SeenDelivery {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.seen_at.elapsed() > ttl
    }
}

pub struct ReleaseTrigger {
    production_branch: String,
    webhook_secret: Option<SecretString>,
    seen: DashMap<String, SeenDelivery>,
    dedupe_ttl: Duration,
}

impl ReleaseTrigger {
    pub fn new(production_branch: impl Into<String>, webhook_secret: Option<SecretString>) -> Self {
        Self {
            production_branch: production_branch.into(),
            webhook_secret,
            seen: DashMap::new(),
            dedupe_ttl: DEFAULT_DEDUPE_TTL,
        }
    }

    pub fn with_dedupe_ttl(mut self, ttl: Duration) -> Self {
        self.dedupe_ttl = ttl;
        self
    }

    pub fn production_branch(&self) -> &str {
        &self.production_branch
    }

    /// Check the `sha256=<hex>` HMAC of the raw request body
    ///
    /// Without a configured secret every body is accepted.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        let secret = match &self.webhook_secret {
            Some(secret) => secret,
            None => return Ok(()),
        };

        let signature = signature
            .ok_or_else(|| ReleaseError::Unauthorized(format!("missing {}", SIGNATURE_HEADER)))?;
        let expected = signature
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or_else(|| ReleaseError::Unauthorized("malformed signature".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|e| ReleaseError::Configuration(format!("webhook secret unusable: {}", e)))?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| ReleaseError::Unauthorized("signature mismatch".to_string()))
    }

    /// Turn a push event into a release request
    ///
    /// Returns `Ok(None)` for events that should not release: other branches,
    /// tags, branch deletions and redeliveries.
    pub fn accept(&self, event: &PushEvent, delivery_id: Option<&str>) -> Result<Option<ReleaseRequest>> {
        let branch = match event.branch() {
            Some(branch) if branch == self.production_branch => branch,
            other => {
                debug!(git_ref = %event.git_ref, branch = ?other, "Ignoring push outside production branch");
                return Ok(None);
            }
        };

        if event.deleted || event.after.chars().all(|c| c == '0') {
            debug!(branch = %branch, "Ignoring branch deletion");
            return Ok(None);
        }

        let commit = event.after.trim().to_ascii_lowercase();
        if !(7..=40).contains(&commit.len()) || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ReleaseError::InvalidEvent(format!(
                "'{}' is not a commit hash",
                event.after
            )));
        }

        let dedupe_key = delivery_id.unwrap_or(commit.as_str()).to_string();
        let mut request = ReleaseRequest::new(commit, branch);
        request.delivery_id = delivery_id.map(str::to_string);

        self.evict_stale();
        match self.seen.entry(dedupe_key) {
            Entry::Occupied(existing) => {
                info!(
                    delivery = %existing.key(),
                    run_id = %existing.get().run_id,
                    "Duplicate push event ignored"
                );
                return Ok(None);
            }
            Entry::Vacant(slot) => {
                slot.insert(SeenDelivery {
                    run_id: request.run_id,
                    seen_at: Instant::now(),
                });
            }
        }

        info!(
            run_id = %request.run_id,
            commit = %request.commit,
            branch = %request.branch,
            "release triggered"
        );
        Ok(Some(request))
    }

    /// Drop expired deliveries, then the oldest ones while at capacity
    fn evict_stale(&self) {
        let ttl = self.dedupe_ttl;
        self.seen.retain(|_, delivery| !delivery.is_expired(ttl));

        while self.seen.len() >= MAX_TRACKED_DELIVERIES {
            let oldest = self
                .seen
                .iter()
                .min_by_key(|entry| entry.value().seen_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.seen.remove(&key);
                }
                None => break,
            }
        }
    }
}
