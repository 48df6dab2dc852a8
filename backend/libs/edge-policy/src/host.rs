//! Canonical host enforcement
//!
//! Every edge request is classified by its host header alone:
//! `Canonical` passes through untouched, anything else (including a missing
//! or malformed header) is answered with a permanent redirect to the
//! canonical host over HTTPS, keeping path and query.

use crate::error::HostPolicyError;
use std::collections::BTreeSet;

/// Classification of an inbound request's host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass {
    Canonical,
    NonCanonical,
}

/// Outcome of host enforcement for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    PassThrough,
    Redirect { location: String },
}

impl RedirectDecision {
    /// Moved Permanently
    pub const REDIRECT_STATUS: u16 = 301;

    pub fn is_redirect(&self) -> bool {
        matches!(self, RedirectDecision::Redirect { .. })
    }
}

/// The single public hostname the site is served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHost {
    host: String,
}

impl CanonicalHost {
    /// Build from a bare hostname (no scheme, no port, no path)
    pub fn new(host: &str) -> Result<Self, HostPolicyError> {
        let trimmed = host.trim();
        let bare = trimmed.strip_suffix('.').unwrap_or(trimmed);

        if !is_valid_hostname(bare) {
            return Err(HostPolicyError::InvalidCanonicalHost(host.to_string()));
        }

        Ok(Self {
            host: bare.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// Classify a raw host header value
    pub fn classify(&self, host_header: Option<&str>) -> HostClass {
        match host_header.and_then(normalize_host) {
            Some(host) if host == self.host => HostClass::Canonical,
            _ => HostClass::NonCanonical,
        }
    }

    /// Decide what to do with a request; pure function of the host header
    pub fn decide(&self, host_header: Option<&str>, path_and_query: &str) -> RedirectDecision {
        match self.classify(host_header) {
            HostClass::Canonical => RedirectDecision::PassThrough,
            HostClass::NonCanonical => RedirectDecision::Redirect {
                location: self.secure_url(path_and_query),
            },
        }
    }

    /// `https://{canonical}{path_and_query}`
    pub fn secure_url(&self, path_and_query: &str) -> String {
        secure_url(&self.host, path_and_query)
    }
}

impl std::fmt::Display for CanonicalHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.host)
    }
}

pub(crate) fn secure_url(host: &str, path_and_query: &str) -> String {
    if path_and_query.starts_with('/') {
        format!("https://{}{}", host, path_and_query)
    } else {
        format!("https://{}/{}", host, path_and_query)
    }
}

/// Alternate domain names attached to the edge distribution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionAliases {
    aliases: BTreeSet<String>,
}

impl DistributionAliases {
    pub fn new<I, S>(aliases: I) -> Result<Self, HostPolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for alias in aliases {
            let alias = alias.as_ref();
            let host = normalize_host(alias)
                .ok_or_else(|| HostPolicyError::InvalidAlias(alias.to_string()))?;
            set.insert(host);
        }
        Ok(Self { aliases: set })
    }

    pub fn contains(&self, host: &str) -> bool {
        normalize_host(host)
            .map(|h| self.aliases.contains(&h))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// The canonical host must be served by the distribution, otherwise every
    /// redirect would land on a hostname the edge does not answer for
    pub fn validate(&self, canonical: &CanonicalHost) -> Result<(), HostPolicyError> {
        if self.aliases.contains(canonical.as_str()) {
            Ok(())
        } else {
            Err(HostPolicyError::CanonicalNotAliased {
                canonical: canonical.to_string(),
            })
        }
    }
}

/// Lowercase a host header value and strip a trailing dot and numeric port.
/// Returns `None` when the value is not a usable DNS hostname.
pub fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let host = match trimmed.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            host
        }
        Some(_) => return None,
        None => trimmed,
    };
    let host = host.strip_suffix('.').unwrap_or(host);

    if is_valid_hostname(host) {
        Some(host.to_ascii_lowercase())
    } else {
        None
    }
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
