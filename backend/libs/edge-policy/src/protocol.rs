//! Viewer protocol policy

use crate::error::HostPolicyError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Scheme the viewer used to reach the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// How the edge treats insecure viewer requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    #[default]
    RedirectToHttps,
    HttpsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolDecision {
    Proceed,
    /// Upgrade to HTTPS on the same host
    Redirect { location: String },
    /// Refuse the request outright (403)
    Reject,
}

impl ViewerProtocolPolicy {
    /// Evaluate the scheme of a request; `host` is the already-normalised host
    /// the upgrade redirect should target
    pub fn evaluate(&self, scheme: Scheme, host: &str, path_and_query: &str) -> ProtocolDecision {
        match (self, scheme) {
            (_, Scheme::Https) | (ViewerProtocolPolicy::AllowAll, Scheme::Http) => {
                ProtocolDecision::Proceed
            }
            (ViewerProtocolPolicy::RedirectToHttps, Scheme::Http) => ProtocolDecision::Redirect {
                location: crate::host::secure_url(host, path_and_query),
            },
            (ViewerProtocolPolicy::HttpsOnly, Scheme::Http) => ProtocolDecision::Reject,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
        }
    }
}

impl FromStr for ViewerProtocolPolicy {
    type Err = HostPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-all" => Ok(ViewerProtocolPolicy::AllowAll),
            "redirect-to-https" => Ok(ViewerProtocolPolicy::RedirectToHttps),
            "https-only" => Ok(ViewerProtocolPolicy::HttpsOnly),
            other => Err(HostPolicyError::UnknownProtocolPolicy(other.to_string())),
        }
    }
}
