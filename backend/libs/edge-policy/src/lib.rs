//! Edge request policy for the static site distribution
//!
//! Two checks run on every viewer request, in order:
//! 1. the viewer protocol policy upgrades (or rejects) plain HTTP;
//! 2. the canonical host enforcer redirects any host other than the
//!    canonical one to `https://{canonical}{path}?{query}`.
//!
//! Neither check keeps state between requests.
//!
//! # Example
//!
//! ```
//! use edge_policy::{CanonicalHost, EdgeDecision, EdgePolicy, ViewerProtocolPolicy};
//!
//! let policy = EdgePolicy::new(
//!     CanonicalHost::new("asadalikhan.co.uk").unwrap(),
//!     ViewerProtocolPolicy::RedirectToHttps,
//! );
//!
//! let request = http::Request::builder()
//!     .uri("https://example.org/projects?x=1")
//!     .header("host", "example.org")
//!     .body(())
//!     .unwrap();
//!
//! assert_eq!(
//!     policy.evaluate(&edge_policy::EdgeRequest::from_http(&request)),
//!     EdgeDecision::Redirect {
//!         location: "https://asadalikhan.co.uk/projects?x=1".to_string(),
//!         status: 301,
//!     }
//! );
//! ```

use http::header::{HeaderValue, HOST, LOCATION};
use http::{Request, Response, StatusCode};
use tracing::debug;

mod error;
mod host;
mod protocol;

pub use error::HostPolicyError;
pub use host::{normalize_host, CanonicalHost, DistributionAliases, HostClass, RedirectDecision};
pub use protocol::{ProtocolDecision, Scheme, ViewerProtocolPolicy};

/// Headers set by the edge or a TLS-terminating proxy carrying the viewer scheme
const FORWARDED_PROTO_HEADERS: &[&str] = &["cloudfront-forwarded-proto", "x-forwarded-proto"];

/// The parts of a viewer request the edge policy looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequest {
    pub scheme: Scheme,
    /// Raw host header; `None` when absent or not valid UTF-8
    pub host: Option<String>,
    pub path_and_query: String,
}

impl EdgeRequest {
    pub fn new(scheme: Scheme, host: Option<&str>, path_and_query: &str) -> Self {
        Self {
            scheme,
            host: host.map(str::to_string),
            path_and_query: path_and_query.to_string(),
        }
    }

    /// Extract scheme, host and path from an `http::Request`
    ///
    /// The scheme is taken from the URI, then forwarded-proto headers; when
    /// neither says HTTPS the request is treated as plain HTTP.
    pub fn from_http<B>(req: &Request<B>) -> Self {
        let uri_https = req.uri().scheme_str() == Some("https");
        let forwarded_https = FORWARDED_PROTO_HEADERS.iter().any(|name| {
            req.headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().eq_ignore_ascii_case("https"))
                .unwrap_or(false)
        });
        let scheme = if uri_https || forwarded_https {
            Scheme::Https
        } else {
            Scheme::Http
        };

        // Only the Host header counts; a canonical authority in the URI does not
        let host = req
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            scheme,
            host,
            path_and_query,
        }
    }
}

/// Final answer for one viewer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDecision {
    /// Serve from cache/origin unmodified
    Forward,
    Redirect { location: String, status: u16 },
    Reject { status: u16 },
}

/// Protocol policy plus canonical host enforcement
#[derive(Debug, Clone)]
pub struct EdgePolicy {
    canonical: CanonicalHost,
    protocol: ViewerProtocolPolicy,
}

impl EdgePolicy {
    pub fn new(canonical: CanonicalHost, protocol: ViewerProtocolPolicy) -> Self {
        Self {
            canonical,
            protocol,
        }
    }

    pub fn canonical(&self) -> &CanonicalHost {
        &self.canonical
    }

    pub fn protocol(&self) -> ViewerProtocolPolicy {
        self.protocol
    }

    pub fn evaluate(&self, request: &EdgeRequest) -> EdgeDecision {
        // Upgrade target falls back to the canonical host when the header is unusable
        let upgrade_host = request
            .host
            .as_deref()
            .and_then(normalize_host)
            .unwrap_or_else(|| self.canonical.as_str().to_string());

        match self
            .protocol
            .evaluate(request.scheme, &upgrade_host, &request.path_and_query)
        {
            ProtocolDecision::Proceed => {}
            ProtocolDecision::Redirect { location } => {
                return EdgeDecision::Redirect {
                    location,
                    status: RedirectDecision::REDIRECT_STATUS,
                }
            }
            ProtocolDecision::Reject => {
                return EdgeDecision::Reject {
                    status: StatusCode::FORBIDDEN.as_u16(),
                }
            }
        }

        match self
            .canonical
            .decide(request.host.as_deref(), &request.path_and_query)
        {
            RedirectDecision::PassThrough => EdgeDecision::Forward,
            RedirectDecision::Redirect { location } => {
                debug!(host = ?request.host, %location, "Redirecting non-canonical host");
                EdgeDecision::Redirect {
                    location,
                    status: RedirectDecision::REDIRECT_STATUS,
                }
            }
        }
    }

    /// Apply the policy to an `http::Request`
    ///
    /// Returns `None` when the request should be forwarded, otherwise the
    /// response the edge answers with.
    pub fn enforce<B>(&self, req: &Request<B>) -> Option<Response<()>> {
        match self.evaluate(&EdgeRequest::from_http(req)) {
            EdgeDecision::Forward => None,
            EdgeDecision::Redirect { location, status } => {
                let mut response = Response::new(());
                *response.status_mut() =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::MOVED_PERMANENTLY);
                let value = HeaderValue::from_str(&location).unwrap_or_else(|_| {
                    HeaderValue::from_str(&self.canonical.secure_url("/"))
                        .unwrap_or_else(|_| HeaderValue::from_static("/"))
                });
                response.headers_mut().insert(LOCATION, value);
                Some(response)
            }
            EdgeDecision::Reject { status } => {
                let mut response = Response::new(());
                *response.status_mut() =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
                Some(response)
            }
        }
    }
}
