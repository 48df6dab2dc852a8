//! Edge enforcement over real `http::Request` values

use edge_policy::{CanonicalHost, EdgeDecision, EdgePolicy, EdgeRequest, Scheme, ViewerProtocolPolicy};
use http::header::LOCATION;
use http::{Request, StatusCode};

fn policy(protocol: ViewerProtocolPolicy) -> EdgePolicy {
    EdgePolicy::new(CanonicalHost::new("asadalikhan.co.uk").unwrap(), protocol)
}

fn https_request(host: Option<&str>, path: &str) -> Request<()> {
    let mut builder = Request::builder()
        .uri(path)
        .header("cloudfront-forwarded-proto", "https");
    if let Some(host) = host {
        builder = builder.header("host", host);
    }
    builder.body(()).unwrap()
}

#[test]
fn test_non_canonical_host_gets_301_with_path_and_query() {
    let req = https_request(Some("example.org"), "/projects?x=1");
    let resp = policy(ViewerProtocolPolicy::RedirectToHttps)
        .enforce(&req)
        .expect("should redirect");

    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        resp.headers().get(LOCATION).unwrap(),
        "https://asadalikhan.co.uk/projects?x=1"
    );
}

#[test]
fn test_canonical_host_is_forwarded_unmodified() {
    let req = https_request(Some("asadalikhan.co.uk"), "/projects?x=1");
    assert!(policy(ViewerProtocolPolicy::RedirectToHttps)
        .enforce(&req)
        .is_none());
}

#[test]
fn test_missing_host_header_redirects_instead_of_erroring() {
    let req = https_request(None, "/about");
    let resp = policy(ViewerProtocolPolicy::RedirectToHttps)
        .enforce(&req)
        .expect("should redirect");

    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        resp.headers().get(LOCATION).unwrap(),
        "https://asadalikhan.co.uk/about"
    );
}

#[test]
fn test_non_utf8_host_header_is_non_canonical() {
    let mut req = https_request(None, "/");
    req.headers_mut().insert(
        "host",
        http::HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap(),
    );

    let resp = policy(ViewerProtocolPolicy::RedirectToHttps).enforce(&req);
    assert_eq!(resp.unwrap().status(), StatusCode::MOVED_PERMANENTLY);
}

#[test]
fn test_canonical_uri_authority_does_not_stand_in_for_host_header() {
    let req = https_request(None, "https://asadalikhan.co.uk/projects?x=1");
    let resp = policy(ViewerProtocolPolicy::RedirectToHttps)
        .enforce(&req)
        .expect("should redirect");

    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        resp.headers().get(LOCATION).unwrap(),
        "https://asadalikhan.co.uk/projects?x=1"
    );
    assert_eq!(EdgeRequest::from_http(&req).host, None);
}

#[test]
fn test_malformed_host_with_canonical_uri_authority_redirects() {
    let mut req = https_request(None, "https://asadalikhan.co.uk/projects?x=1");
    req.headers_mut().insert(
        "host",
        http::HeaderValue::from_bytes(b"\xffbad").unwrap(),
    );

    let resp = policy(ViewerProtocolPolicy::RedirectToHttps).enforce(&req);
    assert_eq!(resp.unwrap().status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(EdgeRequest::from_http(&req).host, None);
}

#[test]
fn test_plain_http_is_upgraded_before_host_check() {
    let request = EdgeRequest::new(Scheme::Http, Some("asadalikhan.co.uk"), "/blog");
    assert_eq!(
        policy(ViewerProtocolPolicy::RedirectToHttps).evaluate(&request),
        EdgeDecision::Redirect {
            location: "https://asadalikhan.co.uk/blog".to_string(),
            status: 301,
        }
    );

    // Upgrade keeps the viewer's host; the host check happens on the follow-up request
    let foreign = EdgeRequest::new(Scheme::Http, Some("www.asadalikhan.co.uk"), "/");
    assert_eq!(
        policy(ViewerProtocolPolicy::RedirectToHttps).evaluate(&foreign),
        EdgeDecision::Redirect {
            location: "https://www.asadalikhan.co.uk/".to_string(),
            status: 301,
        }
    );
    let followed = EdgeRequest::new(Scheme::Https, Some("www.asadalikhan.co.uk"), "/");
    assert_eq!(
        policy(ViewerProtocolPolicy::RedirectToHttps).evaluate(&followed),
        EdgeDecision::Redirect {
            location: "https://asadalikhan.co.uk/".to_string(),
            status: 301,
        }
    );
}

#[test]
fn test_https_only_rejects_plain_http() {
    let req = Request::builder()
        .uri("http://asadalikhan.co.uk/")
        .header("host", "asadalikhan.co.uk")
        .body(())
        .unwrap();

    let resp = policy(ViewerProtocolPolicy::HttpsOnly).enforce(&req).unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get(LOCATION).is_none());
}

#[test]
fn test_decision_is_stateless_across_requests() {
    let policy = policy(ViewerProtocolPolicy::RedirectToHttps);
    let foreign = https_request(Some("example.org"), "/");
    let canonical = https_request(Some("asadalikhan.co.uk"), "/");

    for _ in 0..3 {
        assert!(policy.enforce(&foreign).is_some());
        assert!(policy.enforce(&canonical).is_none());
    }
}
