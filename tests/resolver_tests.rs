mod common;

use common::CannedServer;
use lntopo_capacity::{CapacityError, CapacityResolver, HttpResolver, pack};

#[test]
fn test_http_resolver_reads_capacity() {
    let server = CannedServer::start(vec![
        (200, r#"{"capacity":"500000"}"#),
        (200, r#"{"capacity":100000,"alias":"bob"}"#),
    ]);
    let resolver = HttpResolver::new(server.url_template.as_str()).unwrap();
    let packed = pack("100x2x0").unwrap();
    assert_eq!(resolver.resolve(packed).unwrap(), 500_000);
    assert_eq!(resolver.resolve(packed).unwrap(), 100_000);
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with(&format!("GET /channel/{packed}/json ")));
}

#[test]
fn test_http_resolver_non_200_is_resolution_failure() {
    let server = CannedServer::start(vec![(404, "{}"), (500, "oops")]);
    let resolver = HttpResolver::new(server.url_template.as_str()).unwrap();
    assert!(matches!(
        resolver.resolve(1),
        Err(CapacityError::ResolutionFailed(_))
    ));
    assert!(matches!(
        resolver.resolve(2),
        Err(CapacityError::ResolutionFailed(_))
    ));
    server.requests();
}

#[test]
fn test_http_resolver_body_without_capacity_is_malformed() {
    let server = CannedServer::start(vec![
        (200, "{}"),
        (200, r#"{"capacity":"lots"}"#),
        (200, "not json"),
    ]);
    let resolver = HttpResolver::new(server.url_template.as_str()).unwrap();
    for packed in 1..=3 {
        assert!(
            matches!(
                resolver.resolve(packed),
                Err(CapacityError::MalformedResponse(_))
            ),
            "request {packed}"
        );
    }
    server.requests();
}

#[test]
fn test_http_resolver_unreachable_endpoint() {
    let resolver = HttpResolver::new("http://127.0.0.1:9/channel/{scid}/json").unwrap();
    assert!(matches!(
        resolver.resolve(1),
        Err(CapacityError::ResolutionFailed(_))
    ));
}
