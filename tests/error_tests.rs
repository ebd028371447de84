//! Tests for error codes and classification through the public API.

mod common;

use std::sync::Arc;

use common::recording_state;
use httptrail::client::{Client, RequestDefinition};
use httptrail::config::ClientConfig;
use httptrail::error::transport::invalid_url;
use httptrail::error::*;
use pretty_assertions::assert_eq;

#[test]
fn transparent_wrappers_classify_as_their_cause() {
    let err = UrlError {
        op: "Get".into(),
        url: "http://nope.invalid/".into(),
        source: Arc::new(DnsError {
            host: "nope.invalid".into(),
            kind: DnsErrorKind::NoSuchHost,
        }),
    };
    assert_eq!(
        classify(&err),
        (ErrorCode::DNS_NO_SUCH_HOST, "lookup: no such host".to_string())
    );
}

#[test]
fn unrecognized_errors_fall_back_to_default_code() {
    let err = std::io::Error::new(std::io::ErrorKind::Other, "something odd");
    assert_eq!(
        classify(&err),
        (ErrorCode::DEFAULT, "something odd".to_string())
    );
}

#[test]
fn status_codes_map_above_the_partition_base() {
    assert_eq!(ErrorCode::from_status(200), None);
    assert_eq!(ErrorCode::from_status(399), None);
    assert_eq!(ErrorCode::from_status(400), Some(ErrorCode(1400)));
    assert_eq!(ErrorCode::from_status(503), Some(ErrorCode(1503)));
    assert_eq!(ErrorCode::from_status(799), Some(ErrorCode(1799)));
}

#[test]
fn request_errors_keep_their_cause_downcastable() {
    let err = HttpTrailError::request(invalid_url("::", std::fmt::Error));
    assert_eq!(err.error_code(), Some(ErrorCode::INVALID_URL));
    assert_eq!(err.to_string(), "Request failed (1020): invalid URL");
    assert!(err.is_transport());

    let cause = err.cause().expect("request cause");
    assert!(cause.downcast_ref::<ClassifiedError>().is_some());
}

#[test]
fn configuration_errors_carry_no_code() {
    let err = HttpTrailError::Configuration("blank certificate".into());
    assert_eq!(err.error_code(), None);
    assert!(!err.is_transport());
    assert_eq!(err.to_string(), "Configuration error: blank certificate");
}

#[tokio::test]
async fn unresolvable_hosts_classify_as_dns_failures() {
    let (state, _sink) = recording_state();
    let client = Client::new(&ClientConfig::default(), state).unwrap();

    let response = client
        .get(&RequestDefinition::new("http://httptrail-test.invalid/"))
        .await
        .unwrap();
    let code = response.error_code.expect("dns failure code");
    assert!(
        code == ErrorCode::DNS || code == ErrorCode::DNS_NO_SUCH_HOST,
        "unexpected code {code}: {:?}",
        response.error
    );
}
