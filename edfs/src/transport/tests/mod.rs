//! This contains test scenarios that a given [BrickTransport] needs to pass.
//! We use [rstest] and [rstest_reuse] to provide all transports we want to test
//! against, and then apply this template to all test functions.

use bytes::Bytes;
use rstest::*;
use rstest_reuse::{self, *};
use std::sync::Arc;

use super::BrickTransport;
use crate::fixtures::{BLOB_A, BLOB_A_DIGEST, BLOB_B, BLOB_B_DIGEST};
use crate::tests::utils::make_http_transport;
use crate::transport;

/// This produces a template, which will be applied to all individual test functions.
/// See https://github.com/la10736/rstest/issues/130#issuecomment-968864832
#[template]
#[rstest]
#[case::memory(transport::from_addr("memory://").unwrap())]
#[case::objectstore_memory(transport::from_addr("objectstore+memory:///").unwrap())]
#[case::http(make_http_transport().await)]
pub fn transports(#[case] transport: Arc<dyn BrickTransport>) {}

/// Using [BrickTransport::has] on a non-existing brick should return false.
#[apply(transports)]
#[tokio::test]
async fn has_nonexistent_false(transport: Arc<dyn BrickTransport>) {
    assert!(!transport
        .has(&BLOB_A_DIGEST)
        .await
        .expect("must not fail"));
}

/// Trying to fetch a non-existing brick should return None.
#[apply(transports)]
#[tokio::test]
async fn not_found_fetch(transport: Arc<dyn BrickTransport>) {
    assert!(transport
        .fetch_brick(&BLOB_A_DIGEST)
        .await
        .expect("must not fail")
        .is_none())
}

/// Store a brick, check has, get it back.
#[apply(transports)]
#[tokio::test]
async fn store_has_fetch(transport: Arc<dyn BrickTransport>) {
    for (contents, digest) in &[
        (BLOB_A.clone(), BLOB_A_DIGEST.clone()),
        (BLOB_B.clone(), BLOB_B_DIGEST.clone()),
    ] {
        transport
            .store_brick(digest, contents.clone())
            .await
            .expect("store must succeed");

        assert!(
            transport.has(digest).await.expect("must not fail"),
            "transport should now have the brick"
        );

        let fetched = transport
            .fetch_brick(digest)
            .await
            .expect("fetch must succeed")
            .expect("must be some");

        assert_eq!(contents, &fetched, "fetched brick contents must match");
    }
}

/// Storing the same brick twice is fine, and doesn't change its contents.
#[apply(transports)]
#[tokio::test]
async fn store_twice(transport: Arc<dyn BrickTransport>) {
    for _ in 0..2 {
        transport
            .store_brick(&BLOB_A_DIGEST, BLOB_A.clone())
            .await
            .expect("store must succeed");
    }

    assert_eq!(
        Some(BLOB_A.clone()),
        transport.fetch_brick(&BLOB_A_DIGEST).await.expect("must succeed")
    );
}

/// The endpoint is a valid address for [transport::from_addr].
#[apply(transports)]
#[tokio::test]
async fn endpoint_is_addr(transport: Arc<dyn BrickTransport>) {
    let endpoint = transport.endpoint();
    let reconstructed = transport::from_addr(endpoint.as_str()).expect("must construct");
    assert_eq!(endpoint, reconstructed.endpoint());
}

/// The empty brick is a brick like any other.
#[apply(transports)]
#[tokio::test]
async fn empty_brick(transport: Arc<dyn BrickTransport>) {
    let digest = crate::B3Digest::of(b"");
    transport
        .store_brick(&digest, Bytes::new())
        .await
        .expect("store must succeed");

    assert_eq!(
        Some(Bytes::new()),
        transport.fetch_brick(&digest).await.expect("must succeed")
    );
}
