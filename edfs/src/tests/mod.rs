use std::sync::Arc;

use bytes::Bytes;
use rstest::rstest;

use crate::fixtures::{BLOB_B, HELLO_CONTENTS, WORLD_CONTENTS};
use crate::transport::{self, BrickTransport, TransportRegistry};
use crate::{Edfs, Error, Seed};

pub mod utils;

use self::utils::make_http_transport;

fn edfs_on(transport: Arc<dyn BrickTransport>) -> Edfs {
    let registry = TransportRegistry::default();
    registry.register("default", transport).unwrap();
    Edfs::attach(Arc::new(registry), "default").unwrap()
}

/// Two files in a bar, reopened from nothing but the encoded seed.
#[rstest]
#[case::memory(transport::from_addr("memory://").unwrap())]
#[case::http(make_http_transport().await)]
#[tokio::test]
async fn bar_reopened_from_token(#[case] transport: Arc<dyn BrickTransport>) {
    let edfs = edfs_on(transport);

    let bar = edfs.create_bar().unwrap();
    bar.add_bytes("a.txt", Bytes::from_static(HELLO_CONTENTS))
        .await
        .unwrap();
    bar.add_bytes("b.txt", Bytes::from_static(WORLD_CONTENTS))
        .await
        .unwrap();
    let token = bar.seed().await.unwrap().to_string();

    let seed: Seed = token.parse().expect("must decode");
    let reopened = edfs.load_bar(&seed).await.expect("must load");

    assert_eq!(vec!["a.txt", "b.txt"], reopened.list_files("").await.unwrap());
    assert_eq!(
        Bytes::from_static(HELLO_CONTENTS),
        reopened.read_file("a.txt").await.unwrap()
    );
    assert!(matches!(
        reopened.read_file("c.txt").await,
        Err(Error::NotFound(_))
    ));
}

/// A seed pointing to a local object store can be opened by someone
/// sharing nothing but the filesystem.
#[tokio::test]
async fn objectstore_seed_is_self_contained() {
    let tmpdir = tempfile::tempdir().unwrap();
    let addr = format!(
        "objectstore+{}",
        url::Url::from_directory_path(tmpdir.path()).unwrap()
    );

    let writer = edfs_on(transport::from_addr(&addr).unwrap());
    let csb = writer.create_csb().unwrap();
    csb.add_bytes("app/big", BLOB_B.clone()).await.unwrap();
    let token = csb.seed().await.unwrap().encode();

    let registry = Arc::new(TransportRegistry::default());
    registry
        .register("memory", transport::from_addr("memory://").unwrap())
        .unwrap();
    let reader = Edfs::attach(registry.clone(), "memory").unwrap();

    let reopened = reader
        .load_csb(&Seed::decode(&token).unwrap())
        .await
        .expect("must load");
    assert_eq!(BLOB_B.clone(), reopened.read_file("app/big").await.unwrap());
    assert_eq!(vec!["app"], reopened.namespaces().await.unwrap());

    // further writes go to the same endpoint, and produce a new seed
    reopened
        .add_bytes("app/small", Bytes::from_static(HELLO_CONTENTS))
        .await
        .unwrap();
    let next = reopened.seed().await.unwrap();
    assert_ne!(token, next.encode());
    assert_eq!(addr, next.endpoint().as_str());
}
