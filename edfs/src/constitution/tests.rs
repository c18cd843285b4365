use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use super::*;
use crate::fixtures::{BLOB_C, HELLO_CONTENTS, WORLD_CONTENTS};
use crate::http::DEFAULT_UPLOAD_LIMIT;
use crate::tests::utils::spawn_brick_server;
use crate::transport::{BrickTransport, MemoryBrickTransport};

fn edfs() -> Edfs {
    let registry = TransportRegistry::default();
    registry
        .register("memory", Arc::new(MemoryBrickTransport::default()))
        .unwrap();
    Edfs::attach(Arc::new(registry), "memory").unwrap()
}

/// Writes `a.js`, `b.js` and `c.js` into a fresh temporary directory.
async fn sources() -> (TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = vec![];
    for (name, contents) in [
        ("a.js", Bytes::from_static(HELLO_CONTENTS)),
        ("b.js", Bytes::from_static(WORLD_CONTENTS)),
        ("c.js", BLOB_C.clone()),
    ] {
        let p = dir.path().join(name);
        tokio::fs::write(&p, &contents).await.unwrap();
        paths.push(p);
    }
    (dir, paths)
}

#[tokio::test]
async fn deploy_and_get_bar() {
    let edfs = edfs();
    let (_dir, files) = sources().await;

    let seed = deploy_constitution_bar(&edfs, &files)
        .await
        .expect("must deploy");

    let bar = edfs.load_bar(&seed).await.unwrap();
    assert_eq!(
        vec!["constitution/a.js", "constitution/b.js", "constitution/c.js"],
        bar.list_files("").await.unwrap()
    );

    let constitution = get_constitution_from(&bar).await.unwrap();
    assert_eq!(
        vec!["a.js", "b.js", "c.js"],
        constitution.keys().collect::<Vec<_>>()
    );
    assert_eq!(BLOB_C.clone(), constitution["c.js"]);
}

#[tokio::test]
async fn deploy_and_get_csb_filtered() {
    let edfs = edfs();
    let (_dir, files) = sources().await;

    let seed = deploy_constitution_csb(&edfs, &files)
        .await
        .expect("must deploy");

    let filter = vec!["b.js".to_string(), "nope.js".to_string()];
    let constitution = get_constitution_files_from_csb(&edfs, &seed, Some(&filter))
        .await
        .unwrap();

    assert_eq!(1, constitution.len());
    assert_eq!(Bytes::from_static(WORLD_CONTENTS), constitution["b.js"]);

    // a csb seed can't be opened as bar
    assert!(matches!(
        get_constitution_files_from_bar(&edfs, &seed, None).await,
        Err(Error::Edfs(crate::Error::InvalidRequest(_)))
    ));
}

#[tokio::test]
async fn deploy_folder() {
    let edfs = edfs();
    let (dir, _) = sources().await;
    tokio::fs::create_dir(dir.path().join("subdir")).await.unwrap();
    tokio::fs::write(dir.path().join("subdir").join("d.js"), HELLO_CONTENTS)
        .await
        .unwrap();

    let seed = deploy_constitution_folder_csb(&edfs, dir.path())
        .await
        .expect("must deploy");

    let csb = edfs.load_csb(&seed).await.unwrap();
    assert_eq!(
        vec!["constitution/a.js", "constitution/b.js", "constitution/c.js"],
        csb.list_files(CONSTITUTION_FOLDER).await.unwrap()
    );
}

#[tokio::test]
async fn deploy_missing_file() {
    let edfs = edfs();
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        deploy_constitution_bar(&edfs, &[dir.path().join("nope.js")]).await,
        Err(Error::Edfs(crate::Error::NotFound(_)))
    ));
}

#[tokio::test]
async fn deploy_missing_folder() {
    let edfs = edfs();
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        deploy_constitution_folder_csb(&edfs, dir.path().join("nope")).await,
        Err(Error::Io(_))
    ));
}

/// Files outside of the constitution folder are not part of it.
#[tokio::test]
async fn only_constitution_folder() {
    let edfs = edfs();
    let bar = edfs.create_bar().unwrap();
    bar.add_bytes("constitution/a.js", Bytes::from_static(HELLO_CONTENTS))
        .await
        .unwrap();
    bar.add_bytes("other/b.js", Bytes::from_static(WORLD_CONTENTS))
        .await
        .unwrap();
    bar.add_bytes("b.js", Bytes::from_static(WORLD_CONTENTS))
        .await
        .unwrap();

    let constitution = get_constitution_from(&bar).await.unwrap();
    assert_eq!(vec!["a.js"], constitution.keys().collect::<Vec<_>>());
}

#[tokio::test]
async fn ensure_environment_registers_http_once() {
    let registry = TransportRegistry::default();
    let first = url::Url::parse("http://127.0.0.1:1/").unwrap();
    let second = url::Url::parse("http://127.0.0.1:2/").unwrap();

    ensure_environment_is_ready(&registry, &first).unwrap();
    ensure_environment_is_ready(&registry, &second).unwrap();

    assert_eq!(vec![HTTP_STRATEGY], registry.names());
    assert_eq!(first, registry.get(HTTP_STRATEGY).unwrap().endpoint());
}

/// Racing callers all succeed, and exactly one transport gets registered.
#[test]
fn ensure_environment_concurrently() {
    let endpoint = url::Url::parse("http://127.0.0.1:1/").unwrap();

    for _ in 0..10 {
        let registry = TransportRegistry::default();
        let barrier = std::sync::Barrier::new(4);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        ensure_environment_is_ready(&registry, &endpoint)
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap().expect("must succeed");
            }
        });

        assert_eq!(vec![HTTP_STRATEGY], registry.names());
    }
}

/// Deploy to a brick server, then load the csb with nothing but the seed
/// and an empty registry.
#[tokio::test]
async fn load_csb_over_http() {
    let backend = MemoryBrickTransport::default();
    let endpoint = spawn_brick_server(Arc::new(backend.clone()), None, DEFAULT_UPLOAD_LIMIT).await;
    let (_dir, files) = sources().await;

    let registry = Arc::new(TransportRegistry::default());
    ensure_environment_is_ready(&registry, &endpoint).unwrap();
    let csb = create_csb(registry).unwrap();
    add_files_to_archive(&files, &csb).await.unwrap();
    let seed = csb.seed().await.unwrap();
    assert!(!backend.is_empty());

    let csb = load_csb(Arc::new(TransportRegistry::default()), &seed)
        .await
        .expect("must load");
    let constitution = get_constitution_from(&csb).await.unwrap();

    assert_eq!(3, constitution.len());
    assert_eq!(Bytes::from_static(HELLO_CONTENTS), constitution["a.js"]);
}
