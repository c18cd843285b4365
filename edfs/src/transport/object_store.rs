use std::{io::Cursor, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{path::Path, ObjectStore};
use tracing::{debug, instrument, Level};
use url::Url;

use super::BrickTransport;
use crate::{B3Digest, Error};

/// Uses any object storage supported by the [object_store] crate to store
/// bricks.
///
/// # Data format
/// Bricks are stored at `${base_path}/bricks/b3/$digest_key`, zstd-compressed.
///
/// ## Digest key sharding
/// The blake3 digest encoded in lower hex, and sharded after the second
/// character, so the brick for "hello" lives at
/// `${base_path}/bricks/b3/ea/ea8f163db38682925e4491c5e58d4bb3506ef8c14eb78a86e908c5624a67200f`.
///
/// This reduces the number of files in the same directory, which would be a
/// problem at least when using [object_store::local::LocalFileSystem].
#[derive(Clone)]
pub struct ObjectStoreBrickTransport {
    object_store: Arc<dyn ObjectStore>,
    base_path: Path,

    /// The url this was constructed from, including the `objectstore+` prefix.
    endpoint: Url,
}

impl ObjectStoreBrickTransport {
    /// Constructs a new [ObjectStoreBrickTransport] from a [Url] supported by
    /// [object_store], without the `objectstore+` prefix.
    /// Any path suffix becomes the base path of the object store.
    pub fn parse_url(url: &Url) -> Result<Self, Error> {
        let (object_store, base_path) = object_store::parse_url(url)?;
        let endpoint = Url::parse(&format!("objectstore+{}", url))
            .map_err(|e| Error::InvalidRequest(format!("unable to build endpoint url: {}", e)))?;

        Ok(Self {
            object_store: Arc::new(object_store),
            base_path,
            endpoint,
        })
    }
}

#[instrument(level=Level::TRACE, skip_all,fields(base_path=%base_path,brick.digest=%digest),ret(Display))]
fn derive_brick_path(base_path: &Path, digest: &B3Digest) -> Path {
    let hex = digest.to_hex();
    base_path
        .child("bricks")
        .child("b3")
        .child(&hex[..2])
        .child(hex)
}

#[async_trait]
impl BrickTransport for ObjectStoreBrickTransport {
    #[instrument(skip_all, ret, err, fields(brick.digest=%digest))]
    async fn has(&self, digest: &B3Digest) -> Result<bool, Error> {
        let p = derive_brick_path(&self.base_path, digest);

        match self.object_store.head(&p).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e)?,
        }
    }

    #[instrument(skip_all, err, fields(brick.digest=%digest, brick.size=data.len()))]
    async fn store_brick(&self, digest: &B3Digest, data: Bytes) -> Result<(), Error> {
        let p = derive_brick_path(&self.base_path, digest);

        match self.object_store.head(&p).await {
            // brick already exists, nothing to do
            Ok(_) => {
                debug!("brick already exists");
                Ok(())
            }
            // brick does not yet exist, compress and upload.
            Err(object_store::Error::NotFound { .. }) => {
                let compressed = tokio::task::spawn_blocking(move || {
                    zstd::encode_all(Cursor::new(data), zstd::DEFAULT_COMPRESSION_LEVEL)
                })
                .await??;

                debug!(brick.compressed_size=%compressed.len(), "uploading brick");
                self.object_store
                    .put(&p, Bytes::from(compressed).into())
                    .await?;
                Ok(())
            }
            Err(e) => Err(e)?,
        }
    }

    #[instrument(skip_all, err, fields(brick.digest=%digest))]
    async fn fetch_brick(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        let p = derive_brick_path(&self.base_path, digest);

        match self.object_store.get(&p).await {
            Ok(res) => {
                // FUTUREWORK: use zstd::bulk to prevent decompression bombs
                let raw = res.bytes().await?;
                let contents =
                    tokio::task::spawn_blocking(move || zstd::stream::decode_all(Cursor::new(raw)))
                        .await??;
                Ok(Some(contents.into()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e)?,
        }
    }

    fn endpoint(&self) -> Url {
        self.endpoint.clone()
    }
}
