use std::sync::Arc;

use bytes::Bytes;
use tracing::{instrument, trace, warn};

use crate::{transport::BrickTransport, B3Digest, Error};

/// Content-addressed brick storage on top of a [BrickTransport].
///
/// `put` hashes and only uploads bricks the transport doesn't have yet,
/// `get` verifies fetched bricks against their digest. Errors from the
/// transport are passed through unchanged.
#[derive(Clone)]
pub struct BrickStore {
    transport: Arc<dyn BrickTransport>,
}

impl BrickStore {
    pub fn new(transport: Arc<dyn BrickTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn BrickTransport> {
        &self.transport
    }

    #[instrument(skip_all, fields(brick.size=data.len(), brick.digest=tracing::field::Empty), err)]
    pub async fn put(&self, data: Bytes) -> Result<B3Digest, Error> {
        let digest = B3Digest::of(&data);
        tracing::Span::current().record("brick.digest", tracing::field::display(&digest));

        if self.transport.has(&digest).await? {
            trace!("brick already present");
        } else {
            self.transport.store_brick(&digest, data).await?;
        }

        Ok(digest)
    }

    #[instrument(skip_all, fields(brick.digest=%digest), err)]
    pub async fn get(&self, digest: &B3Digest) -> Result<Bytes, Error> {
        let data = self
            .transport
            .fetch_brick(digest)
            .await?
            .ok_or_else(|| Error::NotFound(format!("brick {}", digest)))?;

        let actual = B3Digest::of(&data);
        if actual != *digest {
            warn!(brick.actual_digest=%actual, "brick failed verification");
            return Err(Error::Corrupt(format!(
                "requested brick {}, but got {}",
                digest, actual
            )));
        }

        Ok(data)
    }

    pub async fn has(&self, digest: &B3Digest) -> Result<bool, Error> {
        self.transport.has(digest).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::BrickStore;
    use crate::{
        fixtures::{HELLO_CONTENTS, HELLO_DIGEST, WORLD_CONTENTS},
        transport::{BrickTransport, MemoryBrickTransport},
        Error,
    };

    #[tokio::test]
    async fn put_is_idempotent() {
        let transport = MemoryBrickTransport::default();
        let store = BrickStore::new(Arc::new(transport.clone()));

        let d1 = store.put(Bytes::from_static(HELLO_CONTENTS)).await.unwrap();
        let d2 = store.put(Bytes::from_static(HELLO_CONTENTS)).await.unwrap();

        assert_eq!(d1, d2);
        assert_eq!(*HELLO_DIGEST, d1);
        assert_eq!(1, transport.len(), "store must hold exactly one copy");
    }

    #[tokio::test]
    async fn get_missing() {
        let store = BrickStore::new(Arc::new(MemoryBrickTransport::default()));
        assert!(matches!(
            store.get(&HELLO_DIGEST).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn get_corrupt() {
        let transport = MemoryBrickTransport::default();
        // stash other contents under the digest of "hello"
        transport
            .store_brick(&HELLO_DIGEST, Bytes::from_static(WORLD_CONTENTS))
            .await
            .unwrap();

        let store = BrickStore::new(Arc::new(transport));
        assert!(matches!(
            store.get(&HELLO_DIGEST).await,
            Err(Error::Corrupt(_))
        ));
    }
}
