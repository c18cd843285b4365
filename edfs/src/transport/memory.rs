use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{instrument, trace};
use url::Url;

use super::BrickTransport;
use crate::{B3Digest, Error};

/// Keeps bricks in a process-local map.
///
/// Clones share the same map. The endpoint is always `memory://`, so an
/// instance built from a seed in another process starts out empty.
#[derive(Clone, Default)]
pub struct MemoryBrickTransport {
    db: Arc<RwLock<HashMap<B3Digest, Bytes>>>,
}

impl MemoryBrickTransport {
    /// Number of distinct bricks stored.
    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }
}

#[async_trait]
impl BrickTransport for MemoryBrickTransport {
    #[instrument(skip_all, fields(brick.digest=%digest))]
    async fn has(&self, digest: &B3Digest) -> Result<bool, Error> {
        Ok(self.db.read().contains_key(digest))
    }

    #[instrument(skip_all, fields(brick.digest=%digest, brick.size=data.len()))]
    async fn store_brick(&self, digest: &B3Digest, data: Bytes) -> Result<(), Error> {
        // Only insert if the brick doesn't already exist.
        let mut db = self.db.write();
        if db.contains_key(digest) {
            trace!("brick already exists");
        } else {
            db.insert(digest.clone(), data);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(brick.digest=%digest))]
    async fn fetch_brick(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        Ok(self.db.read().get(digest).cloned())
    }

    fn endpoint(&self) -> Url {
        Url::parse("memory://").expect("static url must parse")
    }
}
