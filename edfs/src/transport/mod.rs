use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{B3Digest, Error};

mod from_addr;
mod http;
mod memory;
mod object_store;
mod registry;

#[cfg(test)]
pub mod tests;

pub use self::from_addr::from_addr;
pub use self::http::{HttpBrickTransport, HttpTransportConfig};
pub use self::memory::MemoryBrickTransport;
pub use self::object_store::ObjectStoreBrickTransport;
pub use self::registry::{TransportFactory, TransportRegistry};

/// The base trait all brick transport strategies need to implement.
///
/// A transport moves whole bricks to and from some endpoint. It does not
/// hash or verify contents, that's done by [crate::brickstore::BrickStore]
/// on top of it. Any retry policy lives inside an implementation.
#[async_trait]
pub trait BrickTransport: Send + Sync {
    /// Check if the endpoint has the brick, by its digest.
    async fn has(&self, digest: &B3Digest) -> Result<bool, Error>;

    /// Store a brick under the given digest.
    /// Storing a brick that already exists is a no-op.
    async fn store_brick(&self, digest: &B3Digest, data: Bytes) -> Result<(), Error>;

    /// Fetch a brick by its digest. Returns Ok(None) if it doesn't exist.
    async fn fetch_brick(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error>;

    /// Describes the endpoint in a way [from_addr] can construct an
    /// equivalent transport from it, possibly in another process.
    fn endpoint(&self) -> Url;
}

#[async_trait]
impl<A> BrickTransport for A
where
    A: AsRef<dyn BrickTransport> + Send + Sync,
{
    async fn has(&self, digest: &B3Digest) -> Result<bool, Error> {
        self.as_ref().has(digest).await
    }

    async fn store_brick(&self, digest: &B3Digest, data: Bytes) -> Result<(), Error> {
        self.as_ref().store_brick(digest, data).await
    }

    async fn fetch_brick(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        self.as_ref().fetch_brick(digest).await
    }

    fn endpoint(&self) -> Url {
        self.as_ref().endpoint()
    }
}
