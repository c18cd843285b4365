use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;

use crate::archive::{Archive, ArchiveConfig, ArchiveKind};
use crate::brickstore::BrickStore;
use crate::errors::RegistryError;
use crate::seed::Seed;
use crate::transport::{self, BrickTransport, TransportRegistry};
use crate::Error;

/// Entry point for creating and reopening archives, attached to one
/// transport strategy of a [TransportRegistry].
///
/// New archives are created on the attached transport. Seeds may point
/// anywhere though, and loading one resolves a transport for its endpoint
/// first.
pub struct Edfs {
    registry: Arc<TransportRegistry>,
    transport: Arc<dyn BrickTransport>,
    config: ArchiveConfig,
}

impl Edfs {
    /// Attaches to the strategy registered under `name`, instantiating it
    /// if it was registered as a factory.
    pub fn attach(registry: Arc<TransportRegistry>, name: &str) -> Result<Self, Error> {
        let transport = registry.get(name)?;
        Ok(Self {
            registry,
            transport,
            config: ArchiveConfig::default(),
        })
    }

    /// Uses the given chunking parameters for all archives created or
    /// loaded from now on.
    pub fn with_config(mut self, config: ArchiveConfig) -> Result<Self, Error> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn BrickTransport> {
        &self.transport
    }

    pub fn create_bar(&self) -> Result<Archive, Error> {
        self.create(ArchiveKind::Bar)
    }

    pub fn create_csb(&self) -> Result<Archive, Error> {
        self.create(ArchiveKind::Csb)
    }

    pub async fn load_bar(&self, seed: &Seed) -> Result<Archive, Error> {
        self.load(ArchiveKind::Bar, seed).await
    }

    pub async fn load_csb(&self, seed: &Seed) -> Result<Archive, Error> {
        self.load(ArchiveKind::Csb, seed).await
    }

    fn create(&self, kind: ArchiveKind) -> Result<Archive, Error> {
        Archive::new(
            kind,
            BrickStore::new(self.transport.clone()),
            self.config.clone(),
        )
    }

    async fn load(&self, kind: ArchiveKind, seed: &Seed) -> Result<Archive, Error> {
        let transport = self.resolve_transport(seed.endpoint())?;
        Archive::load(kind, seed, BrickStore::new(transport), self.config.clone()).await
    }

    /// Finds a transport for an endpoint: the attached one, one already
    /// registered, or a new one, which is then registered under the
    /// endpoint string.
    #[instrument(skip_all, fields(endpoint=%endpoint), err)]
    fn resolve_transport(&self, endpoint: &Url) -> Result<Arc<dyn BrickTransport>, Error> {
        if self.transport.endpoint() == *endpoint {
            return Ok(self.transport.clone());
        }

        if let Some(transport) = self.registry.find_by_endpoint(endpoint) {
            debug!("using registered transport");
            return Ok(transport);
        }

        let transport = transport::from_addr(endpoint.as_str())?;
        match self.registry.register(endpoint.as_str(), transport.clone()) {
            Ok(()) => {
                debug!("registered new transport");
                Ok(transport)
            }
            // someone else registered it in the meantime
            Err(Error::Registry(RegistryError::AlreadyRegistered(name))) => self.registry.get(&name),
            Err(e) => Err(e),
        }
    }
}
