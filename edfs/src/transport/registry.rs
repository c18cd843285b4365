use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, instrument};
use url::Url;

use super::{from_addr, BrickTransport};
use crate::{Error, RegistryError};

/// Builds a transport on first lookup.
pub type TransportFactory = Box<dyn Fn() -> Result<Arc<dyn BrickTransport>, Error> + Send + Sync>;

enum RegistryEntry {
    Instance(Arc<dyn BrickTransport>),
    Factory(TransportFactory),
}

/// Maps strategy names to transports.
///
/// There's no process-wide instance: create one at startup and hand it
/// to [crate::Edfs::attach] (it's usually kept in an [Arc]).
///
/// Registering a name that's already present fails with
/// [RegistryError::AlreadyRegistered], and never replaces the existing entry.
#[derive(Default)]
pub struct TransportRegistry {
    entries: RwLock<BTreeMap<String, RegistryEntry>>,
}

impl TransportRegistry {
    /// Registers an already constructed transport under `name`.
    #[instrument(skip(self, transport), fields(transport.endpoint=%transport.endpoint()), err)]
    pub fn register(&self, name: &str, transport: Arc<dyn BrickTransport>) -> Result<(), Error> {
        self.insert(name, RegistryEntry::Instance(transport))
    }

    /// Registers a factory, which is invoked the first time `name` is looked up.
    /// The constructed transport is kept and returned on later lookups.
    #[instrument(skip(self, factory), err)]
    pub fn register_factory(&self, name: &str, factory: TransportFactory) -> Result<(), Error> {
        self.insert(name, RegistryEntry::Factory(factory))
    }

    /// Registers a lazily constructed transport for an address understood by [from_addr].
    pub fn register_addr(&self, name: &str, uri: &str) -> Result<(), Error> {
        let uri = uri.to_owned();
        self.register_factory(name, Box::new(move || from_addr(&uri)))
    }

    fn insert(&self, name: &str, entry: RegistryEntry) -> Result<(), Error> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_owned()).into());
        }
        entries.insert(name.to_owned(), entry);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Looks up the transport registered under `name`, instantiating it if
    /// it was registered as a factory.
    #[instrument(skip(self), err)]
    pub fn get(&self, name: &str) -> Result<Arc<dyn BrickTransport>, Error> {
        if let Some(RegistryEntry::Instance(transport)) = self.entries.read().get(name) {
            return Ok(transport.clone());
        }

        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;

        // Someone else might have instantiated it between dropping the read
        // and acquiring the write lock.
        let transport = match entry {
            RegistryEntry::Instance(transport) => return Ok(transport.clone()),
            RegistryEntry::Factory(factory) => {
                debug!("instantiating transport from factory");
                factory().map_err(|e| RegistryError::Factory(name.to_owned(), e.to_string()))?
            }
        };
        *entry = RegistryEntry::Instance(transport.clone());

        Ok(transport)
    }

    /// Returns an already instantiated transport whose endpoint equals `endpoint`.
    /// Factories that were never looked up are not considered.
    pub fn find_by_endpoint(&self, endpoint: &Url) -> Option<Arc<dyn BrickTransport>> {
        self.entries.read().values().find_map(|entry| match entry {
            RegistryEntry::Instance(transport) if transport.endpoint() == *endpoint => {
                Some(transport.clone())
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use url::Url;

    use super::TransportRegistry;
    use crate::{
        transport::{BrickTransport, MemoryBrickTransport},
        Error, RegistryError,
    };

    #[test]
    fn register_and_get() {
        let registry = TransportRegistry::default();
        let transport = Arc::new(MemoryBrickTransport::default());
        registry.register("memory", transport).expect("must succeed");

        assert!(registry.contains("memory"));
        assert!(!registry.contains("http"));
        assert_eq!(vec!["memory".to_string()], registry.names());
        registry.get("memory").expect("must be found");
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = TransportRegistry::default();
        registry
            .register("memory", Arc::new(MemoryBrickTransport::default()))
            .expect("must succeed");

        assert_eq!(
            Err(Error::Registry(RegistryError::AlreadyRegistered(
                "memory".into()
            ))),
            registry.register_addr("memory", "memory://")
        );
    }

    #[test]
    fn unknown_name() {
        let registry = TransportRegistry::default();
        assert!(matches!(
            registry.get("http"),
            Err(Error::Registry(RegistryError::NotFound(_)))
        ));
    }

    #[test]
    fn factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = TransportRegistry::default();
        registry
            .register_factory("memory", {
                let calls = calls.clone();
                Box::new(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(MemoryBrickTransport::default()) as Arc<dyn BrickTransport>)
                })
            })
            .expect("must succeed");

        // not instantiated yet, so it can't be found by endpoint.
        let endpoint = Url::parse("memory://").unwrap();
        assert!(registry.find_by_endpoint(&endpoint).is_none());

        registry.get("memory").expect("must succeed");
        registry.get("memory").expect("must succeed");
        assert_eq!(1, calls.load(Ordering::SeqCst));

        assert!(registry.find_by_endpoint(&endpoint).is_some());
    }

    #[test]
    fn failing_factory() {
        let registry = TransportRegistry::default();
        registry
            .register_addr("broken", "gopher://nowhere")
            .expect("registering must succeed");
        assert!(matches!(
            registry.get("broken"),
            Err(Error::Registry(RegistryError::Factory(..)))
        ));
    }
}
