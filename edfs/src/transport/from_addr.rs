use std::sync::Arc;

use url::Url;

use super::{BrickTransport, HttpBrickTransport, MemoryBrickTransport, ObjectStoreBrickTransport};
use crate::{security::security_context, Error};

/// Constructs a new instance of a [BrickTransport] from an URI.
///
/// The following schemes are supported by the following transports:
/// - `memory://` ([MemoryBrickTransport])
/// - `objectstore+*://` ([ObjectStoreBrickTransport])
/// - `http://`, `https://` ([HttpBrickTransport])
///
/// Every [BrickTransport::endpoint] is accepted here, which is what lets a
/// seed be opened in a process that never saw the original transport.
pub fn from_addr(uri: &str) -> Result<Arc<dyn BrickTransport>, Error> {
    let url =
        Url::parse(uri).map_err(|e| Error::InvalidRequest(format!("unable to parse url: {}", e)))?;

    let transport: Arc<dyn BrickTransport> = match url.scheme() {
        "memory" => {
            // memory doesn't support host or path in the URL.
            if url.host_str().is_some_and(|h| !h.is_empty()) || !url.path().is_empty() {
                return Err(Error::InvalidRequest("invalid url".to_string()));
            }
            Arc::new(MemoryBrickTransport::default())
        }
        scheme if scheme.starts_with("objectstore+") => {
            // We need to convert the URL to string, strip the prefix there, and then
            // parse it back as url, as Url::set_scheme() rejects some of the transitions we want to do.
            let trimmed_url = {
                let s = url.to_string();
                let stripped = s.strip_prefix("objectstore+").unwrap_or(&s);
                Url::parse(stripped)
                    .map_err(|e| Error::InvalidRequest(format!("unable to parse url: {}", e)))?
            };
            Arc::new(ObjectStoreBrickTransport::parse_url(&trimmed_url)?)
        }
        "http" | "https" => Arc::new(HttpBrickTransport::from_url(&url, security_context())?),
        scheme => {
            return Err(Error::InvalidRequest(format!(
                "unknown scheme: {}",
                scheme
            )))
        }
    };

    Ok(transport)
}
