use std::fmt;
use std::str::FromStr;

use data_encoding::BASE64URL_NOPAD;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use url::Url;

use crate::archive::ArchiveKind;
use crate::{B3Digest, Error, B3_LEN};

const SEED_VERSION: u8 = 1;

/// `[version][kind][root digest]`, followed by the endpoint.
const HEADER_LEN: usize = 2 + B3_LEN;

/// Everything needed to reopen an archive elsewhere: its kind, the digest
/// of its index and the endpoint the bricks live at.
///
/// Its textual form is the URL-safe, unpadded base64 encoding of
/// `[version=1][kind][32 byte root digest][endpoint url]`.
#[derive(Clone, Debug, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Seed {
    kind: ArchiveKind,
    root: B3Digest,
    endpoint: Url,
}

impl Seed {
    pub fn new(kind: ArchiveKind, root: B3Digest, endpoint: Url) -> Self {
        Self {
            kind,
            root,
            endpoint,
        }
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn root(&self) -> &B3Digest {
        &self.root
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn encode(&self) -> String {
        let endpoint = self.endpoint.as_str().as_bytes();

        let mut buf = Vec::with_capacity(HEADER_LEN + endpoint.len());
        buf.push(SEED_VERSION);
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(self.root.as_slice());
        buf.extend_from_slice(endpoint);

        BASE64URL_NOPAD.encode(&buf)
    }

    pub fn decode(s: &str) -> Result<Self, Error> {
        let buf = BASE64URL_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| Error::Decode(format!("invalid base64: {}", e)))?;

        if buf.len() <= HEADER_LEN {
            return Err(Error::Decode(format!("too short: {} bytes", buf.len())));
        }

        if buf[0] != SEED_VERSION {
            return Err(Error::Decode(format!("unknown version {}", buf[0])));
        }

        let kind = ArchiveKind::from_byte(buf[1])
            .ok_or_else(|| Error::Decode(format!("unknown archive kind {}", buf[1])))?;

        let root = B3Digest::try_from(&buf[2..HEADER_LEN])
            .map_err(|e| Error::Decode(e.to_string()))?;

        let endpoint = std::str::from_utf8(&buf[HEADER_LEN..])
            .map_err(|e| Error::Decode(format!("endpoint is not utf-8: {}", e)))?;
        let endpoint =
            Url::parse(endpoint).map_err(|e| Error::Decode(format!("invalid endpoint: {}", e)))?;

        Ok(Self {
            kind,
            root,
            endpoint,
        })
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Seed {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
