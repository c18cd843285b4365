use bytes::Bytes;
use data_encoding::{BASE64, HEXLOWER};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// A BLAKE3 digest, the identity of every brick (and of every archive
/// index, which is stored as a brick itself).
#[derive(PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct B3Digest(Bytes);

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLen(usize),

    #[error("invalid digest encoding: {0}")]
    InvalidEncoding(String),
}

pub const B3_LEN: usize = 32;

impl B3Digest {
    /// Hashes the given data.
    pub fn of(data: &[u8]) -> Self {
        blake3::hash(data).into()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }

    /// Lower-case hex form, used in storage paths and HTTP routes.
    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let v = HEXLOWER
            .decode(s.as_bytes())
            .map_err(|e| Error::InvalidEncoding(e.to_string()))?;
        v.try_into()
    }
}

impl From<B3Digest> for bytes::Bytes {
    fn from(val: B3Digest) -> Self {
        val.0
    }
}

impl From<blake3::Hash> for B3Digest {
    fn from(value: blake3::Hash) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl TryFrom<Vec<u8>> for B3Digest {
    type Error = Error;

    // constructs a [B3Digest] from a [Vec<u8>].
    // Returns an error if the digest has the wrong length.
    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() != B3_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value.into()))
        }
    }
}

impl TryFrom<&[u8]> for B3Digest {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != B3_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(Bytes::copy_from_slice(value)))
        }
    }
}

impl From<&[u8; B3_LEN]> for B3Digest {
    fn from(value: &[u8; B3_LEN]) -> Self {
        Self(value.to_vec().into())
    }
}

impl Clone for B3Digest {
    fn clone(&self) -> Self {
        Self(self.0.to_owned())
    }
}

impl std::str::FromStr for B3Digest {
    type Err = Error;

    /// Parses the `b3:<base64>` form produced by [std::fmt::Display].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix("b3:")
            .ok_or_else(|| Error::InvalidEncoding(format!("missing b3: prefix in {}", s)))?;
        let v = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| Error::InvalidEncoding(e.to_string()))?;
        v.try_into()
    }
}

impl std::fmt::Display for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b3:{}", BASE64.encode(&self.0))
    }
}

impl std::fmt::Debug for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b3:{}", BASE64.encode(&self.0))
    }
}
