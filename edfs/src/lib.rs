mod digests;
mod errors;
mod hashing_reader;

pub mod archive;
pub mod brickstore;
pub mod constitution;
pub mod fixtures;
pub mod http;
pub mod manager;
pub mod security;
pub mod seed;
pub mod transport;

pub use archive::{Archive, ArchiveConfig, ArchiveKind};
pub use digests::{B3Digest, B3_LEN};
pub use errors::{Error, RegistryError};
pub use manager::Edfs;
pub use seed::Seed;

#[cfg(test)]
mod tests;

// Required by rstest_reuse's #[template] macro, which refers to $crate::rstest_reuse.
#[cfg(test)]
use rstest_reuse;
