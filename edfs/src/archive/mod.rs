use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use fastcdc::v2020::{AsyncStreamCDC, ChunkData};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::brickstore::BrickStore;
use crate::hashing_reader::B3HashingReader;
use crate::seed::Seed;
use crate::{B3Digest, Error};

mod index;
mod path;


pub use self::index::{ArchiveIndex, BrickRef, FileEntry};
pub use self::path::ArchivePath;

/// Upper bound for the buffer allocated up front by [Archive::read_file].
const MAX_READ_PREALLOC: u64 = 16 * 1024 * 1024;

/// The two archive flavours.
///
/// A [ArchiveKind::Bar] takes files at any level, a [ArchiveKind::Csb]
/// (a bar scoped by namespaces) requires every file to live in a folder,
/// whose first component is its namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Bar,
    Csb,
}

impl ArchiveKind {
    pub(crate) fn as_byte(self) -> u8 {
        match self {
            ArchiveKind::Bar => 0,
            ArchiveKind::Csb => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ArchiveKind::Bar),
            1 => Some(ArchiveKind::Csb),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Bar => f.write_str("bar"),
            ArchiveKind::Csb => f.write_str("csb"),
        }
    }
}

/// Chunking and upload parameters of an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ArchiveConfig {
    /// Average brick size for FastCDC, in bytes.
    /// min value is half, max value double of that number.
    pub avg_chunk_size: u32,

    /// Maximum number of brick uploads in flight per file.
    pub upload_concurrency: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            avg_chunk_size: 256 * 1024,
            upload_concurrency: 8,
        }
    }
}

impl ArchiveConfig {
    const MIN_AVG_CHUNK_SIZE: u32 = 1024;
    const MAX_AVG_CHUNK_SIZE: u32 = 1024 * 1024;

    pub fn validate(&self) -> Result<(), Error> {
        if !(Self::MIN_AVG_CHUNK_SIZE..=Self::MAX_AVG_CHUNK_SIZE).contains(&self.avg_chunk_size) {
            return Err(Error::InvalidRequest(format!(
                "avg_chunk_size must be between {} and {}, got {}",
                Self::MIN_AVG_CHUNK_SIZE,
                Self::MAX_AVG_CHUNK_SIZE,
                self.avg_chunk_size
            )));
        }
        if self.upload_concurrency == 0 {
            return Err(Error::InvalidRequest(
                "upload_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn chunk_sizes(&self) -> (u32, u32, u32) {
        (
            self.avg_chunk_size / 2,
            self.avg_chunk_size,
            self.avg_chunk_size * 2,
        )
    }
}

/// A set of files, each stored as an ordered list of bricks in a
/// [BrickStore], and addressed by the digest of its index.
///
/// Mutations take the index write lock for their whole duration, so
/// concurrent `add_*` calls on one archive are serialized, and a reader
/// never observes a partially added file.
pub struct Archive {
    kind: ArchiveKind,
    store: BrickStore,
    config: ArchiveConfig,
    index: RwLock<ArchiveIndex>,
}

impl Archive {
    /// Creates a new, empty archive.
    pub fn new(kind: ArchiveKind, store: BrickStore, config: ArchiveConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            kind,
            store,
            config,
            index: RwLock::new(ArchiveIndex::default()),
        })
    }

    /// Reopens the archive pointed to by a seed.
    /// The store is expected to talk to the seed's endpoint.
    #[instrument(skip_all, fields(archive.kind=%kind, archive.root=%seed.root()), err)]
    pub async fn load(
        kind: ArchiveKind,
        seed: &Seed,
        store: BrickStore,
        config: ArchiveConfig,
    ) -> Result<Self, Error> {
        if seed.kind() != kind {
            return Err(Error::InvalidRequest(format!(
                "seed points to a {} archive, not a {}",
                seed.kind(),
                kind
            )));
        }
        config.validate()?;

        let buf = store.get(seed.root()).await?;
        let index = ArchiveIndex::from_bytes(&buf)?;

        if kind == ArchiveKind::Csb {
            if let Some(path) = index.paths().find(|p| p.folder().is_empty()) {
                return Err(Error::Corrupt(format!(
                    "csb index contains {} outside of any namespace",
                    path
                )));
            }
        }

        debug!(archive.files = index.len(), "loaded archive index");

        Ok(Self {
            kind,
            store,
            config,
            index: RwLock::new(index),
        })
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn store(&self) -> &BrickStore {
        &self.store
    }

    fn parse_path(&self, archive_path: &str) -> Result<ArchivePath, Error> {
        let path = ArchivePath::parse(archive_path)?;
        if self.kind == ArchiveKind::Csb && path.folder().is_empty() {
            return Err(Error::InvalidRequest(format!(
                "{} is not inside a namespace",
                path
            )));
        }
        Ok(path)
    }

    /// Adds (or replaces) a file, reading it from the local filesystem.
    #[instrument(skip_all, fields(archive.path=archive_path, local.path=%local_path.as_ref().display(), indicatif.pb_show=1), err)]
    pub async fn add_file<P: AsRef<Path>>(
        &self,
        local_path: P,
        archive_path: &str,
    ) -> Result<(), Error> {
        let path = self.parse_path(archive_path)?;

        let mut index = self.index.write().await;

        let f = tokio::fs::File::open(local_path.as_ref()).await?;
        let len = f.metadata().await?.len();

        let entry = self.upload(&path, f, len).await?;
        index.insert(path, entry);

        Ok(())
    }

    /// Adds (or replaces) a file from an in-memory buffer.
    #[instrument(skip_all, fields(archive.path=archive_path, indicatif.pb_show=1), err)]
    pub async fn add_bytes(&self, archive_path: &str, data: Bytes) -> Result<(), Error> {
        let path = self.parse_path(archive_path)?;

        let mut index = self.index.write().await;

        let len = data.len() as u64;
        let entry = self.upload(&path, std::io::Cursor::new(data), len).await?;
        index.insert(path, entry);

        Ok(())
    }

    /// Adds files in order. The first failing file stops the list, its
    /// error is returned, and previously added files stay in the archive.
    #[instrument(skip_all, fields(archive.files=files.len()), err)]
    pub async fn add_files<P: AsRef<Path>>(&self, files: &[(P, String)]) -> Result<(), Error> {
        for (local_path, archive_path) in files {
            self.add_file(local_path, archive_path).await?;
        }
        Ok(())
    }

    /// Chunks the reader contents and stores all bricks, returning the
    /// [FileEntry] describing them. Nothing is inserted into the index here.
    async fn upload<R>(&self, path: &ArchivePath, r: R, len: u64) -> Result<FileEntry, Error>
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = Span::current();
        span.pb_set_style(&edfs_tracing::PB_TRANSFER_STYLE);
        span.pb_set_length(len);
        span.pb_set_message(&format!("Uploading {}", path));
        span.pb_start();

        let (min, avg, max) = self.config.chunk_sizes();
        let mut hr = B3HashingReader::from(r);

        let bricks = {
            let mut chunker = AsyncStreamCDC::new(&mut hr, min, avg, max);

            chunker
                .as_stream()
                .map(|chunk| upload_chunk(self.store.clone(), chunk))
                .buffered(self.config.upload_concurrency)
                .inspect_ok(|(_, size)| span.pb_inc(*size))
                .try_collect::<Vec<_>>()
                .await?
        };

        let bricks: Vec<BrickRef> = bricks
            .into_iter()
            .enumerate()
            .map(|(i, (digest, size))| BrickRef {
                digest,
                size,
                index: i as u32,
            })
            .collect();

        debug!(
            file.size = hr.bytes_read(),
            file.bricks = bricks.len(),
            "stored file"
        );

        Ok(FileEntry {
            folder: path.folder().to_owned(),
            name: path.name().to_owned(),
            bricks,
            size: hr.bytes_read(),
            digest: hr.digest(),
        })
    }

    /// Lists the paths of all files in `folder` or below, sorted.
    /// `""` and `"/"` list the whole archive.
    pub async fn list_files(&self, folder: &str) -> Result<Vec<String>, Error> {
        let folder = path::normalize_folder(folder)?;

        let mut paths: Vec<String> = self
            .index
            .read()
            .await
            .paths()
            .filter(|p| p.is_in(&folder))
            .map(|p| p.to_string())
            .collect();
        paths.sort_unstable();

        Ok(paths)
    }

    /// Reads a whole file, verifying every brick and the file digest.
    #[instrument(skip_all, fields(archive.path=archive_path), err)]
    pub async fn read_file(&self, archive_path: &str) -> Result<Bytes, Error> {
        let path = ArchivePath::parse(archive_path)?;

        let entry = self
            .index
            .read()
            .await
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        // sizes come from the index, which might be crafted
        let mut buf = BytesMut::with_capacity(entry.size.min(MAX_READ_PREALLOC) as usize);
        for brick in &entry.bricks {
            let data = self.store.get(&brick.digest).await?;
            if data.len() as u64 != brick.size {
                return Err(Error::Corrupt(format!(
                    "brick {} of {} has {} bytes, expected {}",
                    brick.index,
                    path,
                    data.len(),
                    brick.size
                )));
            }
            buf.extend_from_slice(&data);
        }

        let actual = B3Digest::of(&buf);
        if actual != entry.digest {
            warn!(file.digest=%actual, "file failed verification");
            return Err(Error::Corrupt(format!(
                "{}: expected digest {}, got {}",
                path, entry.digest, actual
            )));
        }

        Ok(buf.freeze())
    }

    /// Persists the index as a brick and returns a seed pointing to it.
    #[instrument(skip_all, fields(archive.kind=%self.kind), err)]
    pub async fn seed(&self) -> Result<Seed, Error> {
        let buf = self.index.read().await.to_canonical_bytes()?;
        let root = self.store.put(buf).await?;

        Ok(Seed::new(self.kind, root, self.store.transport().endpoint()))
    }

    /// The digest [Archive::seed] would return, without storing anything.
    pub async fn root_digest(&self) -> Result<B3Digest, Error> {
        let buf = self.index.read().await.to_canonical_bytes()?;
        Ok(B3Digest::of(&buf))
    }

    /// Sorted, distinct top-level namespaces.
    /// Only [ArchiveKind::Csb] archives have namespaces.
    pub async fn namespaces(&self) -> Result<Vec<String>, Error> {
        if self.kind != ArchiveKind::Csb {
            return Err(Error::InvalidRequest(format!(
                "a {} archive has no namespaces",
                self.kind
            )));
        }

        Ok(self
            .index
            .read()
            .await
            .paths()
            .map(|p| p.namespace().to_owned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}

/// This really should just belong into the closure at
/// `chunker.as_stream().map(|_| { … })`, but it's easier to name the future
/// as a separate function.
async fn upload_chunk(
    store: BrickStore,
    chunk: Result<ChunkData, fastcdc::v2020::Error>,
) -> Result<(B3Digest, u64), Error> {
    let chunk = chunk.map_err(std::io::Error::from)?;
    let size = chunk.data.len() as u64;
    let digest = store.put(chunk.data.into()).await?;

    Ok((digest, size))
}
