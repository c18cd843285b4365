use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::path::ArchivePath;
use crate::{B3Digest, Error};

/// Version of the serialized index document.
const INDEX_VERSION: u32 = 1;

/// Reference to one brick of a file, in file order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickRef {
    pub digest: B3Digest,
    pub size: u64,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub folder: String,
    pub name: String,
    pub bricks: Vec<BrickRef>,
    pub size: u64,
    /// BLAKE3 digest of the whole file contents.
    pub digest: B3Digest,
}

impl FileEntry {
    /// Checks the brick list is consistent with itself and the file size.
    fn validate(&self) -> Result<(), Error> {
        let mut total = 0u64;
        for (i, brick) in self.bricks.iter().enumerate() {
            if brick.index as usize != i {
                return Err(Error::Corrupt(format!(
                    "{}/{}: brick {} has index {}",
                    self.folder, self.name, i, brick.index
                )));
            }
            total = total.checked_add(brick.size).ok_or_else(|| {
                Error::Corrupt(format!(
                    "{}/{}: brick sizes overflow",
                    self.folder, self.name
                ))
            })?;
        }

        if total != self.size {
            return Err(Error::Corrupt(format!(
                "{}/{}: bricks sum up to {} bytes, expected {}",
                self.folder, self.name, total, self.size
            )));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexDocument {
    version: u32,
    files: Vec<FileEntry>,
}

/// The set of files in an archive, keyed by their path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArchiveIndex {
    entries: BTreeMap<ArchivePath, FileEntry>,
}

impl ArchiveIndex {
    pub fn insert(&mut self, path: ArchivePath, entry: FileEntry) -> Option<FileEntry> {
        self.entries.insert(path, entry)
    }

    pub fn get(&self, path: &ArchivePath) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &ArchivePath> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the index in its canonical form: entries sorted by path.
    pub fn to_canonical_bytes(&self) -> Result<Bytes, Error> {
        let doc = IndexDocument {
            version: INDEX_VERSION,
            files: self.entries.values().cloned().collect(),
        };

        serde_json::to_vec(&doc)
            .map(Bytes::from)
            .map_err(|e| Error::InvalidRequest(format!("unable to serialize index: {}", e)))
    }

    /// Parses and validates a serialized index.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        let doc: IndexDocument = serde_json::from_slice(buf)
            .map_err(|e| Error::Corrupt(format!("unable to parse index: {}", e)))?;

        if doc.version != INDEX_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported index version {}",
                doc.version
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in doc.files {
            let path = ArchivePath::from_parts(entry.folder.clone(), entry.name.clone())
                .map_err(|e| Error::Corrupt(e.to_string()))?;
            entry.validate()?;

            if entries.insert(path.clone(), entry).is_some() {
                return Err(Error::Corrupt(format!("duplicate index entry {}", path)));
            }
        }

        Ok(Self { entries })
    }
}
