//! Deploying and retrieving constitutions: bundles of files kept in the
//! [CONSTITUTION_FOLDER] of a bar or csb, shipped around by seed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::archive::Archive;
use crate::manager::Edfs;
use crate::seed::Seed;
use crate::security::security_context;
use crate::transport::{HttpBrickTransport, TransportRegistry};
use crate::RegistryError;

mod build;

pub use self::build::{
    create_constitution_from_sources, BuildOptions, Bundler, CommandBundler, ProjectMap,
    ProjectModule,
};

/// Folder inside an archive holding the constitution files.
pub const CONSTITUTION_FOLDER: &str = "constitution";

/// Name of the transport strategy used by [load_csb] and [create_csb].
pub const HTTP_STRATEGY: &str = "http";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Edfs(#[from] crate::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to (de)serialize project map: {0}")]
    ProjectMap(#[from] serde_json::Error),

    #[error("bundler failed: {0}")]
    Bundler(String),

    #[error("{0} has no usable file name")]
    InvalidFileName(PathBuf),
}

fn file_name(p: &Path) -> Result<&str, Error> {
    p.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidFileName(p.to_owned()))
}

/// Adds each file as `constitution/<file name>`, in order.
/// The first failing file stops the list.
pub async fn add_files_to_archive<P: AsRef<Path>>(
    files: &[P],
    archive: &Archive,
) -> Result<(), Error> {
    let tasks = files
        .iter()
        .map(|f| {
            let f = f.as_ref();
            Ok((
                f.to_owned(),
                format!("{}/{}", CONSTITUTION_FOLDER, file_name(f)?),
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    archive.add_files(&tasks).await?;
    Ok(())
}

#[instrument(skip_all, fields(files=files.len()), err)]
pub async fn deploy_constitution_bar<P: AsRef<Path>>(
    edfs: &Edfs,
    files: &[P],
) -> Result<Seed, Error> {
    let bar = edfs.create_bar()?;
    add_files_to_archive(files, &bar).await?;
    Ok(bar.seed().await?)
}

#[instrument(skip_all, fields(files=files.len()), err)]
pub async fn deploy_constitution_csb<P: AsRef<Path>>(
    edfs: &Edfs,
    files: &[P],
) -> Result<Seed, Error> {
    let csb = edfs.create_csb()?;
    add_files_to_archive(files, &csb).await?;
    Ok(csb.seed().await?)
}

/// Deploys all regular files directly inside `folder`, sorted by name.
#[instrument(skip_all, fields(folder=%folder.as_ref().display()), err)]
pub async fn deploy_constitution_folder_csb<P: AsRef<Path>>(
    edfs: &Edfs,
    folder: P,
) -> Result<Seed, Error> {
    let mut files = vec![];
    let mut entries = tokio::fs::read_dir(folder.as_ref()).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        } else {
            debug!(path=%entry.path().display(), "skipping non-file");
        }
    }
    files.sort();

    deploy_constitution_csb(edfs, &files).await
}

/// Reads the files of the constitution folder, keyed by file name.
/// Without a filter, all files are returned, otherwise only the ones with
/// a listed name.
#[instrument(skip_all, err)]
pub async fn get_constitution_files_from(
    archive: &Archive,
    filter: Option<&[String]>,
) -> Result<BTreeMap<String, Bytes>, Error> {
    let mut files = BTreeMap::new();

    for path in archive.list_files(CONSTITUTION_FOLDER).await? {
        let name = path.rsplit('/').next().unwrap_or(&path).to_owned();
        if let Some(filter) = filter {
            if !filter.contains(&name) {
                continue;
            }
        }

        let contents = archive.read_file(&path).await?;
        files.insert(name, contents);
    }

    Ok(files)
}

pub async fn get_constitution_from(archive: &Archive) -> Result<BTreeMap<String, Bytes>, Error> {
    get_constitution_files_from(archive, None).await
}

pub async fn get_constitution_files_from_bar(
    edfs: &Edfs,
    seed: &Seed,
    filter: Option<&[String]>,
) -> Result<BTreeMap<String, Bytes>, Error> {
    let bar = edfs.load_bar(seed).await?;
    get_constitution_files_from(&bar, filter).await
}

pub async fn get_constitution_files_from_csb(
    edfs: &Edfs,
    seed: &Seed,
    filter: Option<&[String]>,
) -> Result<BTreeMap<String, Bytes>, Error> {
    let csb = edfs.load_csb(seed).await?;
    get_constitution_files_from(&csb, filter).await
}

/// Makes sure a [HTTP_STRATEGY] transport is registered, pointing it to
/// `endpoint` if it needs to be created. An existing one is left alone.
#[instrument(skip_all, fields(endpoint=%endpoint), err)]
pub fn ensure_environment_is_ready(
    registry: &TransportRegistry,
    endpoint: &Url,
) -> Result<(), Error> {
    let security_context = security_context();

    if registry.contains(HTTP_STRATEGY) {
        return Ok(());
    }

    let transport = HttpBrickTransport::from_url(endpoint, security_context)?;
    match registry.register(HTTP_STRATEGY, Arc::new(transport)) {
        Ok(()) => debug!("registered http strategy"),
        // someone else registered it in the meantime
        Err(crate::Error::Registry(RegistryError::AlreadyRegistered(_))) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Loads a csb through the [HTTP_STRATEGY] transport, registering one for
/// the seed's endpoint first if needed.
pub async fn load_csb(registry: Arc<TransportRegistry>, seed: &Seed) -> Result<Archive, Error> {
    ensure_environment_is_ready(&registry, seed.endpoint())?;
    let edfs = Edfs::attach(registry, HTTP_STRATEGY)?;
    Ok(edfs.load_csb(seed).await?)
}

/// Creates an empty csb on the [HTTP_STRATEGY] transport.
pub fn create_csb(registry: Arc<TransportRegistry>) -> Result<Archive, Error> {
    let edfs = Edfs::attach(registry, HTTP_STRATEGY)?;
    Ok(edfs.create_csb()?)
}

#[cfg(test)]
mod tests;
