use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{file_name, Error};

const TMP_DIR_PREFIX: &str = "PSK_DOMAIN-";
const PROJECT_MAP_FILE: &str = "projectMap.json";

/// A module of a [ProjectMap].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectModule {
    /// Comma-joined file names of the sources making up this module.
    pub deps: String,
    #[serde(rename = "autoLoad")]
    pub auto_load: bool,
}

/// Describes which modules a bundler should produce, keyed by module name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectMap(pub BTreeMap<String, ProjectModule>);

impl ProjectMap {
    /// A map with a single, auto-loaded module built from the given sources.
    pub fn single(name: &str, sources: &[PathBuf]) -> Result<Self, Error> {
        let deps = sources
            .iter()
            .map(|s| file_name(s))
            .collect::<Result<Vec<_>, _>>()?
            .join(",");

        Ok(Self(BTreeMap::from([(
            name.to_owned(),
            ProjectModule {
                deps,
                auto_load: true,
            },
        )])))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BuildOptions {
    pub constitution_name: String,
    /// Where the bundle is written to. Without one, the temporary build
    /// folder is used as output and kept.
    pub output_folder: Option<PathBuf>,
    /// Remove the temporary build folder after a successful build.
    pub cleanup_tmp_dir: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            constitution_name: "constitution".into(),
            output_folder: None,
            cleanup_tmp_dir: true,
        }
    }
}

impl BuildOptions {
    pub fn with_output_folder(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: Some(output_folder.into()),
            ..Default::default()
        }
    }
}

/// Turns a project map and the folders containing its sources into one
/// `<module name>.js` bundle per module in the output folder.
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(
        &self,
        project_map: &Path,
        source_dirs: &[PathBuf],
        output: &Path,
    ) -> Result<(), Error>;
}

/// Runs an external build program as
/// `<program> [args..] --projectMap=<path> --source=<dirs> --output=<dir>`.
#[derive(Clone, Debug)]
pub struct CommandBundler {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBundler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    #[instrument(skip_all, fields(program=%self.program.display()), err)]
    async fn bundle(
        &self,
        project_map: &Path,
        source_dirs: &[PathBuf],
        output: &Path,
    ) -> Result<(), Error> {
        let sources = source_dirs
            .iter()
            .map(|d| d.to_string_lossy())
            .collect::<Vec<_>>()
            .join(",");

        let out = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(format!("--projectMap={}", project_map.display()))
            .arg(format!("--source={}", sources))
            .arg(format!("--output={}", output.display()))
            .kill_on_drop(true)
            .output()
            .await?;

        if !out.status.success() {
            return Err(Error::Bundler(format!(
                "{} exited with {}: {}",
                self.program.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Bundles the given source files into a single constitution, and returns
/// the path of the resulting `<constitution_name>.js`.
#[instrument(skip_all, fields(sources=sources.len()), err)]
pub async fn create_constitution_from_sources(
    sources: &[PathBuf],
    options: &BuildOptions,
    bundler: &dyn Bundler,
) -> Result<PathBuf, Error> {
    let project_map = ProjectMap::single(&options.constitution_name, sources)?;
    let source_dirs: Vec<PathBuf> = sources
        .iter()
        .map(|s| match s.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        })
        .collect();

    let tmp_dir = tempfile::Builder::new()
        .prefix(TMP_DIR_PREFIX)
        .tempdir()?;
    let project_map_path = tmp_dir.path().join(PROJECT_MAP_FILE);
    tokio::fs::write(&project_map_path, serde_json::to_vec(&project_map)?).await?;

    let output = options
        .output_folder
        .clone()
        .unwrap_or_else(|| tmp_dir.path().to_owned());

    bundler
        .bundle(&project_map_path, &source_dirs, &output)
        .await?;

    let constitution = output.join(format!("{}.js", options.constitution_name));

    if options.output_folder.is_some() && options.cleanup_tmp_dir {
        let path = tmp_dir.path().to_owned();
        if let Err(e) = tmp_dir.close() {
            warn!(tmp_dir=%path.display(), err=%e, "failed to delete temporary folder");
        }
    } else {
        let kept = tmp_dir.into_path();
        debug!(tmp_dir=%kept.display(), "keeping temporary folder");
    }

    Ok(constitution)
}
