use std::fmt;

use crate::Error;

/// A validated, `/`-separated path inside an archive, split into the
/// folder (everything before the last `/`, possibly empty) and the name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath {
    folder: String,
    name: String,
}

impl ArchivePath {
    pub fn parse(s: &str) -> Result<Self, Error> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Err(Error::InvalidRequest("empty archive path".into()));
        }

        for component in trimmed.split('/') {
            validate_component(component, s)?;
        }

        Ok(match trimmed.rsplit_once('/') {
            Some((folder, name)) => Self {
                folder: folder.to_owned(),
                name: name.to_owned(),
            },
            None => Self {
                folder: String::new(),
                name: trimmed.to_owned(),
            },
        })
    }

    pub(crate) fn from_parts(folder: String, name: String) -> Result<Self, Error> {
        let p = if folder.is_empty() {
            Self::parse(&name)?
        } else {
            Self::parse(&format!("{}/{}", folder, name))?
        };
        if p.folder != folder || p.name != name {
            return Err(Error::InvalidRequest(format!(
                "invalid folder {:?} or name {:?}",
                folder, name
            )));
        }
        Ok(p)
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The first component of the folder, empty for root-level files.
    pub fn namespace(&self) -> &str {
        self.folder.split('/').next().unwrap_or_default()
    }

    /// Whether this path lies in `folder` or any folder below it.
    /// The empty folder contains everything.
    pub fn is_in(&self, folder: &str) -> bool {
        folder.is_empty()
            || self.folder == folder
            || self
                .folder
                .strip_prefix(folder)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.folder.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.folder, self.name)
        }
    }
}

/// Normalizes a folder argument: leading and trailing slashes are dropped,
/// `""` and `"/"` both mean the root.
pub(crate) fn normalize_folder(folder: &str) -> Result<String, Error> {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for component in trimmed.split('/') {
        validate_component(component, folder)?;
    }
    Ok(trimmed.to_owned())
}

fn validate_component(component: &str, full: &str) -> Result<(), Error> {
    if component.is_empty() || component == "." || component == ".." || component.contains('\0') {
        return Err(Error::InvalidRequest(format!(
            "invalid component {:?} in archive path {:?}",
            component, full
        )));
    }
    Ok(())
}
