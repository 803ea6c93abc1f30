//! Relative paths inside the virtualized root
//!
//! Validation happens once, at construction, so the cache operations that
//! take a [`RelativePath`] never fail on its contents.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, VfsError};

/// A normalized, `/`-separated path relative to the mount root.
///
/// Empty and `.` components are dropped; `..`, absolute paths and NUL bytes
/// are rejected. The empty path is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn new(raw: &str) -> Result<Self> {
        if raw.starts_with('/') {
            return Err(VfsError::InvalidPath(format!("{} is absolute", raw)));
        }
        if raw.contains('\0') {
            return Err(VfsError::InvalidPath(format!("{:?} contains a NUL byte", raw)));
        }

        let mut normalized = String::with_capacity(raw.len());
        for component in raw.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(VfsError::InvalidPath(format!("{} escapes the root", raw)));
                }
                name => {
                    if !normalized.is_empty() {
                        normalized.push('/');
                    }
                    normalized.push_str(name);
                }
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.components().last()
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<RelativePath> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rfind('/') {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        })
    }

    /// Every proper ancestor, nearest first, ending with the root.
    pub fn ancestors(&self) -> impl Iterator<Item = RelativePath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    pub fn join(&self, name: &str) -> Result<RelativePath> {
        if self.is_root() {
            return Self::new(name);
        }
        Self::new(&format!("{}/{}", self.0, name))
    }

    /// Location of this path under a real directory.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.components().fold(root.to_path_buf(), |acc, c| acc.join(c))
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for RelativePath {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = VfsError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
