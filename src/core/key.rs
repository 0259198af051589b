//! Purpose: Identify a destination by its (directory, name) pair and map it to a path.
//! Exports: `ResourceKey`.
//! Role: Single source for key validation and `<root>/<directory>/<name>.txt` layout.
//! Invariants: Equal pairs give equal keys; distinct pairs never collide.
//! Invariants: Components must not contain path separators or NUL, and must not be `.`/`..`.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

pub const FILE_EXTENSION: &str = "txt";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceKey {
    directory: String,
    name: String,
}

impl ResourceKey {
    pub fn new(directory: impl Into<String>, name: impl Into<String>) -> Result<Self, Error> {
        let directory = directory.into();
        let name = name.into();
        validate_component("directory", &directory)?;
        validate_component("name", &name)?;
        Ok(Self { directory, name })
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir_path(&self, root: &Path) -> PathBuf {
        root.join(&self.directory)
    }

    pub fn file_path(&self, root: &Path) -> PathBuf {
        self.dir_path(root)
            .join(format!("{}.{FILE_EXTENSION}", self.name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.directory, self.name)
    }
}

fn validate_component(label: &str, value: &str) -> Result<(), Error> {
    let problem = if value.is_empty() {
        Some("must not be empty")
    } else if value == "." || value == ".." {
        Some("must not be `.` or `..`")
    } else if value.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if value.contains('\0') {
        Some("must not contain NUL")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{label} {problem}: {value:?}"))),
        None => Ok(()),
    }
}
