use std::fs::{self, File};
use std::io::{Read, Write};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::error::ArchiverError;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// Id of the top-level folder of an [`ObjectStore`].
pub const ROOT_FOLDER_ID: &str = "root";

/// Destination that addresses every file by a unique hierarchical path.
pub trait PathDestination: Send + Sync {
    fn make_directories(&self, path: &str) -> Result<(), ArchiverError>;
    /// `None` when nothing exists at `path`.
    fn stat_size(&self, path: &str) -> Result<Option<u64>, ArchiverError>;
    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, ArchiverError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub parent_id: Option<String>,
    pub modified_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub id: String,
    pub size: u64,
}

/// Destination that addresses objects by name inside a folder. Several
/// objects may share a name in the same folder.
pub trait ObjectStore: Send + Sync {
    /// Files (not folders) named `name`, optionally restricted to a parent.
    fn find_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<StoredObject>, ArchiverError>;
    /// Folders named `name`, optionally restricted to a parent.
    fn find_folders_by_name(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<StoredObject>, ArchiverError>;
    fn create_folder(&self, parent_id: Option<&str>, name: &str) -> Result<String, ArchiverError>;
    fn upload(
        &self,
        parent_id: &str,
        content_type: &str,
        name: &str,
        size: u64,
        content: Box<dyn Read + Send>,
    ) -> Result<UploadedObject, ArchiverError>;
    fn delete_by_id(&self, id: &str) -> Result<(), ArchiverError>;
}

/// Path destination rooted in a local directory, e.g. a mounted archive share.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: Utf8PathBuf,
}

impl LocalDirectory {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> Utf8PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl PathDestination for LocalDirectory {
    fn make_directories(&self, path: &str) -> Result<(), ArchiverError> {
        let dir = self.resolve(path);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| ArchiverError::Destination(format!("{dir}: {err}")))
    }

    fn stat_size(&self, path: &str) -> Result<Option<u64>, ArchiverError> {
        let target = self.resolve(path);
        match fs::metadata(target.as_std_path()) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArchiverError::Destination(format!("{target}: {err}"))),
        }
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, ArchiverError> {
        let target = self.resolve(path);
        let file = File::create(target.as_std_path())
            .map_err(|err| ArchiverError::Destination(format!("{target}: {err}")))?;
        Ok(Box::new(file))
    }
}
