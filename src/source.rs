use std::fs::{self, File};
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::RemoteEntry;
use crate::error::ArchiverError;

/// Read side of a transfer: the endpoint the manifest paths point into.
pub trait SourceClient: Send + Sync {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ArchiverError>;
    fn exists(&self, path: &str) -> Result<bool, ArchiverError>;
    fn is_file(&self, path: &str) -> Result<bool, ArchiverError>;
    fn stat_size(&self, path: &str) -> Result<u64, ArchiverError>;
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, ArchiverError>;
}

impl<T: SourceClient + ?Sized> SourceClient for Box<T> {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ArchiverError> {
        (**self).list_directory(path)
    }

    fn exists(&self, path: &str) -> Result<bool, ArchiverError> {
        (**self).exists(path)
    }

    fn is_file(&self, path: &str) -> Result<bool, ArchiverError> {
        (**self).is_file(path)
    }

    fn stat_size(&self, path: &str) -> Result<u64, ArchiverError> {
        (**self).stat_size(path)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, ArchiverError> {
        (**self).open_read(path)
    }
}

/// Source backed by a locally mounted filesystem.
///
/// Manifest paths are absolute; `root` lets tests and chroot-like mounts
/// re-anchor them somewhere else.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: Option<Utf8PathBuf>,
}

impl LocalSource {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: Utf8PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn resolve(&self, path: &str) -> Utf8PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => Utf8PathBuf::from(path),
        }
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

fn source_err(path: &Utf8Path, err: std::io::Error) -> ArchiverError {
    ArchiverError::Source(format!("{path}: {err}"))
}

impl SourceClient for LocalSource {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ArchiverError> {
        let dir = self.resolve(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir.as_std_path()).map_err(|err| source_err(&dir, err))? {
            let entry = entry.map_err(|err| source_err(&dir, err))?;
            let metadata = entry.metadata().map_err(|err| source_err(&dir, err))?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &str) -> Result<bool, ArchiverError> {
        Ok(self.resolve(path).as_std_path().exists())
    }

    fn is_file(&self, path: &str) -> Result<bool, ArchiverError> {
        Ok(self.resolve(path).as_std_path().is_file())
    }

    fn stat_size(&self, path: &str) -> Result<u64, ArchiverError> {
        let resolved = self.resolve(path);
        fs::metadata(resolved.as_std_path())
            .map(|metadata| metadata.len())
            .map_err(|err| source_err(&resolved, err))
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, ArchiverError> {
        let resolved = self.resolve(path);
        let file = File::open(resolved.as_std_path()).map_err(|err| source_err(&resolved, err))?;
        Ok(Box::new(file))
    }
}
