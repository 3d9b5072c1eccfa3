use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiverError {
    #[error("manifest line {line}: {message}")]
    #[diagnostic(help("path lines need a preceding DATASET directive and category header"))]
    ManifestFormat { line: usize, message: String },

    #[error("failed to read manifest at {0}")]
    ManifestRead(PathBuf),

    #[error("missing config file archiver.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing required property: {0}")]
    MissingProperty(String),

    #[error("invalid value for property {property}: {message}")]
    InvalidProperty { property: String, message: String },

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("source path not found: {0}")]
    Resolution(String),

    #[error("source endpoint error: {0}")]
    Source(String),

    #[error("destination endpoint error: {0}")]
    Destination(String),

    #[error("transfer of {path} failed: {message}")]
    TransferIo { path: String, message: String },

    #[error("SSH connection to {0} failed")]
    SshConnect(String),

    #[error("SSH authentication failed for {0}")]
    SshAuth(String),

    #[error("drive request failed: {0}")]
    DriveHttp(String),

    #[error("drive returned status {status}: {message}")]
    DriveStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl ArchiverError {
    /// Errors that abort the whole run instead of a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiverError::ManifestFormat { .. }
                | ArchiverError::ManifestRead(_)
                | ArchiverError::MissingConfig
                | ArchiverError::ConfigRead(_)
                | ArchiverError::ConfigParse(_)
                | ArchiverError::MissingProperty(_)
                | ArchiverError::InvalidProperty { .. }
        )
    }
}
