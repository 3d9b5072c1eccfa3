use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::backend::FolderLayout;
use crate::error::ArchiverError;
use crate::generator::parse_experiment_ids;
use crate::sftp::SftpEndpoint;

pub const CONFIG_FILE_NAME: &str = "archiver.json";
pub const DRIVE_TOKEN_ENV: &str = "PARCH_DRIVE_TOKEN";
pub const DEFAULT_DRIVE_ROOT: &str = "Proteomics/data";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub submission_name: Option<String>,
    #[serde(default)]
    pub source: Option<EndpointConfig>,
    #[serde(default)]
    pub destination: Option<EndpointConfig>,
    #[serde(default)]
    pub size_tolerance: Option<u64>,
    #[serde(default)]
    pub override_existing: Option<bool>,
    #[serde(default)]
    pub keyword_translations: Vec<KeywordTranslationEntry>,
    #[serde(default)]
    pub special_folders: Option<Vec<String>>,
    #[serde(default)]
    pub experiment_ids: Option<ExperimentIds>,
    #[serde(default)]
    pub root_folder: Option<String>,
    #[serde(default)]
    pub preserve_tree: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Local,
    Sftp,
    Drive,
}

/// One side of a transfer. Which fields are required depends on `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub kind: EndpointKind,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    /// Local directory the endpoint is anchored in.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub project_base_path: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl EndpointConfig {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            host: None,
            port: None,
            username: None,
            password: None,
            key_path: None,
            path: None,
            project_base_path: None,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeywordTranslationEntry {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExperimentIds {
    List(Vec<u32>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Local { root: Option<Utf8PathBuf> },
    Sftp(SftpEndpoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDestination {
    Local { path: Utf8PathBuf },
    Sftp(SftpEndpoint),
    Drive { access_token: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub project_name: String,
    pub submission_name: Option<String>,
    pub source: ResolvedSource,
    pub project_base_path: Option<String>,
    pub destination: Option<ResolvedDestination>,
    pub layout: FolderLayout,
    pub size_tolerance: u64,
    pub override_existing: bool,
    pub keyword_translations: Vec<(String, String)>,
    pub special_folders: Vec<String>,
    pub experiment_ids: Vec<u32>,
}

impl ResolvedConfig {
    pub fn require_destination(&self) -> Result<&ResolvedDestination, ArchiverError> {
        self.destination
            .as_ref()
            .ok_or_else(|| ArchiverError::MissingProperty("destination".to_string()))
    }

    pub fn require_project_base_path(&self) -> Result<&str, ArchiverError> {
        self.project_base_path
            .as_deref()
            .ok_or_else(|| ArchiverError::MissingProperty("source.project_base_path".to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ArchiverError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(ArchiverError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ArchiverError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ArchiverError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "config loaded");

        Self::resolve_config(config)
    }

    /// `./archiver.json`, then `<user config dir>/parch/archiver.json`.
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        let dirs = BaseDirs::new()?;
        let user = dirs.config_dir().join("parch").join(CONFIG_FILE_NAME);
        user.exists().then_some(user)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ArchiverError> {
        let project_name = config
            .project_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ArchiverError::MissingProperty("project_name".to_string()))?;

        let source_config = config
            .source
            .ok_or_else(|| ArchiverError::MissingProperty("source".to_string()))?;
        let project_base_path = source_config.project_base_path.clone();
        let source = resolve_source(source_config)?;

        let destination = config.destination.map(resolve_destination).transpose()?;

        let is_drive = matches!(destination, Some(ResolvedDestination::Drive { .. }));
        let root = match config.root_folder {
            Some(root) => root,
            None if is_drive => DEFAULT_DRIVE_ROOT.to_string(),
            None => String::new(),
        };
        let layout = FolderLayout {
            root,
            preserve_tree: config.preserve_tree.unwrap_or(is_drive),
        };

        let keyword_translations = config
            .keyword_translations
            .into_iter()
            .map(|entry| {
                if entry.from.is_empty() {
                    return Err(ArchiverError::InvalidProperty {
                        property: "keyword_translations".to_string(),
                        message: "`from` must not be empty".to_string(),
                    });
                }
                Ok((entry.from, entry.to))
            })
            .collect::<Result<Vec<_>, ArchiverError>>()?;

        let experiment_ids = match config.experiment_ids {
            None => Vec::new(),
            Some(ExperimentIds::List(ids)) => ids,
            Some(ExperimentIds::Text(text)) => parse_experiment_ids(&text)?,
        };

        Ok(ResolvedConfig {
            project_name,
            submission_name: config
                .submission_name
                .filter(|name| !name.trim().is_empty()),
            source,
            project_base_path,
            destination,
            layout,
            size_tolerance: config.size_tolerance.unwrap_or(0),
            override_existing: config.override_existing.unwrap_or(false),
            keyword_translations,
            special_folders: config
                .special_folders
                .unwrap_or_else(default_special_folders),
            experiment_ids,
        })
    }
}

pub fn default_special_folders() -> Vec<String> {
    vec!["projects".to_string()]
}

fn required(value: Option<String>, property: &str) -> Result<String, ArchiverError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ArchiverError::MissingProperty(property.to_string()))
}

fn sftp_endpoint(config: EndpointConfig, side: &str) -> Result<SftpEndpoint, ArchiverError> {
    Ok(SftpEndpoint {
        host: required(config.host, &format!("{side}.host"))?,
        port: config.port.unwrap_or(22),
        username: required(config.username, &format!("{side}.username"))?,
        password: config.password,
        key_path: config.key_path.map(PathBuf::from),
    })
}

fn resolve_source(config: EndpointConfig) -> Result<ResolvedSource, ArchiverError> {
    match config.kind {
        EndpointKind::Local => Ok(ResolvedSource::Local {
            root: config.path.map(Utf8PathBuf::from),
        }),
        EndpointKind::Sftp => Ok(ResolvedSource::Sftp(sftp_endpoint(config, "source")?)),
        EndpointKind::Drive => Err(ArchiverError::InvalidProperty {
            property: "source.kind".to_string(),
            message: "drive can only be used as a destination".to_string(),
        }),
    }
}

fn resolve_destination(config: EndpointConfig) -> Result<ResolvedDestination, ArchiverError> {
    match config.kind {
        EndpointKind::Local => Ok(ResolvedDestination::Local {
            path: Utf8PathBuf::from(required(config.path, "destination.path")?),
        }),
        EndpointKind::Sftp => Ok(ResolvedDestination::Sftp(sftp_endpoint(
            config,
            "destination",
        )?)),
        EndpointKind::Drive => {
            let access_token = config
                .access_token
                .or_else(|| std::env::var(DRIVE_TOKEN_ENV).ok())
                .filter(|token| !token.trim().is_empty())
                .ok_or_else(|| {
                    ArchiverError::MissingProperty(format!(
                        "destination.access_token (or {DRIVE_TOKEN_ENV})"
                    ))
                })?;
            Ok(ResolvedDestination::Drive { access_token })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        let mut source = EndpointConfig::new(EndpointKind::Local);
        source.project_base_path = Some("/data/lab".to_string());
        Config {
            project_name: Some("PXD000001".to_string()),
            source: Some(source),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_without_destination() {
        let resolved = ConfigLoader::resolve_config(minimal()).unwrap();
        assert_eq!(resolved.size_tolerance, 0);
        assert!(!resolved.override_existing);
        assert_eq!(resolved.special_folders, default_special_folders());
        assert!(resolved.destination.is_none());
        assert!(!resolved.layout.preserve_tree);
        assert_eq!(resolved.layout.root, "");
    }

    #[test]
    fn drive_defaults_root_and_tree() {
        let mut config = minimal();
        let mut destination = EndpointConfig::new(EndpointKind::Drive);
        destination.access_token = Some("token".to_string());
        config.destination = Some(destination);

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.layout.root, DEFAULT_DRIVE_ROOT);
        assert!(resolved.layout.preserve_tree);
    }
}
