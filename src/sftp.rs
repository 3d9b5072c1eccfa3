use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::destination::PathDestination;
use crate::domain::RemoteEntry;
use crate::error::ArchiverError;
use crate::source::SourceClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SftpEndpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

impl SftpEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens a fresh SSH session per call. Sessions are never pooled: every
/// operation tears its connection down when the returned handle drops.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    endpoint: SftpEndpoint,
}

impl SftpConnector {
    pub fn new(endpoint: SftpEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &SftpEndpoint {
        &self.endpoint
    }

    fn tcp(&self) -> Result<TcpStream, ArchiverError> {
        let addr = self.endpoint.address();
        let sock = addr
            .to_socket_addrs()
            .map_err(|_| ArchiverError::SshConnect(addr.clone()))?
            .next()
            .ok_or_else(|| ArchiverError::SshConnect(addr.clone()))?;
        let tcp = TcpStream::connect_timeout(&sock, Duration::from_secs(10))
            .map_err(|_| ArchiverError::SshConnect(addr.clone()))?;
        let _ = tcp.set_read_timeout(Some(Duration::from_secs(60)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(60)));
        Ok(tcp)
    }

    fn authenticate(&self, sess: &ssh2::Session) -> bool {
        let username = &self.endpoint.username;
        if let Some(password) = &self.endpoint.password {
            let _ = sess.userauth_password(username, password);
            if sess.authenticated() {
                return true;
            }
        }
        if let Some(key) = &self.endpoint.key_path {
            let _ = sess.userauth_pubkey_file(username, None, key, None);
            if sess.authenticated() {
                return true;
            }
        }
        if let Some(dirs) = BaseDirs::new() {
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let key = dirs.home_dir().join(".ssh").join(name);
                if key.exists() {
                    let _ = sess.userauth_pubkey_file(username, None, &key, None);
                    if sess.authenticated() {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn open(&self) -> Result<ssh2::Sftp, ArchiverError> {
        let addr = self.endpoint.address();
        let tcp = self.tcp()?;
        let mut sess =
            ssh2::Session::new().map_err(|_| ArchiverError::SshConnect(addr.clone()))?;
        sess.set_tcp_stream(tcp);
        sess.handshake()
            .map_err(|_| ArchiverError::SshConnect(addr.clone()))?;
        if !self.authenticate(&sess) {
            return Err(ArchiverError::SshAuth(addr));
        }
        tracing::debug!(address = %addr, "sftp session opened");
        sess.sftp()
            .map_err(|err| ArchiverError::SshConnect(format!("{addr}: {err}")))
    }
}

/// Source endpoint reached over SFTP.
#[derive(Debug, Clone)]
pub struct SftpSource {
    connector: SftpConnector,
}

impl SftpSource {
    pub fn new(endpoint: SftpEndpoint) -> Self {
        Self {
            connector: SftpConnector::new(endpoint),
        }
    }
}

fn source_err(path: &str, err: ssh2::Error) -> ArchiverError {
    ArchiverError::Source(format!("{path}: {err}"))
}

impl SourceClient for SftpSource {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ArchiverError> {
        let sftp = self.connector.open()?;
        let entries = sftp
            .readdir(Path::new(path))
            .map_err(|err| source_err(path, err))?;
        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                Some(RemoteEntry {
                    name,
                    is_dir: stat.is_dir(),
                    size: stat.size.unwrap_or_default(),
                })
            })
            .collect())
    }

    fn exists(&self, path: &str) -> Result<bool, ArchiverError> {
        let sftp = self.connector.open()?;
        Ok(sftp.stat(Path::new(path)).is_ok())
    }

    fn is_file(&self, path: &str) -> Result<bool, ArchiverError> {
        let sftp = self.connector.open()?;
        Ok(sftp
            .stat(Path::new(path))
            .map(|stat| stat.is_file())
            .unwrap_or(false))
    }

    fn stat_size(&self, path: &str) -> Result<u64, ArchiverError> {
        let sftp = self.connector.open()?;
        let stat = sftp
            .stat(Path::new(path))
            .map_err(|err| source_err(path, err))?;
        Ok(stat.size.unwrap_or_default())
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, ArchiverError> {
        let sftp = self.connector.open()?;
        let file = sftp
            .open(Path::new(path))
            .map_err(|err| source_err(path, err))?;
        Ok(Box::new(file))
    }
}

/// Remote archive server reached over SFTP.
#[derive(Debug, Clone)]
pub struct SftpDestination {
    connector: SftpConnector,
}

impl SftpDestination {
    pub fn new(endpoint: SftpEndpoint) -> Self {
        Self {
            connector: SftpConnector::new(endpoint),
        }
    }
}

fn destination_err(path: &str, err: ssh2::Error) -> ArchiverError {
    ArchiverError::Destination(format!("{path}: {err}"))
}

impl PathDestination for SftpDestination {
    fn make_directories(&self, path: &str) -> Result<(), ArchiverError> {
        let sftp = self.connector.open()?;
        let mut current = if path.starts_with('/') {
            PathBuf::from("/")
        } else {
            PathBuf::new()
        };
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current.push(segment);
            match sftp.stat(&current) {
                Ok(stat) if stat.is_file() => {
                    return Err(ArchiverError::Destination(format!(
                        "{} exists as a file",
                        current.display()
                    )));
                }
                Ok(_) => {}
                Err(_) => {
                    sftp.mkdir(&current, 0o755)
                        .map_err(|err| destination_err(path, err))?;
                }
            }
        }
        Ok(())
    }

    fn stat_size(&self, path: &str) -> Result<Option<u64>, ArchiverError> {
        let sftp = self.connector.open()?;
        match sftp.stat(Path::new(path)) {
            Ok(stat) if stat.is_file() => Ok(stat.size),
            _ => Ok(None),
        }
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write + Send>, ArchiverError> {
        let sftp = self.connector.open()?;
        let file = sftp
            .create(Path::new(path))
            .map_err(|err| destination_err(path, err))?;
        Ok(Box::new(file))
    }
}
