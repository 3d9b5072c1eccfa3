use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ArchiverError;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable size, e.g. `1.5 GB`.
pub fn descriptive_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Writes `content` next to `path` in a temp file and renames it into place.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ArchiverError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| ArchiverError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("parch-manifest")
        .tempfile_in(parent)
        .map_err(|err| ArchiverError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| ArchiverError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| ArchiverError::Filesystem(err.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(descriptive_size(0), "0 B");
        assert_eq!(descriptive_size(1023), "1023 B");
        assert_eq!(descriptive_size(1536), "1.5 KB");
        assert_eq!(descriptive_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("paths.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
