use std::fmt;

use serde::{Deserialize, Serialize};

/// File categories recognised in manifests.
///
/// Declaration order is the transfer priority: datasets are always walked
/// category by category in this order, independent of how the manifest
/// listed them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Dtaselect,
    Raw,
    CensusChro,
    Other,
    Ms1,
    Ms2,
    Ms3,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Dtaselect,
        Category::Raw,
        Category::CensusChro,
        Category::Other,
        Category::Ms1,
        Category::Ms2,
        Category::Ms3,
    ];

    /// Folder name used at the destination.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Dtaselect => "DTASELECT",
            Category::Raw => "RAW",
            Category::CensusChro => "CENSUS_CHRO",
            Category::Other => "OTHER",
            Category::Ms1 => "MS1",
            Category::Ms2 => "MS2",
            Category::Ms3 => "MS3",
        }
    }

    /// Section header used in manifests.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Dtaselect => "DTASelect-files",
            Category::Raw => "raw-files",
            Category::CensusChro => "census_chro-files",
            Category::Other => "other-files",
            Category::Ms1 => "ms1-files",
            Category::Ms2 => "ms2-files",
            Category::Ms3 => "ms3-files",
        }
    }

    /// `None` means the manifest has to carry an explicit name.
    pub fn default_filename(&self) -> Option<&'static str> {
        match self {
            Category::Dtaselect => Some("DTASelect-filter.txt"),
            Category::CensusChro => Some("census_chro.xml"),
            _ => None,
        }
    }

    /// `None` means any extension matches.
    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            Category::Dtaselect => Some("txt"),
            Category::Raw => Some("raw"),
            Category::CensusChro => Some("xml"),
            Category::Other => None,
            Category::Ms1 => Some("ms1"),
            Category::Ms2 => Some("ms2"),
            Category::Ms3 => Some("ms3"),
        }
    }

    pub fn lookup_by_label(label: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(label))
    }

    /// Default filenames are shared by every dataset, so they say nothing
    /// about where a file came from.
    pub fn is_generic_filename(filename: &str) -> bool {
        Category::ALL
            .iter()
            .filter_map(|category| category.default_filename())
            .any(|default| default == filename)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single directory entry as reported by a source endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// A concrete source file resolved from a manifest path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: String,
    pub size: u64,
    pub destination_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Skip,
    Transfer,
    ReplaceDuplicates,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip => write!(f, "skip"),
            Decision::Transfer => write!(f, "transfer"),
            Decision::ReplaceDuplicates => write!(f, "replace-duplicates"),
        }
    }
}

/// Outcome of reconciling one resolved file against the destination.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub source_path: String,
    pub destination_folder: String,
    pub destination_name: String,
    pub size_at_source: u64,
    pub size_at_destination: Option<u64>,
    pub decision: Decision,
    pub bytes_moved: u64,
    pub bytes_credited: u64,
    pub integrity_warning: bool,
}
