use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;

static DATE_STAMP_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d{4}_\d{2}_.*$").expect("valid date stamp pattern"));

/// Ordered keyword substitutions applied to output filenames.
///
/// Only the first key found in a name is replaced, in configuration order.
/// Overlapping keys are therefore order dependent: with `[("AB", "x"),
/// ("ABC", "y")]` the name `ABC.raw` becomes `xC.raw`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordTranslator {
    translations: Vec<(String, String)>,
}

impl KeywordTranslator {
    pub fn new(translations: Vec<(String, String)>) -> Self {
        Self { translations }
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    pub fn keyword_in(&self, filename: &str) -> Option<(&str, &str)> {
        self.translations
            .iter()
            .find(|(from, _)| !from.is_empty() && filename.contains(from.as_str()))
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    pub fn translate(&self, filename: &str) -> String {
        match self.keyword_in(filename) {
            Some((from, to)) => {
                let translated = filename.replace(from, to);
                tracing::debug!(from = filename, to = %translated, "keyword translation");
                translated
            }
            None => filename.to_string(),
        }
    }
}

/// Derives a meaningful output filename from a source path when the
/// manifest only carries a generic one.
pub trait NamingStrategy: Send + Sync {
    fn derive_name(&self, path: &str) -> Option<String>;
}

/// Looks for the first ancestor named like one of the marker folders and
/// uses the directory right below it, minus any `_YYYY_MM_...` suffix.
#[derive(Debug, Clone)]
pub struct SpecialFolderNaming {
    markers: Vec<String>,
}

impl SpecialFolderNaming {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl Default for SpecialFolderNaming {
    fn default() -> Self {
        Self::new(vec!["projects".to_string()])
    }
}

impl NamingStrategy for SpecialFolderNaming {
    fn derive_name(&self, path: &str) -> Option<String> {
        let path = Utf8Path::new(path);
        let mut inner: Option<&str> = None;
        let mut current = path.parent();
        while let Some(dir) = current {
            let Some(dir_name) = dir.file_name() else {
                break;
            };
            if self.markers.iter().any(|marker| marker == dir_name) {
                let stem = DATE_STAMP_SUFFIX.replace(inner?, "");
                if stem.is_empty() {
                    return None;
                }
                return Some(match path.extension() {
                    Some(ext) => format!("{stem}.{ext}"),
                    None => stem.into_owned(),
                });
            }
            inner = Some(dir_name);
            current = dir.parent();
        }
        None
    }
}

/// Strategy that never renames, for callers that want generic names kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepGenericNames;

impl NamingStrategy for KeepGenericNames {
    fn derive_name(&self, _path: &str) -> Option<String> {
        None
    }
}
