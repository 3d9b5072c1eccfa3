use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::dataset::Dataset;
use crate::domain::Category;
use crate::error::ArchiverError;
use crate::naming::{KeywordTranslator, NamingStrategy, SpecialFolderNaming};

pub const DATASET_DIRECTIVE: &str = "DATASET";
pub const FILTERED_PREFIX: &str = "Filtered_";

static DATASET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DATASET\s+(\S.*)$").expect("valid directive pattern"));
static DRIVE_LETTER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]:[\\/]").expect("valid drive letter pattern"));

/// Datasets keyed by name, iterated in name order.
pub type DatasetRegistry = BTreeMap<String, Dataset>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    DatasetDirective(String),
    CategoryHeader(Category),
    PathEntry {
        path: String,
        output_name: Option<String>,
        metadata: Option<String>,
    },
    Ignored,
}

pub fn is_path(line: &str) -> bool {
    line.starts_with('/') || DRIVE_LETTER_PATH.is_match(line)
}

/// Classifies an already trimmed manifest line.
pub fn classify_line(line: &str, line_number: usize) -> Result<ManifestLine, ArchiverError> {
    if let Some(captures) = DATASET_LINE.captures(line) {
        return Ok(ManifestLine::DatasetDirective(captures[1].trim().to_string()));
    }
    if line == DATASET_DIRECTIVE {
        return Err(ArchiverError::ManifestFormat {
            line: line_number,
            message: "DATASET directive without a name".to_string(),
        });
    }
    if let Some(category) = Category::lookup_by_label(line) {
        return Ok(ManifestLine::CategoryHeader(category));
    }
    if is_path(line) {
        let mut fields = line.splitn(3, '\t');
        let path = fields.next().unwrap_or_default().trim().to_string();
        let output_name = fields
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let metadata = fields
            .next()
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        return Ok(ManifestLine::PathEntry {
            path,
            output_name,
            metadata,
        });
    }
    Ok(ManifestLine::Ignored)
}

pub struct ManifestParser {
    translator: KeywordTranslator,
    naming: Box<dyn NamingStrategy>,
}

impl Default for ManifestParser {
    fn default() -> Self {
        Self::new(KeywordTranslator::default(), Box::new(SpecialFolderNaming::default()))
    }
}

impl ManifestParser {
    pub fn new(translator: KeywordTranslator, naming: Box<dyn NamingStrategy>) -> Self {
        Self { translator, naming }
    }

    pub fn parse_file(&self, path: &Path) -> Result<DatasetRegistry, ArchiverError> {
        let content = fs::read_to_string(path)
            .map_err(|_| ArchiverError::ManifestRead(path.to_path_buf()))?;
        self.parse_str(&content)
    }

    pub fn parse_str(&self, content: &str) -> Result<DatasetRegistry, ArchiverError> {
        self.parse_lines(content.lines())
    }

    pub fn parse_lines<'a, I>(&self, lines: I) -> Result<DatasetRegistry, ArchiverError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut datasets = DatasetRegistry::new();
        let mut current_category: Option<Category> = None;
        let mut current_dataset: Option<String> = None;

        for (index, raw) in lines.into_iter().enumerate() {
            let line_number = index + 1;
            match classify_line(raw.trim(), line_number)? {
                ManifestLine::DatasetDirective(name) => {
                    datasets
                        .entry(name.clone())
                        .or_insert_with(|| Dataset::new(name.clone()));
                    current_dataset = Some(name);
                }
                ManifestLine::CategoryHeader(category) => {
                    current_category = Some(category);
                }
                ManifestLine::PathEntry {
                    path,
                    output_name,
                    metadata,
                } => {
                    let category = current_category.ok_or_else(|| ArchiverError::ManifestFormat {
                        line: line_number,
                        message: format!("path {path} appears before any category header"),
                    })?;
                    let dataset_name =
                        current_dataset
                            .as_ref()
                            .ok_or_else(|| ArchiverError::ManifestFormat {
                                line: line_number,
                                message: format!("path {path} appears before any DATASET directive"),
                            })?;
                    let resolved = self.resolve_output_name(category, &path, output_name.clone());
                    let dataset = datasets
                        .get_mut(dataset_name)
                        .ok_or_else(|| ArchiverError::DatasetNotFound(dataset_name.clone()))?;
                    dataset.register_written(category, &path, output_name, resolved, metadata);
                }
                ManifestLine::Ignored => {}
            }
        }

        Ok(datasets)
    }

    fn resolve_output_name(
        &self,
        category: Category,
        path: &str,
        explicit: Option<String>,
    ) -> Option<String> {
        let mut name = explicit.or_else(|| category.default_filename().map(str::to_string))?;
        if Category::is_generic_filename(&name) {
            if let Some(derived) = self.naming.derive_name(path) {
                tracing::debug!(path, generic = %name, derived = %derived, "derived output name");
                name = derived;
            }
        }
        Some(self.translator.translate(&name))
    }
}

/// Renders datasets back into manifest text. Names are written as the
/// manifest gave them, so parsing the output resolves them the same way.
pub fn render_manifest<'a, I>(datasets: I) -> String
where
    I: IntoIterator<Item = &'a Dataset>,
{
    let mut out = String::new();
    for dataset in datasets {
        out.push_str(&format!("{DATASET_DIRECTIVE} {}\n", dataset.name()));
        for category in dataset.categories() {
            out.push_str(category.label());
            out.push('\n');
            for path in dataset.paths(category) {
                out.push_str(path);
                match (dataset.written_name(path), dataset.metadata(path)) {
                    (Some(name), Some(metadata)) => {
                        out.push_str(&format!("\t{name}\t{metadata}"))
                    }
                    (Some(name), None) => out.push_str(&format!("\t{name}")),
                    (None, Some(metadata)) => out.push_str(&format!("\t\t{metadata}")),
                    (None, None) => {}
                }
                out.push('\n');
            }
        }
    }
    out
}

fn strip_base<'a>(path: &'a str, base_path: &str) -> &'a str {
    match path.find(base_path) {
        Some(index) if !base_path.is_empty() => &path[index + base_path.len()..],
        _ => path,
    }
}

/// Builds the inclusion set for [`filter_manifest`], normalizing every
/// entry relative to `base_path`.
pub fn inclusion_set<'a, I>(lines: I, base_path: &str) -> HashSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| strip_base(line, base_path).to_string())
        .collect()
}

/// Drops DTASelect path lines whose base-relative path is not included.
/// Every other line is kept verbatim.
pub fn filter_manifest<'a, I>(lines: I, base_path: &str, included: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut in_dtaselect = false;
    let mut kept = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if let Some(category) = Category::lookup_by_label(trimmed) {
            in_dtaselect = category == Category::Dtaselect;
        } else if in_dtaselect && is_path(trimmed) {
            let path = trimmed.split('\t').next().unwrap_or_default();
            if !included.contains(strip_base(path, base_path)) {
                tracing::debug!(path, "excluded by inclusion list");
                continue;
            }
        }
        kept.push(line.to_string());
    }
    kept
}

/// Default output of a filtered manifest: `Filtered_<name>` beside the input.
pub fn filtered_manifest_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{FILTERED_PREFIX}{name}"))
}
