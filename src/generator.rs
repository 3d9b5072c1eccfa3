use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;

use crate::dataset::Dataset;
use crate::domain::{Category, RemoteEntry};
use crate::error::ArchiverError;
use crate::source::SourceClient;

const SPECTRA_DIR: &str = "spectra";
const SEARCH_DIR: &str = "search";
/// DTASelect writes its run parameters within the first few header lines.
const DTASELECT_HEADER_LINES: usize = 30;

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub project_name: String,
    pub project_base_path: String,
    pub experiment_ids: Vec<u32>,
    pub include_dtaselect: bool,
}

/// Parses `"12, 15 19"` style id lists.
pub fn parse_experiment_ids(text: &str) -> Result<Vec<u32>, ArchiverError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            piece.parse().map_err(|_| ArchiverError::InvalidProperty {
                property: "experiment_ids".to_string(),
                message: format!("`{piece}` is not a numeric experiment id"),
            })
        })
        .collect()
}

/// Numeric suffix after the last `_`, e.g. `HEK_lysate_17605` -> 17605.
pub fn trailing_id(name: &str) -> Option<u32> {
    let (_, id) = name.rsplit_once('_')?;
    id.parse().ok()
}

/// Command-line parameter line from a DTASelect-filter header, i.e. the
/// first header line starting with `-`. Reading stops at the `Locus` table.
pub fn read_dtaselect_parameters(reader: impl Read) -> std::io::Result<Option<String>> {
    for line in BufReader::new(reader).lines().take(DTASELECT_HEADER_LINES) {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.starts_with("Locus") {
            break;
        }
        if trimmed.starts_with('-') {
            return Ok(Some(trimmed.to_string()));
        }
    }
    Ok(None)
}

fn join(parent: &str, child: &str) -> String {
    format!("{}/{child}", parent.trim_end_matches('/'))
}

fn sorted_entries(
    source: &dyn SourceClient,
    path: &str,
) -> Result<Vec<RemoteEntry>, ArchiverError> {
    let mut entries = source.list_directory(path)?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Builds a manifest for a project by listing experiment folders at the
/// source.
pub struct ManifestGenerator<'a> {
    source: &'a dyn SourceClient,
}

impl<'a> ManifestGenerator<'a> {
    pub fn new(source: &'a dyn SourceClient) -> Self {
        Self { source }
    }

    pub fn experiment_paths(
        &self,
        project_base_path: &str,
        experiment_ids: &BTreeSet<u32>,
    ) -> Result<Vec<String>, ArchiverError> {
        Ok(sorted_entries(self.source, project_base_path)?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .filter(|entry| trailing_id(&entry.name).is_some_and(|id| experiment_ids.contains(&id)))
            .map(|entry| join(project_base_path, &entry.name))
            .collect())
    }

    pub fn raw_file_paths(&self, experiment_path: &str) -> Result<Vec<String>, ArchiverError> {
        let spectra = join(experiment_path, SPECTRA_DIR);
        if !self.source.exists(&spectra)? {
            tracing::warn!(path = %spectra, "experiment has no spectra folder");
            return Ok(Vec::new());
        }
        Ok(sorted_entries(self.source, &spectra)?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter(|entry| {
                Utf8Path::new(&entry.name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("raw"))
            })
            .map(|entry| join(&spectra, &entry.name))
            .collect())
    }

    /// `(search id, path)` for every `search/<name>_<id>/DTASelect-filter.txt`.
    pub fn dtaselect_paths(
        &self,
        experiment_path: &str,
    ) -> Result<Vec<(u32, String)>, ArchiverError> {
        let search = join(experiment_path, SEARCH_DIR);
        if !self.source.exists(&search)? {
            return Ok(Vec::new());
        }
        let filename = Category::Dtaselect.default_filename().unwrap_or_default();
        let mut found = Vec::new();
        for entry in sorted_entries(self.source, &search)? {
            let Some(id) = entry.is_dir.then(|| trailing_id(&entry.name)).flatten() else {
                continue;
            };
            let candidate = join(&join(&search, &entry.name), filename);
            if self.source.is_file(&candidate)? {
                found.push((id, candidate));
            }
        }
        Ok(found)
    }

    pub fn dtaselect_parameters(&self, path: &str) -> Result<Option<String>, ArchiverError> {
        let reader = self.source.open_read(path)?;
        let parameters = read_dtaselect_parameters(reader)
            .map_err(|err| ArchiverError::Source(format!("{path}: {err}")))?;
        if parameters.is_none() {
            tracing::warn!(path, "no parameter line in DTASelect header");
        }
        Ok(parameters)
    }

    pub fn generate(&self, options: &GeneratorOptions) -> Result<Dataset, ArchiverError> {
        let requested: BTreeSet<u32> = options.experiment_ids.iter().copied().collect();
        let mut dataset = Dataset::new(&options.project_name);
        let experiments = self.experiment_paths(&options.project_base_path, &requested)?;
        tracing::info!(
            requested = requested.len(),
            found = experiments.len(),
            "experiment folders listed"
        );

        for experiment in &experiments {
            for path in self.raw_file_paths(experiment)? {
                dataset.register_path(Category::Raw, &path, None, None);
            }
            if options.include_dtaselect {
                for (id, path) in self.dtaselect_paths(experiment)? {
                    let output_name = format!("DTASelect-filter_{id}.txt");
                    let parameters = self.dtaselect_parameters(&path)?;
                    dataset.register_path(Category::Dtaselect, &path, Some(output_name), parameters);
                }
            }
        }
        Ok(dataset)
    }
}
