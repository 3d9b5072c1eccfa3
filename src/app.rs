use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::backend::{DestinationBackend, DestinationLocation};
use crate::dataset::Dataset;
use crate::domain::{Category, Decision, SourceFile, TransferRecord};
use crate::error::ArchiverError;
use crate::fs_util::descriptive_size;
use crate::manifest::DatasetRegistry;
use crate::naming::KeywordTranslator;
use crate::source::SourceClient;

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Replaces the dataset name as the top destination folder.
    pub submission_name: Option<String>,
    /// Prefix stripped from source paths when a backend preserves the tree.
    pub project_base_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub category: Category,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub name: String,
    pub bytes_credited: u64,
    pub bytes_moved: u64,
    pub records: Vec<TransferRecord>,
    pub failures: Vec<FailureRecord>,
}

impl DatasetReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bytes_credited: 0,
            bytes_moved: 0,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.records
            .iter()
            .filter(|record| record.decision == decision)
            .count()
    }

    pub fn integrity_warnings(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.integrity_warning)
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub bytes_credited: u64,
    pub bytes_moved: u64,
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        self.datasets.iter().map(|dataset| dataset.failures.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Walks datasets in a fixed order and reconciles every resolved file
/// against the destination, one file at a time.
pub struct App<S: SourceClient, B: DestinationBackend> {
    source: S,
    backend: B,
    translator: KeywordTranslator,
    options: TransferOptions,
}

impl<S: SourceClient, B: DestinationBackend> App<S, B> {
    pub fn new(
        source: S,
        backend: B,
        translator: KeywordTranslator,
        options: TransferOptions,
    ) -> Self {
        Self {
            source,
            backend,
            translator,
            options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn transfer_datasets(
        &mut self,
        datasets: &DatasetRegistry,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut reports = Vec::new();
        for dataset in datasets.values() {
            tracing::info!(dataset = dataset.name(), "transfer started");
            let report = self.transfer_dataset(dataset, sink);
            tracing::info!(dataset = dataset.name(), "transfer finished");
            reports.push(report);
        }
        let bytes_credited = reports.iter().map(|report| report.bytes_credited).sum();
        let bytes_moved = reports.iter().map(|report| report.bytes_moved).sum();
        sink.event(ProgressEvent {
            message: format!(
                "{} transferred in {} datasets",
                descriptive_size(bytes_credited),
                reports.len()
            ),
            elapsed: None,
        });
        RunReport {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            bytes_credited,
            bytes_moved,
            datasets: reports,
        }
    }

    pub fn transfer_named(
        &mut self,
        datasets: &DatasetRegistry,
        name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetReport, ArchiverError> {
        let dataset = datasets
            .get(name)
            .ok_or_else(|| ArchiverError::DatasetNotFound(name.to_string()))?;
        Ok(self.transfer_dataset(dataset, sink))
    }

    pub fn transfer_dataset(&mut self, dataset: &Dataset, sink: &dyn ProgressSink) -> DatasetReport {
        let mut report = DatasetReport::new(dataset.name());
        let start = Instant::now();

        for category in dataset.categories() {
            for path in dataset.paths(category) {
                let files = match self.resolve(category, path, dataset.output_name(path)) {
                    Ok(files) => files,
                    Err(err) => {
                        tracing::warn!(dataset = dataset.name(), path = %path, error = %err, "skipping manifest entry");
                        report.failures.push(FailureRecord {
                            category,
                            path: path.clone(),
                            error: err.to_string(),
                        });
                        continue;
                    }
                };
                if files.is_empty() {
                    tracing::info!(path = %path, "no matching files at source");
                }
                for file in files {
                    self.transfer_file(dataset, category, &file, &mut report);
                    sink.event(ProgressEvent {
                        message: format!(
                            "{} transferred in {} dataset so far",
                            descriptive_size(report.bytes_credited),
                            dataset.name()
                        ),
                        elapsed: Some(start.elapsed()),
                    });
                }
            }
        }

        tracing::info!(
            dataset = dataset.name(),
            credited = %descriptive_size(report.bytes_credited),
            moved = %descriptive_size(report.bytes_moved),
            failures = report.failures.len(),
            "dataset summary"
        );
        sink.event(ProgressEvent {
            message: format!(
                "{} transferred in {} dataset",
                descriptive_size(report.bytes_credited),
                dataset.name()
            ),
            elapsed: Some(start.elapsed()),
        });
        report
    }

    fn transfer_file(
        &mut self,
        dataset: &Dataset,
        category: Category,
        file: &SourceFile,
        report: &mut DatasetReport,
    ) {
        let location = DestinationLocation::build(
            self.backend.layout(),
            self.options.submission_name.as_deref(),
            self.options.project_base_path.as_deref(),
            dataset.name(),
            category,
            file,
        );
        match self
            .backend
            .reconcile_and_transfer(&self.source, file, &location)
        {
            Ok(record) => {
                report.bytes_credited += record.bytes_credited;
                report.bytes_moved += record.bytes_moved;
                report.records.push(record);
            }
            Err(err) => {
                tracing::warn!(source = %file.path, error = %err, "file not transferred");
                report.failures.push(FailureRecord {
                    category,
                    path: file.path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    /// Turns one manifest path into the concrete files to reconcile.
    pub fn resolve(
        &self,
        category: Category,
        path: &str,
        output_name: Option<&str>,
    ) -> Result<Vec<SourceFile>, ArchiverError> {
        let manifest_path = Utf8Path::new(path);
        let extension = manifest_path.extension().filter(|ext| !ext.is_empty());

        if let (Some(name), Some(_)) = (output_name, extension) {
            if !self.source.exists(path)? {
                return Err(ArchiverError::Resolution(path.to_string()));
            }
            let size = self.source.stat_size(path)?;
            let name = Utf8Path::new(name).file_name().unwrap_or(name);
            return Ok(vec![SourceFile {
                path: path.to_string(),
                size,
                destination_name: name.to_string(),
            }]);
        }

        if extension.is_some() && self.source.is_file(path)? {
            let size = self.source.stat_size(path)?;
            let name = manifest_path.file_name().unwrap_or(path);
            return Ok(vec![SourceFile {
                path: path.to_string(),
                size,
                destination_name: self.pattern_name(output_name, name, 1),
            }]);
        }

        let directory = match extension {
            Some(_) => manifest_path.parent().map(Utf8Path::as_str).unwrap_or("/"),
            None => path,
        };
        if !self.source.exists(directory)? {
            return Err(ArchiverError::Resolution(path.to_string()));
        }
        let wanted = extension.or(category.default_extension());

        let mut candidates: Vec<_> = self
            .source
            .list_directory(directory)?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter(|entry| match wanted {
                Some(wanted) => Utf8Path::new(&entry.name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted)),
                None => true,
            })
            .collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));

        let base = directory.trim_end_matches('/');
        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(index, entry)| SourceFile {
                path: format!("{base}/{}", entry.name),
                size: entry.size,
                destination_name: self.pattern_name(output_name, &entry.name, index + 1),
            })
            .collect())
    }

    fn pattern_name(&self, stem: Option<&str>, original: &str, ordinal: usize) -> String {
        match stem {
            Some(stem) => match Utf8Path::new(original).extension() {
                Some(ext) => format!("{stem}_{ordinal}.{ext}"),
                None => format!("{stem}_{ordinal}"),
            },
            None => self.translator.translate(original),
        }
    }
}
