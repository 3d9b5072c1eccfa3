use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use proteomics_archiver::app::{App, ProgressEvent, ProgressSink, TransferOptions};
use proteomics_archiver::backend::{FolderLayout, PathAddressedBackend};
use proteomics_archiver::destination::LocalDirectory;
use proteomics_archiver::domain::{Category, Decision, RemoteEntry};
use proteomics_archiver::error::ArchiverError;
use proteomics_archiver::manifest::ManifestParser;
use proteomics_archiver::naming::KeywordTranslator;
use proteomics_archiver::output::JsonOutput;
use proteomics_archiver::source::{LocalSource, SourceClient};

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn write_file(root: &Path, relative: &str, bytes: usize) {
    let path = root.join(relative.trim_start_matches('/'));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![b'x'; bytes]).unwrap();
}

fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn local_app(
    source_root: &Path,
    destination_root: &Path,
) -> App<LocalSource, PathAddressedBackend<LocalDirectory>> {
    App::new(
        LocalSource::with_root(utf8(source_root)),
        PathAddressedBackend::new(
            LocalDirectory::new(utf8(destination_root)),
            FolderLayout::default(),
        ),
        KeywordTranslator::default(),
        TransferOptions::default(),
    )
}

const MANIFEST: &str = "\
DATASET PXD0001
ms2-files
/lab/projects/exp_1/ms2
raw-files
/lab/projects/exp_1/spectra
";

fn seed_project(source: &Path) {
    write_file(source, "/lab/projects/exp_1/spectra/b.raw", 20);
    write_file(source, "/lab/projects/exp_1/spectra/a.RAW", 10);
    write_file(source, "/lab/projects/exp_1/spectra/notes.txt", 5);
    write_file(source, "/lab/projects/exp_1/ms2/a.ms2", 7);
}

#[test]
fn second_run_moves_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();

    let mut app = local_app(&source, &destination);
    let first = app.transfer_datasets(&datasets, &JsonOutput);
    assert_eq!(first.bytes_moved, 37);
    assert_eq!(first.bytes_credited, 37);
    assert_eq!(first.datasets[0].count(Decision::Transfer), 3);
    assert!(destination.join("PXD0001/RAW/a.RAW").exists());

    let mut app = local_app(&source, &destination);
    let second = app.transfer_datasets(&datasets, &JsonOutput);
    assert_eq!(second.bytes_moved, 0);
    assert_eq!(second.bytes_credited, 37);
    let records = &second.datasets[0].records;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| record.decision == Decision::Skip));
}

#[test]
fn categories_follow_priority_order() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let folders: Vec<&str> = report.datasets[0]
        .records
        .iter()
        .map(|record| record.destination_folder.as_str())
        .collect();
    assert_eq!(folders, vec!["PXD0001/RAW", "PXD0001/RAW", "PXD0001/MS2"]);
    let names: Vec<&str> = report.datasets[0]
        .records
        .iter()
        .map(|record| record.destination_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.RAW", "b.raw", "a.ms2"]);
}

#[test]
fn size_mismatch_is_transferred_again() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    write_file(&destination, "/PXD0001/RAW/b.raw", 3);
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let record = report.datasets[0]
        .records
        .iter()
        .find(|record| record.destination_name == "b.raw")
        .unwrap();
    assert_eq!(record.decision, Decision::Transfer);
    assert_eq!(record.size_at_destination, Some(3));
    assert_eq!(record.bytes_moved, 20);
    assert_eq!(
        fs::metadata(destination.join("PXD0001/RAW/b.raw")).unwrap().len(),
        20
    );
}

#[test]
fn missing_entry_does_not_stop_the_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    write_file(&source, "/lab/x/spectra/a.raw", 4);
    let manifest = "\
DATASET PXD0002
raw-files
/lab/missing/spectra
/lab/x/spectra/a.raw
/lab/x/spectra/gone.raw\tgone.raw
";
    let datasets = ManifestParser::default().parse_str(manifest).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let dataset = &report.datasets[0];
    assert_eq!(dataset.records.len(), 1);
    assert_eq!(dataset.failures.len(), 2);
    assert_eq!(dataset.failures[0].category, Category::Raw);
    assert_eq!(dataset.bytes_credited, 4);
    assert_eq!(report.failure_count(), 2);
}

#[test]
fn output_stem_numbers_every_match() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    let manifest = "\
DATASET PXD0003
raw-files
/lab/projects/exp_1/spectra\tsample
";
    let datasets = ManifestParser::default().parse_str(manifest).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let names: Vec<&str> = report.datasets[0]
        .records
        .iter()
        .map(|record| record.destination_name.as_str())
        .collect();
    assert_eq!(names, vec!["sample_1.RAW", "sample_2.raw"]);
}

#[test]
fn wildcard_takes_matching_extension_in_name_order() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    write_file(&source, "/lab/x/c.raw", 3);
    write_file(&source, "/lab/x/a.RAW", 1);
    write_file(&source, "/lab/x/b.txt", 2);
    write_file(&source, "/lab/x/d.ms2", 4);
    write_file(&source, "/lab/x/nested.raw/e.raw", 5);
    let manifest = "\
DATASET PXD0006
ms2-files
/lab/x/*.raw
";
    let datasets = ManifestParser::default().parse_str(manifest).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let dataset = &report.datasets[0];
    assert!(dataset.failures.is_empty());
    let sources: Vec<&str> = dataset
        .records
        .iter()
        .map(|record| record.source_path.as_str())
        .collect();
    assert_eq!(sources, vec!["/lab/x/a.RAW", "/lab/x/c.raw"]);
    assert_eq!(dataset.bytes_moved, 4);
    assert!(destination.join("PXD0006/MS2/a.RAW").exists());
    assert!(!destination.join("PXD0006/MS2/d.ms2").exists());
}

#[test]
fn generic_file_lands_under_derived_name() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    let path = "/ip2/lab/projects/B9_X5628_UZ_Sup_2019_02_19_10_17605/quant/2019_02_19_10_17605/DTASelect-filter.txt";
    write_file(&source, path, 12);
    let manifest = format!("DATASET PXD0004\nDTASelect-files\n{path}\n");
    let datasets = ManifestParser::default().parse_str(&manifest).unwrap();

    let mut app = local_app(&source, &destination);
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    assert_eq!(report.datasets[0].records[0].destination_name, "B9_X5628_UZ_Sup.txt");
    assert!(destination.join("PXD0004/DTASELECT/B9_X5628_UZ_Sup.txt").exists());
}

#[test]
fn submission_name_replaces_dataset_folder() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();

    let mut app = App::new(
        LocalSource::with_root(utf8(&source)),
        PathAddressedBackend::new(
            LocalDirectory::new(utf8(&destination)),
            FolderLayout {
                root: "archive".to_string(),
                preserve_tree: false,
            },
        ),
        KeywordTranslator::new(vec![("a.".to_string(), "first.".to_string())]),
        TransferOptions {
            submission_name: Some("MSV000123".to_string()),
            project_base_path: None,
        },
    );
    app.transfer_datasets(&datasets, &JsonOutput);
    assert!(destination.join("archive/MSV000123/RAW/first.RAW").exists());
    assert!(destination.join("archive/MSV000123/MS2/first.ms2").exists());
}

#[test]
fn progress_reports_running_totals() {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    let destination = temp.path().join("destination");
    seed_project(&source);
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();

    let sink = RecordingSink::default();
    let mut app = local_app(&source, &destination);
    app.transfer_datasets(&datasets, &sink);
    let messages = sink.messages.lock().unwrap();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], "10 B transferred in PXD0001 dataset so far");
    assert_eq!(messages[4], "37 B transferred in 1 datasets");
}

#[test]
fn unknown_dataset_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let datasets = ManifestParser::default().parse_str(MANIFEST).unwrap();
    let mut app = local_app(temp.path(), temp.path());
    let err = app
        .transfer_named(&datasets, "PXD9999", &JsonOutput)
        .unwrap_err();
    assert_matches!(err, ArchiverError::DatasetNotFound(name) if name == "PXD9999");
}

/// Source whose reported sizes can disagree with the bytes it serves.
struct ShortReadSource {
    files: HashMap<String, (u64, Vec<u8>)>,
}

impl SourceClient for ShortReadSource {
    fn list_directory(&self, _path: &str) -> Result<Vec<RemoteEntry>, ArchiverError> {
        Ok(Vec::new())
    }

    fn exists(&self, path: &str) -> Result<bool, ArchiverError> {
        Ok(self.files.contains_key(path))
    }

    fn is_file(&self, path: &str) -> Result<bool, ArchiverError> {
        Ok(self.files.contains_key(path))
    }

    fn stat_size(&self, path: &str) -> Result<u64, ArchiverError> {
        self.files
            .get(path)
            .map(|(size, _)| *size)
            .ok_or_else(|| ArchiverError::Source(path.to_string()))
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, ArchiverError> {
        let (_, bytes) = self
            .files
            .get(path)
            .ok_or_else(|| ArchiverError::Source(path.to_string()))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }
}

#[test]
fn truncated_copy_raises_integrity_warning() {
    let temp = tempfile::tempdir().unwrap();
    let mut files = HashMap::new();
    files.insert("/lab/run.raw".to_string(), (100, vec![b'x'; 60]));
    let datasets = ManifestParser::default()
        .parse_str("DATASET PXD0005\nraw-files\n/lab/run.raw\n")
        .unwrap();

    let mut app = App::new(
        ShortReadSource { files },
        PathAddressedBackend::new(LocalDirectory::new(utf8(temp.path())), FolderLayout::default()),
        KeywordTranslator::default(),
        TransferOptions::default(),
    );
    let report = app.transfer_datasets(&datasets, &JsonOutput);
    let dataset = &report.datasets[0];
    assert_eq!(dataset.integrity_warnings(), 1);
    assert_eq!(dataset.records[0].bytes_moved, 60);
    assert_eq!(dataset.records[0].bytes_credited, 60);
}
