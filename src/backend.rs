use std::collections::HashMap;
use std::io::{self, Write};

use camino::{Utf8Component, Utf8Path};
use serde::Serialize;

use crate::destination::{
    DEFAULT_CONTENT_TYPE, ObjectStore, PathDestination, ROOT_FOLDER_ID, StoredObject,
};
use crate::domain::{Category, Decision, SourceFile, TransferRecord};
use crate::error::ArchiverError;
use crate::fs_util::descriptive_size;
use crate::source::SourceClient;

/// How a backend lays folders out below its root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderLayout {
    pub root: String,
    /// Append the source file's directory, relative to the project base
    /// path, below the category folder.
    pub preserve_tree: bool,
}

/// Where one resolved file lands at the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationLocation {
    pub folder: String,
    pub name: String,
}

impl DestinationLocation {
    /// `[root]/{submission or dataset}/{category}[/tree suffix]`; empty and
    /// literal `null` segments are dropped.
    pub fn build(
        layout: &FolderLayout,
        submission_name: Option<&str>,
        project_base_path: Option<&str>,
        dataset_name: &str,
        category: Category,
        file: &SourceFile,
    ) -> Self {
        let owner = submission_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(dataset_name);
        let mut segments: Vec<&str> = Vec::new();
        segments.extend(layout.root.split('/'));
        segments.push(owner);
        segments.push(category.name());

        if layout.preserve_tree {
            let parent = Utf8Path::new(&file.path).parent();
            match (project_base_path, parent) {
                (Some(base), Some(parent)) => match parent.strip_prefix(base) {
                    Ok(relative) => segments.extend(relative.components().filter_map(
                        |component| match component {
                            Utf8Component::Normal(name) => Some(name),
                            _ => None,
                        },
                    )),
                    Err(_) => {
                        tracing::debug!(%parent, "source outside project base path; tree not preserved");
                    }
                },
                (None, Some(parent)) => {
                    tracing::debug!(%parent, "no project base path; tree not preserved");
                }
                _ => {}
            }
        }

        let joined = segments
            .into_iter()
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && *segment != "null")
            .collect::<Vec<_>>()
            .join("/");
        let folder = if layout.root.starts_with('/') {
            format!("/{joined}")
        } else {
            joined
        };

        Self {
            folder,
            name: file.destination_name.clone(),
        }
    }

    pub fn full_path(&self) -> String {
        if self.folder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.folder, self.name)
        }
    }
}

/// Decision policy of one destination kind. The byte copy itself is
/// delegated to the collaborator client the backend wraps.
pub trait DestinationBackend {
    fn layout(&self) -> &FolderLayout;

    fn reconcile_and_transfer(
        &mut self,
        source: &dyn SourceClient,
        file: &SourceFile,
        location: &DestinationLocation,
    ) -> Result<TransferRecord, ArchiverError>;
}

impl<T: DestinationBackend + ?Sized> DestinationBackend for Box<T> {
    fn layout(&self) -> &FolderLayout {
        (**self).layout()
    }

    fn reconcile_and_transfer(
        &mut self,
        source: &dyn SourceClient,
        file: &SourceFile,
        location: &DestinationLocation,
    ) -> Result<TransferRecord, ArchiverError> {
        (**self).reconcile_and_transfer(source, file, location)
    }
}

fn record(
    file: &SourceFile,
    location: &DestinationLocation,
    size_at_destination: Option<u64>,
    decision: Decision,
) -> TransferRecord {
    TransferRecord {
        source_path: file.path.clone(),
        destination_folder: location.folder.clone(),
        destination_name: location.name.clone(),
        size_at_source: file.size,
        size_at_destination,
        decision,
        bytes_moved: 0,
        bytes_credited: 0,
        integrity_warning: false,
    }
}

fn check_integrity(record: &mut TransferRecord) {
    if record.bytes_moved != record.size_at_source {
        record.integrity_warning = true;
        tracing::warn!(
            source = %record.source_path,
            expected = record.size_at_source,
            moved = record.bytes_moved,
            "transferred size differs from source size; transfer may be truncated"
        );
    }
}

pub struct PathAddressedBackend<D: PathDestination> {
    destination: D,
    layout: FolderLayout,
}

impl<D: PathDestination> PathAddressedBackend<D> {
    pub fn new(destination: D, layout: FolderLayout) -> Self {
        Self {
            destination,
            layout,
        }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    fn copy(
        &self,
        source: &dyn SourceClient,
        file: &SourceFile,
        target: &str,
    ) -> Result<u64, ArchiverError> {
        let transfer_err = |err: io::Error| ArchiverError::TransferIo {
            path: file.path.clone(),
            message: err.to_string(),
        };
        let mut reader = source.open_read(&file.path)?;
        let mut writer = self.destination.open_write(target)?;
        let moved = io::copy(&mut reader, &mut writer).map_err(transfer_err)?;
        writer.flush().map_err(transfer_err)?;
        Ok(moved)
    }
}

impl<D: PathDestination> DestinationBackend for PathAddressedBackend<D> {
    fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    fn reconcile_and_transfer(
        &mut self,
        source: &dyn SourceClient,
        file: &SourceFile,
        location: &DestinationLocation,
    ) -> Result<TransferRecord, ArchiverError> {
        let target = location.full_path();
        let size_at_destination = self.destination.stat_size(&target)?;

        match size_at_destination {
            Some(size) if size == file.size => {
                tracing::info!(
                    source = %file.path,
                    target = %target,
                    size = %descriptive_size(size),
                    "already at destination with the same size; skipping"
                );
                let mut skipped = record(file, location, size_at_destination, Decision::Skip);
                skipped.bytes_credited = file.size;
                return Ok(skipped);
            }
            Some(size) => {
                let side = if size > file.size { "destination" } else { "source" };
                tracing::info!(
                    source = %file.path,
                    at_source = %descriptive_size(file.size),
                    at_destination = %descriptive_size(size),
                    diff = %descriptive_size(size.abs_diff(file.size)),
                    "size mismatch, bigger at {side}; transferring again"
                );
            }
            None => {}
        }

        self.destination.make_directories(&location.folder)?;
        tracing::info!(source = %file.path, target = %target, "transferring");
        let moved = self.copy(source, file, &target)?;

        let mut transferred = record(file, location, size_at_destination, Decision::Transfer);
        transferred.bytes_moved = moved;
        transferred.bytes_credited = moved;
        check_integrity(&mut transferred);
        Ok(transferred)
    }
}

/// Backend for stores that identify objects by name inside folders and
/// tolerate duplicates.
pub struct NameAddressedBackend<S: ObjectStore> {
    store: S,
    layout: FolderLayout,
    size_tolerance: u64,
    override_existing: bool,
    content_type: String,
    folder_ids: HashMap<(String, String), String>,
}

impl<S: ObjectStore> NameAddressedBackend<S> {
    pub fn new(store: S, layout: FolderLayout, size_tolerance: u64, override_existing: bool) -> Self {
        Self {
            store,
            layout,
            size_tolerance,
            override_existing,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            folder_ids: HashMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolves `a/b/c` one segment at a time below the store root, creating
    /// missing folders.
    /// Lookups are memoized per (name, parent) for the adapter's lifetime.
    pub fn resolve_folder(&mut self, folder: &str) -> Result<String, ArchiverError> {
        let mut parent = ROOT_FOLDER_ID.to_string();
        for segment in folder.split('/').filter(|segment| !segment.is_empty()) {
            let key = (segment.to_string(), parent.clone());
            let id = match self.folder_ids.get(&key) {
                Some(id) => id.clone(),
                None => {
                    let found = self.store.find_folders_by_name(segment, Some(&parent))?;
                    let id = match found.into_iter().next() {
                        Some(existing) => existing.id,
                        None => {
                            tracing::info!(folder = segment, parent = %parent, "creating folder");
                            self.store.create_folder(Some(&parent), segment)?
                        }
                    };
                    self.folder_ids.insert(key, id.clone());
                    id
                }
            };
            parent = id;
        }
        Ok(parent)
    }

    fn within_tolerance(&self, object: &StoredObject, source_size: u64) -> bool {
        object
            .size
            .map(|size| size.abs_diff(source_size) <= self.size_tolerance)
            .unwrap_or(false)
    }

    fn upload(
        &self,
        source: &dyn SourceClient,
        file: &SourceFile,
        parent_id: &str,
        location: &DestinationLocation,
    ) -> Result<u64, ArchiverError> {
        tracing::info!(
            source = %file.path,
            target = %location.full_path(),
            "uploading"
        );
        let reader = source.open_read(&file.path)?;
        let uploaded = self
            .store
            .upload(parent_id, &self.content_type, &location.name, file.size, reader)?;
        Ok(uploaded.size)
    }
}

impl<S: ObjectStore> DestinationBackend for NameAddressedBackend<S> {
    fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    fn reconcile_and_transfer(
        &mut self,
        source: &dyn SourceClient,
        file: &SourceFile,
        location: &DestinationLocation,
    ) -> Result<TransferRecord, ArchiverError> {
        let parent_id = self.resolve_folder(&location.folder)?;
        let existing = self.store.find_by_name(&location.name, Some(&parent_id))?;

        if existing.is_empty() {
            let moved = self.upload(source, file, &parent_id, location)?;
            let mut uploaded = record(file, location, None, Decision::Transfer);
            uploaded.bytes_moved = moved;
            uploaded.bytes_credited = moved;
            check_integrity(&mut uploaded);
            return Ok(uploaded);
        }

        if existing.len() > 1 {
            tracing::info!(
                name = %location.name,
                folder = %location.folder,
                count = existing.len(),
                "multiple objects share this name"
            );
        }

        let (within, outside): (Vec<StoredObject>, Vec<StoredObject>) = existing
            .into_iter()
            .partition(|object| self.within_tolerance(object, file.size));

        if !self.override_existing {
            let size_at_destination = within
                .first()
                .or_else(|| outside.first())
                .and_then(|object| object.size);
            if within.is_empty() {
                tracing::warn!(
                    source = %file.path,
                    target = %location.full_path(),
                    at_source = %descriptive_size(file.size),
                    at_destination = ?size_at_destination,
                    "present at destination with a different size but override is off; review manually"
                );
            } else {
                tracing::info!(
                    source = %file.path,
                    target = %location.full_path(),
                    "already at destination; skipping"
                );
            }
            return Ok(record(file, location, size_at_destination, Decision::Skip));
        }

        let mut within = within.into_iter();
        let retained = within.next();
        for duplicate in within.chain(outside) {
            tracing::info!(
                id = %duplicate.id,
                name = %duplicate.name,
                size = ?duplicate.size,
                "deleting duplicate"
            );
            self.store.delete_by_id(&duplicate.id)?;
        }

        match retained {
            Some(kept) => {
                let size = kept.size.unwrap_or_default();
                tracing::info!(
                    id = %kept.id,
                    target = %location.full_path(),
                    size = %descriptive_size(size),
                    "keeping existing copy within tolerance"
                );
                let mut replaced =
                    record(file, location, kept.size, Decision::ReplaceDuplicates);
                replaced.bytes_credited = size;
                Ok(replaced)
            }
            None => {
                let moved = self.upload(source, file, &parent_id, location)?;
                let mut replaced = record(file, location, None, Decision::ReplaceDuplicates);
                replaced.bytes_moved = moved;
                replaced.bytes_credited = moved;
                check_integrity(&mut replaced);
                Ok(replaced)
            }
        }
    }
}
