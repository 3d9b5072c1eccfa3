use std::collections::{BTreeMap, HashMap};

use crate::domain::Category;

/// Source paths of one named dataset, grouped by category.
///
/// Categories are kept in a `BTreeMap` so iteration always follows the
/// category priority order; paths inside a category keep manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    paths_by_category: BTreeMap<Category, Vec<String>>,
    output_name_by_path: HashMap<String, Option<String>>,
    written_name_by_path: HashMap<String, Option<String>>,
    metadata_by_path: HashMap<String, String>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paths_by_category: BTreeMap::new(),
            output_name_by_path: HashMap::new(),
            written_name_by_path: HashMap::new(),
            metadata_by_path: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a path under `category` together with its output name.
    ///
    /// Returns `false` when the path was already registered for that
    /// category; the first registration is kept untouched.
    pub fn register_path(
        &mut self,
        category: Category,
        path: &str,
        output_name: Option<String>,
        metadata: Option<String>,
    ) -> bool {
        let written = output_name.clone();
        self.register_written(category, path, written, output_name, metadata)
    }

    /// Like [`Dataset::register_path`], but also keeps the name exactly as
    /// the manifest spelled it, before defaults and translation applied.
    pub fn register_written(
        &mut self,
        category: Category,
        path: &str,
        written_name: Option<String>,
        output_name: Option<String>,
        metadata: Option<String>,
    ) -> bool {
        let paths = self.paths_by_category.entry(category).or_default();
        if paths.iter().any(|existing| existing == path) {
            tracing::debug!(dataset = %self.name, path, "path already registered");
            return false;
        }
        paths.push(path.to_string());
        self.output_name_by_path
            .entry(path.to_string())
            .or_insert(output_name);
        self.written_name_by_path
            .entry(path.to_string())
            .or_insert(written_name);
        if let Some(metadata) = metadata {
            self.metadata_by_path
                .entry(path.to_string())
                .or_insert(metadata);
        }
        true
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.paths_by_category.keys().copied()
    }

    pub fn paths(&self, category: Category) -> &[String] {
        self.paths_by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn output_name(&self, path: &str) -> Option<&str> {
        self.output_name_by_path
            .get(path)
            .and_then(|name| name.as_deref())
    }

    /// Name as given in the manifest; rendering this keeps a re-parse stable.
    pub fn written_name(&self, path: &str) -> Option<&str> {
        self.written_name_by_path
            .get(path)
            .and_then(|name| name.as_deref())
    }

    pub fn metadata(&self, path: &str) -> Option<&str> {
        self.metadata_by_path.get(path).map(String::as_str)
    }

    pub fn path_count(&self) -> usize {
        self.paths_by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.path_count() == 0
    }

    /// Every `(category, path, output name)` triple in transfer order.
    pub fn entries(&self) -> Vec<(Category, String, Option<String>)> {
        self.paths_by_category
            .iter()
            .flat_map(|(category, paths)| {
                paths.iter().map(|path| {
                    (
                        *category,
                        path.clone(),
                        self.output_name(path).map(str::to_string),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_noop() {
        let mut dataset = Dataset::new("cftr");
        assert!(dataset.register_path(Category::Raw, "/data/a.raw", None, None));
        assert!(!dataset.register_path(
            Category::Raw,
            "/data/a.raw",
            Some("other.raw".to_string()),
            None
        ));
        assert_eq!(dataset.paths(Category::Raw).len(), 1);
        assert_eq!(dataset.output_name("/data/a.raw"), None);
    }

    #[test]
    fn categories_follow_priority_order() {
        let mut dataset = Dataset::new("cftr");
        dataset.register_path(Category::Ms2, "/data/ms2", None, None);
        dataset.register_path(Category::Raw, "/data/raw", None, None);
        dataset.register_path(Category::Dtaselect, "/data/dta.txt", None, None);
        let order: Vec<_> = dataset.categories().collect();
        assert_eq!(
            order,
            vec![Category::Dtaselect, Category::Raw, Category::Ms2]
        );
    }

    #[test]
    fn written_name_is_kept_apart_from_output_name() {
        let mut dataset = Dataset::new("cftr");
        dataset.register_written(
            Category::Raw,
            "/data/a.raw",
            Some("run.raw".to_string()),
            Some("run_v2.raw".to_string()),
            None,
        );
        dataset.register_path(Category::Raw, "/data/b.raw", Some("b.raw".to_string()), None);
        assert_eq!(dataset.written_name("/data/a.raw"), Some("run.raw"));
        assert_eq!(dataset.output_name("/data/a.raw"), Some("run_v2.raw"));
        assert_eq!(dataset.written_name("/data/b.raw"), Some("b.raw"));
    }

    #[test]
    fn paths_keep_insertion_order() {
        let mut dataset = Dataset::new("cftr");
        dataset.register_path(Category::Raw, "/z", None, None);
        dataset.register_path(Category::Raw, "/a", None, None);
        assert_eq!(dataset.paths(Category::Raw), ["/z", "/a"]);
    }
}
