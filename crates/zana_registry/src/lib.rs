//! The registry cache: a read-only view over a JSON bundle produced
//! externally (by the boot collaborator that downloads and decompresses
//! it) mapping `sourceID` to installation metadata.

use std::path::PathBuf;
use std::sync::RwLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use zana_error::ZanaError;

/// Installation metadata for one package, as published in the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryItem {
    #[serde(rename = "sourceID", default)]
    pub source_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// Executable name -> path template, relative to the package's install
    /// root, e.g. `{"eslint": "bin/eslint.js"}`.
    #[serde(default)]
    pub bin: IndexMap<String, String>,
    /// Download filename templates, for source-download providers outside
    /// the four ecosystem drivers.
    #[serde(default)]
    pub asset: Vec<String>,
}

impl RegistryItem {
    fn empty(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            ..Default::default()
        }
    }
}

/// Read-only reader over the decompressed registry bundle, with an
/// in-memory memoized copy that is only refreshed when the caller passes
/// `force: true`.
pub struct RegistryCache {
    path: PathBuf,
    cache: RwLock<Option<IndexMap<String, RegistryItem>>>,
}

impl RegistryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// (Re)load the cache from disk if it hasn't been loaded yet, or
    /// unconditionally when `force` is set. A missing file is treated as an
    /// empty registry; a present-but-unparseable file is a hard error.
    pub fn refresh(&self, force: bool) -> Result<(), ZanaError> {
        if !force && self.cache.read().unwrap().is_some() {
            return Ok(());
        }

        let items = match fs_err::read_to_string(&self.path) {
            Ok(contents) => {
                let parsed: Vec<RegistryItem> =
                    serde_json::from_str(&contents).map_err(|source| ZanaError::RegistryCorrupt {
                        path: self.path.clone(),
                        source,
                    })?;
                parsed
                    .into_iter()
                    .map(|item| (item.source_id.clone(), item))
                    .collect()
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(source) => {
                return Err(ZanaError::RegistryIo {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        *self.cache.write().unwrap() = Some(items);
        Ok(())
    }

    /// All known registry items. Load failures are logged and treated as an
    /// empty registry — the registry is an externally refreshed artifact,
    /// not something whose absence should abort a reconciliation.
    pub fn get_all(&self) -> Vec<RegistryItem> {
        if let Err(err) = self.refresh(false) {
            tracing::warn!(error = %err, "failed to load registry cache, treating as empty");
            return Vec::new();
        }
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a single item by `sourceID`. Never fails: an absent entry or
    /// a load failure both yield an empty [`RegistryItem`].
    pub fn get_by_source_id(&self, source_id: &str) -> RegistryItem {
        if let Err(err) = self.refresh(false) {
            tracing::warn!(error = %err, "failed to load registry cache, treating as empty");
            return RegistryItem::empty(source_id);
        }
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .and_then(|items| items.get(source_id).cloned())
            .unwrap_or_else(|| RegistryItem::empty(source_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RegistryCache::new(dir.path().join("zana-registry.json"));
        assert!(cache.get_all().is_empty());
        assert_eq!(cache.get_by_source_id("npm:eslint"), RegistryItem::empty("npm:eslint"));
    }

    #[test]
    fn corrupt_file_surfaces_via_refresh_but_queries_stay_infallible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zana-registry.json");
        fs_err::write(&path, "not json").unwrap();
        let cache = RegistryCache::new(&path);

        assert!(matches!(
            cache.refresh(true).unwrap_err(),
            ZanaError::RegistryCorrupt { .. }
        ));
        // get_all/get_by_source_id never propagate the error.
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn get_by_source_id_returns_item_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zana-registry.json");
        fs_err::write(
            &path,
            r#"[{"sourceID":"npm:eslint","name":"eslint","description":"lint","version":"9.0.0","bin":{"eslint":"bin/eslint.js"}}]"#,
        )
        .unwrap();
        let cache = RegistryCache::new(&path);

        let item = cache.get_by_source_id("npm:eslint");
        assert_eq!(item.name, "eslint");
        assert_eq!(item.bin.get("eslint").unwrap(), "bin/eslint.js");
    }

    #[test]
    fn memoized_copy_is_only_refreshed_when_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zana-registry.json");
        fs_err::write(&path, "[]").unwrap();
        let cache = RegistryCache::new(&path);
        assert!(cache.get_all().is_empty());

        fs_err::write(&path, r#"[{"sourceID":"npm:eslint"}]"#).unwrap();
        // Without force, the stale in-memory copy is served.
        assert!(cache.get_all().is_empty());

        cache.refresh(true).unwrap();
        assert_eq!(cache.get_all().len(), 1);
    }
}
