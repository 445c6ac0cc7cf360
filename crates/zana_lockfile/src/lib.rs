//! The lockfile store: the declarative, desired-state document the whole
//! reconciliation engine reads from and writes to.
//!
//! The on-disk format is `{ "packages": [{ "sourceID": ..., "version": ... },
//! ...] }`. Insertion order of `packages` is preserved across
//! read-modify-write cycles, and any top-level field the core doesn't know
//! about is round-tripped unchanged, for forward compatibility with future
//! lockfile producers.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zana_error::ZanaError;

/// A single desired package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    #[serde(rename = "sourceID")]
    pub source_id: String,
    pub version: String,
}

/// The lockfile store. Owns exactly one file on disk; mutation always goes
/// through [`Lockfile::add`]/[`Lockfile::remove`], which persist atomically
/// before returning.
#[derive(Debug, Clone)]
pub struct Lockfile {
    path: PathBuf,
    packages: IndexMap<String, LockedPackage>,
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawLockfile {
    #[serde(default)]
    packages: Vec<LockedPackage>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Lockfile {
    /// Load the lockfile at `path`. A missing file is treated as an empty,
    /// not-yet-created lockfile (it is created lazily on first write). A
    /// file that exists but fails to parse as JSON is a hard error — the
    /// spec explicitly forbids silently treating a corrupt lockfile as "no
    /// packages present", since that would let a reconciliation run
    /// destructively remove everything a provider has installed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ZanaError> {
        let path = path.into();

        let contents = match fs_err::read_to_string(&path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    packages: IndexMap::new(),
                    extra: Map::new(),
                });
            }
            Err(source) => return Err(ZanaError::LockfileIo { path, source }),
        };

        let raw: RawLockfile =
            serde_json::from_str(&contents).map_err(|source| ZanaError::LockfileCorrupt {
                path: path.clone(),
                source,
            })?;

        let packages = raw
            .packages
            .into_iter()
            .map(|pkg| (pkg.source_id.clone(), pkg))
            .collect();

        Ok(Self {
            path,
            packages,
            extra: raw.extra,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, in lockfile order.
    pub fn get_all(&self) -> Vec<&LockedPackage> {
        self.packages.values().collect()
    }

    /// Entries whose `sourceID` provider prefix matches `provider`.
    pub fn get_by_provider(&self, provider: &str) -> Vec<&LockedPackage> {
        self.packages
            .values()
            .filter(|pkg| provider_of(&pkg.source_id) == provider)
            .collect()
    }

    pub fn is_installed(&self, source_id: &str) -> bool {
        self.packages.contains_key(source_id)
    }

    pub fn get(&self, source_id: &str) -> Option<&LockedPackage> {
        self.packages.get(source_id)
    }

    /// Upsert `source_id` at `version`. If the entry already exists, its
    /// version is overwritten and its original position in the file is
    /// preserved (this is `IndexMap::insert`'s native behavior for an
    /// existing key). Persists atomically before returning.
    pub fn add(&mut self, source_id: impl Into<String>, version: impl Into<String>) -> Result<(), ZanaError> {
        let source_id = source_id.into();
        self.packages.insert(
            source_id.clone(),
            LockedPackage {
                source_id,
                version: version.into(),
            },
        );
        self.save()
    }

    /// Remove `source_id`. A missing entry is a no-op (still `Ok`, no write
    /// performed).
    pub fn remove(&mut self, source_id: &str) -> Result<(), ZanaError> {
        if self.packages.shift_remove(source_id).is_none() {
            return Ok(());
        }
        self.save()
    }

    fn save(&self) -> Result<(), ZanaError> {
        let parent = self
            .path
            .parent()
            .expect("lockfile path always has a parent directory");
        fs_err::create_dir_all(parent).map_err(|source| ZanaError::LockfileIo {
            path: parent.to_path_buf(),
            source,
        })?;

        let mut raw = Map::new();
        raw.insert(
            "packages".to_string(),
            serde_json::to_value(self.packages.values().collect::<Vec<_>>()).expect(
                "LockedPackage always serializes",
            ),
        );
        for (key, value) in &self.extra {
            raw.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let serialized = serde_json::to_string_pretty(&Value::Object(raw)).expect(
            "lockfile document always serializes",
        );

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| ZanaError::LockfileIo {
            path: parent.to_path_buf(),
            source,
        })?;
        tmp.write_all(serialized.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .map_err(|source| ZanaError::LockfileIo {
                path: self.path.clone(),
                source,
            })?;
        tmp.persist(&self.path)
            .map_err(|err| ZanaError::LockfileIo {
                path: self.path.clone(),
                source: err.error,
            })?;

        tracing::debug!(path = %self.path.display(), "lockfile persisted");
        Ok(())
    }
}

fn provider_of(source_id: &str) -> &str {
    source_id.split_once(':').map(|(p, _)| p).unwrap_or(source_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lockfile_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("nested").join("zana-lock.json")
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lockfile = Lockfile::load(lockfile_path(&dir)).unwrap();
        assert!(lockfile.get_all().is_empty());
    }

    #[test]
    fn corrupt_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zana-lock.json");
        fs_err::write(&path, "not json").unwrap();
        let err = Lockfile::load(&path).unwrap_err();
        assert!(matches!(err, ZanaError::LockfileCorrupt { .. }));
    }

    #[test]
    fn add_creates_parent_directory_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(&dir);
        let mut lockfile = Lockfile::load(&path).unwrap();
        lockfile.add("npm:eslint", "9.0.0").unwrap();

        assert!(path.exists());
        let reloaded = Lockfile::load(&path).unwrap();
        assert_eq!(reloaded.get("npm:eslint").unwrap().version, "9.0.0");
    }

    #[test]
    fn add_preserves_insertion_order_and_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(&dir);
        let mut lockfile = Lockfile::load(&path).unwrap();
        lockfile.add("npm:eslint", "9.0.0").unwrap();
        lockfile.add("pypi:black", "24.3.0").unwrap();
        lockfile.add("npm:eslint", "9.1.0").unwrap();

        let ids: Vec<&str> = lockfile
            .get_all()
            .iter()
            .map(|pkg| pkg.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["npm:eslint", "pypi:black"]);
        assert_eq!(lockfile.get("npm:eslint").unwrap().version, "9.1.0");
    }

    #[test]
    fn remove_missing_entry_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(&dir);
        let mut lockfile = Lockfile::load(&path).unwrap();
        lockfile.remove("npm:does-not-exist").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn get_by_provider_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut lockfile = Lockfile::load(lockfile_path(&dir)).unwrap();
        lockfile.add("npm:eslint", "9.0.0").unwrap();
        lockfile.add("pypi:black", "24.3.0").unwrap();
        lockfile.add("npm:prettier", "3.0.0").unwrap();

        let npm: Vec<&str> = lockfile
            .get_by_provider("npm")
            .iter()
            .map(|pkg| pkg.source_id.as_str())
            .collect();
        assert_eq!(npm, vec!["npm:eslint", "npm:prettier"]);
    }

    #[test]
    fn unrecognized_top_level_fields_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zana-lock.json");
        fs_err::write(
            &path,
            r#"{ "packages": [], "futureField": { "nested": true } }"#,
        )
        .unwrap();

        let mut lockfile = Lockfile::load(&path).unwrap();
        lockfile.add("npm:eslint", "9.0.0").unwrap();

        let contents = fs_err::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["futureField"]["nested"], Value::Bool(true));
    }
}
