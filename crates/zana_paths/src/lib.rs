//! Platform path resolution for Zana. Pure function of the environment —
//! nothing here touches the filesystem or performs I/O.

use std::path::{Path, PathBuf};

use zana_consts::{
    BIN_DIR, ENV_ZANA_HOME, LOCKFILE_NAME, PACKAGES_DIR, REGISTRY_CACHE_DIR, REGISTRY_CACHE_FILE,
};

/// Resolved set of directories Zana reads from and writes to.
///
/// When `ZANA_HOME` is set, every path below is rooted under it. Otherwise
/// the data root (packages, bin, registry cache) and the config root
/// (lockfile) are resolved independently via `dirs`, which on Linux
/// naturally yields the XDG `XDG_DATA_HOME`/`XDG_CONFIG_HOME` split spec.md
/// calls for, and on macOS/Windows yields the same directory for both
/// (Application Support / `%APPDATA%`), also matching spec.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZanaHome {
    data_root: PathBuf,
    config_root: PathBuf,
}

impl ZanaHome {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ZanaHomeError> {
        if let Some(home) = std::env::var_os(ENV_ZANA_HOME) {
            let home = PathBuf::from(home);
            return Ok(Self {
                data_root: home.clone(),
                config_root: home,
            });
        }

        let data_root = dirs::data_dir()
            .ok_or(ZanaHomeError::NoHomeDirectory)?
            .join("zana");
        let config_root = dirs::config_dir()
            .ok_or(ZanaHomeError::NoHomeDirectory)?
            .join("zana");

        Ok(Self {
            data_root,
            config_root,
        })
    }

    /// Construct an explicit, single-root home (used by tests and by an
    /// explicit `ZANA_HOME` override).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_root: root.clone(),
            config_root: root,
        }
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.config_root.join(LOCKFILE_NAME)
    }

    pub fn packages_root(&self) -> PathBuf {
        self.data_root.join(PACKAGES_DIR)
    }

    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.packages_root().join(provider)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.data_root.join(BIN_DIR)
    }

    pub fn registry_cache_path(&self) -> PathBuf {
        self.data_root
            .join(REGISTRY_CACHE_DIR)
            .join(REGISTRY_CACHE_FILE)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ZanaHomeError {
    #[error("could not determine the current user's home directory")]
    NoHomeDirectory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_shares_data_and_config() {
        let home = ZanaHome::at("/tmp/zana-test");
        assert_eq!(
            home.lockfile_path(),
            PathBuf::from("/tmp/zana-test/zana-lock.json")
        );
        assert_eq!(
            home.bin_dir(),
            PathBuf::from("/tmp/zana-test/bin")
        );
        assert_eq!(
            home.provider_dir("npm"),
            PathBuf::from("/tmp/zana-test/packages/npm")
        );
        assert_eq!(
            home.registry_cache_path(),
            PathBuf::from("/tmp/zana-test/registry-cache/zana-registry.json")
        );
    }

    #[test]
    fn env_override_wins_over_os_defaults() {
        // SAFETY: test-local env var mutation; no other test in this crate reads ZANA_HOME.
        unsafe {
            std::env::set_var("ZANA_HOME", "/tmp/zana-override");
        }
        let home = ZanaHome::from_env().unwrap();
        unsafe {
            std::env::remove_var("ZANA_HOME");
        }
        assert_eq!(home.data_root(), Path::new("/tmp/zana-override"));
        assert_eq!(home.config_root(), Path::new("/tmp/zana-override"));
    }
}
