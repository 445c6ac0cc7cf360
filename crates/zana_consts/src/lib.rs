//! Shared string constants and CLI styling used across the Zana workspace.

use console::Style;
use once_cell::sync::Lazy;

/// Name of the lockfile Zana writes under `ZANA_HOME`.
pub const LOCKFILE_NAME: &str = "zana-lock.json";

/// Directory (under `ZANA_HOME`) that holds per-provider install areas.
pub const PACKAGES_DIR: &str = "packages";

/// Directory (under `ZANA_HOME`) that holds the unified executable layer.
pub const BIN_DIR: &str = "bin";

/// Directory (under `ZANA_HOME`) that holds the decompressed registry bundle.
pub const REGISTRY_CACHE_DIR: &str = "registry-cache";

/// File name of the decompressed registry bundle.
pub const REGISTRY_CACHE_FILE: &str = "zana-registry.json";

/// Name of the optional ambient config file.
pub const CONFIG_FILE: &str = "config.toml";

/// Env var that overrides the Zana home directory.
pub const ENV_ZANA_HOME: &str = "ZANA_HOME";

/// Env var that overrides the registry download URL (consumed by the boot
/// collaborator; the core only ever reads it back for display purposes).
pub const ENV_ZANA_REGISTRY_URL: &str = "ZANA_REGISTRY_URL";

/// The literal version string meaning "resolve to the newest available".
pub const LATEST: &str = "latest";

/// Legacy identifier prefix accepted on input and normalized away.
pub const LEGACY_PKG_PREFIX: &str = "pkg:";

pub const PACKAGE_JSON: &str = "package.json";
pub const PACKAGE_LOCK_JSON: &str = "package-lock.json";
pub const NODE_MODULES_DIR: &str = "node_modules";

pub const REQUIREMENTS_TXT: &str = "requirements.txt";

pub const GO_MOD: &str = "go.mod";

pub const CRATES_TOML: &str = ".crates.toml";

pub static PROVIDER_STYLE: Lazy<Style> = Lazy::new(|| Style::new().cyan());
pub static PACKAGE_STYLE: Lazy<Style> = Lazy::new(|| Style::new().green());
pub static VERSION_STYLE: Lazy<Style> = Lazy::new(|| Style::new().blue());
pub static ERROR_STYLE: Lazy<Style> = Lazy::new(|| Style::new().red().bold());
