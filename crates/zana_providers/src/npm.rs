//! The npm driver: `packages/npm/` is a regular npm project directory
//! (`package.json`, `package-lock.json`, `node_modules/`), reconciled via
//! the fast / bulk / per-package paths described in §4.4.1.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zana_bin::{expose_symlink, sweep_provider, BinDir};
use zana_consts::{LATEST, NODE_MODULES_DIR, PACKAGE_JSON, PACKAGE_LOCK_JSON};
use zana_error::ZanaError;
use zana_lockfile::Lockfile;
use zana_process::{CommandSpec, ShellOut};
use zana_registry::RegistryCache;

use crate::{Driver, Provider, SourceId};

pub struct NpmDriver<S: ShellOut> {
    shell: Arc<S>,
    lockfile: Arc<Mutex<Lockfile>>,
    registry: Arc<RegistryCache>,
    bin_dir: Arc<BinDir>,
    root: PathBuf,
}

impl<S: ShellOut> NpmDriver<S> {
    pub fn new(
        shell: Arc<S>,
        lockfile: Arc<Mutex<Lockfile>>,
        registry: Arc<RegistryCache>,
        bin_dir: Arc<BinDir>,
        root: PathBuf,
    ) -> Self {
        Self {
            shell,
            lockfile,
            registry,
            bin_dir,
            root,
        }
    }

    fn package_json_path(&self) -> PathBuf {
        self.root.join(PACKAGE_JSON)
    }

    fn package_lock_path(&self) -> PathBuf {
        self.root.join(PACKAGE_LOCK_JSON)
    }

    fn node_modules_path(&self) -> PathBuf {
        self.root.join(NODE_MODULES_DIR)
    }

    fn installed_package_json(&self, name: &str) -> PathBuf {
        self.node_modules_path().join(name).join(PACKAGE_JSON)
    }

    async fn desired(&self) -> Vec<(String, String)> {
        let lockfile = self.lockfile.lock().await;
        lockfile
            .get_by_provider(Provider::Npm.prefix())
            .into_iter()
            .map(|pkg| (strip_prefix(&pkg.source_id), pkg.version.clone()))
            .collect()
    }

    fn provider_io(&self, path: PathBuf, source: std::io::Error) -> ZanaError {
        ZanaError::ProviderIo {
            provider: Provider::Npm.to_string(),
            path,
            source,
        }
    }

    fn regenerate_package_json(&self, desired: &[(String, String)]) -> Result<(), ZanaError> {
        let mut dependencies = serde_json::Map::new();
        for (name, version) in desired {
            let spec = if version.is_empty() || version == LATEST {
                "*".to_string()
            } else {
                version.clone()
            };
            dependencies.insert(name.clone(), serde_json::Value::String(spec));
        }
        let manifest = serde_json::json!({
            "name": "zana-npm-packages",
            "version": "0.0.0",
            "private": true,
            "dependencies": dependencies,
        });

        let contents = serde_json::to_string_pretty(&manifest).expect("manifest always serializes");
        let path = self.package_json_path();
        if fs_err::read_to_string(&path).ok().as_deref() == Some(contents.as_str()) {
            return Ok(());
        }
        fs_err::write(&path, contents).map_err(|source| self.provider_io(path, source))
    }

    /// Read the installed version of `name` from its `node_modules`
    /// `package.json`, if present and parseable.
    fn installed_version(&self, name: &str) -> Option<String> {
        let contents = fs_err::read_to_string(self.installed_package_json(name)).ok()?;
        let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
        value.get("version")?.as_str().map(str::to_string)
    }

    /// The `bin` field, normalized to name -> relative-path pairs. A bare
    /// string value names a single executable after the package itself.
    fn installed_bin_map(&self, name: &str) -> Vec<(String, String)> {
        let Ok(contents) = fs_err::read_to_string(self.installed_package_json(name)) else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) else {
            return Vec::new();
        };
        match value.get("bin") {
            Some(serde_json::Value::String(path)) => vec![(name.to_string(), path.clone())],
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn fast_path_ok(&self, desired: &[(String, String)]) -> bool {
        let lock_path = self.package_lock_path();
        let manifest_path = self.package_json_path();
        let (Ok(lock_meta), Ok(manifest_meta)) = (lock_path.metadata(), manifest_path.metadata()) else {
            return false;
        };
        let (Ok(lock_time), Ok(manifest_time)) = (lock_meta.modified(), manifest_meta.modified()) else {
            return false;
        };
        if lock_time < manifest_time {
            return false;
        }

        desired.iter().all(|(name, version)| {
            version.is_empty()
                || version == LATEST
                || self.installed_version(name).as_deref() == Some(version.as_str())
        })
    }

    async fn npm_ci(&self) -> Result<bool, ZanaError> {
        let output = self
            .shell
            .run(CommandSpec::new("npm").args(["ci"]).cwd(&self.root))
            .await?;
        Ok(output.success())
    }

    async fn per_package_install(&self, desired: &[(String, String)]) -> Result<bool, ZanaError> {
        let mut all_ok = true;
        for (name, version) in desired {
            let wants_latest = version.is_empty() || version == LATEST;
            if !wants_latest && self.installed_version(name).as_deref() == Some(version.as_str()) {
                continue;
            }
            let spec = if wants_latest {
                name.clone()
            } else {
                format!("{name}@{version}")
            };
            let output = self
                .shell
                .run(CommandSpec::new("npm").args(["install", spec.as_str()]).cwd(&self.root))
                .await?;
            if !output.success() {
                tracing::error!(package = name.as_str(), stderr = output.stderr.as_str(), "npm install failed");
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    fn regenerate_symlinks(&self, desired: &[(String, String)]) -> Result<(), ZanaError> {
        let mut keep = HashSet::new();
        for (name, _) in desired {
            for (exe_name, relative) in self.installed_bin_map(name) {
                let target = self.node_modules_path().join(name).join(relative);
                if target.exists() {
                    expose_symlink(&self.bin_dir, &exe_name, &target)?;
                    keep.insert(exe_name);
                }
            }
        }
        sweep_provider(&self.bin_dir, &self.root, &keep)?;
        Ok(())
    }

    async fn sync_inner(&self) -> Result<bool, ZanaError> {
        fs_err::create_dir_all(&self.root).map_err(|source| self.provider_io(self.root.clone(), source))?;

        let desired = self.desired().await;
        self.regenerate_package_json(&desired)?;
        if desired.is_empty() {
            sweep_provider(&self.bin_dir, &self.root, &HashSet::new())?;
            return Ok(true);
        }

        if self.fast_path_ok(&desired) {
            self.regenerate_symlinks(&desired)?;
            return Ok(true);
        }

        // Bulk path: attempt `npm ci` whenever the lock is missing or stale
        // relative to the manifest we just (re)wrote; fall back per-package
        // on failure.
        let all_ok = match self.npm_ci().await {
            Ok(true) => true,
            _ => self.per_package_install(&desired).await?,
        };

        self.regenerate_symlinks(&desired)?;
        Ok(all_ok)
    }

    async fn resolve_latest(&self, repo: &str) -> Result<String, ZanaError> {
        let output = self
            .shell
            .run(CommandSpec::new("npm").args(["view", repo, "version"]))
            .await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: "npm view".to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        let version = output.stdout.trim();
        if version.is_empty() {
            return Err(ZanaError::ParseFailed {
                what: format!("npm view {repo} version"),
                reason: "empty output".to_string(),
            });
        }
        Ok(version.to_string())
    }
}

fn strip_prefix(source_id: &str) -> String {
    source_id.split_once(':').map(|(_, repo)| repo.to_string()).unwrap_or_else(|| source_id.to_string())
}

#[async_trait]
impl<S: ShellOut> Driver for NpmDriver<S> {
    fn provider(&self) -> Provider {
        Provider::Npm
    }

    async fn install(&self, repo: &str, version: &str) -> bool {
        let source_id = SourceId::new(Provider::Npm, repo);
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.add(source_id.canonical(), version) {
                tracing::error!(package = repo, error = %err, "failed to record npm package in lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn remove(&self, repo: &str) -> bool {
        let source_id = SourceId::new(Provider::Npm, repo);
        let item = self.registry.get_by_source_id(&source_id.canonical());
        for name in item.bin.keys() {
            let path = self.bin_dir.entry_path(name);
            if path.is_symlink() || path.exists() {
                if let Err(err) = fs_err::remove_file(&path) {
                    tracing::warn!(entry = name.as_str(), error = %err, "failed to remove bin entry during npm remove");
                }
            }
        }
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.remove(&source_id.canonical()) {
                tracing::error!(package = repo, error = %err, "failed to remove npm package from lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn update(&self, repo: &str) -> bool {
        match self.resolve_latest(repo).await {
            Ok(version) => self.install(repo, &version).await,
            Err(err) => {
                tracing::error!(package = repo, error = %err, "failed to resolve latest npm version");
                false
            }
        }
    }

    async fn sync(&self) -> bool {
        match self.sync_inner().await {
            Ok(ok) => ok,
            Err(err) => {
                tracing::error!(error = %err, "npm sync failed");
                false
            }
        }
    }

    async fn clean(&self) -> bool {
        if self.root.exists() {
            if let Err(source) = fs_err::remove_dir_all(&self.root) {
                tracing::error!(error = %source, "failed to clean npm install area");
                return false;
            }
        }
        self.sync().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zana_process::fake::FakeShell;

    fn setup() -> (tempfile::TempDir, Arc<Mutex<Lockfile>>, Arc<RegistryCache>, Arc<BinDir>, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let lockfile = Arc::new(Mutex::new(Lockfile::load(dir.path().join("zana-lock.json")).unwrap()));
        let registry = Arc::new(RegistryCache::new(dir.path().join("zana-registry.json")));
        let bin_dir = Arc::new(BinDir::new(dir.path().join("bin")));
        let root = dir.path().join("packages/npm");
        (dir, lockfile, registry, bin_dir, root)
    }

    fn write_installed_package(root: &std::path::Path, name: &str, version: &str, bin: &str) {
        let pkg_dir = root.join("node_modules").join(name);
        fs_err::create_dir_all(pkg_dir.join("bin")).unwrap();
        fs_err::write(
            pkg_dir.join("package.json"),
            serde_json::json!({ "name": name, "version": version, "bin": bin }).to_string(),
        )
        .unwrap();
        fs_err::write(pkg_dir.join(bin), "#!/usr/bin/env node\n").unwrap();
    }

    #[tokio::test]
    async fn first_install_runs_ci_and_exposes_bin() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("npm", &["ci"], "");
        let driver = NpmDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir.clone(), root.clone());

        {
            let mut lf = lockfile.lock().await;
            lf.add("npm:eslint", "9.0.0").unwrap();
        }
        // npm ci doesn't actually populate node_modules in this fake; simulate
        // it having done so before the driver inspects node_modules.
        write_installed_package(&root, "eslint", "9.0.0", "bin/eslint.js");

        assert!(driver.sync().await);
        assert!(bin_dir.entry_path("eslint").is_symlink());
        assert_eq!(shell.call_count("npm"), 1);
        drop(dir);
    }

    #[tokio::test]
    async fn second_sync_is_idempotent_via_fast_path() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("npm", &["ci"], "");
        let driver = NpmDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir.clone(), root.clone());
        {
            let mut lf = lockfile.lock().await;
            lf.add("npm:eslint", "9.0.0").unwrap();
        }
        write_installed_package(&root, "eslint", "9.0.0", "bin/eslint.js");
        assert!(driver.sync().await);
        assert_eq!(shell.call_count("npm"), 1);

        // Make package-lock.json newer than package.json to hit the fast path.
        fs_err::write(root.join("package-lock.json"), "{}").unwrap();
        let now = std::time::SystemTime::now();
        filetime_touch(&root.join("package-lock.json"), now);

        assert!(driver.sync().await);
        assert_eq!(shell.call_count("npm"), 1, "fast path must not re-invoke npm");
        drop(dir);
    }

    #[tokio::test]
    async fn remove_deletes_lockfile_entry_and_bin_symlink() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("npm", &["ci"], "");
        let driver = NpmDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir.clone(), root.clone());
        {
            let mut lf = lockfile.lock().await;
            lf.add("npm:eslint", "9.0.0").unwrap();
        }
        write_installed_package(&root, "eslint", "9.0.0", "bin/eslint.js");
        assert!(driver.sync().await);
        assert!(bin_dir.entry_path("eslint").exists());

        assert!(driver.remove("eslint").await);
        let lf = lockfile.lock().await;
        assert!(!lf.is_installed("npm:eslint"));
        drop(dir);
    }

    fn filetime_touch(path: &std::path::Path, _time: std::time::SystemTime) {
        // Re-writing the file bumps its mtime past the package.json write above.
        let contents = fs_err::read_to_string(path).unwrap();
        fs_err::write(path, contents).unwrap();
    }
}
