//! The Cargo driver: `packages/cargo/` is used as `cargo install --root`,
//! so binaries land directly under `<root>/bin`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;

use zana_bin::{expose_symlink, sweep_provider, BinDir};
use zana_consts::LATEST;
use zana_error::ZanaError;
use zana_lockfile::Lockfile;
use zana_process::{CommandSpec, ShellOut};
use zana_registry::RegistryCache;

use crate::{Driver, Provider, SourceId};

pub struct CargoDriver<S: ShellOut> {
    shell: Arc<S>,
    lockfile: Arc<Mutex<Lockfile>>,
    registry: Arc<RegistryCache>,
    bin_dir: Arc<BinDir>,
    root: PathBuf,
}

impl<S: ShellOut> CargoDriver<S> {
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

    fn root_arg(&self) -> String {
        self.root.display().to_string()
    }

    fn bin_subdir(&self) -> PathBuf {
        self.root.join("bin")
    }

    fn provider_io(&self, path: PathBuf, source: std::io::Error) -> ZanaError {
        ZanaError::ProviderIo {
            provider: Provider::Cargo.to_string(),
            path,
            source,
        }
    }

    async fn desired(&self) -> Vec<(String, String)> {
        let lockfile = self.lockfile.lock().await;
        lockfile
            .get_by_provider(Provider::Cargo.prefix())
            .into_iter()
            .map(|pkg| (strip_prefix(&pkg.source_id), pkg.version.clone()))
            .collect()
    }

    /// Parses `cargo install --list`'s `<crate> v<version>:` header lines.
    async fn installed_crates(&self) -> Result<HashMap<String, String>, ZanaError> {
        let output = self
            .shell
            .run(CommandSpec::new("cargo").args(["install", "--list", "--root", self.root_arg().as_str()]))
            .await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: "cargo install --list".to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }

        static HEADER_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(\S+) v([0-9][^\s:]*):$").expect("valid regex"));

        let mut installed = HashMap::new();
        for line in output.stdout.lines() {
            if let Some(caps) = HEADER_RE.captures(line) {
                installed.insert(caps[1].to_string(), caps[2].to_string());
            }
        }
        Ok(installed)
    }

    async fn resolve_latest(&self, crate_name: &str) -> Result<String, ZanaError> {
        static VERSION_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r#"^\S+\s*=\s*"([^"]+)""#).expect("valid regex"));

        let output = self.shell.run(CommandSpec::new("cargo").args(["search", crate_name])).await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: "cargo search".to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        let first_line = output.stdout.lines().next().ok_or_else(|| ZanaError::ParseFailed {
            what: format!("cargo search {crate_name}"),
            reason: "empty output".to_string(),
        })?;
        VERSION_RE
            .captures(first_line)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ZanaError::ParseFailed {
                what: format!("cargo search {crate_name}"),
                reason: format!("could not parse version from `{first_line}`"),
            })
    }

    /// Installs or upgrades every outdated desired crate. Returns the
    /// overall success flag plus the `(crate, resolved_version)` pairs that
    /// need an upsert back into the lockfile because their desired version
    /// was `latest`.
    async fn install_or_update(&self, desired: &[(String, String)]) -> Result<(bool, Vec<(String, String)>), ZanaError> {
        let installed = self.installed_crates().await?;
        let mut all_ok = true;
        let mut resolved = Vec::new();

        for (crate_name, version) in desired {
            let wants_latest = version.is_empty() || version == LATEST;
            let target_version = if wants_latest {
                match self.resolve_latest(crate_name).await {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::error!(crate_name = crate_name.as_str(), error = %err, "failed to resolve latest cargo version");
                        all_ok = false;
                        continue;
                    }
                }
            } else {
                version.clone()
            };

            let already_current = installed.get(crate_name).map(|v| v == &target_version).unwrap_or(false);
            if already_current {
                if wants_latest {
                    resolved.push((crate_name.clone(), target_version));
                }
                continue;
            }

            let root_arg = self.root_arg();
            let mut args = vec!["install", "--root", root_arg.as_str(), "--version", target_version.as_str()];
            if installed.contains_key(crate_name) {
                args.push("--force");
            }
            args.push(crate_name.as_str());

            let output = self.shell.run(CommandSpec::new("cargo").args(args)).await?;
            if !output.success() {
                tracing::error!(crate_name = crate_name.as_str(), stderr = output.stderr.as_str(), "cargo install failed");
                all_ok = false;
                continue;
            }
            if wants_latest {
                resolved.push((crate_name.clone(), target_version));
            }
        }

        Ok((all_ok, resolved))
    }

    fn regenerate_symlinks(&self) -> Result<(), ZanaError> {
        let mut keep = HashSet::new();
        if let Ok(entries) = fs_err::read_dir(self.bin_subdir()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    expose_symlink(&self.bin_dir, &name, &path)?;
                    keep.insert(name);
                }
            }
        }
        sweep_provider(&self.bin_dir, &self.root, &keep)?;
        Ok(())
    }

    async fn sync_inner(&self) -> Result<bool, ZanaError> {
        fs_err::create_dir_all(self.bin_subdir()).map_err(|source| self.provider_io(self.bin_subdir(), source))?;

        let desired = self.desired().await;
        if desired.is_empty() {
            sweep_provider(&self.bin_dir, &self.root, &HashSet::new())?;
            return Ok(true);
        }

        if !self.shell.has_command("cargo") {
            return Err(ZanaError::SubprocessMissing { command: "cargo".to_string() });
        }

        let (all_ok, resolved) = self.install_or_update(&desired).await?;
        if !resolved.is_empty() {
            let mut lockfile = self.lockfile.lock().await;
            for (crate_name, version) in resolved {
                let source_id = SourceId::new(Provider::Cargo, crate_name).canonical();
                lockfile.add(source_id, version)?;
            }
        }
        self.regenerate_symlinks()?;
        Ok(all_ok)
    }
}

fn strip_prefix(source_id: &str) -> String {
    source_id.split_once(':').map(|(_, repo)| repo.to_string()).unwrap_or_else(|| source_id.to_string())
}

#[async_trait]
impl<S: ShellOut> Driver for CargoDriver<S> {
    fn provider(&self) -> Provider {
        Provider::Cargo
    }

    async fn install(&self, repo: &str, version: &str) -> bool {
        let source_id = SourceId::new(Provider::Cargo, repo);
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.add(source_id.canonical(), version) {
                tracing::error!(crate_name = repo, error = %err, "failed to record cargo crate in lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn remove(&self, repo: &str) -> bool {
        let source_id = SourceId::new(Provider::Cargo, repo);
        let item = self.registry.get_by_source_id(&source_id.canonical());
        let names: Vec<String> = if item.bin.is_empty() { vec![repo.to_string()] } else { item.bin.keys().cloned().collect() };
        for name in names {
            let path = self.bin_dir.entry_path(&name);
            if path.is_symlink() || path.exists() {
                if let Err(err) = fs_err::remove_file(&path) {
                    tracing::warn!(entry = name.as_str(), error = %err, "failed to remove bin entry during cargo remove");
                }
            }
        }
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.remove(&source_id.canonical()) {
                tracing::error!(crate_name = repo, error = %err, "failed to remove cargo crate from lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn update(&self, repo: &str) -> bool {
        // Cargo resolves `latest` itself during Sync and upserts the concrete
        // version afterward; Update just re-requests the literal `latest`.
        self.install(repo, LATEST).await
    }

    async fn sync(&self) -> bool {
        match self.sync_inner().await {
            Ok(ok) => ok,
            Err(err) => {
                tracing::error!(error = %err, "cargo sync failed");
                false
            }
        }
    }

    async fn clean(&self) -> bool {
        if self.root.exists() {
            if let Err(source) = fs_err::remove_dir_all(&self.root) {
                tracing::error!(error = %source, "failed to clean cargo install area");
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
        let root = dir.path().join("packages/cargo");
        (dir, lockfile, registry, bin_dir, root)
    }

    #[tokio::test]
    async fn install_concrete_version_runs_cargo_install() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("cargo", &["install", "--list", "--root", root.display().to_string().as_str()], "");
        shell.on_success(
            "cargo",
            &["install", "--root", root.display().to_string().as_str(), "--version", "14.1.0", "ripgrep"],
            "",
        );
        let driver = CargoDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir.clone(), root.clone());
        fs_err::create_dir_all(root.join("bin")).unwrap();
        fs_err::write(root.join("bin/rg"), "binary").unwrap();

        assert!(driver.install("ripgrep", "14.1.0").await);
        assert!(bin_dir.entry_path("rg").is_symlink());
        drop(dir);
    }

    #[tokio::test]
    async fn latest_resolves_via_cargo_search_and_upserts_concrete_version() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("cargo", &["install", "--list", "--root", root.display().to_string().as_str()], "");
        shell.on_success("cargo", &["search", "ripgrep"], "ripgrep = \"14.1.0\"    # search tool\n");
        shell.on_success(
            "cargo",
            &["install", "--root", root.display().to_string().as_str(), "--version", "14.1.0", "ripgrep"],
            "",
        );
        let driver = CargoDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir, root.clone());

        assert!(driver.install("ripgrep", "latest").await);
        let lf = lockfile.lock().await;
        assert_eq!(lf.get("cargo:ripgrep").unwrap().version, "14.1.0");
        drop(dir);
    }

    #[tokio::test]
    async fn already_current_version_skips_install() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success(
            "cargo",
            &["install", "--list", "--root", root.display().to_string().as_str()],
            "ripgrep v14.1.0:\n    rg\n",
        );
        let driver = CargoDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir, root.clone());
        {
            let mut lf = lockfile.lock().await;
            lf.add("cargo:ripgrep", "14.1.0").unwrap();
        }
        fs_err::create_dir_all(root.join("bin")).unwrap();
        fs_err::write(root.join("bin/rg"), "binary").unwrap();

        assert!(driver.sync().await);
        assert_eq!(shell.call_count("cargo"), 1, "only --list should run, no install");
        drop(dir);
    }
}
