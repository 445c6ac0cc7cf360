//! The PyPI driver: `packages/pypi/` is used as a `pip install --prefix`
//! target, so modules land under `lib/pythonX.Y/site-packages/` and
//! scripts under `bin/`. Exposure goes through the wrapper policy rather
//! than symlinks, since a script needs `PYTHONPATH` set before exec.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;

use zana_bin::{expose_wrapper, sweep_provider, BinDir};
use zana_consts::{LATEST, REQUIREMENTS_TXT};
use zana_error::ZanaError;
use zana_lockfile::Lockfile;
use zana_process::{CommandSpec, ShellOut};
use zana_registry::RegistryCache;

use crate::{Driver, Provider, SourceId};

pub struct PypiDriver<S: ShellOut> {
    shell: Arc<S>,
    lockfile: Arc<Mutex<Lockfile>>,
    registry: Arc<RegistryCache>,
    bin_dir: Arc<BinDir>,
    root: PathBuf,
}

impl<S: ShellOut> PypiDriver<S> {
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

    fn pip_command(&self) -> &'static str {
        if self.shell.has_command("pip3") {
            "pip3"
        } else {
            "pip"
        }
    }

    fn requirements_path(&self) -> PathBuf {
        self.root.join(REQUIREMENTS_TXT)
    }

    fn provider_bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    fn provider_io(&self, path: PathBuf, source: std::io::Error) -> ZanaError {
        ZanaError::ProviderIo {
            provider: Provider::PyPi.to_string(),
            path,
            source,
        }
    }

    /// `<root>/lib/pythonX.Y/site-packages`, discovered by scanning `lib/`
    /// for the version directory `pip install --prefix` created.
    fn site_packages_dir(&self) -> Option<PathBuf> {
        let entries = fs_err::read_dir(self.root.join("lib")).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_python_dir = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with("python"))
                .unwrap_or(false);
            if path.is_dir() && is_python_dir {
                let candidate = path.join("site-packages");
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    async fn desired(&self) -> Vec<(String, String)> {
        let lockfile = self.lockfile.lock().await;
        lockfile
            .get_by_provider(Provider::PyPi.prefix())
            .into_iter()
            .map(|pkg| (strip_prefix(&pkg.source_id), pkg.version.clone()))
            .collect()
    }

    fn regenerate_requirements(&self, desired: &[(String, String)]) -> Result<(), ZanaError> {
        let lines: Vec<String> = desired
            .iter()
            .map(|(name, version)| {
                if version.is_empty() || version == LATEST {
                    name.clone()
                } else {
                    format!("{name}=={version}")
                }
            })
            .collect();
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        fs_err::write(self.requirements_path(), contents)
            .map_err(|source| self.provider_io(self.requirements_path(), source))
    }

    async fn installed_versions(&self) -> Result<HashMap<String, String>, ZanaError> {
        let output = self.shell.run(CommandSpec::new(self.pip_command()).arg("freeze")).await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: format!("{} freeze", self.pip_command()),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.split_once("=="))
            .map(|(name, version)| (name.to_lowercase(), version.to_string()))
            .collect())
    }

    async fn install_outdated(&self, desired: &[(String, String)]) -> Result<bool, ZanaError> {
        let installed = self.installed_versions().await?;
        let mut all_ok = true;
        for (name, version) in desired {
            if version.is_empty() || version == LATEST {
                // Not reconcilable to a concrete version here; Update resolves
                // `latest` to a concrete version before calling Install.
                continue;
            }
            if installed.get(&name.to_lowercase()).map(|v| v == version).unwrap_or(false) {
                continue;
            }
            let spec = format!("{name}=={version}");
            let prefix_arg = self.root.display().to_string();
            let output = self
                .shell
                .run(
                    CommandSpec::new(self.pip_command())
                        .args(["install", "--prefix", prefix_arg.as_str(), spec.as_str()]),
                )
                .await?;
            if !output.success() {
                tracing::error!(package = name.as_str(), stderr = output.stderr.as_str(), "pip install failed");
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    fn regenerate_wrappers(&self) -> Result<(), ZanaError> {
        let mut keep = HashSet::new();
        if let Some(site_packages) = self.site_packages_dir() {
            if let Ok(entries) = fs_err::read_dir(self.provider_bin_dir()) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        expose_wrapper(&self.bin_dir, &name, &site_packages, &path)?;
                        keep.insert(name);
                    }
                }
            }
        }
        sweep_provider(&self.bin_dir, &self.root, &keep)?;
        Ok(())
    }

    async fn sync_inner(&self) -> Result<bool, ZanaError> {
        fs_err::create_dir_all(&self.root).map_err(|source| self.provider_io(self.root.clone(), source))?;

        let desired = self.desired().await;
        self.regenerate_requirements(&desired)?;
        if desired.is_empty() {
            sweep_provider(&self.bin_dir, &self.root, &HashSet::new())?;
            return Ok(true);
        }

        let all_ok = self.install_outdated(&desired).await?;
        self.regenerate_wrappers()?;
        Ok(all_ok)
    }

    async fn resolve_latest(&self, repo: &str) -> Result<String, ZanaError> {
        static VERSIONS_LINE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^Available versions:\s*(.+)$").expect("valid regex"));

        let output = self
            .shell
            .run(CommandSpec::new(self.pip_command()).args(["index", "versions", repo]))
            .await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: format!("{} index versions", self.pip_command()),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        let versions = output
            .stdout
            .lines()
            .find_map(|line| VERSIONS_LINE_RE.captures(line))
            .ok_or_else(|| ZanaError::ParseFailed {
                what: format!("{} index versions {repo}", self.pip_command()),
                reason: "no \"Available versions:\" line in output".to_string(),
            })?;
        let first = versions[1]
            .split(',')
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ZanaError::ParseFailed {
                what: format!("{} index versions {repo}", self.pip_command()),
                reason: "empty version list".to_string(),
            })?;
        Ok(first.to_string())
    }
}

fn strip_prefix(source_id: &str) -> String {
    source_id.split_once(':').map(|(_, repo)| repo.to_string()).unwrap_or_else(|| source_id.to_string())
}

#[async_trait]
impl<S: ShellOut> Driver for PypiDriver<S> {
    fn provider(&self) -> Provider {
        Provider::PyPi
    }

    async fn install(&self, repo: &str, version: &str) -> bool {
        let source_id = SourceId::new(Provider::PyPi, repo);
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.add(source_id.canonical(), version) {
                tracing::error!(package = repo, error = %err, "failed to record pypi package in lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn remove(&self, repo: &str) -> bool {
        let source_id = SourceId::new(Provider::PyPi, repo);
        let item = self.registry.get_by_source_id(&source_id.canonical());
        for name in item.bin.keys() {
            let path = self.bin_dir.entry_path(name);
            if path.is_symlink() || path.exists() {
                if let Err(err) = fs_err::remove_file(&path) {
                    tracing::warn!(entry = name.as_str(), error = %err, "failed to remove bin entry during pypi remove");
                }
            }
        }
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.remove(&source_id.canonical()) {
                tracing::error!(package = repo, error = %err, "failed to remove pypi package from lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn update(&self, repo: &str) -> bool {
        match self.resolve_latest(repo).await {
            Ok(version) => self.install(repo, &version).await,
            Err(err) => {
                tracing::error!(package = repo, error = %err, "failed to resolve latest pypi version");
                false
            }
        }
    }

    async fn sync(&self) -> bool {
        match self.sync_inner().await {
            Ok(ok) => ok,
            Err(err) => {
                tracing::error!(error = %err, "pypi sync failed");
                false
            }
        }
    }

    async fn clean(&self) -> bool {
        if self.root.exists() {
            if let Err(source) = fs_err::remove_dir_all(&self.root) {
                tracing::error!(error = %source, "failed to clean pypi install area");
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
        let root = dir.path().join("packages/pypi");
        (dir, lockfile, registry, bin_dir, root)
    }

    fn write_installed_script(root: &std::path::Path, name: &str, version_output: &str) {
        fs_err::create_dir_all(root.join("lib/python3.12/site-packages")).unwrap();
        fs_err::create_dir_all(root.join("bin")).unwrap();
        fs_err::write(root.join("bin").join(name), format!("#!/bin/sh\necho {version_output}\n")).unwrap();
    }

    #[tokio::test]
    async fn install_black_exposes_wrapper_script() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("pip3", &["freeze"], "");
        shell.on_success(
            "pip3",
            &["install", "--prefix", root.display().to_string().as_str(), "black==24.3.0"],
            "",
        );
        let driver = PypiDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir.clone(), root.clone());

        assert!(driver.install("black", "24.3.0").await);
        write_installed_script(&root, "black", "24.3.0");
        // A second sync picks up the script pip install would have written.
        shell.on_success("pip3", &["freeze"], "black==24.3.0\n");
        assert!(driver.sync().await);

        let script = fs_err::read_to_string(bin_dir.entry_path("black")).unwrap();
        assert!(script.contains("PYTHONPATH"));
        assert!(script.contains("site-packages"));
        drop(dir);
    }

    #[tokio::test]
    async fn already_installed_version_skips_pip_install() {
        let (dir, lockfile, registry, bin_dir, root) = setup();
        let shell = Arc::new(FakeShell::new());
        shell.on_success("pip3", &["freeze"], "black==24.3.0\n");
        write_installed_script(&root, "black", "24.3.0");
        let driver = PypiDriver::new(shell.clone(), lockfile.clone(), registry, bin_dir, root.clone());
        {
            let mut lf = lockfile.lock().await;
            lf.add("pypi:black", "24.3.0").unwrap();
        }

        assert!(driver.sync().await);
        assert_eq!(shell.call_count("pip3"), 1, "only freeze should run, no install");
        drop(dir);
    }
}
