//! The Go driver: `packages/golang/` holds a throwaway `go.mod` and
//! `GOBIN=<root>/bin`, so every `go install` deposits its binary directly
//! where the symlink policy expects it.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use zana_bin::{expose_symlink, sweep_provider, BinDir};
use zana_consts::{GO_MOD, LATEST};
use zana_error::ZanaError;
use zana_lockfile::Lockfile;
use zana_process::{CommandSpec, ShellOut};
use zana_registry::RegistryCache;

use crate::{Driver, Provider, SourceId};

pub struct GoDriver<S: ShellOut> {
    shell: Arc<S>,
    lockfile: Arc<Mutex<Lockfile>>,
    registry: Arc<RegistryCache>,
    bin_dir: Arc<BinDir>,
    root: PathBuf,
}

impl<S: ShellOut> GoDriver<S> {
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

    fn go_mod_path(&self) -> PathBuf {
        self.root.join(GO_MOD)
    }

    fn gobin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    fn provider_io(&self, path: PathBuf, source: std::io::Error) -> ZanaError {
        ZanaError::ProviderIo {
            provider: Provider::Golang.to_string(),
            path,
            source,
        }
    }

    fn basename(module: &str) -> &str {
        module.rsplit('/').next().unwrap_or(module)
    }

    async fn desired(&self) -> Vec<(String, String)> {
        let lockfile = self.lockfile.lock().await;
        lockfile
            .get_by_provider(Provider::Golang.prefix())
            .into_iter()
            .map(|pkg| (strip_prefix(&pkg.source_id), pkg.version.clone()))
            .collect()
    }

    async fn ensure_go_mod(&self) -> Result<(), ZanaError> {
        if self.go_mod_path().exists() {
            return Ok(());
        }
        let output = self
            .shell
            .run(
                CommandSpec::new("go")
                    .args(["mod", "init", "zana-golang-packages"])
                    .cwd(&self.root),
            )
            .await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: "go mod init".to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    async fn install_missing(&self, desired: &[(String, String)]) -> Result<bool, ZanaError> {
        let mut all_ok = true;
        let gobin = self.gobin_dir().display().to_string();
        for (module, version) in desired {
            let exe = self.gobin_dir().join(Self::basename(module));
            if exe.exists() {
                continue;
            }
            let wants_latest = version.is_empty() || version == LATEST;
            let spec = if wants_latest {
                format!("{module}@latest")
            } else {
                format!("{module}@{version}")
            };
            let output = self
                .shell
                .run(CommandSpec::new("go").args(["install", spec.as_str()]).env("GOBIN", gobin.as_str()))
                .await?;
            if !output.success() {
                tracing::error!(module = module.as_str(), stderr = output.stderr.as_str(), "go install failed");
                all_ok = false;
            }
        }
        Ok(all_ok)
    }

    fn regenerate_symlinks(&self, desired: &[(String, String)]) -> Result<(), ZanaError> {
        let mut keep = HashSet::new();
        for (module, _) in desired {
            let source_id = format!("{}:{module}", Provider::Golang.prefix());
            let item = self.registry.get_by_source_id(&source_id);
            if item.bin.is_empty() {
                let name = Self::basename(module).to_string();
                let target = self.gobin_dir().join(&name);
                if target.exists() {
                    expose_symlink(&self.bin_dir, &name, &target)?;
                    keep.insert(name);
                }
            } else {
                for (name, relative) in &item.bin {
                    let target = self.gobin_dir().join(relative);
                    if target.exists() {
                        expose_symlink(&self.bin_dir, name, &target)?;
                        keep.insert(name.clone());
                    }
                }
            }
        }
        sweep_provider(&self.bin_dir, &self.root, &keep)?;
        Ok(())
    }

    async fn sync_inner(&self) -> Result<bool, ZanaError> {
        fs_err::create_dir_all(self.gobin_dir()).map_err(|source| self.provider_io(self.gobin_dir(), source))?;

        let desired = self.desired().await;
        if desired.is_empty() {
            sweep_provider(&self.bin_dir, &self.root, &HashSet::new())?;
            return Ok(true);
        }

        if !self.shell.has_command("go") {
            return Err(ZanaError::SubprocessMissing { command: "go".to_string() });
        }
        self.ensure_go_mod().await?;

        let all_ok = self.install_missing(&desired).await?;
        self.regenerate_symlinks(&desired)?;
        Ok(all_ok)
    }

    async fn resolve_latest(&self, module: &str) -> Result<String, ZanaError> {
        let output = self
            .shell
            .run(CommandSpec::new("go").args(["list", "-m", "-versions", module]))
            .await?;
        if !output.success() {
            return Err(ZanaError::SubprocessFailed {
                command: "go list -m -versions".to_string(),
                exit_code: Some(output.exit_code),
                stderr: output.stderr,
            });
        }
        output
            .stdout
            .split_whitespace()
            .last()
            .map(str::to_string)
            .ok_or_else(|| ZanaError::ParseFailed {
                what: format!("go list -m -versions {module}"),
                reason: "no versions listed".to_string(),
            })
    }
}

fn strip_prefix(source_id: &str) -> String {
    source_id.split_once(':').map(|(_, repo)| repo.to_string()).unwrap_or_else(|| source_id.to_string())
}

#[async_trait]
impl<S: ShellOut> Driver for GoDriver<S> {
    fn provider(&self) -> Provider {
        Provider::Golang
    }

    async fn install(&self, repo: &str, version: &str) -> bool {
        let source_id = SourceId::new(Provider::Golang, repo);
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.add(source_id.canonical(), version) {
                tracing::error!(module = repo, error = %err, "failed to record go module in lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn remove(&self, repo: &str) -> bool {
        let source_id = SourceId::new(Provider::Golang, repo);
        let item = self.registry.get_by_source_id(&source_id.canonical());
        let names: Vec<String> = if item.bin.is_empty() {
            vec![Self::basename(repo).to_string()]
        } else {
            item.bin.keys().cloned().collect()
        };
        for name in names {
            let path = self.bin_dir.entry_path(&name);
            if path.is_symlink() || path.exists() {
                if let Err(err) = fs_err::remove_file(&path) {
                    tracing::warn!(entry = name.as_str(), error = %err, "failed to remove bin entry during go remove");
                }
            }
        }
        {
            let mut lockfile = self.lockfile.lock().await;
            if let Err(err) = lockfile.remove(&source_id.canonical()) {
                tracing::error!(module = repo, error = %err, "failed to remove go module from lockfile");
                return false;
            }
        }
        self.sync().await
    }

    async fn update(&self, repo: &str) -> bool {
        match self.resolve_latest(repo).await {
            Ok(version) => self.install(repo, &version).await,
            Err(err) => {
                tracing::error!(module = repo, error = %err, "failed to resolve latest go version");
                false
            }
        }
    }

    async fn sync(&self) -> bool {
        match self.sync_inner().await {
            Ok(ok) => ok,
            Err(err) => {
                tracing::error!(error = %err, "go sync failed");
                false
            }
        }
    }

    async fn clean(&self) -> bool {
        if self.root.exists() {
            if let Err(source) = fs_err::remove_dir_all(&self.root) {
                tracing::error!(error = %source, "failed to clean go install area");
                return false;
            }
        }
        self.sync().await
    }
}
