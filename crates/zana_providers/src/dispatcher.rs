//! Stateless dispatch: given a package identifier or a provider, resolve
//! the right driver and forward the operation, aggregating outcomes for
//! bulk commands.
//!
//! Carries an explicit [`DispatcherConfig`] record rather than the
//! module-level mutable globals the source material used for "first run /
//! registry URL override" state — the §9 redesign flag this rewrite
//! resolves.

use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use tokio::sync::Mutex;

use zana_bin::BinDir;
use zana_error::ZanaError;
use zana_lockfile::Lockfile;
use zana_paths::ZanaHome;
use zana_process::ShellOut;
use zana_registry::RegistryCache;

use crate::cargo::CargoDriver;
use crate::go::GoDriver;
use crate::npm::NpmDriver;
use crate::pypi::PypiDriver;
use crate::{Driver, Provider, SourceId};

/// Non-functional settings threaded through every driver constructor,
/// resolved once at startup rather than read from ambient globals.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub registry_url_override: Option<String>,
    pub force_registry_refresh: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            registry_url_override: None,
            force_registry_refresh: false,
        }
    }
}

/// One driver per provider, built once per process from shared
/// collaborators (shell, lockfile, registry, bin directory).
pub struct Dispatcher {
    drivers: IndexMap<Provider, Arc<dyn Driver>>,
    lockfile: Arc<Mutex<Lockfile>>,
}

impl Dispatcher {
    pub fn new<S: ShellOut + 'static>(
        shell: Arc<S>,
        home: &ZanaHome,
        registry: Arc<RegistryCache>,
        config: &DispatcherConfig,
    ) -> Result<Self, ZanaError> {
        let lockfile = Arc::new(Mutex::new(Lockfile::load(home.lockfile_path())?));
        let bin_dir = Arc::new(BinDir::new(home.bin_dir()));

        let _ = &config.registry_url_override; // consumed by the boot collaborator, kept here for display/debugging
        if config.force_registry_refresh {
            registry.refresh(true)?;
        }

        let mut drivers: IndexMap<Provider, Arc<dyn Driver>> = IndexMap::new();
        drivers.insert(
            Provider::Npm,
            Arc::new(NpmDriver::new(shell.clone(), lockfile.clone(), registry.clone(), bin_dir.clone(), home.provider_dir(Provider::Npm.prefix()))),
        );
        drivers.insert(
            Provider::PyPi,
            Arc::new(PypiDriver::new(shell.clone(), lockfile.clone(), registry.clone(), bin_dir.clone(), home.provider_dir(Provider::PyPi.prefix()))),
        );
        drivers.insert(
            Provider::Golang,
            Arc::new(GoDriver::new(shell.clone(), lockfile.clone(), registry.clone(), bin_dir.clone(), home.provider_dir(Provider::Golang.prefix()))),
        );
        drivers.insert(
            Provider::Cargo,
            Arc::new(CargoDriver::new(shell, lockfile.clone(), registry, bin_dir, home.provider_dir(Provider::Cargo.prefix()))),
        );

        Ok(Self { drivers, lockfile })
    }

    fn driver_for(&self, provider: Provider) -> Result<&Arc<dyn Driver>, ZanaError> {
        self.drivers.get(&provider).ok_or(ZanaError::UnsupportedProvider {
            provider: provider.to_string(),
        })
    }

    pub async fn install(&self, identifier: &str, version: &str) -> Result<bool, ZanaError> {
        let source_id = SourceId::parse(identifier)?;
        let driver = self.driver_for(source_id.provider())?;
        Ok(driver.install(source_id.repo(), version).await)
    }

    pub async fn remove(&self, identifier: &str) -> Result<bool, ZanaError> {
        let source_id = SourceId::parse(identifier)?;
        let driver = self.driver_for(source_id.provider())?;
        Ok(driver.remove(source_id.repo()).await)
    }

    pub async fn update(&self, identifier: &str) -> Result<bool, ZanaError> {
        let source_id = SourceId::parse(identifier)?;
        let driver = self.driver_for(source_id.provider())?;
        Ok(driver.update(source_id.repo()).await)
    }

    pub async fn sync_provider(&self, provider: Provider) -> Result<bool, ZanaError> {
        Ok(self.driver_for(provider)?.sync().await)
    }

    pub async fn clean(&self, provider: Provider) -> Result<bool, ZanaError> {
        Ok(self.driver_for(provider)?.clean().await)
    }

    /// Run `Sync` across every provider, in a fixed order, aggregating a
    /// report rather than short-circuiting on the first failure.
    pub async fn sync_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for provider in Provider::ALL {
            let Ok(driver) = self.driver_for(provider) else { continue };
            if driver.sync().await {
                report.succeeded.push(provider.to_string());
            } else {
                report.failed.push(provider.to_string());
            }
        }
        report
    }

    /// `update --all [provider]`: re-resolves and upgrades every lockfile
    /// entry, optionally restricted to one provider.
    pub async fn update_all(&self, provider_filter: Option<Provider>) -> SyncReport {
        let ids = self.desired_identifiers(provider_filter).await;
        let mut report = SyncReport::default();
        for id in ids {
            match self.update(&id).await {
                Ok(true) => report.succeeded.push(id),
                _ => report.failed.push(id),
            }
        }
        report
    }

    /// `remove --all [provider]`: removes every matching lockfile entry.
    pub async fn remove_all(&self, provider_filter: Option<Provider>) -> SyncReport {
        let ids = self.desired_identifiers(provider_filter).await;
        let mut report = SyncReport::default();
        for id in ids {
            match self.remove(&id).await {
                Ok(true) => report.succeeded.push(id),
                _ => report.failed.push(id),
            }
        }
        report
    }

    async fn desired_identifiers(&self, provider_filter: Option<Provider>) -> Vec<String> {
        let lockfile = self.lockfile.lock().await;
        match provider_filter {
            Some(provider) => lockfile.get_by_provider(provider.prefix()).into_iter().map(|pkg| pkg.source_id.clone()).collect(),
            None => lockfile.get_all().into_iter().map(|pkg| pkg.source_id.clone()).collect(),
        }
    }
}

/// Aggregated outcome of a bulk operation: which identifiers (or provider
/// names, for `sync_all`) succeeded and which failed.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncReport {
    pub fn ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Render a per-entry pass/fail line plus a final summary.
    pub fn report(&self) -> String {
        let entries = self
            .succeeded
            .iter()
            .map(|name| format!("{} {}", zana_consts::PACKAGE_STYLE.apply_to("✓"), name))
            .chain(self.failed.iter().map(|name| format!("{} {}", zana_consts::ERROR_STYLE.apply_to("✗"), name)))
            .join("\n");
        format!("{entries}\n{} succeeded, {} failed", self.succeeded.len(), self.failed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zana_process::fake::FakeShell;

    #[tokio::test]
    async fn unsupported_provider_short_circuits_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let home = ZanaHome::at(dir.path());
        let shell = Arc::new(FakeShell::new());
        let registry = Arc::new(RegistryCache::new(home.registry_cache_path()));
        let dispatcher = Dispatcher::new(shell, &home, registry, &DispatcherConfig::default()).unwrap();

        let err = dispatcher.install("brew:numpy", "1.0").await.unwrap_err();
        assert!(matches!(err, ZanaError::UnsupportedProvider { .. }));
        assert!(!home.lockfile_path().exists());
    }

    #[tokio::test]
    async fn invalid_identifier_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let home = ZanaHome::at(dir.path());
        let shell = Arc::new(FakeShell::new());
        let registry = Arc::new(RegistryCache::new(home.registry_cache_path()));
        let dispatcher = Dispatcher::new(shell, &home, registry, &DispatcherConfig::default()).unwrap();

        let err = dispatcher.install("eslint", "9.0.0").await.unwrap_err();
        assert!(matches!(err, ZanaError::InvalidIdentifier { .. }));
    }

    #[tokio::test]
    async fn sync_all_with_empty_lockfile_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let home = ZanaHome::at(dir.path());
        let shell = Arc::new(FakeShell::new());
        let registry = Arc::new(RegistryCache::new(home.registry_cache_path()));
        let dispatcher = Dispatcher::new(shell.clone(), &home, registry, &DispatcherConfig::default()).unwrap();

        let report = dispatcher.sync_all().await;
        assert!(report.ok());
        assert_eq!(report.succeeded.len(), 4);
        assert!(shell.calls().is_empty(), "an empty lockfile should run no subprocesses at all");
    }
}
