//! The unified bin layer: the single `bin/` directory every driver exposes
//! its managed executables through, via one of two policies (symlink or
//! generated wrapper script).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use is_executable::IsExecutable;
use zana_error::ZanaError;

const WRAPPER_MARKER: &str = "# zana-target:";

/// The shared `bin/` directory. Every driver resolves entry paths through
/// this type rather than building `bin/<name>` strings by hand.
#[derive(Debug, Clone)]
pub struct BinDir(PathBuf);

impl BinDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn ensure(&self) -> Result<(), ZanaError> {
        fs_err::create_dir_all(&self.0).map_err(|source| ZanaError::BinLayerIo {
            path: self.0.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.0.join(exe_name(name))
    }

    /// Every entry this layer recognizes as managed (a symlink or a
    /// generated wrapper carrying [`WRAPPER_MARKER`]). Anything else in the
    /// directory — a file a user dropped in by hand — is left out, and the
    /// sweep step never touches it.
    pub fn managed_entries(&self) -> Result<Vec<GlobalExecutable>, ZanaError> {
        let mut out = Vec::new();
        let entries = match fs_err::read_dir(&self.0) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(source) => {
                return Err(ZanaError::BinLayerIo {
                    path: self.0.clone(),
                    source,
                });
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| ZanaError::BinLayerIo {
                path: self.0.clone(),
                source,
            })?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if path.is_symlink() {
                let target = fs_err::read_link(&path).map_err(|source| ZanaError::BinLayerIo {
                    path: path.clone(),
                    source,
                })?;
                let target = resolve_relative(&self.0, &target);
                out.push(GlobalExecutable::Symlink { name, target });
            } else if path.is_file() && path.is_executable() {
                if let Some(target) = read_wrapper_target(&path)? {
                    out.push(GlobalExecutable::Wrapper { name, target });
                }
            }
        }

        Ok(out)
    }
}

/// A managed `bin/` entry, tagged with how it exposes its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalExecutable {
    Symlink { name: String, target: PathBuf },
    Wrapper { name: String, target: PathBuf },
}

impl GlobalExecutable {
    pub fn name(&self) -> &str {
        match self {
            GlobalExecutable::Symlink { name, .. } => name,
            GlobalExecutable::Wrapper { name, .. } => name,
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            GlobalExecutable::Symlink { target, .. } => target,
            GlobalExecutable::Wrapper { target, .. } => target,
        }
    }
}

/// Expose `target` under `bin/name`, replacing whatever was there.
/// Prefers a relative symlink when `target` lives under `bin_dir`'s parent
/// tree; falls back to an absolute symlink otherwise. On platforms where
/// symlink creation is not permitted, falls back to copying the target
/// file in place.
pub fn expose_symlink(bin_dir: &BinDir, name: &str, target: &Path) -> Result<(), ZanaError> {
    bin_dir.ensure()?;
    let link_path = bin_dir.entry_path(name);
    remove_entry(&link_path)?;

    let link_target = relativize(bin_dir.path(), target).unwrap_or_else(|| target.to_path_buf());

    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(&link_target, &link_path).is_err() {
            fs_err::copy(target, &link_path).map_err(|source| ZanaError::BinLayerIo {
                path: link_path.clone(),
                source,
            })?;
        }
        chmod_executable(&link_path)?;
    }
    #[cfg(not(unix))]
    {
        if std::os::windows::fs::symlink_file(&link_target, &link_path).is_err() {
            fs_err::copy(target, &link_path).map_err(|source| ZanaError::BinLayerIo {
                path: link_path.clone(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Write a wrapper script under `bin/name` that prepends `site_packages` to
/// `PYTHONPATH` and execs `interpreter_script`. Regenerated unconditionally
/// on every call, per the wrapper policy's "regenerate every Sync" rule.
pub fn expose_wrapper(
    bin_dir: &BinDir,
    name: &str,
    site_packages: &Path,
    interpreter_script: &Path,
) -> Result<(), ZanaError> {
    bin_dir.ensure()?;
    let wrapper_path = bin_dir.entry_path(name);
    remove_entry(&wrapper_path)?;

    let script = format!(
        "#!/bin/sh\n{marker} {target}\nexport PYTHONPATH=\"{site_packages}:$PYTHONPATH\"\nexec \"{target}\" \"$@\"\n",
        marker = WRAPPER_MARKER,
        target = interpreter_script.display(),
        site_packages = site_packages.display(),
    );
    fs_err::write(&wrapper_path, script).map_err(|source| ZanaError::BinLayerIo {
        path: wrapper_path.clone(),
        source,
    })?;
    chmod_executable(&wrapper_path)?;

    Ok(())
}

/// Remove every managed entry whose target lives under `provider_root` and
/// whose name is not in `keep`. Only entries this layer recognizes as
/// managed are candidates; failures removing an individual entry are
/// logged and do not abort the sweep, matching the "recoverable errors are
/// logged, execution continues" propagation policy.
pub fn sweep_provider(
    bin_dir: &BinDir,
    provider_root: &Path,
    keep: &HashSet<String>,
) -> Result<Vec<String>, ZanaError> {
    let mut removed = Vec::new();
    for entry in bin_dir.managed_entries()? {
        if !entry.target().starts_with(provider_root) {
            continue;
        }
        if keep.contains(entry.name()) {
            continue;
        }
        let path = bin_dir.entry_path(entry.name());
        if let Err(err) = remove_entry(&path) {
            tracing::warn!(entry = entry.name(), error = %err, "failed to sweep stale bin entry");
            continue;
        }
        removed.push(entry.name().to_string());
    }
    Ok(removed)
}

fn remove_entry(path: &Path) -> Result<(), ZanaError> {
    if path.exists() || path.is_symlink() {
        fs_err::remove_file(path).map_err(|source| ZanaError::BinLayerIo {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn chmod_executable(path: &Path) -> Result<(), ZanaError> {
    use std::os::unix::fs::PermissionsExt;
    fs_err::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        ZanaError::BinLayerIo {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn chmod_executable(_path: &Path) -> Result<(), ZanaError> {
    Ok(())
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

fn resolve_relative(base: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        base.join(target)
    }
}

/// Best-effort relative path from `bin_dir` to `target`, via their longest
/// common ancestor. Returns `None` when they share no ancestor (distinct
/// Windows drives, for instance), in which case the caller falls back to
/// an absolute target.
fn relativize(bin_dir: &Path, target: &Path) -> Option<PathBuf> {
    let bin_components: Vec<_> = bin_dir.components().collect();
    let target_components: Vec<_> = target.components().collect();

    let common = bin_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..bin_components.len() {
        relative.push("..");
    }
    for component in &target_components[common..] {
        relative.push(component);
    }
    Some(relative)
}

fn read_wrapper_target(path: &Path) -> Result<Option<PathBuf>, ZanaError> {
    let contents = fs_err::read_to_string(path).map_err(|source| ZanaError::BinLayerIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents.lines().find_map(|line| {
        line.strip_prefix(WRAPPER_MARKER)
            .map(|rest| PathBuf::from(rest.trim()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expose_symlink_creates_executable_entry() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        let target_dir = dir.path().join("packages/npm/node_modules/eslint");
        fs_err::create_dir_all(&target_dir).unwrap();
        let target = target_dir.join("bin/eslint.js");
        fs_err::write(&target, "#!/usr/bin/env node\n").unwrap();

        expose_symlink(&bin, "eslint", &target).unwrap();

        let link = bin.entry_path("eslint");
        assert!(link.is_symlink());
        let entries = bin.managed_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "eslint");
    }

    #[test]
    fn expose_symlink_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs_err::write(&first, "old").unwrap();
        fs_err::write(&second, "new").unwrap();

        expose_symlink(&bin, "tool", &first).unwrap();
        expose_symlink(&bin, "tool", &second).unwrap();

        let resolved = fs_err::canonicalize(bin.entry_path("tool")).unwrap();
        assert_eq!(resolved, fs_err::canonicalize(&second).unwrap());
    }

    #[test]
    fn expose_wrapper_writes_executable_script_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        let interpreter_script = dir.path().join("packages/pypi/bin/black");
        let site_packages = dir.path().join("packages/pypi/lib/python3.12/site-packages");

        expose_wrapper(&bin, "black", &site_packages, &interpreter_script).unwrap();

        let script = fs_err::read_to_string(bin.entry_path("black")).unwrap();
        assert!(script.contains("PYTHONPATH"));
        assert!(script.contains(&interpreter_script.display().to_string()));

        let entries = bin.managed_entries().unwrap();
        assert_eq!(entries[0].target(), interpreter_script);
    }

    #[test]
    fn sweep_removes_only_stale_entries_owned_by_provider() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        let npm_root = dir.path().join("packages/npm");
        let cargo_root = dir.path().join("packages/cargo");
        fs_err::create_dir_all(&npm_root).unwrap();
        fs_err::create_dir_all(&cargo_root).unwrap();

        let eslint_target = npm_root.join("node_modules/eslint/bin/eslint.js");
        fs_err::create_dir_all(eslint_target.parent().unwrap()).unwrap();
        fs_err::write(&eslint_target, "x").unwrap();
        let rg_target = cargo_root.join("bin/rg");
        fs_err::create_dir_all(rg_target.parent().unwrap()).unwrap();
        fs_err::write(&rg_target, "x").unwrap();

        expose_symlink(&bin, "eslint", &eslint_target).unwrap();
        expose_symlink(&bin, "rg", &rg_target).unwrap();

        let removed = sweep_provider(&bin, &npm_root, &HashSet::new()).unwrap();

        assert_eq!(removed, vec!["eslint".to_string()]);
        assert!(!bin.entry_path("eslint").exists());
        assert!(bin.entry_path("rg").exists());
    }

    #[test]
    fn sweep_keeps_entries_still_desired() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        let npm_root = dir.path().join("packages/npm");
        let target = npm_root.join("node_modules/eslint/bin/eslint.js");
        fs_err::create_dir_all(target.parent().unwrap()).unwrap();
        fs_err::write(&target, "x").unwrap();
        expose_symlink(&bin, "eslint", &target).unwrap();

        let keep: HashSet<String> = ["eslint".to_string()].into_iter().collect();
        let removed = sweep_provider(&bin, &npm_root, &keep).unwrap();

        assert!(removed.is_empty());
        assert!(bin.entry_path("eslint").exists());
    }

    #[test]
    fn unmanaged_user_file_is_never_swept() {
        let dir = tempfile::tempdir().unwrap();
        let bin = BinDir::new(dir.path().join("bin"));
        bin.ensure().unwrap();
        let user_file = bin.entry_path("my-script");
        fs_err::write(&user_file, "#!/bin/sh\necho hi\n").unwrap();
        #[cfg(unix)]
        chmod_executable(&user_file).unwrap();

        let entries = bin.managed_entries().unwrap();
        assert!(entries.is_empty());

        let removed = sweep_provider(&bin, dir.path(), &HashSet::new()).unwrap();
        assert!(removed.is_empty());
        assert!(user_file.exists());
    }
}
