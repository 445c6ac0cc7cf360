//! Provider driver contract, the four ecosystem drivers, and the
//! dispatcher that selects between them by source-ID prefix.

pub mod cargo;
pub mod dispatcher;
pub mod go;
pub mod npm;
pub mod pypi;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use zana_error::ZanaError;

/// The closed set of ecosystems a source ID can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Npm,
    PyPi,
    Golang,
    Cargo,
}

impl Provider {
    pub fn prefix(self) -> &'static str {
        match self {
            Provider::Npm => "npm",
            Provider::PyPi => "pypi",
            Provider::Golang => "golang",
            Provider::Cargo => "cargo",
        }
    }

    pub const ALL: [Provider; 4] = [Provider::Npm, Provider::PyPi, Provider::Golang, Provider::Cargo];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Provider {
    type Err = ZanaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(Provider::Npm),
            "pypi" => Ok(Provider::PyPi),
            "golang" => Ok(Provider::Golang),
            "cargo" => Ok(Provider::Cargo),
            other => Err(ZanaError::UnsupportedProvider {
                provider: other.to_string(),
            }),
        }
    }
}

/// A parsed, normalized `<provider>:<repo>` package identifier. Also
/// accepts the legacy `pkg:<provider>/<repo>` form on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    provider: Provider,
    repo: String,
}

impl SourceId {
    pub fn new(provider: Provider, repo: impl Into<String>) -> Self {
        Self {
            provider,
            repo: repo.into(),
        }
    }

    /// Parse `<provider>:<repo>` or the legacy `pkg:<provider>/<repo>` form.
    pub fn parse(raw: &str) -> Result<Self, ZanaError> {
        if let Some(rest) = raw.strip_prefix(zana_consts::LEGACY_PKG_PREFIX) {
            let (provider, repo) = rest.split_once('/').ok_or_else(|| ZanaError::InvalidIdentifier {
                identifier: raw.to_string(),
            })?;
            return Ok(Self {
                provider: provider.parse()?,
                repo: repo.to_string(),
            });
        }

        let (provider, repo) = raw.split_once(':').ok_or_else(|| ZanaError::InvalidIdentifier {
            identifier: raw.to_string(),
        })?;
        Ok(Self {
            provider: provider.parse()?,
            repo: repo.to_string(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The canonical `<provider>:<repo>` string, as stored in the lockfile.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.provider.prefix(), self.repo)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// The uniform contract every driver implements. The dispatcher depends
/// only on this trait, never on a concrete driver type — one variant per
/// ecosystem, no shared base class (§9 "Provider polymorphism").
///
/// Every method reports failure as `false` rather than an `Err`: a failed
/// package in a bulk `Sync` must not abort the packages after it, and the
/// dispatcher aggregates booleans rather than short-circuiting on the
/// first error.
#[async_trait]
pub trait Driver: Send + Sync {
    fn provider(&self) -> Provider;
    async fn install(&self, repo: &str, version: &str) -> bool;
    async fn remove(&self, repo: &str) -> bool;
    async fn update(&self, repo: &str) -> bool;
    async fn sync(&self) -> bool;
    async fn clean(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let id = SourceId::parse("npm:eslint").unwrap();
        assert_eq!(id.provider(), Provider::Npm);
        assert_eq!(id.repo(), "eslint");
        assert_eq!(id.canonical(), "npm:eslint");
    }

    #[test]
    fn normalizes_legacy_form() {
        let id = SourceId::parse("pkg:golang/github.com/x/y").unwrap();
        assert_eq!(id.provider(), Provider::Golang);
        assert_eq!(id.repo(), "github.com/x/y");
        assert_eq!(id.canonical(), "golang:github.com/x/y");
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = SourceId::parse("brew:numpy").unwrap_err();
        assert!(matches!(err, ZanaError::UnsupportedProvider { .. }));
    }

    #[test]
    fn rejects_malformed_identifier() {
        let err = SourceId::parse("eslint").unwrap_err();
        assert!(matches!(err, ZanaError::InvalidIdentifier { .. }));
    }
}
