//! Typed error kinds shared across the Zana workspace.
//!
//! Every fallible operation in the core returns a [`ZanaError`] rather than
//! a bare `std::io::Error` or a boxed `dyn Error`, so that callers (and the
//! CLI's `miette` renderer) can distinguish *why* something failed, per the
//! error-kind table in the design's error handling section.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ZanaError {
    #[error("failed to read or write the lockfile at {path}")]
    #[diagnostic(code(zana::lockfile_io))]
    LockfileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the lockfile at {path} is not valid JSON")]
    #[diagnostic(code(zana::lockfile_parse), help("the lockfile appears corrupt; fix or delete it by hand before retrying"))]
    LockfileCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read the registry cache at {path}")]
    #[diagnostic(code(zana::registry_io))]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the registry cache at {path} is not valid JSON")]
    #[diagnostic(code(zana::registry_parse))]
    RegistryCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{command}` is not available on PATH")]
    #[diagnostic(
        code(zana::subprocess_missing),
        help("install {command} and make sure it is on PATH")
    )]
    SubprocessMissing { command: String },

    #[error("`{command}` exited with a non-zero status{}", exit_code.map(|c| format!(" ({c})")).unwrap_or_default())]
    #[diagnostic(code(zana::subprocess_failed))]
    SubprocessFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse {what}: {reason}")]
    #[diagnostic(code(zana::parse_failed))]
    ParseFailed { what: String, reason: String },

    #[error("unsupported provider `{provider}`")]
    #[diagnostic(code(zana::unsupported_provider))]
    UnsupportedProvider { provider: String },

    #[error("invalid package identifier `{identifier}`")]
    #[diagnostic(
        code(zana::invalid_identifier),
        help("expected `<provider>:<repo>` or the legacy `pkg:<provider>/<repo>` form")
    )]
    InvalidIdentifier { identifier: String },

    #[error("failed to update the unified bin directory at {path}")]
    #[diagnostic(code(zana::bin_layer_io))]
    BinLayerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read or write the {provider} install area at {path}")]
    #[diagnostic(code(zana::provider_io))]
    ProviderIo {
        provider: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ZanaResult<T> = Result<T, ZanaError>;
