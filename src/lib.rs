//! Zana: a cross-platform package manager for developer tools (LSP
//! servers, DAP servers, formatters, linters) backed by npm, PyPI, Go, and
//! Cargo.

pub mod cli;
