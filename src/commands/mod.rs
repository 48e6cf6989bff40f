//! Command implementations for the govm CLI
//!
//! - **versions**: install, uninstall, list and switch Go versions
//! - **env**: inspect and repair GOROOT, GOPATH, GOPROXY and PATH
//! - **cache**: archive download cache
//! - **modules**: module cache and `go get` / `go install` wrappers
//! - **config**: persisted settings
//! - **system**: platform info and shell completions
//! - **utils**: shared output helpers (internal)

pub mod cache;
pub mod config;
pub mod env;
pub mod modules;
pub mod system;
pub mod versions;
pub(crate) mod utils;

pub use versions::{current, install, latest, list, list_remote, register, uninstall, use_version};
