//! Library interface for govm, a Go toolchain version manager.
//!
//! [`Govm`] is the entry point; the modules below are exposed for callers
//! that need a single piece (the release index client, the resolver, the
//! module cache) without the rest.

pub mod api;
pub mod cache;
pub mod config;
pub mod download;
pub mod env;
pub mod error;
pub mod extract;
pub mod manager;
pub mod module;
pub mod package;
pub mod paths;
pub mod platform;
pub mod progress;
pub mod receipt;
pub mod registry;
pub mod resolve;
pub mod version;

// Re-export commonly used types
pub use config::{Config, GoPathMode};
pub use env::{EnvStore, FileEnvStore, MemoryEnvStore, Shell};
pub use error::{GovmError, Result};
pub use manager::{Govm, GovmEvent, SwitchResult, SwitchState};
pub use paths::GovmPaths;
pub use progress::{DownloadProgress, InstallEvent, Phase};
pub use registry::{InstallHandle, InstallSource, InstalledVersion, VersionRegistry};
