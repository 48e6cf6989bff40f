//! Package lookup against a Go module proxy, and fetching through the active
//! toolchain's `go` command.
//!
//! Proxy endpoints used:
//! - `/{module}/@latest` - latest version info
//! - `/{module}/@v/list` - all known versions
//! - `/{module}/@v/{version}.info` - metadata of one version
//!
//! Module paths are case-escaped (`!` + lowercase) in URLs.

use crate::api::http_client;
use crate::error::{GovmError, Result};
use crate::module::{ModuleInfo, escape_module_path};
use crate::platform::host_go_binary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_MODULE_PATH_LENGTH: usize = 500;
const MAX_VERSION_LENGTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub path: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "Version")]
    version: String,
}

pub(crate) fn validate_module_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(GovmError::parse("module path", "module path is empty"));
    }
    if path.len() > MAX_MODULE_PATH_LENGTH {
        return Err(GovmError::parse(
            "module path",
            format!("exceeds {} characters", MAX_MODULE_PATH_LENGTH),
        ));
    }
    if path.contains(char::is_whitespace)
        || path.contains("..")
        || path.contains('\\')
        || path.starts_with('/')
    {
        return Err(GovmError::parse(
            "module path",
            format!("'{}' is not a module path", path),
        ));
    }
    Ok(())
}

pub(crate) fn validate_version(version: &str) -> Result<()> {
    if version.is_empty()
        || version.len() > MAX_VERSION_LENGTH
        || version.contains("..")
        || version.contains('/')
        || version.contains('\\')
    {
        return Err(GovmError::parse(
            "module version",
            format!("'{}' is not a version", version),
        ));
    }
    Ok(())
}

/// Split `path@version`; the version is `None` when absent.
pub fn split_module_query(query: &str) -> (&str, Option<&str>) {
    match query.rsplit_once('@') {
        Some((path, version)) if !version.is_empty() => (path, Some(version)),
        Some((path, _)) => (path, None),
        None => (query, None),
    }
}

/// Client for a Go module proxy, with lookups cached in memory for the
/// lifetime of the client.
#[derive(Clone)]
pub struct ModuleProxy {
    client: reqwest::Client,
    base: String,
    latest_cache: moka::future::Cache<String, String>,
}

impl ModuleProxy {
    /// `base` is a single proxy URL such as `https://proxy.golang.org`.
    pub fn new(base: &str, http_proxy: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(http_proxy, REQUEST_TIMEOUT)?,
            base: base.trim_end_matches('/').to_string(),
            latest_cache: moka::future::Cache::new(500),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get(&self, module_path: &str, endpoint: &str) -> Result<String> {
        let url = format!("{}/{}/{}", self.base, escape_module_path(module_path), endpoint);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GovmError::Network(format!("Failed to reach {}: {}", self.base, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(GovmError::PackageNotFound(module_path.to_string()));
        }
        if !status.is_success() {
            return Err(GovmError::Network(format!("{} returned HTTP {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| GovmError::Network(format!("Failed to read {}: {}", url, e)))
    }

    /// Latest version of a module.
    pub async fn latest(&self, module_path: &str) -> Result<String> {
        validate_module_path(module_path)?;
        if let Some(cached) = self.latest_cache.get(module_path).await {
            return Ok(cached);
        }

        let body = self.get(module_path, "@latest").await?;
        let info: VersionInfo = serde_json::from_str(&body)
            .map_err(|e| GovmError::parse(format!("{}@latest", module_path), e))?;

        self.latest_cache
            .insert(module_path.to_string(), info.version.clone())
            .await;
        Ok(info.version)
    }

    /// Known versions of a module in proxy order.
    pub async fn versions(&self, module_path: &str) -> Result<Vec<String>> {
        validate_module_path(module_path)?;
        let body = self.get(module_path, "@v/list").await?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Canonical form of `version` if the proxy knows it.
    pub async fn version_info(&self, module_path: &str, version: &str) -> Result<String> {
        validate_module_path(module_path)?;
        validate_version(version)?;
        let body = self.get(module_path, &format!("@v/{}.info", version)).await?;
        let info: VersionInfo = serde_json::from_str(&body)
            .map_err(|e| GovmError::parse(format!("{}@{}", module_path, version), e))?;
        Ok(info.version)
    }

    /// Find the module providing `package_path` by trying it and then each
    /// parent path, longest first. Returns `(module path, latest version)`.
    pub async fn find_module(&self, package_path: &str) -> Result<(String, String)> {
        validate_module_path(package_path)?;
        let mut candidate = package_path;
        loop {
            match self.latest(candidate).await {
                Ok(version) => return Ok((candidate.to_string(), version)),
                Err(GovmError::PackageNotFound(_)) => match candidate.rsplit_once('/') {
                    Some((parent, _)) if parent.contains('/') || parent.contains('.') => {
                        candidate = parent
                    }
                    _ => return Err(GovmError::PackageNotFound(package_path.to_string())),
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Modules matching `query`: cached ones whose path contains it, plus the
    /// proxy's latest version when `query` is itself a module path.
    pub async fn search(&self, query: &str, local: &[ModuleInfo]) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let mut results: Vec<SearchResult> = local
            .iter()
            .filter(|m| m.path.contains(query))
            .map(|m| SearchResult {
                path: m.path.clone(),
                version: m.version.clone(),
                description: "in module cache".to_string(),
            })
            .collect();

        if looks_like_module_path(query) {
            match self.find_module(query).await {
                Ok((path, version)) => results.insert(
                    0,
                    SearchResult {
                        path,
                        version,
                        description: format!("latest on {}", self.base),
                    },
                ),
                Err(GovmError::PackageNotFound(_)) if !results.is_empty() => {}
                Err(e) => return Err(e),
            }
        } else if results.is_empty() {
            return Err(GovmError::PackageNotFound(query.to_string()));
        }

        Ok(results)
    }
}

/// Module paths start with a domain-like element (`github.com/...`).
fn looks_like_module_path(query: &str) -> bool {
    let first = query.split('/').next().unwrap_or_default();
    first.contains('.') && !query.contains(char::is_whitespace)
}

/// A `go` invocation against a specific toolchain and GOPATH.
#[derive(Debug, Clone)]
pub struct GoCommand {
    go: PathBuf,
    goroot: PathBuf,
    envs: Vec<(String, String)>,
}

impl GoCommand {
    pub fn new(goroot: &Path) -> Self {
        Self {
            go: goroot.join("bin").join(host_go_binary()),
            goroot: goroot.to_path_buf(),
            envs: Vec::new(),
        }
    }

    pub fn env(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn is_available(&self) -> bool {
        self.go.is_file()
    }

    /// Run `go <args>` and return stdout.
    ///
    /// A failure mentioning a missing module or version is reported as
    /// [`GovmError::PackageNotFound`] for `target`.
    pub async fn run(&self, args: &[&str], target: &str) -> Result<String> {
        if !self.is_available() {
            return Err(GovmError::NotFound(format!(
                "go binary at {}",
                self.go.display()
            )));
        }

        debug!("Running {} {}", self.go.display(), args.join(" "));
        let output = tokio::process::Command::new(&self.go)
            .args(args)
            .env("GOROOT", &self.goroot)
            .env("GOFLAGS", "-mod=mod")
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if ["404 Not Found", "410 Gone", "no matching versions", "unknown revision", "not found"]
            .iter()
            .any(|needle| stderr.contains(needle))
        {
            return Err(GovmError::PackageNotFound(target.to_string()));
        }
        Err(anyhow::anyhow!("go {} failed: {}", args.join(" "), stderr).into())
    }
}

/// Download `module_path@version` (latest when `version` is empty) into the
/// module cache. Returns the fetched `path@version`.
pub async fn get_package(
    proxy: &ModuleProxy,
    go: &GoCommand,
    module_path: &str,
    version: &str,
) -> Result<String> {
    let version = if version.trim().is_empty() {
        proxy.latest(module_path).await?
    } else {
        proxy.version_info(module_path, version.trim()).await?
    };
    let target = format!("{}@{}", module_path, version);

    go.run(&["mod", "download", "-json", &target], &target).await?;
    info!("Downloaded {}", target);
    Ok(target)
}

/// `go install` a package (`path` or `path@version`) into GOPATH/bin.
pub async fn install_package(proxy: &ModuleProxy, go: &GoCommand, query: &str) -> Result<String> {
    let (path, version) = split_module_query(query.trim());
    let version = match version {
        Some(v) => v.to_string(),
        None => proxy.find_module(path).await?.1,
    };
    let target = format!("{}@{}", path, version);

    go.run(&["install", &target], &target).await?;
    info!("Installed {}", target);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(path: &str, version: &str) -> ModuleInfo {
        ModuleInfo {
            path: path.to_string(),
            version: version.to_string(),
            size: 0,
            dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_split_module_query() {
        assert_eq!(split_module_query("golang.org/x/tools@v0.1.0"), ("golang.org/x/tools", Some("v0.1.0")));
        assert_eq!(split_module_query("golang.org/x/tools"), ("golang.org/x/tools", None));
        assert_eq!(split_module_query("golang.org/x/tools@"), ("golang.org/x/tools", None));
    }

    #[test]
    fn test_validation() {
        assert!(validate_module_path("").is_err());
        assert!(validate_module_path("../etc/passwd").is_err());
        assert!(validate_version("v1.0.0/../../x").is_err());
        assert!(validate_version("v1.2.3").is_ok());
    }

    #[tokio::test]
    async fn test_latest_is_escaped_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/github.com/!burnt!sushi/toml/@latest")
            .with_status(200)
            .with_body(r#"{"Version":"v1.3.2","Time":"2023-06-08T06:13:13Z"}"#)
            .expect(1)
            .create_async()
            .await;

        let proxy = ModuleProxy::new(&server.url(), "").unwrap();
        assert_eq!(proxy.latest("github.com/BurntSushi/toml").await.unwrap(), "v1.3.2");
        assert_eq!(proxy.latest("github.com/BurntSushi/toml").await.unwrap(), "v1.3.2");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_and_gone() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/example.com/missing/@v/list")
            .with_status(404)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/example.com/retracted/@v/list")
            .with_status(410)
            .create_async()
            .await;
        let _c = server
            .mock("GET", "/example.com/broken/@v/list")
            .with_status(500)
            .create_async()
            .await;

        let proxy = ModuleProxy::new(&server.url(), "").unwrap();
        assert!(matches!(
            proxy.versions("example.com/missing").await,
            Err(GovmError::PackageNotFound(_))
        ));
        assert!(matches!(
            proxy.versions("example.com/retracted").await,
            Err(GovmError::PackageNotFound(_))
        ));
        assert!(matches!(
            proxy.versions("example.com/broken").await,
            Err(GovmError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_find_module_walks_up_to_module_root() {
        let mut server = mockito::Server::new_async().await;
        let _sub = server
            .mock("GET", "/golang.org/x/tools/cmd/goimports/@latest")
            .with_status(404)
            .create_async()
            .await;
        let _cmd = server
            .mock("GET", "/golang.org/x/tools/cmd/@latest")
            .with_status(404)
            .create_async()
            .await;
        let _root = server
            .mock("GET", "/golang.org/x/tools/@latest")
            .with_status(200)
            .with_body(r#"{"Version":"v0.20.0"}"#)
            .create_async()
            .await;

        let proxy = ModuleProxy::new(&server.url(), "").unwrap();
        let (module, version) = proxy.find_module("golang.org/x/tools/cmd/goimports").await.unwrap();
        assert_eq!(module, "golang.org/x/tools");
        assert_eq!(version, "v0.20.0");
    }

    #[tokio::test]
    async fn test_search_merges_cache_and_proxy() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/golang.org/x/text/@latest")
            .with_status(200)
            .with_body(r#"{"Version":"v0.15.0"}"#)
            .create_async()
            .await;

        let proxy = ModuleProxy::new(&server.url(), "").unwrap();
        let cached = vec![local("golang.org/x/text", "v0.14.0"), local("github.com/a/b", "v1.0.0")];

        let results = proxy.search("golang.org/x/text", &cached).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].version, "v0.15.0");
        assert_eq!(results[1].version, "v0.14.0");

        let results = proxy.search("a/b", &cached).await.unwrap();
        assert_eq!(results.len(), 1);

        assert!(matches!(
            proxy.search("nothing here", &cached).await,
            Err(GovmError::PackageNotFound(_))
        ));
    }

    #[cfg(unix)]
    fn fake_go(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let goroot = dir.join("go");
        std::fs::create_dir_all(goroot.join("bin")).unwrap();
        let go = goroot.join("bin/go");
        std::fs::write(&go, script).unwrap();
        std::fs::set_permissions(&go, std::fs::Permissions::from_mode(0o755)).unwrap();
        goroot
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_go_command_passes_environment() {
        let dir = tempfile::tempdir().unwrap();
        let goroot = fake_go(dir.path(), "#!/bin/sh\necho \"$GOPATH $GOPROXY $*\"\n");

        let out = GoCommand::new(&goroot)
            .env("GOPATH", "/gp")
            .env("GOPROXY", "off")
            .run(&["mod", "download", "x@v1"], "x@v1")
            .await
            .unwrap();
        assert_eq!(out.trim(), "/gp off mod download x@v1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_go_command_maps_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let goroot = fake_go(
            dir.path(),
            "#!/bin/sh\necho 'go: example.com/x@v9.9.9: reading https://proxy/x/@v/v9.9.9.info: 404 Not Found' >&2\nexit 1\n",
        );

        let err = GoCommand::new(&goroot)
            .run(&["mod", "download", "example.com/x@v9.9.9"], "example.com/x@v9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, GovmError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_go_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = GoCommand::new(dir.path()).run(&["version"], "go").await.unwrap_err();
        assert!(matches!(err, GovmError::NotFound(_)));
    }
}
