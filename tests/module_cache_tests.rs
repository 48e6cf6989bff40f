// Module cache inspection, verification and cleanup through the Govm API,
// plus package search against a mock module proxy.


use govm::module::{VerifyStatus, escape_module_path, hash_dir};
use govm::{Govm, GovmError};
use std::fs;
use std::path::Path;
use test_helpers::*;

/// Lay out `module@version` the way `go mod download` does, read-only.
fn cache_module(root: &Path, module: &str, version: &str, files: &[(&str, &str)]) {
    let dir = root.join(format!("{}@{}", escape_module_path(module), version));
    for (name, contents) in files {
        let file = dir.join(name);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, contents).unwrap();
    }
    let hash = hash_dir(&dir, &format!("{}@{}", module, version)).unwrap();

    let dl = root
        .join("cache/download")
        .join(escape_module_path(module))
        .join("@v");
    fs::create_dir_all(&dl).unwrap();
    fs::write(dl.join(format!("{}.ziphash", version)), hash).unwrap();
    fs::write(dl.join(format!("{}.info", version)), "{}").unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for entry in walkdir::WalkDir::new(&dir).contents_first(true) {
            let entry = entry.unwrap();
            let mode = if entry.file_type().is_dir() { 0o555 } else { 0o444 };
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode)).unwrap();
        }
    }
}

async fn active_govm(env: &TestEnvironment) -> Govm {
    let govm = env.govm();
    let goroot = env.paths.versions_dir().join("1.22.0");
    fs::create_dir_all(goroot.join("bin")).unwrap();
    fs::write(goroot.join("bin").join(govm::platform::host_go_binary()), b"").unwrap();
    fs::write(goroot.join("VERSION"), "go1.22.0\n").unwrap();
    govm.use_version("1.22.0").await.unwrap();
    govm
}

#[tokio::test]
async fn test_list_stats_and_verify() {
    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    let cache = govm.module_cache_path();
    assert_eq!(cache, env.paths.gopath_root().join("1.22.0/pkg/mod"));

    cache_module(&cache, "github.com/BurntSushi/toml", "v1.3.2", &[("go.mod", "module x\n")]);
    cache_module(
        &cache,
        "golang.org/x/text",
        "v0.14.0",
        &[("go.mod", "module golang.org/x/text\n"), ("doc.go", "package text\n")],
    );

    let modules = govm.modules().unwrap();
    let names: Vec<_> = modules
        .iter()
        .map(|m| format!("{}@{}", m.path, m.version))
        .collect();
    assert_eq!(
        names,
        vec!["github.com/BurntSushi/toml@v1.3.2", "golang.org/x/text@v0.14.0"]
    );

    let stats = govm.module_stats().unwrap();
    assert_eq!(stats.total_modules, 2);
    assert!(stats.total_size > 0);

    let results = govm.verify_modules().unwrap();
    assert!(results.iter().all(|r| r.status == VerifyStatus::Ok));

    // Clean everything; read-only trees are removable
    govm.clean_module_cache().unwrap();
    assert!(!cache.exists());
    assert!(govm.modules().unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_tampered_module_fails_verification() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    let cache = govm.module_cache_path();
    cache_module(&cache, "example.com/lib", "v1.0.0", &[("lib.go", "package lib\n")]);

    let file = cache.join("example.com/lib@v1.0.0/lib.go");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
    fs::write(&file, "package lib // changed\n").unwrap();

    let results = govm.verify_modules().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, VerifyStatus::Mismatch);

    govm.clean_module_cache().unwrap();
}

#[tokio::test]
async fn test_clean_single_module() {
    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    let cache = govm.module_cache_path();
    cache_module(&cache, "example.com/a", "v1.0.0", &[("a.go", "package a\n")]);
    cache_module(&cache, "example.com/a", "v1.1.0", &[("a.go", "package a\n")]);

    govm.clean_module("example.com/a", "v1.0.0").unwrap();

    let left: Vec<_> = govm.modules().unwrap().into_iter().map(|m| m.version).collect();
    assert_eq!(left, vec!["v1.1.0"]);
    assert!(!cache.join("cache/download/example.com/a/@v/v1.0.0.ziphash").exists());

    assert!(matches!(
        govm.clean_module("example.com/a", "v9.9.9"),
        Err(GovmError::NotFound(_))
    ));

    govm.clean_module_cache().unwrap();
}

#[tokio::test]
async fn test_each_version_has_its_own_cache() {
    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    cache_module(
        &govm.module_cache_path(),
        "example.com/only",
        "v0.1.0",
        &[("x.go", "package x\n")],
    );

    let other = env.paths.versions_dir().join("1.21.0");
    fs::create_dir_all(other.join("bin")).unwrap();
    fs::write(other.join("bin").join(govm::platform::host_go_binary()), b"").unwrap();
    fs::write(other.join("VERSION"), "go1.21.0\n").unwrap();
    govm.use_version("1.21.0").await.unwrap();
    assert!(govm.modules().unwrap().is_empty());

    govm.use_version("1.22.0").await.unwrap();
    assert_eq!(govm.modules().unwrap().len(), 1);
    govm.clean_module_cache().unwrap();
}

#[tokio::test]
async fn test_search_uses_configured_proxy() {
    let env = TestEnvironment::new();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/github.com/!burnt!sushi/toml/@latest")
        .with_status(200)
        .with_body(r#"{"Version":"v1.3.2","Time":"2023-06-08T06:12:23Z"}"#)
        .create_async()
        .await;
    for path in ["/example.com/missing/@latest", "/example.com/@latest"] {
        server.mock("GET", path).with_status(404).create_async().await;
    }

    let govm = env.govm();
    govm.set_goproxy(&format!("{},direct", server.url())).unwrap();
    // Keep the local half of the search inside the test directory
    govm.set_shared_gopath(&env.dir("gopath").to_string_lossy()).unwrap();

    let results = govm.search_packages("github.com/BurntSushi/toml").await.unwrap();
    assert_eq!(results[0].path, "github.com/BurntSushi/toml");
    assert_eq!(results[0].version, "v1.3.2");

    let err = govm.search_packages("example.com/missing").await.unwrap_err();
    assert!(matches!(err, GovmError::PackageNotFound(_)));
}

#[tokio::test]
async fn test_search_includes_local_cache_hits() {
    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    cache_module(
        &govm.module_cache_path(),
        "example.com/local/widgets",
        "v0.3.0",
        &[("w.go", "package widgets\n")],
    );

    // Not a module path, so only the local cache is consulted
    let results = govm.search_packages("local/widgets").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, "example.com/local/widgets");
    assert_eq!(results[0].version, "v0.3.0");

    govm.clean_module_cache().unwrap();
}

#[tokio::test]
async fn test_clean_module_rejects_paths_outside_cache() {
    let env = TestEnvironment::new();
    let govm = active_govm(&env).await;
    cache_module(&govm.module_cache_path(), "example.com/a", "v1.0.0", &[("a.go", "package a\n")]);
    let outside = env.dir("precious@data");
    fs::write(outside.join("notes.txt"), "keep").unwrap();

    let err = govm.clean_module("../../../../../precious", "data").unwrap_err();
    assert!(matches!(err, GovmError::Parse { .. }));
    assert!(outside.join("notes.txt").is_file());
    assert_eq!(govm.modules().unwrap().len(), 1);

    govm.clean_module_cache().unwrap();
}

#[tokio::test]
async fn test_package_commands_need_active_version() {
    let env = TestEnvironment::new();
    let govm = env.govm();
    assert!(govm.get_package("example.com/a", "").await.is_err());
    assert!(govm.install_package("example.com/a/cmd/a").await.is_err());
}
