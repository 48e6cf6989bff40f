//! Module cache and package commands

use super::utils::{print_json, spinner};
use anyhow::{Result, bail};
use colored::Colorize;
use govm::Govm;
use govm::cache::format_size;
use govm::module::VerifyStatus;
use govm::package::split_module_query;

pub fn list(govm: &Govm, json: bool) -> Result<()> {
    let modules = govm.modules()?;
    if json {
        return print_json(&modules);
    }
    if modules.is_empty() {
        println!("Module cache is empty");
        return Ok(());
    }
    for m in &modules {
        println!(
            "{}@{} {}",
            m.path.bold(),
            m.version,
            format_size(m.size).dimmed()
        );
    }
    Ok(())
}

pub fn stats(govm: &Govm, json: bool) -> Result<()> {
    let stats = govm.module_stats()?;
    if json {
        return print_json(&stats);
    }
    println!("{} {}", "Module cache:".bold(), stats.cache_path.display());
    println!("  Modules    {}", stats.total_modules);
    println!("  Size       {}", stats.total_size_str);
    Ok(())
}

pub fn path(govm: &Govm) -> Result<()> {
    println!("GOPATH     {}", govm.current_gopath().display());
    println!("GOMODCACHE {}", govm.module_cache_path().display());
    Ok(())
}

pub fn clean(govm: &Govm) -> Result<()> {
    let cache = govm.module_cache_path();
    govm.clean_module_cache()?;
    println!(
        "{} Cleaned module cache {}",
        "✓".green(),
        cache.display().to_string().dimmed()
    );
    Ok(())
}

/// `target` is `path@version`.
pub fn clean_module(govm: &Govm, target: &str) -> Result<()> {
    let (path, Some(version)) = split_module_query(target) else {
        bail!("Expected <module>@<version>, got '{}'", target);
    };
    govm.clean_module(path, version)?;
    println!("{} Removed {}@{}", "✓".green(), path.bold(), version);
    Ok(())
}

pub fn verify(govm: &Govm, json: bool) -> Result<()> {
    let pb = spinner("Verifying module cache...");
    let results = govm.verify_modules();
    pb.finish_and_clear();
    let results = results?;

    if json {
        return print_json(&results);
    }

    let mut bad = 0;
    for r in &results {
        let symbol = match r.status {
            VerifyStatus::Ok => "✓".green(),
            VerifyStatus::Mismatch => {
                bad += 1;
                "✗".red()
            }
            VerifyStatus::Missing => "?".yellow(),
        };
        println!("{} {}@{} {}", symbol, r.module.bold(), r.version, r.message.dimmed());
    }

    if bad > 0 {
        bail!("{} module(s) failed verification", bad);
    }
    println!("{} {} module(s) checked", "✓".green(), results.len());
    Ok(())
}

pub async fn search(govm: &Govm, query: &str, json: bool) -> Result<()> {
    let pb = spinner(format!("Searching for '{}'...", query));
    let results = govm.search_packages(query).await;
    pb.finish_and_clear();
    let results = results?;

    if json {
        return print_json(&results);
    }
    for r in &results {
        println!(
            "{} {} {}",
            r.path.bold(),
            r.version.green(),
            format!("({})", r.description).dimmed()
        );
    }
    Ok(())
}

/// `target` is `path` or `path@version`.
pub async fn get(govm: &Govm, target: &str) -> Result<()> {
    let (path, version) = split_module_query(target);
    let pb = spinner(format!("Downloading {}...", target));
    let fetched = govm.get_package(path, version.unwrap_or_default()).await;
    pb.finish_and_clear();
    println!("{} Downloaded {}", "✓".green(), fetched?.bold());
    Ok(())
}

pub async fn install(govm: &Govm, target: &str) -> Result<()> {
    let pb = spinner(format!("Installing {}...", target));
    let installed = govm.install_package(target).await;
    pb.finish_and_clear();
    println!("{} Installed {}", "✓".green(), installed?.bold());
    Ok(())
}
