//! Installing, listing and switching Go versions

use super::utils::{format_columns, is_tty, print_json, spinner, terminal_width};
use anyhow::{Result, bail};
use colored::Colorize;
use govm::cache::format_size;
use govm::{Govm, InstallEvent, InstallSource, InstalledVersion, Phase};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

pub fn list(govm: &Govm, json: bool, quiet: bool) -> Result<()> {
    let versions = govm.list_installed()?;

    if json {
        return print_json(&versions);
    }
    if quiet {
        for v in &versions {
            println!("{}", v.version);
        }
        return Ok(());
    }
    if versions.is_empty() {
        println!("No Go versions installed");
        println!("Run {} to install one", "govm install <version>".cyan());
        return Ok(());
    }

    for v in &versions {
        let marker = if v.is_current { "*".green().bold() } else { " ".normal() };
        let padded = format!("{:<10}", v.version);
        let tag = if v.is_current {
            padded.green().bold()
        } else {
            padded.bold()
        };
        let source = match v.source {
            InstallSource::Managed => String::new(),
            InstallSource::System => " (system)".to_string(),
        };
        let size = if v.size > 0 {
            format!(" {}", format_size(v.size))
        } else {
            String::new()
        };
        println!(
            "{} {}{} {}",
            marker,
            tag,
            source.yellow(),
            format!("{}{}", v.path.display(), size).dimmed()
        );
    }
    Ok(())
}

pub async fn list_remote(govm: &Govm, all: bool, json: bool) -> Result<()> {
    let pb = spinner("Fetching release index...");
    let remote = govm.list_remote(all).await;
    pb.finish_and_clear();
    let remote = remote?;

    if json {
        return print_json(&remote);
    }

    let installed: Vec<String> = govm
        .list_installed()?
        .into_iter()
        .map(|v| v.version)
        .collect();

    if !is_tty() {
        for r in &remote {
            println!("{}", r.version);
        }
        return Ok(());
    }

    let items: Vec<String> = remote
        .iter()
        .map(|r| {
            if installed.contains(&r.version) {
                format!("{} ✓", r.version)
            } else {
                r.version.clone()
            }
        })
        .collect();
    print!("{}", format_columns(&items, terminal_width()));
    Ok(())
}

pub async fn latest(govm: &Govm) -> Result<()> {
    let pb = spinner("Fetching release index...");
    let tag = govm.latest_stable().await;
    pb.finish_and_clear();
    println!("{}", tag?);
    Ok(())
}

fn progress_bar(mp: &MultiProgress, tag: &str) -> ProgressBar {
    let pb = if is_tty() {
        mp.add(ProgressBar::new(0))
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg:24} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("⬇ go{}", tag));
    pb
}

fn render(pb: &ProgressBar, tag: &str, event: &InstallEvent) {
    let InstallEvent::Progress(p) = event else {
        return;
    };
    match p.phase {
        Phase::Downloading => {
            if p.total > 0 {
                pb.set_length(p.total);
            }
            pb.set_position(p.downloaded);
        }
        Phase::Extracting | Phase::Verifying => {
            pb.set_message(format!("{} go{}", p.phase, tag));
        }
    }
}

/// Drive one install to completion, cancelling on Ctrl-C.
async fn install_one(
    govm: &Govm,
    tag: &str,
    dir: Option<&Path>,
    mp: &MultiProgress,
) -> Result<InstalledVersion> {
    let mut handle = govm.install(tag, dir)?;
    let tag = handle.version().to_string();
    let pb = progress_bar(mp, &tag);

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => render(&pb, &tag, &event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    pb.finish_and_clear();
    if interrupted {
        handle.cancel().await;
        bail!("Install of Go {} was cancelled", tag);
    }
    Ok(handle.wait().await?)
}

pub async fn install(
    govm: &Govm,
    versions: &[String],
    dir: Option<PathBuf>,
    use_after: bool,
) -> Result<()> {
    let mut tags = Vec::with_capacity(versions.len());
    for v in versions {
        if v == "latest" {
            let pb = spinner("Resolving latest stable release...");
            let latest = govm.latest_stable().await;
            pb.finish_and_clear();
            tags.push(latest?);
        } else {
            tags.push(v.clone());
        }
    }
    if tags.is_empty() {
        bail!("No version given");
    }

    let mp = MultiProgress::new();
    let installs: Vec<_> = tags
        .iter()
        .map(|tag| install_one(govm, tag, dir.as_deref(), &mp))
        .collect();
    let results = futures::future::join_all(installs).await;

    let mut installed = Vec::new();
    let mut failed = 0;
    for (tag, result) in tags.iter().zip(results) {
        match result {
            Ok(v) => {
                println!(
                    "{} Installed Go {} at {}",
                    "✓".green(),
                    v.version.bold(),
                    v.path.display().to_string().dimmed()
                );
                installed.push(v);
            }
            Err(e) => {
                println!("{} Go {}: {}", "✗".red(), tag.bold(), e);
                failed += 1;
            }
        }
    }

    if use_after {
        if let Some(v) = installed.last() {
            use_version(govm, &v.version).await?;
        }
    }

    if failed > 0 {
        bail!("{} of {} installs failed", failed, tags.len());
    }
    Ok(())
}

pub async fn uninstall(govm: &Govm, versions: &[String]) -> Result<()> {
    for tag in versions {
        govm.uninstall(tag).await?;
        println!("{} Uninstalled Go {}", "✓".green(), tag.bold());
    }
    Ok(())
}

pub async fn use_version(govm: &Govm, id: &str) -> Result<()> {
    match govm.use_version(id).await? {
        Some(result) => {
            println!(
                "{} Now using Go {} ({}ms)",
                "✓".green(),
                result.version.bold(),
                result.time_ms
            );
            println!("  GOROOT {}", result.goroot.display().to_string().dimmed());
            println!("  GOPATH {}", result.gopath.display().to_string().dimmed());
            println!(
                "\nRun {} to load it into this shell",
                "eval \"$(govm env shellenv)\"".cyan()
            );
        }
        None => println!("{} Cleared the active Go version", "✓".green()),
    }
    Ok(())
}

pub fn current(govm: &Govm) -> Result<()> {
    let tag = govm.current_version();
    if tag.is_empty() {
        if is_tty() {
            println!("No active Go version");
        }
        return Ok(());
    }
    println!("{}", tag);
    Ok(())
}

pub fn register(govm: &Govm, path: &Path) -> Result<()> {
    let v = govm.register_system(path)?;
    println!(
        "{} Registered Go {} at {}",
        "✓".green(),
        v.version.bold(),
        v.path.display().to_string().dimmed()
    );
    Ok(())
}
