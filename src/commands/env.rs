//! Environment inspection and repair

use super::utils::print_json;
use anyhow::{Result, bail};
use colored::Colorize;
use govm::env::DiagnoseStatus;
use govm::{Govm, Shell};
use std::path::Path;

pub fn info(govm: &Govm, json: bool) -> Result<()> {
    let info = govm.env_info();
    if json {
        return print_json(&info);
    }

    let show = |name: &str, value: &str| {
        let value = if value.is_empty() {
            "(unset)".dimmed().to_string()
        } else {
            value.to_string()
        };
        println!("{:<8} {}", name.bold(), value);
    };
    show("GOROOT", &info.goroot);
    show("GOPATH", &info.gopath);
    show("GOPROXY", &info.goproxy);
    show("GOBIN", &info.gobin);
    show("PATH", &info.path);
    Ok(())
}

pub fn doctor(govm: &Govm, json: bool) -> Result<()> {
    let results = govm.diagnose()?;
    if json {
        return print_json(&results);
    }

    let mut failures = 0;
    for r in &results {
        let symbol = match r.status {
            DiagnoseStatus::Pass => "✓".green(),
            DiagnoseStatus::Warn => "⚠".yellow(),
            DiagnoseStatus::Fail => {
                failures += 1;
                "✗".red()
            }
        };
        println!("{} {:<8} {}", symbol, r.item.bold(), r.message);
        if let Some(hint) = &r.hint {
            println!("           {}", hint.dimmed());
        }
    }

    if failures > 0 {
        bail!("{} environment check(s) failed", failures);
    }
    Ok(())
}

pub fn set(govm: &Govm, name: &str, value: &str) -> Result<()> {
    govm.set_env_var(name, value)?;
    println!("{} {}={}", "✓".green(), name.bold(), value);
    Ok(())
}

pub async fn fix_goroot(govm: &Govm, path: Option<&Path>) -> Result<()> {
    let goroot = govm.fix_goroot(path).await?;
    println!(
        "{} GOROOT set to {}",
        "✓".green(),
        goroot.display().to_string().bold()
    );
    Ok(())
}

pub fn fix_goproxy(govm: &Govm) -> Result<()> {
    let goproxy = govm.fix_goproxy()?;
    println!("{} GOPROXY set to {}", "✓".green(), goproxy.bold());
    Ok(())
}

/// Print a script that loads the managed environment, for `eval`.
pub fn shellenv(govm: &Govm, shell: Option<&str>) -> Result<()> {
    let shell = match shell {
        Some(name) => name.parse::<Shell>()?,
        None => Shell::detect(),
    };
    print!("{}", govm.shell_script(shell));
    Ok(())
}
