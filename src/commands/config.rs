use super::utils::print_json;
use anyhow::Result;
use colored::Colorize;
use govm::{Config, GoPathMode, Govm};

fn show_config(cfg: &Config) {
    let value = |v: &str| {
        if v.is_empty() {
            "(default)".dimmed().to_string()
        } else {
            v.to_string()
        }
    };
    println!("{:<14} {}", "mirror".bold(), cfg.mirror);
    println!("{:<14} {}", "proxy".bold(), value(&cfg.proxy));
    println!("{:<14} {}", "goproxy".bold(), value(&cfg.goproxy));
    println!("{:<14} {}", "install_dir".bold(), value(&cfg.install_dir));
    println!("{:<14} {}", "cache_dir".bold(), value(&cfg.cache_dir));
    println!("{:<14} {}", "gopath_mode".bold(), cfg.gopath_mode);
    println!("{:<14} {}", "shared_gopath".bold(), value(&cfg.shared_gopath));
}

fn saved(cfg: &Config) {
    println!("{} Configuration saved", "✓".green());
    show_config(cfg);
}

pub fn show(govm: &Govm, json: bool) -> Result<()> {
    let cfg = govm.config();
    if json {
        return print_json(&cfg);
    }
    show_config(&cfg);
    Ok(())
}

pub fn mirrors(govm: &Govm) -> Result<()> {
    let current = govm.config().mirror;
    for m in govm.mirror_options() {
        let marker = if m.url == current { "*".green() } else { " ".normal() };
        println!("{} {:<28} {}", marker, m.name, m.url.dimmed());
    }
    Ok(())
}

pub fn set_mirror(govm: &Govm, url: &str) -> Result<()> {
    saved(&govm.set_mirror(url)?);
    Ok(())
}

pub fn set_proxy(govm: &Govm, url: &str) -> Result<()> {
    saved(&govm.set_proxy(url)?);
    Ok(())
}

pub fn set_goproxy(govm: &Govm, value: &str) -> Result<()> {
    saved(&govm.set_goproxy(value)?);
    Ok(())
}

pub fn set_install(govm: &Govm, install_dir: &str, cache_dir: &str) -> Result<()> {
    saved(&govm.set_install_settings(install_dir, cache_dir)?);
    Ok(())
}

pub fn gopath_mode(govm: &Govm, mode: &str) -> Result<()> {
    let mode: GoPathMode = mode.parse()?;
    saved(&govm.set_gopath_mode(mode)?);
    Ok(())
}

pub fn shared_gopath(govm: &Govm, path: &str) -> Result<()> {
    saved(&govm.set_shared_gopath(path)?);
    Ok(())
}

pub fn reset(govm: &Govm) -> Result<()> {
    saved(&govm.reset_config()?);
    Ok(())
}
