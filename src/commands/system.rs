use super::utils::print_json;
use anyhow::Result;
use clap_complete::Shell;
use colored::Colorize;
use govm::Govm;

pub fn info(govm: &Govm, json: bool) -> Result<()> {
    let info = govm.system_info();
    if json {
        return print_json(&info);
    }
    println!("{:<8} {}", "govm".bold(), info.govm_version);
    println!("{:<8} {}/{}", "platform".bold(), info.os, info.arch);
    println!("{:<8} {}", "home".bold(), info.base_dir.display());
    let current = govm.current_version();
    if !current.is_empty() {
        println!("{:<8} {}", "go".bold(), current.green());
    }
    Ok(())
}

pub fn completions(shell: Shell, cmd: &mut clap::Command) {
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, cmd, name, &mut std::io::stdout());
}
