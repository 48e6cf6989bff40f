mod colors;
mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use govm::Govm;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "govm")]
#[command(author, version, about = "Install and switch between Go toolchain versions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed Go versions
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Only print version tags
        #[arg(short, long)]
        quiet: bool,
    },

    /// List versions available from the mirror
    #[command(name = "ls-remote", alias = "list-remote")]
    ListRemote {
        /// Include betas and release candidates
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the newest stable release
    Latest,

    /// Install one or more Go versions ("latest" for the newest stable)
    #[command(alias = "i")]
    Install {
        /// Version tags, e.g. 1.22.1
        #[arg(required = true)]
        versions: Vec<String>,

        /// Install into this directory instead of the configured one
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Switch to the version once installed
        #[arg(long = "use")]
        use_after: bool,
    },

    /// Remove installed Go versions
    #[command(alias = "rm")]
    Uninstall {
        #[arg(required = true)]
        versions: Vec<String>,
    },

    /// Switch the active Go version
    Use {
        /// Tag, install path, or a unique part of a path; "" clears it
        version: String,
    },

    /// Print the active Go version
    Current,

    /// Register a Go installation govm did not install
    Register {
        /// GOROOT of the installation
        path: PathBuf,
    },

    /// Inspect and repair the Go environment
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// Manage the download cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Manage the module cache and Go packages
    #[command(name = "mod")]
    Mod {
        #[command(subcommand)]
        command: ModCommands,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show platform and installation details
    System {
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Show GOROOT, GOPATH, GOPROXY, GOBIN and PATH
    Info {
        #[arg(long)]
        json: bool,
    },

    /// Check the environment for problems
    #[command(alias = "diagnose")]
    Doctor {
        #[arg(long)]
        json: bool,
    },

    /// Set an environment variable
    Set { name: String, value: String },

    /// Point GOROOT and PATH at the active version or at PATH
    FixGoroot { path: Option<PathBuf> },

    /// Reset GOPROXY to a working value
    FixGoproxy,

    /// Print a script to load the environment: eval "$(govm env shellenv)"
    Shellenv {
        /// bash, zsh or fish (default: from $SHELL)
        #[arg(long)]
        shell: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache location and size
    Info {
        #[arg(long)]
        json: bool,
    },

    /// Remove downloaded archives
    Clean {
        /// Remove everything under the cache directory
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum ModCommands {
    /// List cached modules
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },

    /// Summarize the module cache
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print GOPATH and GOMODCACHE for the active version
    Path,

    /// Remove the whole module cache
    Clean,

    /// Remove one module version: <module>@<version>
    CleanModule { target: String },

    /// Check cached modules against their recorded hashes
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Search cached modules and the module proxy
    Search {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Download a module: <module>[@<version>]
    Get { target: String },

    /// Build and install a command: <package>[@<version>]
    Install { target: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current settings
    Show {
        #[arg(long)]
        json: bool,
    },

    /// List known download mirrors
    Mirrors,

    /// Set the release download mirror
    SetMirror { url: String },

    /// Set the HTTP proxy ("" to disable)
    SetProxy { url: String },

    /// Set GOPROXY for switched-to versions
    SetGoproxy { value: String },

    /// Set install and cache directories ("" for the default)
    SetInstall {
        #[arg(long, default_value = "")]
        install_dir: String,

        #[arg(long, default_value = "")]
        cache_dir: String,
    },

    /// Choose per-version ("isolated") or "shared" GOPATH
    GopathMode { mode: String },

    /// GOPATH used in shared mode ("" for ~/go)
    SharedGopath { path: String },

    /// Restore default settings
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "govm=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    colors::init_colors(cli.no_color);

    let Some(command) = cli.command else {
        println!("{} govm - a Go version manager", "👋".bold());
        println!("\nRun {} to see available commands.", "govm --help".cyan());
        return Ok(());
    };

    if let Commands::Completions { shell } = &command {
        commands::system::completions(*shell, &mut Cli::command());
        return Ok(());
    }

    let govm = Govm::new()?;

    match command {
        Commands::List { json, quiet } => commands::list(&govm, json, quiet)?,
        Commands::ListRemote { all, json } => commands::list_remote(&govm, all, json).await?,
        Commands::Latest => commands::latest(&govm).await?,
        Commands::Install {
            versions,
            dir,
            use_after,
        } => commands::install(&govm, &versions, dir, use_after).await?,
        Commands::Uninstall { versions } => commands::uninstall(&govm, &versions).await?,
        Commands::Use { version } => commands::use_version(&govm, &version).await?,
        Commands::Current => commands::current(&govm)?,
        Commands::Register { path } => commands::register(&govm, &path)?,
        Commands::Env { command } => match command {
            EnvCommands::Info { json } => commands::env::info(&govm, json)?,
            EnvCommands::Doctor { json } => commands::env::doctor(&govm, json)?,
            EnvCommands::Set { name, value } => commands::env::set(&govm, &name, &value)?,
            EnvCommands::FixGoroot { path } => {
                commands::env::fix_goroot(&govm, path.as_deref()).await?
            }
            EnvCommands::FixGoproxy => commands::env::fix_goproxy(&govm)?,
            EnvCommands::Shellenv { shell } => commands::env::shellenv(&govm, shell.as_deref())?,
        },
        Commands::Cache { command } => match command {
            CacheCommands::Info { json } => commands::cache::info(&govm, json)?,
            CacheCommands::Clean { all } => commands::cache::clean(&govm, all)?,
        },
        Commands::Mod { command } => match command {
            ModCommands::List { json } => commands::modules::list(&govm, json)?,
            ModCommands::Stats { json } => commands::modules::stats(&govm, json)?,
            ModCommands::Path => commands::modules::path(&govm)?,
            ModCommands::Clean => commands::modules::clean(&govm)?,
            ModCommands::CleanModule { target } => commands::modules::clean_module(&govm, &target)?,
            ModCommands::Verify { json } => commands::modules::verify(&govm, json)?,
            ModCommands::Search { query, json } => {
                commands::modules::search(&govm, &query, json).await?
            }
            ModCommands::Get { target } => commands::modules::get(&govm, &target).await?,
            ModCommands::Install { target } => commands::modules::install(&govm, &target).await?,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => commands::config::show(&govm, json)?,
            ConfigCommands::Mirrors => commands::config::mirrors(&govm)?,
            ConfigCommands::SetMirror { url } => commands::config::set_mirror(&govm, &url)?,
            ConfigCommands::SetProxy { url } => commands::config::set_proxy(&govm, &url)?,
            ConfigCommands::SetGoproxy { value } => commands::config::set_goproxy(&govm, &value)?,
            ConfigCommands::SetInstall {
                install_dir,
                cache_dir,
            } => commands::config::set_install(&govm, &install_dir, &cache_dir)?,
            ConfigCommands::GopathMode { mode } => commands::config::gopath_mode(&govm, &mode)?,
            ConfigCommands::SharedGopath { path } => {
                commands::config::shared_gopath(&govm, &path)?
            }
            ConfigCommands::Reset => commands::config::reset(&govm)?,
        },
        Commands::System { json } => commands::system::info(&govm, json)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_flags() {
        let cli = Cli::try_parse_from(["govm", "install", "1.22.1", "1.21.8", "--use"]).unwrap();
        match cli.command {
            Some(Commands::Install {
                versions,
                use_after,
                dir,
            }) => {
                assert_eq!(versions, vec!["1.22.1", "1.21.8"]);
                assert!(use_after);
                assert!(dir.is_none());
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_use_accepts_empty_argument() {
        let cli = Cli::try_parse_from(["govm", "use", ""]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Use { version }) if version.is_empty()));
    }
}
