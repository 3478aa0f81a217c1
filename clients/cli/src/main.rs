//! Parley CLI
//!
//! Command-line front end: manage the configuration file and run the session
//! facade against a simulated network with a small reply bot.

use clap::{Parser, Subcommand};
use console::{style, Emoji};
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod config;

use config::CliConfig;

static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

/// Parley - session facade for a multi-device messaging network
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Run the reply bot against a simulated network
    Simulate {
        /// Our account on the simulated network
        #[arg(short, long, default_value = "79000000000@s.whatsapp.net")]
        account: String,

        /// Destinations the network knows as registered accounts
        #[arg(short, long, value_name = "ADDRESS")]
        registered: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(CliConfig::default_path);

    match cli.command {
        // Does not read the existing file, so a broken one can be replaced
        Commands::Init { force } => {
            init_logging(cli.verbose, false)?;
            init_config(&config_path, force)?;
        }
        Commands::Config => {
            let config = CliConfig::load_or_default(&config_path)?;
            init_logging(cli.verbose, config.json_logs)?;
            show_config(&config_path, &config)?;
        }
        Commands::Simulate { account, registered } => {
            let config = CliConfig::load_or_default(&config_path)?;
            init_logging(cli.verbose, config.json_logs)?;
            commands::simulate(&config, &account, &registered).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        let confirm = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;

        if !confirm {
            println!("{} Cancelled", CROSS);
            return Ok(());
        }
    }

    CliConfig::default().save(path)?;

    println!("{} Wrote {}", CHECK, style(path.display()).cyan());
    println!(
        "{}",
        style("The credentials directory holds session secrets; keep it private.").dim()
    );
    Ok(())
}

fn show_config(path: &Path, config: &CliConfig) -> anyhow::Result<()> {
    let source = if path.exists() { "file" } else { "defaults" };
    println!("{} {} ({})", GEAR, style(path.display()).cyan(), source);
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
