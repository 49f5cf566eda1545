use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod context;
mod edits;

use commands::{
    ConfigCommand, DeleteCommand, EditCommand, ListCommand, NewCommand, ShowCommand,
    SimulateCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "scen")]
#[command(version)]
#[command(about = "Create, edit and simulate scenarios", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a scenario from a defaults variant
    New(NewCommand),

    /// Show a scenario
    Show(ShowCommand),

    /// Edit settings and array sections of a scenario
    Edit(EditCommand),

    /// List scenarios
    List(ListCommand),

    /// Delete a scenario
    Delete(DeleteCommand),

    /// Run a simulation and store its results in a scenario
    Simulate(SimulateCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;
    init_tracing(&config);

    execute_command(&cli.command, &config, cli_config_path)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level.value))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn execute_command(
    command: &Option<Commands>,
    config: &Config,
    cli_config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Some(Commands::New(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Show(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Edit(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::List(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Delete(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Simulate(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
