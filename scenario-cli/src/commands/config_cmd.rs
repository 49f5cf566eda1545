use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# scen configuration

# Directory for scenarios saved without a server (default: platform data dir)
# data_dir: ~/.local/share/scen

# Defaults variant used by 'scen new' (blank, standard)
default_variant: standard

# Log filter used when RUST_LOG is unset
log_level: warn

# Scenario server. Without a server_url, scenarios are stored under data_dir.
# remote:
#   server_url: http://localhost:8080
#   api_key: your-api-key
#   timeout_secs: 30
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_config(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'scen config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn print_config(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("data_dir: {}", config.data_dir.value.display());
    println!("  source: {}", config.data_dir.source);
    println!();

    println!("default_variant: {}", config.default_variant.value);
    println!("  source: {}", config.default_variant.source);
    println!();

    println!("log_level: {}", config.log_level.value);
    println!("  source: {}", config.log_level.source);
    println!();

    match &config.remote.server_url {
        Some(url) => {
            println!("remote.server_url: {}", url);
            println!(
                "remote.api_key: {}",
                if config.remote.api_key.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("remote.timeout_secs: {}", config.remote.timeout_secs);
        }
        None => println!("remote: not configured (scenarios stored under data_dir)"),
    }
}
