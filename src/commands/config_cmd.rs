use clap::{Args, Subcommand, ValueEnum};
use std::fmt::Display;
use std::fs;
use std::io::Write;

use seedsync::config::{Config, ConfigValue};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

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

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => show_text(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'seedsync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let default_config = r#"# seedsync configuration

# Path to SQLite database (default: platform data dir)
# database_path: ~/.local/share/seedsync/seedsync.db

# Directory holding the sync seed
# data_dir: ~/.local/share/seedsync

# Name shown to the other devices of the sync group
# device_name: laptop

sync:
  relay_url: ws://localhost:8080
  fetch_interval_secs: 30
  page_size: 300
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

fn show_text(config: &Config) {
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

    print_value("database_path", &config.database_path.value.display(), &config.database_path);
    print_value("data_dir", &config.data_dir.value.display(), &config.data_dir);
    print_value("device_name", &config.device_name.value, &config.device_name);
    print_value("relay_url", &config.relay_url.value, &config.relay_url);

    let sync = &config.sync;
    println!("sync:");
    println!("  fetch_interval_secs: {}", sync.fetch_interval_secs);
    println!("  page_size: {}", sync.page_size);
    println!("  pairing_timeout_secs: {}", sync.pairing_timeout_secs);
    println!("  in_flight_timeout_secs: {}", sync.in_flight_timeout_secs);
    println!("  debug: {}", sync.debug);
}

fn print_value<T>(key: &str, shown: &dyn Display, value: &ConfigValue<T>) {
    println!("{}: {}", key, shown);
    println!("  source: {}", value.source);
    println!();
}
