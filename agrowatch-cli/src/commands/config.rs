//! Configuration CLI commands.

use agrowatch::config::{config_file_path, ConfigFile, ConfigKey};
use clap::Subcommand;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key as section.key (e.g. fetch.max_retries)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key as section.key (e.g. fetch.max_retries)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key),
        ConfigCommands::Set { key, value } => run_set(&key, &value),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'agrowatch config list' to see available keys.",
            key
        ))
    })
}

fn run_get(key: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let config = ConfigFile::load()?;
    let value = key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str) -> Result<(), CliError> {
    let key = parse_key(key)?;
    let mut config = ConfigFile::load()?;
    key.set(&mut config, value)?;
    config.save()?;

    println!("Set {} = {}", key.name(), value);
    Ok(())
}

fn run_list() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("Configuration ({})", config_file_path().display());
    let mut current_section = "";
    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            println!();
            println!("[{}]", section);
            current_section = section;
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (default: {})", key.key_name(), default_hint(*key));
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }
    Ok(())
}

fn default_hint(key: ConfigKey) -> String {
    match key {
        ConfigKey::PinsDirectory => ConfigFile::default().pins_dir().display().to_string(),
        other => other.get(&ConfigFile::default()),
    }
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}
