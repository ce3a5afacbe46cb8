//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rsk_core::config::{self, ClientConfig};
use rsk_core::ConfigError;

use crate::output::{format_config, print_error, print_info, print_success, print_warning};

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the config file, falling back to defaults when it does not exist
pub fn load_client_config(config_path: Option<&PathBuf>) -> Result<ClientConfig> {
    let path = resolve_path(config_path);
    match config::load_config::<ClientConfig>(&path) {
        Ok(config) => {
            config
                .connection
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", path))?;
            Ok(config)
        }
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Ok(ClientConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config file: {:?}", path)),
    }
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);
    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults; run 'rsk config init' to create one");
    }
    println!();

    let config = load_client_config(config_path)?;
    println!("{}", format_config(&config));
    Ok(())
}

/// Write a configuration file with default values
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default_config(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    let config = ClientConfig {
        url: Some("ws://localhost:7000/rsocket".to_string()),
        ..Default::default()
    };
    config::save_config(path, &config)
        .with_context(|| format!("Failed to write config file: {:?}", path))
}

/// Print the path of the configuration file
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}
