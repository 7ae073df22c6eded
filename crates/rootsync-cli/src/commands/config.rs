//! Config command - Inspect the rootsync configuration
//!
//! `rootsync config show` prints the effective configuration (defaults
//! when no file exists); `rootsync config validate` loads the file
//! strictly and reports every validation error.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use rootsync_core::config::Config;
use tracing::info;

use crate::output::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        format.print_json(&json);
        return Ok(());
    }

    format.success(&format!("Configuration ({})", config_path.display()));
    if !config_path.exists() {
        format.info("File not found, showing defaults");
    }
    format.info("");
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        format.info(line);
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {

    let errors: Vec<String> = if !config_path.exists() {
        vec![format!(
            "Configuration file not found at {}",
            config_path.display()
        )]
    } else {
        match Config::load(config_path) {
            Ok(config) => config.validate().iter().map(|e| e.to_string()).collect(),
            Err(e) => vec![format!("Failed to parse configuration: {}", e)],
        }
    };

    info!(
        config_path = %config_path.display(),
        errors = errors.len(),
        "Validated configuration"
    );

    if format.is_json() {
        format.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": errors,
        }));
    } else if errors.is_empty() {
        format.success("Configuration is valid");
        format.info(&format!("File: {}", config_path.display()));
    } else {
        format.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        format.info(&format!("File: {}", config_path.display()));
        for error in &errors {
            format.info(&format!("  {}", error));
        }
    }
    Ok(())
}
