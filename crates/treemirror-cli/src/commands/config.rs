//! Config command - View and validate treemirror configuration
//!
//! Provides the `treemirror config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON), passwords redacted
//! 2. Validates the configuration file and reports errors
//! 3. Prints the configuration file path

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use treemirror_core::config::Config;

use super::load_config;
use crate::output::{plural, OutputFormat, Printer};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
            ConfigCommand::Path => execute_path(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let out = Printer::new(format);
    let config = redacted(load_config(config_path)?);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        out.json(&json);
    } else {
        out.success(&format!("Configuration ({})", config_path.display()));
        out.line("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            out.line(line);
        }
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let out = Printer::new(format);

    if !config_path.exists() {
        if format.is_json() {
            out.json(&serde_json::json!({
                "valid": false,
                "config_path": config_path.display().to_string(),
                "errors": ["Configuration file not found. Using defaults."],
            }));
        } else {
            out.line(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            out.line("Using default configuration, which has no sources.");
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if format.is_json() {
                out.json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {}", e)],
                }));
            } else {
                out.error(&format!("Failed to parse configuration: {}", e));
                out.line(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        out.json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "sources": config.sources.len(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        out.success("Configuration is valid");
        out.line(&format!("File: {}", config_path.display()));
        out.line(&format!(
            "{} source{}",
            config.sources.len(),
            plural(config.sources.len())
        ));
    } else {
        out.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            plural(errors.len())
        ));
        out.line(&format!("File: {}", config_path.display()));
        out.line("");
        for error in &errors {
            out.line(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_path(config_path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        Printer::new(format).json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

/// Replaces every configured password with a placeholder
fn redacted(mut config: Config) -> Config {
    for source in &mut config.sources {
        if source.password.is_some() {
            source.password = Some("********".to_string());
        }
    }
    config
}
