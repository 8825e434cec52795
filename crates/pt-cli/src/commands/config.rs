//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use pt_core::config::{self, PtConfig};
use pt_core::ConfigError;

fn resolve(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load settings. An explicit path must exist; a missing default file
/// yields the defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<PtConfig> {
    let path = resolve(config_path);
    match config::load_config::<PtConfig>(&path) {
        Ok(settings) => Ok(settings),
        Err(ConfigError::NotFound(_)) if config_path.is_none() => Ok(PtConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to load config {}", path.display())),
    }
}

/// Show the current configuration file
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {}", path.display()));
        print_info("Run 'podtunnel config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {}", path.display()));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    println!("{}", content);

    Ok(())
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve(config_path).display());
    Ok(())
}

/// Write a commented default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {}", path.display()));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default_config(&path)?;
    print_success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

const DEFAULT_CONFIG: &str = r#"# podtunnel configuration

# Kubeconfig to read (defaults to $KUBECONFIG, then ~/.kube/config)
# kubeconfig = "/home/me/.kube/config"

# Context overriding the kubeconfig's current-context
# context = "staging"

# debug, info, warn, error or off
log_level = "info"

# What happens when a running tunnel fails:
#   terminate - exit immediately
#   log       - report the failure, close all tunnels and exit non-zero
fault_policy = "terminate"

# Tunnels opened by `podtunnel up`
# [[forward]]
# namespace = "default"
# target = "web"
# local_port = 8080
# remote_port = 80
"#;
