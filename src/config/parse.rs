use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use regex::Regex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config document
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).unwrap();
    let mut unexpanded: Vec<String> = re
        .captures_iter(yaml)
        .map(|cap| cap[1].to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    let error_msg = if unexpanded.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

fn expand_paths(config: &mut Config) {
    for destination in &mut config.destinations {
        match destination {
            DestinationConfig::Parquet { dir, .. } | DestinationConfig::Json { dir, .. } => {
                *dir = expand_tilde(dir);
            }
            DestinationConfig::Duckdb { path, .. } => {
                *path = expand_tilde(path);
            }
        }
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_ingest(&config.ingest, &mut errors);
    validate_destinations(config, &mut errors);

    if config.compaction.enabled && config.compaction.interval.is_zero() {
        errors.push("compaction.interval must be greater than zero".to_string());
    }

    if let Some(forwarding) = &config.forwarding {
        validate_forwarding(forwarding, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_ingest(ingest: &IngestConfig, errors: &mut Vec<String>) {
    if ingest.listen.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "ingest.listen '{}' is not a valid socket address (expected host:port)",
            ingest.listen
        ));
    }
    if ingest.buffer_limit == 0 {
        errors.push("ingest.buffer_limit must be greater than zero".to_string());
    }
}

fn validate_destinations(config: &Config, errors: &mut Vec<String>) {
    if config.destinations.is_empty() {
        errors.push("config must have at least one entry in 'destinations'".to_string());
        return;
    }

    let mut seen = HashSet::new();
    for destination in &config.destinations {
        let label = destination.label();
        if !seen.insert(label.clone()) {
            errors.push(format!(
                "destination '{}' is configured more than once; two writers would race for the same files",
                label
            ));
        }

        match destination {
            DestinationConfig::Parquet { batch, .. } | DestinationConfig::Json { batch, .. } => {
                validate_batch(&label, batch, errors);
            }
            DestinationConfig::Duckdb {
                batch_size,
                flush_interval,
                intake_buffer,
                ..
            } => {
                if *batch_size == 0 {
                    errors.push(format!("destination '{}': batch_size must be greater than zero", label));
                }
                if flush_interval.is_zero() {
                    errors.push(format!("destination '{}': flush_interval must be greater than zero", label));
                }
                if *intake_buffer == 0 {
                    errors.push(format!("destination '{}': intake_buffer must be greater than zero", label));
                }
            }
        }
    }

    let forwarding: Vec<String> = config
        .destinations
        .iter()
        .filter(|d| d.forwards())
        .map(|d| d.label())
        .collect();

    if forwarding.len() > 1 {
        errors.push(format!(
            "only one destination may set 'forward: true', found: {}",
            forwarding.join(", ")
        ));
    }
    if !forwarding.is_empty() && config.forwarding.is_none() {
        errors.push(format!(
            "destination '{}' sets 'forward: true' but there is no 'forwarding' section",
            forwarding[0]
        ));
    }
}

fn validate_batch(label: &str, batch: &BatchSettings, errors: &mut Vec<String>) {
    if batch.max_rows == 0 {
        errors.push(format!("destination '{}': batch.max_rows must be greater than zero", label));
    }
    if batch.max_idle.is_zero() {
        errors.push(format!("destination '{}': batch.max_idle must be greater than zero", label));
    }
    if batch.max_wait.is_zero() {
        errors.push(format!("destination '{}': batch.max_wait must be greater than zero", label));
    }
    if batch.intake_buffer == 0 {
        errors.push(format!("destination '{}': batch.intake_buffer must be greater than zero", label));
    }
}

fn validate_forwarding(forwarding: &ForwardingConfig, errors: &mut Vec<String>) {
    if forwarding.measurement_id.trim().is_empty() {
        errors.push("forwarding.measurement_id must not be empty".to_string());
    }
    if forwarding.api_secret.trim().is_empty() {
        errors.push("forwarding.api_secret must not be empty".to_string());
    }
    if forwarding.workers == 0 {
        errors.push("forwarding.workers must be greater than zero".to_string());
    }
    if forwarding.queue_size == 0 {
        errors.push("forwarding.queue_size must be greater than zero".to_string());
    }
}
