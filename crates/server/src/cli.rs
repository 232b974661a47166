//! Command-line interface
//!
//! Flags override values from the optional YAML configuration file. Port
//! validation happens at parse time so an out-of-range value never reaches
//! the server.

use clap::Parser;
use finserve_common::config::ServerConfig;
use finserve_common::Result;
use std::path::PathBuf;

/// TCP prediction server for precompiled model artifacts
#[derive(Debug, Parser)]
#[command(name = "finserve")]
pub struct Cli {
    /// Path to the serialized model artifact [default: financial_model.pt]
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// TCP port to listen on, in range 1-65535 [default: 8888]
    #[arg(long, value_parser = parse_port)]
    pub port: Option<u16>,

    /// Optional YAML configuration file; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    match s.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(format!("'{}' is not a port in range 1-65535", s)),
    }
}

impl Cli {
    /// Assemble the validated server configuration.
    ///
    /// Starts from the config file when given (defaults otherwise), then
    /// applies flag overrides.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}
