// cli/mod.rs - Command-line flags layered over the environment configuration
use clap::{Parser, Subcommand};

use crate::config::{parse_upstream_uri, AppConfig, ConfigError, Environment};

#[derive(Debug, Parser)]
#[command(name = "docguard")]
#[command(about = "Document-ownership access control proxy for Elasticsearch-style stores")]
#[command(version)]
pub struct Cli {
    #[arg(long = "env", help = "Environment preset: development, staging or production")]
    pub environment: Option<String>,

    #[arg(long, help = "Base URI of the document store")]
    pub upstream: Option<String>,

    #[arg(long, help = "Trusted request header carrying the caller's identity")]
    pub identity_header: Option<String>,

    #[arg(long, help = "Document attribute naming the owner(s)")]
    pub owner_field: Option<String>,

    #[arg(long, help = "Listen address")]
    pub bind: Option<String>,

    #[arg(long, help = "Listen port")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Print the effective configuration as JSON and exit")]
    CheckConfig,
}

impl Cli {
    /// Build the effective configuration: environment preset, then
    /// environment variables, then flags.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.environment {
            Some(name) => {
                let environment = Environment::parse(name)
                    .ok_or_else(|| ConfigError::UnknownEnvironment(name.clone()))?;
                AppConfig::from_env_as(environment)?
            }
            None => AppConfig::from_env()?,
        };

        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply flag overrides on top of an existing configuration.
    pub fn apply(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(uri) = &self.upstream {
            config.upstream.uri = parse_upstream_uri(uri)?;
        }
        if let Some(header) = &self.identity_header {
            config.identity.header = header.clone();
        }
        if let Some(field) = &self.owner_field {
            config.identity.owner_field = field.clone();
        }
        if let Some(bind) = &self.bind {
            config.api.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        Ok(())
    }
}
