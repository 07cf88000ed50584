use std::{env, path::PathBuf};

use thiserror::Error;

pub const SERVICE_NAME: &str = "products-gateway";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment mode, read from `APP_ENV`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    pub log_level: String,
    pub log_dir: PathBuf,
    /// Endpoint override for DynamoDB, e.g. a local instance.
    pub dynamodb_endpoint: Option<String>,
    pub dynamodb_table: String,
    /// Set when running inside the Lambda runtime.
    pub lambda_runtime_api: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value })?,
            None => 3000,
        };

        let lambda_runtime_api = var("AWS_LAMBDA_RUNTIME_API");
        // Only /tmp is writable inside the Lambda runtime.
        let default_log_dir = if lambda_runtime_api.is_some() {
            "/tmp/logs"
        } else {
            "logs"
        };

        Ok(Self {
            port,
            environment: var("APP_ENV")
                .map(|value| Environment::parse(&value))
                .unwrap_or_default(),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_dir: var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default_log_dir)),
            dynamodb_endpoint: var("DYNAMODB_ENDPOINT"),
            dynamodb_table: var("DYNAMODB_TABLE").unwrap_or_else(|| "demo-products".to_string()),
            lambda_runtime_api,
        })
    }

    pub fn runs_on_lambda(&self) -> bool {
        self.lambda_runtime_api.is_some()
    }
}
