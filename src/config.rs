//! Configuration loading
//!
//! Loads SQL Server connection configuration from environment variables,
//! optionally reading from a .env file first.

use std::{env, path::Path};

use tracing::{debug, error, trace, warn};

use crate::error::DalgenError;

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Accept the server certificate without validation
    pub trust_cert: bool,
}

impl DbConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - DB_HOST (default: localhost)
    /// - DB_PORT (default: 1433)
    /// - DB_NAME (required)
    /// - DB_USER (required)
    /// - DB_PASSWORD (required)
    /// - DB_TRUST_CERT (default: false)
    pub fn from_env() -> Result<Self, DalgenError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DalgenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("Loading database configuration from environment");

        let host = lookup("DB_HOST").unwrap_or_else(|| {
            trace!("DB_HOST not set, using default");
            "localhost".to_string()
        });

        let port_str = lookup("DB_PORT").unwrap_or_else(|| {
            trace!("DB_PORT not set, using default");
            "1433".to_string()
        });

        let port = port_str.parse::<u16>().map_err(|e| {
            error!(port = ?port_str, error = ?e, "Invalid DB_PORT value");
            DalgenError::Config("DB_PORT must be a valid port number".to_string())
        })?;

        let database = lookup("DB_NAME").ok_or_else(|| {
            error!("DB_NAME environment variable is not set");
            DalgenError::Config("DB_NAME environment variable is required".to_string())
        })?;

        let user = lookup("DB_USER").ok_or_else(|| {
            error!("DB_USER environment variable is not set");
            DalgenError::Config("DB_USER environment variable is required".to_string())
        })?;

        let password = lookup("DB_PASSWORD").ok_or_else(|| {
            error!("DB_PASSWORD environment variable is not set");
            DalgenError::Config("DB_PASSWORD environment variable is required".to_string())
        })?;

        let trust_cert = match lookup("DB_TRUST_CERT").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                error!(value = ?v, "Invalid DB_TRUST_CERT value");
                return Err(DalgenError::Config("DB_TRUST_CERT must be true or false".to_string()));
            }
        };

        debug!(host = ?host, port = ?port, database = ?database, user = ?user, "Configuration loaded");

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
            trust_cert,
        })
    }

    /// Load a .env file and then read configuration from environment
    pub fn load(env_file: &Path) -> Result<Self, DalgenError> {
        if env_file.exists() {
            debug!(path = ?env_file, "Loading environment file");
            dotenvy::from_path(env_file).map_err(|e| {
                error!(path = ?env_file, error = ?e, "Failed to load environment file");
                DalgenError::Config(format!("Failed to load {}: {}", env_file.display(), e))
            })?;
        } else {
            warn!(path = ?env_file, "Environment file not found, using existing environment");
        }

        Self::from_env()
    }

    /// Build a connection string with password redacted (for logs and error messages)
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "Server=tcp:{},{};Database={};User Id={};Password=***",
            self.host, self.port, self.database, self.user
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DB_NAME", "hotel"),
        ("DB_USER", "sa"),
        ("DB_PASSWORD", "secret"),
    ];

    fn sample_config() -> DbConfig {
        DbConfig {
            host: "localhost".to_string(),
            port: 1433,
            database: "hotel".to_string(),
            user: "sa".to_string(),
            password: "secret".to_string(),
            trust_cert: true,
        }
    }

    #[test]
    fn test_from_lookup_with_defaults() {
        let config = DbConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1433);
        assert_eq!(config.database, "hotel");
        assert_eq!(config.user, "sa");
        assert!(!config.trust_cert);
    }

    #[test]
    fn test_from_lookup_with_custom_values() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DB_HOST", "sql.example.com"));
        vars.push(("DB_PORT", "14330"));
        vars.push(("DB_TRUST_CERT", "true"));

        let config = DbConfig::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.host, "sql.example.com");
        assert_eq!(config.port, 14330);
        assert!(config.trust_cert);
    }

    #[test]
    fn test_from_lookup_missing_db_name() {
        let err = DbConfig::from_lookup(lookup_from(&[("DB_USER", "sa"), ("DB_PASSWORD", "x")])).unwrap_err();
        assert!(err.to_string().contains("DB_NAME"));
    }

    #[test]
    fn test_from_lookup_invalid_port() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DB_PORT", "not_a_number"));

        let err = DbConfig::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_redacted_connection_string() {
        let conn_str = sample_config().redacted_connection_string();

        assert!(!conn_str.contains("secret"));
        assert!(conn_str.contains("***"));
    }
}
