use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::env;

/// Full process configuration: ambient connection/application settings layered
/// with the `config` crate, plus the handful of flat environment variables
/// that are this system's external interface (§6) and are therefore read
/// directly rather than nested under a prefix.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub node: NodeSettings,
    pub sync: SyncSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Parsed from `CASSANDRA_CONTACT_POINTS`; the first entry is used as the
    /// Postgres host:port (see SPEC_FULL.md §1, store substitution).
    #[serde(skip)]
    pub contact_points: Vec<String>,
    /// Seconds to wait for schema agreement / pool readiness (`DB_TIMEOUT`).
    #[serde(skip)]
    pub db_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeSettings {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub parallel_workers: usize,
    pub polltime_delay_seconds: u64,
    pub development_sync_length: Option<usize>,
}

const DEFAULT_CONTACT_POINTS: &str = r#"["localhost:9042"]"#;
const DEFAULT_POLLTIME_DELAY_SECONDS: u64 = 30;

impl Settings {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Environment::default().separator("__"))
            .set_default("database.username", "postgres")?
            .set_default("database.password", "postgres")?
            .set_default("database.database_name", "chain_gateway")?
            .build()
            .context("failed to build layered configuration")?;

        let mut database: DatabaseSettings = config
            .try_deserialize()
            .context("failed to deserialize database settings")?;

        database.contact_points = parse_contact_points()?;
        database.db_timeout_secs = parse_db_timeout()?;

        let node = NodeSettings {
            url: env::var("NODE_URL").unwrap_or_else(|_| "http://localhost:1984".to_string()),
        };

        let sync = SyncSettings {
            parallel_workers: parse_parallel_workers()?,
            polltime_delay_seconds: env::var("POLLTIME_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLLTIME_DELAY_SECONDS),
            development_sync_length: parse_development_sync_length()?,
        };

        Ok(Settings {
            database,
            node,
            sync,
        })
    }

    /// `host:port` of the first configured contact point, for building the
    /// Postgres connection string.
    pub fn primary_contact_point(&self) -> &str {
        self.database
            .contact_points
            .first()
            .map(String::as_str)
            .unwrap_or("localhost:9042")
    }
}

fn parse_contact_points() -> Result<Vec<String>> {
    let raw = env::var("CASSANDRA_CONTACT_POINTS")
        .unwrap_or_else(|_| DEFAULT_CONTACT_POINTS.to_string());
    serde_json::from_str(&raw)
        .with_context(|| format!("CASSANDRA_CONTACT_POINTS is not a JSON array: {raw}"))
}

fn parse_db_timeout() -> Result<u64> {
    match env::var("DB_TIMEOUT") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("DB_TIMEOUT is not a valid integer: {raw}")),
        Err(_) => Ok(30),
    }
}

fn parse_parallel_workers() -> Result<usize> {
    match env::var("PARALLEL_WORKERS") {
        Ok(raw) => {
            let n: usize = raw
                .parse()
                .with_context(|| format!("PARALLEL_WORKERS is not a valid integer: {raw}"))?;
            if n == 0 {
                bail!("PARALLEL_WORKERS must be a positive integer, got 0");
            }
            Ok(n)
        }
        Err(_) => Ok(1),
    }
}

/// Fatal configuration per SPEC_FULL.md §7 item 6: a non-integer
/// `DEVELOPMENT_SYNC_LENGTH` must fail fast with a diagnostic rather than
/// silently falling back to "no truncation".
fn parse_development_sync_length() -> Result<Option<usize>> {
    match env::var("DEVELOPMENT_SYNC_LENGTH") {
        Ok(raw) => {
            let n: usize = raw.parse().with_context(|| {
                format!("DEVELOPMENT_SYNC_LENGTH is set but not a valid integer: {raw}")
            })?;
            Ok(Some(n))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_points_default_when_unset() {
        env::remove_var("CASSANDRA_CONTACT_POINTS");
        let points = parse_contact_points().unwrap();
        assert_eq!(points, vec!["localhost:9042".to_string()]);
    }

    #[test]
    fn development_sync_length_rejects_non_integer() {
        env::set_var("DEVELOPMENT_SYNC_LENGTH", "not-a-number");
        let result = parse_development_sync_length();
        env::remove_var("DEVELOPMENT_SYNC_LENGTH");
        assert!(result.is_err());
    }

    #[test]
    fn parallel_workers_rejects_zero() {
        env::set_var("PARALLEL_WORKERS", "0");
        let result = parse_parallel_workers();
        env::remove_var("PARALLEL_WORKERS");
        assert!(result.is_err());
    }
}
