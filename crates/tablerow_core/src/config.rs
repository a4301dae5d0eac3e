//! Database and pool configuration.
//!
//! # Responsibility
//! - Hold connection and pool sizing settings with working defaults.
//! - Read `db.*` keys from a properties-style configuration file.
//!
//! # Invariants
//! - A validated config always has a non-empty URL, at least one connection
//!   and a splice-safe schema name.

use crate::db::{DbError, DbResult};
use crate::schema::validate_identifier;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 30;
pub const DEFAULT_MAX_WAIT_MS: u64 = 5_000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POOL_NAME: &str = "tablerowpool";

/// URL naming a private in-memory SQLite database.
pub const MEMORY_URL: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// SQLite file path or `:memory:`. A leading `sqlite:` or `jdbc:sqlite:`
    /// scheme is accepted.
    pub url: String,
    /// Schema used to introspect unqualified table names.
    pub schema: Option<String>,
    pub max_connections: u32,
    /// Longest wait for a pooled connection before checkout fails.
    pub max_wait_ms: u64,
    /// Idle connections kept open; `None` keeps every idle connection.
    pub max_idle: Option<u32>,
    pub pool_name: String,
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            schema: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            max_idle: None,
            pool_name: DEFAULT_POOL_NAME.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DbConfig {
    /// Defaults pointed at one SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            url: path.into(),
            ..Self::default()
        }
    }

    /// Parses `db.*` entries from properties text.
    ///
    /// Blank lines, `#`/`!` comments and keys outside `db.` are skipped.
    /// Missing keys keep their defaults. The result is validated.
    pub fn from_properties(text: &str) -> DbResult<Self> {
        let mut config = Self::default();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                return Err(DbError::Config(format!(
                    "line {}: expected `key = value`",
                    line_no + 1
                )));
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "db.url" => config.url = value.to_string(),
                "db.schema" => {
                    config.schema = (!value.is_empty()).then(|| value.to_string());
                }
                "db.maxconnections" => config.max_connections = parse_number(key, value)?,
                "db.maxwait" => config.max_wait_ms = parse_number(key, value)?,
                "db.maxidle" => {
                    let idle: i64 = parse_number(key, value)?;
                    config.max_idle = if idle < 0 {
                        None
                    } else {
                        Some(u32::try_from(idle).map_err(|_| out_of_range(key, value))?)
                    };
                }
                "db.poolname" => config.pool_name = value.to_string(),
                "db.busytimeout" => config.busy_timeout_ms = parse_number(key, value)?,
                other => {
                    debug!("event=config_parse module=db status=skip key={}", other);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.sqlite_path().is_empty() {
            return Err(DbError::Config("db.url cannot be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(DbError::Config(
                "db.maxconnections must be at least 1".to_string(),
            ));
        }
        if self.pool_name.trim().is_empty() {
            return Err(DbError::Config("db.poolname cannot be empty".to_string()));
        }
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        Ok(())
    }

    /// The URL with any SQLite scheme prefix removed.
    pub fn sqlite_path(&self) -> &str {
        let url = self.url.trim();
        ["jdbc:sqlite:", "sqlite://", "sqlite:"]
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .unwrap_or(url)
    }

    pub fn is_memory(&self) -> bool {
        self.sqlite_path() == MEMORY_URL
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> DbResult<T> {
    value.parse().map_err(|_| out_of_range(key, value))
}

fn out_of_range(key: &str, value: &str) -> DbError {
    DbError::Config(format!("`{key}` has invalid value `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::{DbConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_WAIT_MS};
    use crate::db::DbError;

    #[test]
    fn defaults_match_pool_sizing() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.max_wait_ms, DEFAULT_MAX_WAIT_MS);
        assert_eq!(config.max_idle, None);
        assert!(config.is_memory());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn properties_override_defaults_and_skip_noise() {
        let config = DbConfig::from_properties(
            "# database\n\
             db.url = jdbc:sqlite:/var/lib/app/data.db\n\
             db.maxconnections = 8\n\
             db.maxwait: 250\n\
             db.maxidle = -1\n\
             db.username = ignored\n\
             mail.server = smtp.example.org\n\
             \n\
             ! trailing comment\n",
        )
        .unwrap();
        assert_eq!(config.sqlite_path(), "/var/lib/app/data.db");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_wait_ms, 250);
        assert_eq!(config.max_idle, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            DbConfig::from_properties("db.maxconnections = lots"),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            DbConfig::from_properties("db.maxconnections = 0"),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            DbConfig::from_properties("db.schema = public; drop"),
            Err(DbError::InvalidIdentifier(_))
        ));
        assert!(DbConfig::from_properties("db.url").is_err());
    }

    #[test]
    fn maxidle_keeps_a_bounded_count() {
        let config = DbConfig::from_properties("db.maxidle = 4").unwrap();
        assert_eq!(config.max_idle, Some(4));
    }
}
