//! Process configuration read from the environment.
//!
//! `.env` is loaded by the binary before this runs.

use std::env;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

pub const DATABASE_URL_VAR: &str = "TRAITLOAD_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "TRAITLOAD_MAX_CONNECTIONS";
pub const USER_ID_VAR: &str = "TRAITLOAD_USER_ID";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://traitload.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Settings shared by every subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Acting user for submissions, when configured
    pub user_id: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            user_id: None,
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_connections = match get(MAX_CONNECTIONS_VAR) {
            Some(raw) => {
                let n: u32 = parse(MAX_CONNECTIONS_VAR, &raw)?;
                if n == 0 {
                    return Err(ConfigError::Invalid {
                        name: MAX_CONNECTIONS_VAR,
                        value: raw,
                        message: "must be at least 1".to_string(),
                    });
                }
                n
            }
            None => defaults.max_connections,
        };

        let user_id = get(USER_ID_VAR)
            .map(|raw| parse::<i64>(USER_ID_VAR, &raw))
            .transpose()?;

        Ok(Self {
            database_url: get(DATABASE_URL_VAR).unwrap_or(defaults.database_url),
            max_connections,
            user_id,
        })
    }

    /// The acting user, preferring an explicit value over the configured one.
    pub fn require_user_id(&self, explicit: Option<i64>) -> ConfigResult<i64> {
        explicit
            .or(self.user_id)
            .ok_or(ConfigError::Missing(USER_ID_VAR))
    }
}

fn parse<T>(name: &'static str, raw: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_reads_every_setting() {
        let config = Config::from_lookup(lookup(&[
            (DATABASE_URL_VAR, "sqlite::memory:"),
            (MAX_CONNECTIONS_VAR, " 2 "),
            (USER_ID_VAR, "42"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.user_id, Some(42));
    }

    #[test]
    fn test_blank_is_unset() {
        let config = Config::from_lookup(lookup(&[(DATABASE_URL_VAR, "  ")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[(USER_ID_VAR, "alice")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: USER_ID_VAR, .. }));

        let err = Config::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_require_user_id() {
        let config = Config {
            user_id: Some(7),
            ..Config::default()
        };
        assert_eq!(config.require_user_id(Some(3)).unwrap(), 3);
        assert_eq!(config.require_user_id(None).unwrap(), 7);
        assert!(matches!(
            Config::default().require_user_id(None),
            Err(ConfigError::Missing(USER_ID_VAR))
        ));
    }
}
