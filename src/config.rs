use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

use anyhow::{ensure, Context};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_HISTORY_LIMIT: i64 = 30;
const DEFAULT_PARENT_WINDOW_DAYS: i64 = 30;

/// Longest attendance window, in days, any view or report looks back over.
pub const MAX_WINDOW_DAYS: i64 = 3650;
pub const MAX_ROW_LIMIT: i64 = 1000;

/// Runtime settings read from the environment (a `.env` file is loaded first
/// when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub attendance_history_limit: i64,
    pub parent_window_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.is_empty())
            .context("DATABASE_URL must be set to the backend Postgres instance")?;

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            attendance_history_limit: parse_within(
                &lookup,
                "ATTENDANCE_HISTORY_LIMIT",
                DEFAULT_HISTORY_LIMIT,
                1..=MAX_ROW_LIMIT,
            )?,
            parent_window_days: parse_within(
                &lookup,
                "PARENT_WINDOW_DAYS",
                DEFAULT_PARENT_WINDOW_DAYS,
                1..=MAX_WINDOW_DAYS,
            )?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_within<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_or(lookup, key, default)?;
    ensure!(
        range.contains(&value),
        "{key} must be between {} and {}, got {value}",
        range.start(),
        range.end()
    );
    Ok(value)
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/halaqah")]))
            .unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.attendance_history_limit, 30);
        assert_eq!(config.parent_window_days, 30);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/halaqah"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("ATTENDANCE_HISTORY_LIMIT", " 60 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.attendance_history_limit, 60);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "")])).is_err());
    }

    #[test]
    fn invalid_number_names_the_key() {
        let error = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/halaqah"),
            ("PARENT_WINDOW_DAYS", "a month"),
        ]))
        .unwrap_err();
        assert!(error.to_string().contains("PARENT_WINDOW_DAYS"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for (key, raw) in [
            ("PARENT_WINDOW_DAYS", "100000000"),
            ("PARENT_WINDOW_DAYS", "0"),
            ("ATTENDANCE_HISTORY_LIMIT", "-5"),
        ] {
            let error = Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://localhost/halaqah"),
                (key, raw),
            ]))
            .unwrap_err();
            assert!(error.to_string().contains(key), "{key}={raw}: {error}");
        }

        let widest = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/halaqah"),
            ("PARENT_WINDOW_DAYS", "3650"),
        ]))
        .unwrap();
        assert_eq!(widest.parent_window_days, MAX_WINDOW_DAYS);
    }
}
