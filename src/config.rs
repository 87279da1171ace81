use std::env;

use anyhow::Context;

use connect_attendance::DEFAULT_TREND_WEEKS;

/// Settings from `.env` and the environment. Values are kept raw and only
/// parsed by the commands that use them.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: Option<String>,
    pub trend_weeks: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let var = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Config {
            database_url: var("DATABASE_URL"),
            max_connections: var("DATABASE_MAX_CONNECTIONS"),
            trend_weeks: var("TREND_WEEKS"),
        }
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    pub fn max_connections(&self) -> anyhow::Result<u32> {
        match self.max_connections.as_deref() {
            Some(value) => parse_positive(value)
                .map_err(anyhow::Error::msg)
                .context("invalid DATABASE_MAX_CONNECTIONS"),
            None => Ok(5),
        }
    }

    /// The `--weeks` flag wins over `TREND_WEEKS`.
    pub fn trend_weeks(&self, flag: Option<usize>) -> anyhow::Result<usize> {
        if let Some(weeks) = flag {
            return Ok(weeks);
        }
        match self.trend_weeks.as_deref() {
            Some(value) => parse_trend_weeks(value)
                .map_err(anyhow::Error::msg)
                .context("invalid TREND_WEEKS"),
            None => Ok(DEFAULT_TREND_WEEKS),
        }
    }
}

/// Parser for `--weeks` and `TREND_WEEKS`.
pub fn parse_trend_weeks(value: &str) -> Result<usize, String> {
    parse_positive(value)
}

fn parse_positive<T>(value: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(number) if number > T::default() => Ok(number),
        _ => Err(format!("expected a positive integer, got `{value}`")),
    }
}
