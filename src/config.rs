//! Configuration for the Clean-Bet API.
//!
//! Process settings (`AppConfig`) come from defaults, an optional `config`
//! file and `CLEANBET_*` environment variables. Business tunables live in the
//! `configurations` table and are read once into [`Tunables`].

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::scoring::{HeuristicParams, StrategyKind};
use crate::storage::ConfigStore;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/cleanbet.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Analysis defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Strategy used when a request does not name one
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Most recent runs considered by the heuristic match score
    #[serde(default = "default_window")]
    pub window: usize,
    /// Fixed seed for the heuristic random source; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_window() -> usize {
    5
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            window: default_window(),
            seed: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (CLEANBET_SERVER_PORT, etc.)
            .add_source(
                config::Environment::with_prefix("CLEANBET")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Keys of the required business tunables
pub const DELTA_KEY: &str = "delta";
pub const TOTAL_RUNS_KEY: &str = "total_runs";
pub const BET_VALUE_KEY: &str = "bet_value";
/// Stored under this historical spelling
pub const AVERAGE_POSITION_KEY: &str = "average_postion";

/// Snapshot of the business tunables, parsed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tunables {
    /// Distance tolerance in furlongs
    pub delta: f64,
    pub total_runs: usize,
    /// Stake per selection
    pub bet_value: f64,
    /// Upper bound on average finishing position for predictions
    pub average_position: f64,
}

fn required<S, T>(store: &S, key: &str) -> Result<T>
where
    S: ConfigStore + ?Sized,
    T: std::str::FromStr,
{
    let raw = store
        .config_value(key)?
        .ok_or_else(|| AnalysisError::Config(format!("missing tunable '{}'", key)))?;
    raw.trim()
        .parse()
        .map_err(|_| AnalysisError::Config(format!("malformed tunable '{}': {:?}", key, raw)))
}

impl Tunables {
    /// Read every required tunable, failing on the first missing or
    /// malformed key.
    pub fn from_store<S: ConfigStore + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self {
            delta: required(store, DELTA_KEY)?,
            total_runs: required(store, TOTAL_RUNS_KEY)?,
            bet_value: required(store, BET_VALUE_KEY)?,
            average_position: required(store, AVERAGE_POSITION_KEY)?,
        })
    }

    pub fn heuristic_params(&self, window: usize) -> HeuristicParams {
        HeuristicParams {
            delta: self.delta,
            total_runs: self.total_runs,
            limit: window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_config(DELTA_KEY, "1").unwrap();
        store.set_config(TOTAL_RUNS_KEY, "10").unwrap();
        store.set_config(BET_VALUE_KEY, "5").unwrap();
        store.set_config(AVERAGE_POSITION_KEY, "4.5").unwrap();
        store
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "data/cleanbet.db");
        assert_eq!(config.analysis.strategy, StrategyKind::Deterministic);
        assert_eq!(config.analysis.window, 5);
        assert!(config.analysis.seed.is_none());
    }

    #[test]
    fn test_tunables_from_store() {
        let tunables = Tunables::from_store(&seeded_store()).unwrap();
        assert_eq!(
            tunables,
            Tunables {
                delta: 1.0,
                total_runs: 10,
                bet_value: 5.0,
                average_position: 4.5,
            }
        );
        assert_eq!(tunables.heuristic_params(3).limit, 3);
    }

    #[test]
    fn test_missing_tunable_fails_fast() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_config(DELTA_KEY, "1").unwrap();

        let err = Tunables::from_store(&store).unwrap_err();
        match err {
            AnalysisError::Config(message) => assert!(message.contains(TOTAL_RUNS_KEY)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tunable() {
        let store = seeded_store();
        store.set_config(TOTAL_RUNS_KEY, "ten").unwrap();
        assert!(matches!(
            Tunables::from_store(&store),
            Err(AnalysisError::Config(_))
        ));
    }
}
