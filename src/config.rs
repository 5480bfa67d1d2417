// Runtime configuration
// Defaults first, then environment overrides:
//
//   MARKET_DATA_FILE          -> data_file
//   MARKET_PEST_FILE          -> pest_file
//   MARKET_BIND_ADDR          -> bind_addr
//   MARKET_STATIC_DIR         -> static_dir
//   MARKET_STALE_CUTOFF_YEAR  -> stale_cutoff_year

use crate::error::ConfigError;
use crate::pricing::StalenessPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_DATA_FILE: &str = "MARKET_DATA_FILE";
pub const ENV_PEST_FILE: &str = "MARKET_PEST_FILE";
pub const ENV_BIND_ADDR: &str = "MARKET_BIND_ADDR";
pub const ENV_STATIC_DIR: &str = "MARKET_STATIC_DIR";
pub const ENV_STALE_CUTOFF_YEAR: &str = "MARKET_STALE_CUTOFF_YEAR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Price CSV loaded at startup
    pub data_file: PathBuf,
    /// Optional pest reference JSON
    pub pest_file: Option<PathBuf>,
    pub bind_addr: SocketAddr,
    /// Built front-end assets (index.html + assets/)
    pub static_dir: PathBuf,
    /// Observations dated before this year are flagged stale
    pub stale_cutoff_year: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("./data/wfp_food_prices_ken.csv"),
            pest_file: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir: PathBuf::from("./ui/dist"),
            stale_cutoff_year: StalenessPolicy::default().cutoff_year,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATA_FILE) {
            self.data_file = PathBuf::from(path);
        }
        if let Some(path) = get(ENV_PEST_FILE) {
            self.pest_file = Some(PathBuf::from(path));
        }
        if let Some(addr) = get(ENV_BIND_ADDR) {
            self.bind_addr = addr.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_BIND_ADDR,
                value: addr.clone(),
            })?;
        }
        if let Some(dir) = get(ENV_STATIC_DIR) {
            self.static_dir = PathBuf::from(dir);
        }
        if let Some(year) = get(ENV_STALE_CUTOFF_YEAR) {
            self.stale_cutoff_year = year.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_STALE_CUTOFF_YEAR,
                value: year.clone(),
            })?;
        }

        Ok(self)
    }

    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy::new(self.stale_cutoff_year)
    }
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.stale_cutoff_year, 2026);
        assert!(config.pest_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::default()
            .with_overrides(lookup(&[
                (ENV_DATA_FILE, "/srv/prices.csv"),
                (ENV_PEST_FILE, "/srv/pests.json"),
                (ENV_BIND_ADDR, "127.0.0.1:3000"),
                (ENV_STATIC_DIR, "/srv/www"),
                (ENV_STALE_CUTOFF_YEAR, "2025"),
            ]))
            .unwrap();

        assert_eq!(config.data_file, PathBuf::from("/srv/prices.csv"));
        assert_eq!(config.pest_file, Some(PathBuf::from("/srv/pests.json")));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.static_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.staleness(), StalenessPolicy::new(2025));
    }

    #[test]
    fn test_empty_values_ignored() {
        let config = AppConfig::default()
            .with_overrides(lookup(&[(ENV_DATA_FILE, ""), (ENV_STALE_CUTOFF_YEAR, "  ")]))
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_values() {
        let err = AppConfig::default()
            .with_overrides(lookup(&[(ENV_STALE_CUTOFF_YEAR, "next year")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid { key: ENV_STALE_CUTOFF_YEAR, value: "next year".to_string() }
        );

        let err = AppConfig::default()
            .with_overrides(lookup(&[(ENV_BIND_ADDR, "localhost")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_BIND_ADDR, .. }));
    }
}
