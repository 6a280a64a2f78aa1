//! Application configuration (ground: teacher's `config.rs` usage in
//! `main.rs` — `config::AppConfig::load()`, `is_auth_disabled()`,
//! `get_trading_pairs()` — reconstructed here since the teacher's own
//! `config.rs` source wasn't part of the retrieval pack, in its idiom:
//! `config` crate layered over `dotenvy`).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
    #[serde(default)]
    pub trading_pairs: String,
    #[serde(default)]
    pub auth_disabled: bool,
    #[serde(default = "default_queue_depth")]
    pub matcher_queue_depth: usize,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_expiry() -> u64 {
    3600 * 24
}

fn default_queue_depth() -> usize {
    4096
}

impl AppConfig {
    /// Loads configuration layered as env vars over `.env`, matching the
    /// teacher's `dotenvy::dotenv().ok()` followed by `AppConfig::load()`.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        let cfg: AppConfig = settings.try_deserialize()?;
        Ok(cfg)
    }

    pub fn is_auth_disabled(&self) -> bool {
        self.auth_disabled
    }

    /// Comma-separated `BASE/QUOTE` pairs, e.g. `BTC/USDT,ETH/USDT`.
    pub fn get_trading_pairs(&self) -> Vec<String> {
        self.trading_pairs
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
