//! Process-wide configuration loaded from environment variables.
//!
//! Everything that belongs to a simulated device (tags, states, roles) lives
//! in a loaded [`crate::profile::Profile`] instead — this covers only the
//! knobs that exist before any profile is read.

use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub metrics_bind_addr: String,
    pub default_byte_order: String,
    pub default_seed: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metrics_bind_addr: env::var("METRICS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
            default_byte_order: env::var("DEFAULT_BYTE_ORDER").unwrap_or_else(|_| "little".to_string()),
            default_seed: env::var("DEFAULT_SEED").unwrap_or_else(|_| "0".to_string()).parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_vars_are_unset() {
        let config = Config {
            environment: "development".to_string(),
            metrics_bind_addr: "0.0.0.0:9090".to_string(),
            default_byte_order: "little".to_string(),
            default_seed: 0,
        };
        assert_eq!(config.metrics_bind_addr, "0.0.0.0:9090");
        assert_eq!(config.default_byte_order, "little");
    }
}
