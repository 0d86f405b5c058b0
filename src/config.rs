use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::economy::EconomyRules;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Shared guard backend; an in-process guard is used when absent.
    pub redis_url: Option<String>,
    pub guard_ttl: Duration,
    pub claim_cooldown: Duration,
    /// Poll interval of the game config cache, which bounds its staleness.
    pub config_refresh: Duration,
    /// JSON object of config documents seeded into storage at startup.
    pub game_config_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let redis_url = optional(&env_map, "REDIS_URL");
        let game_config_path = optional(&env_map, "GAME_CONFIG_PATH");

        let guard_ttl = Duration::from_secs(positive(&env_map, "GUARD_TTL_SECS", 15)?);
        let claim_cooldown = Duration::from_secs(non_negative(&env_map, "CLAIM_COOLDOWN_SECS", 600)?);
        let config_refresh = Duration::from_millis(positive(&env_map, "CONFIG_REFRESH_MS", 5000)?);

        Ok(Config {
            port,
            database_path,
            redis_url,
            guard_ttl,
            claim_cooldown,
            config_refresh,
            game_config_path,
        })
    }

    pub fn economy_rules(&self) -> EconomyRules {
        EconomyRules {
            claim_cooldown: self.claim_cooldown,
            guard_ttl: self.guard_ttl,
        }
    }
}

fn optional(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn non_negative(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
    }
}

fn positive(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match non_negative(env_map, key, default)? {
        0 => Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.redis_url.is_none());
        assert_eq!(config.guard_ttl, Duration::from_secs(15));
        assert_eq!(config.claim_cooldown, Duration::from_secs(600));
        assert_eq!(config.config_refresh, Duration::from_millis(5000));
        assert!(config.game_config_path.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_guard_ttl_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("GUARD_TTL_SECS".to_string(), "0".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "GUARD_TTL_SECS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_cooldown_allowed() {
        let mut env_map = setup_required_env();
        env_map.insert("CLAIM_COOLDOWN_SECS".to_string(), "0".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.economy_rules().claim_cooldown, Duration::ZERO);
    }

    #[test]
    fn test_blank_redis_url_means_in_process_guard() {
        let mut env_map = setup_required_env();
        env_map.insert("REDIS_URL".to_string(), "  ".to_string());
        assert!(Config::from_env_map(env_map).unwrap().redis_url.is_none());
    }
}
