// src/config.rs
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 为空时使用内存存储（本地调试 / 测试）
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    /// 重置密码链接的前缀
    pub app_url: String,
    pub secure_cookies: bool,
    pub max_connections: u32,
    pub purge_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            app_url: "http://localhost:3000".to_string(),
            secure_cookies: false,
            max_connections: 5,
            purge_interval_secs: 3600,
        }
    }
}

impl Config {
    /// 先加载 .env，再读取环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        Ok(Config {
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            app_url: lookup("APP_URL").unwrap_or(defaults.app_url),
            secure_cookies: parse_or(&lookup, "COOKIE_SECURE", defaults.secure_cookies)?,
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            purge_interval_secs: parse_or(
                &lookup,
                "PURGE_INTERVAL_SECS",
                defaults.purge_interval_secs,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(!config.secure_cookies);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn values_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/gear"),
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("COOKIE_SECURE", "true"),
            ("PURGE_INTERVAL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/gear"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.secure_cookies);
        assert_eq!(config.purge_interval_secs, 60);
    }

    #[test]
    fn bad_values_are_reported() {
        let err = config_from(&[("DATABASE_MAX_CONNECTIONS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }
}
