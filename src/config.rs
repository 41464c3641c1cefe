// src/config.rs
// Runtime configuration pulled from the environment, with development defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Largest payload carried by a single streamed frame (16 KiB)
pub const MAX_STREAM_CHUNK_SIZE: usize = 16_384;

/// Chunk every new player is bound to
pub const BOOTSTRAP_CHUNK: (i64, i64, i64) = (0, 0, 0);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub texture_dir: PathBuf,
    pub tick_hz: u32,
    pub cache_sweep_interval: Duration,
    pub cache_retention: Duration,
    pub chunk_size: f64,
    pub solver_iterations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8081,
            texture_dir: PathBuf::from("./assets/textures"),
            tick_hz: 60,
            cache_sweep_interval: Duration::from_secs(5 * 60),
            cache_retention: Duration::from_secs(30 * 60),
            chunk_size: 500.0,
            solver_iterations: 20,
        }
    }
}

impl ServerConfig {
    /// Build the config from `HTTP_HOST`, `HTTP_PORT`, `TEXTURE_DIR`, `TICK_HZ`,
    /// `CACHE_SWEEP_SECS`, `CACHE_RETENTION_SECS`, `CHUNK_SIZE` and `SOLVER_ITERATIONS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HTTP_HOST").unwrap_or(defaults.host),
            port: env_or("HTTP_PORT", defaults.port),
            texture_dir: std::env::var("TEXTURE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.texture_dir),
            tick_hz: env_where("TICK_HZ", defaults.tick_hz, |hz| *hz > 0),
            cache_sweep_interval: Duration::from_secs(env_where(
                "CACHE_SWEEP_SECS",
                defaults.cache_sweep_interval.as_secs(),
                |secs| *secs > 0,
            )),
            cache_retention: Duration::from_secs(env_or(
                "CACHE_RETENTION_SECS",
                defaults.cache_retention.as_secs(),
            )),
            chunk_size: env_where("CHUNK_SIZE", defaults.chunk_size, |size| size.is_finite() && *size > 0.0),
            solver_iterations: env_where("SOLVER_ITERATIONS", defaults.solver_iterations, |n| *n > 0),
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// Simulation step length derived from the tick rate
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

/// Parsed value of `key`; unset keys quietly take the default
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    env_where(key, default, |_| true)
}

/// Like `env_or`, but values failing `valid` also fall back with a warning
fn env_where<T>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(_) => {
            warn!(key = %key, value = %raw, default = %default, "Out-of-range config value, using default");
            default
        }
        Err(_) => {
            warn!(key = %key, value = %raw, default = %default, "Unparseable config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.cache_sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.cache_retention, Duration::from_secs(1800));
        assert_eq!(cfg.tick_hz, 60);
    }

    #[test]
    fn tick_interval_is_one_sixtieth() {
        let cfg = ServerConfig::default();
        let expected = Duration::from_secs_f64(1.0 / 60.0);
        assert_eq!(cfg.tick_interval(), expected);
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("CHUNKWORLD_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("CHUNKWORLD_TEST_GARBAGE", 7u32), 7);
        std::env::set_var("CHUNKWORLD_TEST_GOOD", "42");
        assert_eq!(env_or("CHUNKWORLD_TEST_GOOD", 7u32), 42);
        assert_eq!(env_or("CHUNKWORLD_TEST_UNSET", 7u32), 7);
    }

    #[test]
    fn zero_and_negative_values_fall_back() {
        std::env::set_var("CACHE_SWEEP_SECS", "0");
        std::env::set_var("CHUNK_SIZE", "-5");
        std::env::set_var("TICK_HZ", "0");
        std::env::set_var("SOLVER_ITERATIONS", "0");
        let cfg = ServerConfig::from_env();
        for key in ["CACHE_SWEEP_SECS", "CHUNK_SIZE", "TICK_HZ", "SOLVER_ITERATIONS"] {
            std::env::remove_var(key);
        }

        let defaults = ServerConfig::default();
        assert_eq!(cfg.cache_sweep_interval, defaults.cache_sweep_interval);
        assert_eq!(cfg.chunk_size, defaults.chunk_size);
        assert_eq!(cfg.tick_hz, defaults.tick_hz);
        assert_eq!(cfg.solver_iterations, defaults.solver_iterations);

        std::env::set_var("CHUNKWORLD_TEST_NAN", "NaN");
        assert_eq!(env_where("CHUNKWORLD_TEST_NAN", 1.0f64, |v| v.is_finite()), 1.0);
    }
}
