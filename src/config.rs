//! TOML configuration loader. A minimal file still produces a valid
//! [`Configuration`]: every field outside `[docker]`'s `socket` carries a
//! default.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub docker: DockerConfiguration,

    #[serde(default)]
    pub app: AppConfiguration,

    #[serde(rename = "redis-rpc", default)]
    pub redis_rpc: RedisRpcConfiguration,

    #[serde(default)]
    pub sentry: SentryConfiguration,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let config: Configuration =
            toml::from_str(&content).with_context(|| "failed to parse configuration")?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfiguration {
    pub socket: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    "v1.41".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfiguration {
    #[serde(rename = "max-container-ram", default = "default_max_container_ram")]
    pub max_container_ram: String,

    #[serde(rename = "max-container-cpu", default = "default_max_container_cpu")]
    pub max_container_cpu: f64,

    #[serde(rename = "max-containers", default)]
    pub max_containers: Option<usize>,

    #[serde(rename = "image-prefix", default = "default_image_prefix")]
    pub image_prefix: String,

    #[serde(rename = "exec-timeout-seconds", default = "default_exec_timeout")]
    pub exec_timeout_seconds: u64,

    #[serde(rename = "output-byte-cap", default = "default_output_byte_cap")]
    pub output_byte_cap: usize,

    /// Reproduces the historical memory-string parsing bug bit-for-bit
    /// (strip trailing `m`, divide by `1024*1024`) instead of the corrected
    /// `N * 1024 * 1024` interpretation. Off by default.
    #[serde(rename = "legacy-memory-parsing", default)]
    pub legacy_memory_parsing: bool,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            max_container_ram: default_max_container_ram(),
            max_container_cpu: default_max_container_cpu(),
            max_containers: None,
            image_prefix: default_image_prefix(),
            exec_timeout_seconds: default_exec_timeout(),
            output_byte_cap: default_output_byte_cap(),
            legacy_memory_parsing: false,
        }
    }
}

fn default_max_container_ram() -> String {
    "128m".to_string()
}

fn default_max_container_cpu() -> f64 {
    1.0
}

fn default_image_prefix() -> String {
    "run".to_string()
}

fn default_exec_timeout() -> u64 {
    30
}

fn default_output_byte_cap() -> usize {
    1024 * 1024
}

/// Concurrency default absent an explicit `max-containers`: a fixed
/// constant rather than a computed "optimal" value, matching the reference
/// implementation's own hardcoded choice.
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

impl AppConfiguration {
    pub fn max_concurrency(&self) -> usize {
        self.max_containers.unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn container_stop_timeout_seconds(&self) -> u64 {
        self.exec_timeout_seconds + 2
    }

    /// Parses a memory string like `"128m"` into a byte count.
    ///
    /// The historical parser stripped the trailing `m` and then divided by
    /// `1024*1024`, turning `"128m"` into `0` bytes. This returns the
    /// corrected `N * 1024 * 1024` interpretation unless
    /// `legacy_memory_parsing` is set, in which case it reproduces the bug.
    pub fn max_ram_bytes(&self) -> Result<i64> {
        parse_memory_string(&self.max_container_ram, self.legacy_memory_parsing)
    }
}

fn parse_memory_string(raw: &str, legacy_bug: bool) -> Result<i64> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_suffix(['m', 'M'])
        .ok_or_else(|| anyhow::anyhow!("memory value {raw:?} must end in 'm' (megabytes)"))?;
    let n: i64 = digits
        .parse()
        .with_context(|| format!("memory value {raw:?} is not a number"))?;

    if legacy_bug {
        Ok(n / (1024 * 1024))
    } else {
        Ok(n * 1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedisRpcConfiguration {
    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl RedisRpcConfiguration {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SentryConfiguration {
    pub dsn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[docker]\nsocket = \"/var/run/docker.sock\"").unwrap();

        let config = Configuration::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.docker.socket, "/var/run/docker.sock");
        assert_eq!(config.app.max_concurrency(), DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.redis_rpc.port, 6379);
        assert!(config.sentry.dsn.is_none());
    }

    #[test]
    fn memory_string_corrected_interpretation() {
        assert_eq!(parse_memory_string("128m", false).unwrap(), 128 * 1024 * 1024);
    }

    #[test]
    fn memory_string_legacy_bug_reproduced() {
        // The historical bug: "128m" -> 0 once divided by 1024*1024.
        assert_eq!(parse_memory_string("128m", true).unwrap(), 0);
    }

    #[test]
    fn memory_string_rejects_missing_suffix() {
        assert!(parse_memory_string("128", false).is_err());
    }
}
