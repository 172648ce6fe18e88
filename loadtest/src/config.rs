//! Load test and balancer configuration
//!
//! Configuration is loaded from environment variables. Durations use the
//! humantime syntax (`45s`, `300ms`, `1m 30s`).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::client::BodyEncoding;
use crate::error::ConfigError;
use crate::scenario::{ExecutorKind, ScenarioOptions};

/// Main configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint the iteration body posts to
    pub target_url: String,
    /// Number of concurrent virtual users
    pub vus: usize,
    /// How long VUs keep starting new iterations
    pub duration: Duration,
    /// Extra time granted to in-flight iterations after `duration`
    pub graceful_stop: Duration,
    /// Pause at the end of every iteration
    pub think_time: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Drain and drop response bodies instead of keeping them
    pub discard_response_bodies: bool,
    /// How the payload is encoded on the wire
    pub body_encoding: BodyEncoding,
    /// Optional path the JSON summary is written to
    pub summary_export: Option<PathBuf>,

    /// Balancer configuration
    pub balancer: BalancerConfig,
}

/// Load balancer configuration
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Initial backend pool
    pub backends: Vec<String>,
    /// Health check configuration
    pub health: HealthCheckConfig,
}

/// Backend health probing
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Pause between two sweeps over the pool
    pub interval: Duration,
    /// A probe slower than this counts as slow and unhealthy
    pub timeout: Duration,
    /// Probes per backend per sweep
    pub max_retries: u32,
    /// Pause between two failed probes of the same backend
    pub retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:8080/self".to_string(),
            vus: 10,
            duration: Duration::from_secs(45),
            graceful_stop: Duration::from_secs(30),
            think_time: Duration::from_millis(300),
            request_timeout: Duration::from_secs(60),
            discard_response_bodies: true,
            body_encoding: BodyEncoding::Form,
            summary_export: None,
            balancer: BalancerConfig::default(),
        }
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backends: (3000..=3004)
                .map(|port| format!("http://localhost:{}", port))
                .collect(),
            health: HealthCheckConfig::default(),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Workload
        if let Some(url) = lookup("TARGET_URL")
            && !url.is_empty()
        {
            config.target_url = url;
        }
        if let Some(val) = lookup("VUS") {
            config.vus = parse_number("VUS", &val)?;
        }
        if let Some(val) = lookup("DURATION") {
            config.duration = parse_duration("DURATION", &val)?;
        }
        if let Some(val) = lookup("GRACEFUL_STOP") {
            config.graceful_stop = parse_duration("GRACEFUL_STOP", &val)?;
        }
        if let Some(val) = lookup("THINK_TIME") {
            config.think_time = parse_duration("THINK_TIME", &val)?;
        }
        if let Some(val) = lookup("REQUEST_TIMEOUT") {
            config.request_timeout = parse_duration("REQUEST_TIMEOUT", &val)?;
        }
        if let Some(val) = lookup("DISCARD_RESPONSE_BODIES") {
            config.discard_response_bodies = parse_bool(&val);
        }
        if let Some(val) = lookup("BODY_ENCODING") {
            config.body_encoding =
                val.parse()
                    .map_err(|reason: String| ConfigError::InvalidValue {
                        var: "BODY_ENCODING",
                        value: val.clone(),
                        reason,
                    })?;
        }
        if let Some(path) = lookup("SUMMARY_EXPORT")
            && !path.is_empty()
        {
            config.summary_export = Some(PathBuf::from(path));
        }

        // Balancer
        if let Some(val) = lookup("LB_LISTEN_ADDR") {
            config.balancer.listen_addr =
                val.parse().map_err(|e: std::net::AddrParseError| {
                    ConfigError::InvalidValue {
                        var: "LB_LISTEN_ADDR",
                        value: val.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }
        if let Some(val) = lookup("LB_BACKENDS") {
            config.balancer.backends = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(val) = lookup("LB_HEALTH_INTERVAL") {
            config.balancer.health.interval = parse_duration("LB_HEALTH_INTERVAL", &val)?;
        }
        if let Some(val) = lookup("LB_HEALTH_TIMEOUT") {
            config.balancer.health.timeout = parse_duration("LB_HEALTH_TIMEOUT", &val)?;
        }
        if let Some(val) = lookup("LB_HEALTH_RETRIES") {
            config.balancer.health.max_retries = parse_number("LB_HEALTH_RETRIES", &val)?;
        }
        if let Some(val) = lookup("LB_HEALTH_RETRY_DELAY") {
            config.balancer.health.retry_delay = parse_duration("LB_HEALTH_RETRY_DELAY", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject workloads the executor cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vus == 0 {
            return Err(ConfigError::NoVirtualUsers);
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        Url::parse(&self.target_url).map_err(|_| ConfigError::InvalidUrl(self.target_url.clone()))?;
        for backend in &self.balancer.backends {
            Url::parse(backend).map_err(|_| ConfigError::InvalidUrl(backend.clone()))?;
        }
        Ok(())
    }

    /// Workload options handed to the executor
    pub fn scenario_options(&self) -> ScenarioOptions {
        ScenarioOptions {
            executor: ExecutorKind::ConstantVus,
            target_url: self.target_url.clone(),
            vus: self.vus,
            duration: self.duration,
            graceful_stop: self.graceful_stop,
            think_time: self.think_time,
            request_timeout: self.request_timeout,
            discard_response_bodies: self.discard_response_bodies,
            body_encoding: self.body_encoding,
        }
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target_url, "http://localhost:8080/self");
        assert_eq!(config.vus, 10);
        assert_eq!(config.duration, Duration::from_secs(45));
        assert_eq!(config.think_time, Duration::from_millis(300));
        assert!(config.discard_response_bodies);
        assert_eq!(config.body_encoding, BodyEncoding::Form);
        assert_eq!(config.balancer.backends.len(), 5);
        assert_eq!(config.balancer.listen_addr.port(), 8080);
    }

    #[test]
    fn test_empty_lookup_yields_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.vus, 10);
        assert_eq!(config.graceful_stop, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TARGET_URL", "http://127.0.0.1:9000/self"),
            ("VUS", "3"),
            ("DURATION", "2s"),
            ("THINK_TIME", "50ms"),
            ("DISCARD_RESPONSE_BODIES", "false"),
            ("BODY_ENCODING", "json"),
            ("LB_BACKENDS", "http://a:1, http://b:2,"),
            ("LB_HEALTH_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.target_url, "http://127.0.0.1:9000/self");
        assert_eq!(config.vus, 3);
        assert_eq!(config.duration, Duration::from_secs(2));
        assert_eq!(config.think_time, Duration::from_millis(50));
        assert!(!config.discard_response_bodies);
        assert_eq!(config.body_encoding, BodyEncoding::Json);
        assert_eq!(config.balancer.backends, vec!["http://a:1", "http://b:2"]);
        assert_eq!(config.balancer.health.max_retries, 5);
    }

    #[test]
    fn test_rejects_zero_vus() {
        let err = Config::from_lookup(lookup_from(&[("VUS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::NoVirtualUsers));
    }

    #[test]
    fn test_rejects_zero_duration() {
        let err = Config::from_lookup(lookup_from(&[("DURATION", "0s")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration));
    }

    #[test]
    fn test_rejects_malformed_duration() {
        let err = Config::from_lookup(lookup_from(&[("DURATION", "-45s")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "DURATION",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let err = Config::from_lookup(lookup_from(&[("BODY_ENCODING", "xml")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: "BODY_ENCODING",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_invalid_target_url() {
        let err = Config::from_lookup(lookup_from(&[("TARGET_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_scenario_options_mirror_config() {
        let config = Config::default();
        let options = config.scenario_options();
        assert_eq!(options.executor, ExecutorKind::ConstantVus);
        assert_eq!(options.vus, config.vus);
        assert_eq!(options.duration, config.duration);
        assert_eq!(options.target_url, config.target_url);
    }
}
