use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::registry::{RegistryConfig, DEFAULT_MAX_ENTRIES};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "info,webcamera_relay=debug";
pub const MONITOR_ID_LEN: usize = 16;

#[derive(Parser, Debug, Clone)]
#[command(name = "webcamera-relay")]
#[command(about = "Signaling relay brokering camera and monitor peer connections")]
pub struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "WEBCAMERA_RELAY_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// tracing-subscriber filter directive
    #[arg(long, env = "RUST_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Maximum number of open signaling streams
    #[arg(long, env = "WEBCAMERA_MAX_STREAMS", default_value_t = DEFAULT_MAX_ENTRIES)]
    pub max_entries: usize,

    /// Lifetime of a signaling stream, counted from when it was opened
    #[arg(long, env = "WEBCAMERA_STREAM_TTL", default_value_t = 600)]
    pub stream_ttl_secs: u64,

    /// How often expired streams are swept
    #[arg(long, env = "WEBCAMERA_SWEEP_INTERVAL", default_value_t = 30)]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub registry: RegistryConfig,
    pub sweep_interval: Duration,
    pub monitor_id_len: usize,
}

impl From<Cli> for RelayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            bind_addr: cli.bind,
            log_filter: cli.log_filter,
            registry: RegistryConfig {
                max_entries: cli.max_entries.max(1),
                ttl: Duration::from_secs(cli.stream_ttl_secs.max(1)),
            },
            sweep_interval: Duration::from_secs(cli.sweep_interval_secs.max(1)),
            monitor_id_len: MONITOR_ID_LEN,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            registry: RegistryConfig::default(),
            sweep_interval: Duration::from_secs(30),
            monitor_id_len: MONITOR_ID_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn cli_defaults_match_relay_defaults() {
        let cli = Cli::try_parse_from(["webcamera-relay"]).unwrap();
        let config = RelayConfig::from(cli);
        let defaults = RelayConfig::default();
        assert_eq!(config.registry, defaults.registry);
        assert_eq!(config.sweep_interval, defaults.sweep_interval);
        assert_eq!(config.monitor_id_len, 16);
    }

    #[test_timeout::timeout]
    fn zero_values_are_clamped() {
        let cli = Cli::try_parse_from([
            "webcamera-relay",
            "--max-entries",
            "0",
            "--stream-ttl-secs",
            "0",
            "--bind",
            "127.0.0.1:9000",
        ])
        .unwrap();
        let config = RelayConfig::from(cli);
        assert_eq!(config.registry.max_entries, 1);
        assert_eq!(config.registry.ttl, Duration::from_secs(1));
        assert_eq!(config.bind_addr.port(), 9000);
    }
}
