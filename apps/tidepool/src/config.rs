use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    /// Port to listen on; 0 lets the OS pick one.
    pub port: u16,
    /// Log connection lifecycle events at info level.
    pub verbose: bool,
    /// Peers silent for longer than this are evicted. Zero disables eviction.
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn eviction_enabled(&self) -> bool {
        !self.idle_timeout.is_zero()
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            verbose: false,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}
