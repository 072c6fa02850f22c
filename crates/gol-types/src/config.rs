// Per-process configuration structs. The binary fills them from CLI flags.

use std::time::Duration;

/// Environment variable the controller reads the broker address from.
pub const BROKER_ADDR_ENV: &str = "SERVER";

// ── Broker ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `host:port` the broker listens on for controllers and workers.
    pub listen_addr: String,

    /// Upper bound on one `NextState` call. A call that exceeds it is
    /// treated exactly like a failed call: evict and retry the turn.
    pub call_timeout: Duration,

    /// Upper bound on dialling a subscribing worker's callback address.
    pub dial_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8030".into(),
            call_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(5),
        }
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `host:port` the worker serves `NextState` on.
    pub listen_addr: String,

    /// Broker to subscribe to at startup.
    pub broker_addr: String,

    /// Address the broker should dial back. Defaults to the bound listen
    /// address when `None`.
    pub advertise_addr: Option<String>,

    /// Size of the strip thread pool. Fixed for the process lifetime.
    pub threads: usize,

    /// Upper bound on connecting to the broker.
    pub connect_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8050".into(),
            broker_addr: "127.0.0.1:8030".into(),
            advertise_addr: None,
            threads: 4,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub broker_addr: String,

    /// How often `(turn, alive)` progress is polled and reported.
    pub progress_interval: Duration,

    /// How often completion is polled.
    pub finish_poll_interval: Duration,

    pub connect_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            broker_addr: "127.0.0.1:8030".into(),
            progress_interval: Duration::from_secs(2),
            finish_poll_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_config_defaults() {
        let cfg = BrokerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8030");
        assert_eq!(cfg.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn worker_config_defaults() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.broker_addr, "127.0.0.1:8030");
        assert!(cfg.advertise_addr.is_none());
    }
}
