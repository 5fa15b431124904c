use shared::DEFAULT_PORT;
use std::time::Duration;

/// Tunables for the relay server
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to, e.g. `0.0.0.0:5000`
    pub bind_addr: String,
    /// Maximum number of registered connections, 0 for no limit
    pub max_connections: usize,
    /// Frames buffered per connection before writes to it start failing
    pub queue_capacity: usize,
    /// Upper bound for the handshake and for each socket write
    pub write_timeout: Duration,
    /// Largest accepted inbound message in bytes
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_connections: 0,
            queue_capacity: 64,
            write_timeout: Duration::from_secs(5),
            max_message_size: 64 * 1024,
        }
    }
}

impl RelayConfig {
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// True when one more connection would exceed `max_connections`.
    pub fn at_capacity(&self, current: usize) -> bool {
        self.max_connections > 0 && current >= self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.max_connections, 0);
        assert!(config.queue_capacity > 0);
        assert!(config.write_timeout > Duration::ZERO);
    }

    #[test]
    fn test_unlimited_capacity() {
        let config = RelayConfig::default();
        assert!(!config.at_capacity(0));
        assert!(!config.at_capacity(100_000));
    }

    #[test]
    fn test_capacity_limit() {
        let config = RelayConfig {
            max_connections: 2,
            ..RelayConfig::default()
        };
        assert!(!config.at_capacity(1));
        assert!(config.at_capacity(2));
        assert!(config.at_capacity(3));
    }

    #[test]
    fn test_with_bind_addr() {
        let config = RelayConfig::default().with_bind_addr("127.0.0.1:0");
        assert_eq!(config.bind_addr, "127.0.0.1:0");
    }
}
