//! Test data builders for creating test objects

use port_logger::config::{PortLogConfig, SourceConfig, TcpSourceConfig};
use std::path::Path;

/// Builder for pipeline configs with test-friendly timings
pub struct ConfigBuilder {
    config: PortLogConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Millisecond-scale polling and backoff so reconnect tests finish quickly
    pub fn new() -> Self {
        let mut config = PortLogConfig::default();
        config.supervisor.poll_interval_ms = 20;
        config.supervisor.reconnect_backoff_ms = 25;
        config.pipeline.handoff_wait_ms = 5;
        config.display.console_name = "test".to_string();
        Self { config }
    }

    pub fn log_dir(mut self, dir: &Path) -> Self {
        self.config.log.base_directory = dir.to_path_buf();
        self
    }

    pub fn log_file(mut self, name: &str) -> Self {
        self.config.log.file_name = name.to_string();
        self
    }

    pub fn handoff_capacity(mut self, capacity: usize) -> Self {
        self.config.pipeline.handoff_capacity = capacity;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.supervisor.poll_interval_ms = ms;
        self
    }

    pub fn wait_for_source(mut self) -> Self {
        self.config.supervisor.wait_for_source = true;
        self
    }

    pub fn tcp(mut self, bind_address: &str) -> Self {
        self.config.source = SourceConfig::Tcp(TcpSourceConfig {
            bind_address: bind_address.to_string(),
            accept_timeout_ms: 50,
            read_timeout_ms: 20,
        });
        self
    }

    pub fn build(self) -> PortLogConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new().handoff_capacity(2).wait_for_source().build();
        assert_eq!(config.pipeline.handoff_capacity, 2);
        assert!(config.supervisor.wait_for_source);
        assert!(config.validate().is_ok());
    }
}
