//! # Device Configuration
//!
//! ```toml
//! rx_ring = 4
//! zero_copy_tx = false
//!
//! [pool]
//! block_size = 1600
//! block_count = 10
//! ```

use std::path::Path;

use packetpool_core::PoolConfig;
use serde::Deserialize;

use crate::error::{NetError, NetResult};

/// Settings for one [`NetDevice`](crate::NetDevice) and the pool behind it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetDeviceConfig {
    /// Pool geometry and receive queue capacity.
    pub pool: PoolConfig,
    /// Blocks kept armed for hardware receive.
    pub rx_ring: usize,
    /// Transmit straight from the caller's buffer instead of staging
    /// through a pool block.
    pub zero_copy_tx: bool,
}

impl Default for NetDeviceConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            rx_ring: 4,
            zero_copy_tx: cfg!(feature = "tx-zero-copy"),
        }
    }
}

impl NetDeviceConfig {
    /// Parses a configuration from TOML text. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidConfig`] for malformed TOML or an
    /// inconsistent configuration.
    pub fn from_toml_str(text: &str) -> NetResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| NetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> NetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks that the receive ring fits in the pool.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidConfig`] if `rx_ring` exceeds the block count.
    pub fn validate(&self) -> NetResult<()> {
        if self.rx_ring > self.pool.block_count {
            return Err(NetError::InvalidConfig(format!(
                "rx_ring {} exceeds block_count {}",
                self.rx_ring, self.pool.block_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = NetDeviceConfig::from_toml_str("").unwrap();
        assert_eq!(config, NetDeviceConfig::default());
    }

    #[test]
    fn test_parse_full() {
        let config = NetDeviceConfig::from_toml_str(
            "rx_ring = 2\nzero_copy_tx = true\n[pool]\nblock_size = 1600\nblock_count = 10\n",
        )
        .unwrap();
        assert_eq!(config.rx_ring, 2);
        assert!(config.zero_copy_tx);
        assert_eq!(config.pool.block_size, 1600);
        assert_eq!(config.pool.queue_capacity(), 10);
    }

    #[test]
    fn test_rx_ring_larger_than_pool() {
        let err = NetDeviceConfig::from_toml_str(
            "rx_ring = 20\n[pool]\nblock_size = 64\nblock_count = 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, NetError::InvalidConfig(_)));
    }
}
