//! # Pool Configuration
//!
//! Build-time constants fix the alignment and the bitmap ceiling; the block
//! geometry of an individual pool is runtime data, usually read from TOML:
//!
//! ```toml
//! block_size = 1536
//! block_count = 32
//! queue_capacity = 16
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::bitops::WORD_BITS;
use crate::error::{PoolError, PoolResult};

/// Alignment of the arena base and of every block, in bytes.
pub const ALIGNMENT: usize = 64;

const _: () = assert!(ALIGNMENT.is_power_of_two(), "ALIGNMENT must be a power of two");

/// Bitmap words used by the default pool type.
pub const DEFAULT_BITMAP_WORDS: usize = 4;

/// Largest block count the default pool type supports.
pub const MAX_BLOCKS: usize = DEFAULT_BITMAP_WORDS * WORD_BITS;

/// Rounds `size` up to the next multiple of [`ALIGNMENT`].
///
/// Returns `None` if the rounded value does not fit in `usize`.
#[inline]
#[must_use]
pub const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(padded) => Some(padded & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Geometry of one pool and the queue normally built on it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Requested block size in bytes (rounded up to [`ALIGNMENT`]).
    pub block_size: usize,
    /// Number of blocks in the arena.
    pub block_count: usize,
    /// Capacity of the companion queue. Defaults to `block_count`.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            // One Ethernet frame plus headroom, rounded to the cache line
            block_size: 1536,
            block_count: 32,
            queue_capacity: None,
        }
    }
}

impl PoolConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the text is not valid TOML or
    /// does not describe a pool.
    pub fn from_toml_str(text: &str) -> PoolResult<Self> {
        toml::from_str(text).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PoolError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Capacity for the companion queue.
    #[inline]
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.block_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1), Some(64));
        assert_eq!(align_up(64), Some(64));
        assert_eq!(align_up(65), Some(128));
        assert_eq!(align_up(1536), Some(1536));
        assert_eq!(align_up(1600), Some(1600));
        assert_eq!(align_up(1601), Some(1664));
        assert_eq!(align_up(usize::MAX), None);
    }

    #[test]
    fn test_max_blocks() {
        assert_eq!(MAX_BLOCKS, 256);
    }

    #[test]
    fn test_parse_toml() {
        let config = PoolConfig::from_toml_str(
            "block_size = 1600\nblock_count = 10\nqueue_capacity = 8\n",
        )
        .unwrap();
        assert_eq!(config.block_size, 1600);
        assert_eq!(config.block_count, 10);
        assert_eq!(config.queue_capacity(), 8);
    }

    #[test]
    fn test_queue_capacity_defaults_to_block_count() {
        let config = PoolConfig::from_toml_str("block_size = 64\nblock_count = 12\n").unwrap();
        assert_eq!(config.queue_capacity(), 12);
    }

    #[test]
    fn test_invalid_toml() {
        let err = PoolConfig::from_toml_str("block_size = \"big\"").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PoolConfig::load("/nonexistent/packetpool.toml").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }
}
