//! # PACKETPOOL
//!
//! Simulated network device driving [`packetpool_core`] the way a NIC
//! driver would:
//! - RX: frames land in hardware-owned blocks and are queued with their length
//! - Consumers copy out or take the block itself (zero-copy)
//! - TX: frames are staged in pool blocks (or sent straight through) and the
//!   block is freed on transmit completion
//!
//! The "hardware" is a [`Wire`]: a pair of crossbeam channels.
//!
//! ## Example
//!
//! ```rust,ignore
//! use packetpool::{NetDevice, NetDeviceConfig, Wire};
//! use packetpool_core::MemoryPool;
//!
//! let config = NetDeviceConfig::load("device.toml")?;
//! let pool: MemoryPool = MemoryPool::from_config(&config.pool)?;
//! let (nic, peer) = Wire::pair();
//!
//! let device = NetDevice::new(&pool, &config, nic)?;
//! device.arm_rx();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod netdev;
pub mod wire;

pub use config::NetDeviceConfig;
pub use error::{NetError, NetResult};
pub use netdev::{DeviceStats, EventCallback, MsgType, NetDevice, RxPacket, TxBuffer};
pub use wire::{Port, Wire, WIRE_DEPTH};
