//! # Network Device
//!
//! A NIC driver shaped around one [`MemoryPool`]:
//!
//! ```text
//!   wire ──> poll_rx ──> [armed hw block] ──> rx queue ──> receive_into / receive_zero_copy
//!                                                               │
//!   wire <── send / send_buffer <── [tx block] <── packet_alloc │
//!                         │                                     │
//!                         └──── free on tx completion ──────────┴──> pool
//! ```
//!
//! `poll_rx` plays the receive interrupt: it fills hardware-owned blocks
//! from the wire and queues them with their frame length. Consumers either
//! copy out (`receive_into`) or take the block itself (`receive_zero_copy`)
//! and hand it back with `release`.
//!
//! ## Safety Note
//!
//! Block bytes are reached through the pool's unsafe accessors. Every block
//! touched here is owned by the device (armed, or just dequeued) or by a
//! non-`Clone` [`RxPacket`]/[`TxBuffer`]. The safe accessors copy in or out
//! and never hand out a borrow of block memory. The borrowing ones
//! ([`NetDevice::payload`], [`NetDevice::tx_payload_mut`]) are `unsafe`,
//! since nothing stops other code from freeing a block through the pool.

#![allow(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use packetpool_core::{BlockRef, BufferQueue, DefaultLock, MemoryPool, PoolLock};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::NetDeviceConfig;
use crate::error::{NetError, NetResult};
use crate::wire::Port;

/// Event kinds reported to the device callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgType {
    /// A frame was queued for the stack.
    RxPacket,
    /// A frame left the device.
    TxPacket,
}

/// Callback invoked with each received or transmitted frame.
pub type EventCallback = Box<dyn Fn(MsgType, &[u8]) + Send + Sync>;

/// A received frame held by the caller without copying.
///
/// The block stays allocated until passed to [`NetDevice::release`].
#[derive(Debug)]
pub struct RxPacket {
    block: BlockRef,
    len: usize,
}

impl RxPacket {
    /// Frame length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A pool block reserved for an outgoing frame.
#[derive(Debug)]
pub struct TxBuffer {
    block: BlockRef,
    len: usize,
}

impl TxBuffer {
    /// Frame length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the frame is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Live device counters.
#[derive(Debug, Default)]
struct Counters {
    rx_frames: AtomicU64,
    rx_bytes: AtomicU64,
    rx_dropped: AtomicU64,
    tx_frames: AtomicU64,
    tx_bytes: AtomicU64,
}

/// Snapshot of device statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Frames queued for the stack.
    pub rx_frames: u64,
    /// Bytes queued for the stack.
    pub rx_bytes: u64,
    /// Frames dropped on receive (no block, queue full, oversized).
    pub rx_dropped: u64,
    /// Frames put on the wire.
    pub tx_frames: u64,
    /// Bytes put on the wire.
    pub tx_bytes: u64,
}

/// Simulated network device over a borrowed pool.
///
/// # Example
///
/// ```rust,ignore
/// let config = NetDeviceConfig::default();
/// let pool: MemoryPool = MemoryPool::from_config(&config.pool)?;
/// let (nic, peer) = Wire::pair();
///
/// let device = NetDevice::new(&pool, &config, nic)?;
/// device.arm_rx();
///
/// peer.transmit(&frame)?;
/// device.poll_rx()?;
///
/// let mut buf = [0u8; 1514];
/// let len = device.receive_into(&mut buf)?;
/// ```
pub struct NetDevice<'p, R: PoolLock = DefaultLock> {
    pool: &'p MemoryPool<R>,
    rx: BufferQueue<'p, R>,
    /// Blocks pre-allocated for hardware receive.
    armed: Mutex<Vec<BlockRef>>,
    port: Port,
    rx_ring: usize,
    zero_copy_tx: bool,
    callback: Option<EventCallback>,
    counters: Counters,
}

impl<'p, R: PoolLock> NetDevice<'p, R> {
    /// Brings a device up on `pool`, attached to one end of a wire.
    ///
    /// The receive queue takes `config.pool.queue_capacity()` entries.
    ///
    /// # Errors
    ///
    /// - [`NetError::InvalidConfig`] if `rx_ring` exceeds the pool
    /// - [`NetError::Pool`] if the receive queue cannot be created
    pub fn new(pool: &'p MemoryPool<R>, config: &NetDeviceConfig, port: Port) -> NetResult<Self> {
        if config.rx_ring > pool.block_count() {
            return Err(NetError::InvalidConfig(format!(
                "rx_ring {} exceeds pool block count {}",
                config.rx_ring,
                pool.block_count()
            )));
        }
        let rx = BufferQueue::new(pool, config.pool.queue_capacity())?;

        info!(
            block_size = pool.block_size(),
            blocks = pool.block_count(),
            rx_queue = rx.capacity(),
            zero_copy_tx = config.zero_copy_tx,
            "net device up"
        );

        Ok(Self {
            pool,
            rx,
            armed: Mutex::new(Vec::with_capacity(config.rx_ring)),
            port,
            rx_ring: config.rx_ring,
            zero_copy_tx: config.zero_copy_tx,
            callback: None,
            counters: Counters::default(),
        })
    }

    /// Registers the callback for receive and transmit events.
    pub fn set_callback(&mut self, callback: impl Fn(MsgType, &[u8]) + Send + Sync + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Tops the armed set up to `rx_ring` hardware-owned blocks.
    ///
    /// Returns how many blocks are armed afterwards. Fewer than `rx_ring`
    /// means the pool ran dry.
    pub fn arm_rx(&self) -> usize {
        let armed = {
            let mut armed = self.armed.lock();
            while armed.len() < self.rx_ring {
                match self.pool.allocate(true) {
                    Some(block) => armed.push(block),
                    None => break,
                }
            }
            armed.len()
        };

        if armed < self.rx_ring {
            warn!(armed, wanted = self.rx_ring, "rx ring partially armed");
        }
        armed
    }

    /// Moves every frame waiting on the wire into the receive queue.
    ///
    /// Each frame lands in an armed block (or a fresh hardware block if
    /// none is armed) and is queued with its length. Frames that cannot be
    /// placed are dropped and counted.
    ///
    /// Returns the number of frames queued.
    ///
    /// # Errors
    ///
    /// [`NetError::LinkDown`] if the peer is gone and nothing was received.
    pub fn poll_rx(&self) -> NetResult<usize> {
        let mut queued = 0;
        loop {
            let frame = match self.port.try_receive() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if queued == 0 => return Err(e),
                Err(_) => break,
            };

            match self.deliver(&frame) {
                Ok(()) => {
                    queued += 1;
                    self.counters.rx_frames.fetch_add(1, Ordering::Relaxed);
                    self.counters.rx_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
                    self.notify(MsgType::RxPacket, &frame);
                }
                Err(e) => {
                    self.counters.rx_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, len = frame.len(), "dropped rx frame");
                }
            }
        }
        Ok(queued)
    }

    /// Places one frame in a hardware block and queues it.
    fn deliver(&self, frame: &[u8]) -> NetResult<()> {
        if frame.len() > self.pool.block_size() {
            return Err(NetError::FrameTooLarge {
                len: frame.len(),
                max: self.pool.block_size(),
            });
        }

        let armed = self.armed.lock().pop();
        let block = armed
            .or_else(|| self.pool.allocate(true))
            .ok_or(NetError::NoBuffer)?;

        // SAFETY: the block is armed or freshly allocated, so only the device holds it.
        let bytes = unsafe { self.pool.bytes_mut(block)? };
        bytes[..frame.len()].copy_from_slice(frame);

        if let Err(e) = self.rx.enqueue_with_length(block, frame.len()) {
            self.recycle(block)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Returns an unused receive block to the armed set, or to the pool if
    /// the set is full.
    fn recycle(&self, block: BlockRef) -> NetResult<()> {
        let spare = {
            let mut armed = self.armed.lock();
            if armed.len() < self.rx_ring {
                armed.push(block);
                None
            } else {
                Some(block)
            }
        };
        if let Some(block) = spare {
            self.pool.free(block)?;
        }
        Ok(())
    }

    /// Dequeues one frame, copies up to `buf.len()` bytes of it into `buf`
    /// and frees its block.
    ///
    /// Returns the number of bytes copied, `min(frame length, buf.len())`.
    ///
    /// # Errors
    ///
    /// [`NetError::NoPacket`] if the receive queue is empty.
    pub fn receive_into(&self, buf: &mut [u8]) -> NetResult<usize> {
        let entry = self.rx.dequeue_with_length().ok_or(NetError::NoPacket)?;
        let copied = entry.len.min(buf.len());

        // SAFETY: the block was just dequeued and is freed only after the copy.
        let bytes = unsafe { self.pool.bytes(entry.block)? };
        buf[..copied].copy_from_slice(&bytes[..copied]);

        self.pool.free(entry.block)?;
        trace!(len = entry.len, copied, "rx copied out");
        Ok(copied)
    }

    /// Dequeues one frame without copying it.
    ///
    /// The caller reads it with [`NetDevice::copy_payload`] (or the unsafe
    /// [`NetDevice::payload`]) and must hand it back with
    /// [`NetDevice::release`]. A dropped packet leaks its block.
    #[must_use]
    pub fn receive_zero_copy(&self) -> Option<RxPacket> {
        self.rx
            .dequeue_with_length()
            .map(|entry| RxPacket { block: entry.block, len: entry.len })
    }

    /// Copies up to `buf.len()` bytes of a zero-copy packet into `buf`.
    ///
    /// The packet keeps its block. Returns `min(packet length, buf.len())`.
    ///
    /// # Errors
    ///
    /// Fails if the packet came from another device's pool.
    pub fn copy_payload(&self, packet: &RxPacket, buf: &mut [u8]) -> NetResult<usize> {
        let copied = packet.len.min(buf.len());
        // SAFETY: the packet owns its block and the borrow ends with the copy.
        let bytes = unsafe { self.pool.bytes(packet.block)? };
        buf[..copied].copy_from_slice(&bytes[..copied]);
        Ok(copied)
    }

    /// Frame bytes of a zero-copy packet, borrowed in place.
    ///
    /// # Errors
    ///
    /// Fails if the packet came from another device's pool.
    ///
    /// # Safety
    ///
    /// The packet's block must stay allocated and unwritten while the slice
    /// lives. Freeing it through the pool (by pointer or by index) and
    /// polling again lets the device write into the borrowed bytes.
    pub unsafe fn payload<'a>(&'a self, packet: &'a RxPacket) -> NetResult<&'a [u8]> {
        // SAFETY: upheld by the caller.
        let bytes = unsafe { self.pool.bytes(packet.block)? };
        Ok(&bytes[..packet.len])
    }

    /// Returns a zero-copy packet's block to the pool.
    ///
    /// # Errors
    ///
    /// Fails if the packet came from another device's pool.
    pub fn release(&self, packet: RxPacket) -> NetResult<()> {
        self.pool.free(packet.block)?;
        Ok(())
    }

    /// Whether a received frame is waiting.
    #[must_use]
    pub fn has_packet(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Number of received frames waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.count()
    }

    /// Reserves a block for an outgoing frame of `len` bytes.
    ///
    /// # Errors
    ///
    /// - [`NetError::FrameTooLarge`] if `len` exceeds the block size
    /// - [`NetError::NoBuffer`] if the pool is exhausted
    pub fn packet_alloc(&self, len: usize) -> NetResult<TxBuffer> {
        let max = self.pool.block_size();
        if len > max {
            warn!(len, max, "tx frame larger than block");
            return Err(NetError::FrameTooLarge { len, max });
        }
        let block = self.pool.allocate(false).ok_or(NetError::NoBuffer)?;
        Ok(TxBuffer { block, len })
    }

    /// Copies `data` into a transmit buffer and makes it the frame.
    ///
    /// # Errors
    ///
    /// - [`NetError::FrameTooLarge`] if `data` exceeds the block size
    /// - [`NetError::Pool`] if the buffer came from another device's pool
    pub fn write_tx(&self, buffer: &mut TxBuffer, data: &[u8]) -> NetResult<()> {
        let max = self.pool.block_size();
        if data.len() > max {
            return Err(NetError::FrameTooLarge { len: data.len(), max });
        }
        // SAFETY: the buffer owns its block and the borrow ends with the copy.
        let bytes = unsafe { self.pool.bytes_mut(buffer.block)? };
        bytes[..data.len()].copy_from_slice(data);
        buffer.len = data.len();
        Ok(())
    }

    /// Writable frame bytes of a transmit buffer, borrowed in place.
    ///
    /// # Errors
    ///
    /// Fails if the buffer came from another device's pool.
    ///
    /// # Safety
    ///
    /// The buffer's block must stay allocated and untouched by other code
    /// while the slice lives. Freeing it through the pool lets a later
    /// allocation alias the borrowed bytes.
    pub unsafe fn tx_payload_mut<'a>(&'a self, buffer: &'a mut TxBuffer) -> NetResult<&'a mut [u8]> {
        // SAFETY: upheld by the caller.
        let bytes = unsafe { self.pool.bytes_mut(buffer.block)? };
        Ok(&mut bytes[..buffer.len])
    }

    /// Returns an unsent transmit buffer to the pool.
    ///
    /// # Errors
    ///
    /// Fails if the buffer came from another device's pool.
    pub fn discard(&self, buffer: TxBuffer) -> NetResult<()> {
        self.pool.free(buffer.block)?;
        Ok(())
    }

    /// Transmits a frame.
    ///
    /// With `zero_copy_tx` the frame goes straight from `data` to the wire.
    /// Otherwise it is staged in a pool block first, and that block is freed
    /// on transmit completion.
    ///
    /// # Errors
    ///
    /// - [`NetError::FrameTooLarge`] if `data` exceeds the block size
    /// - [`NetError::NoBuffer`] if no staging block is free
    /// - [`NetError::LinkDown`] if the peer is gone
    pub fn send(&self, data: &[u8]) -> NetResult<()> {
        if self.zero_copy_tx {
            let max = self.pool.block_size();
            if data.len() > max {
                return Err(NetError::FrameTooLarge { len: data.len(), max });
            }
            self.port.transmit(data)?;
            self.complete_tx(data);
            return Ok(());
        }

        let mut buffer = self.packet_alloc(data.len())?;
        if let Err(e) = self.write_tx(&mut buffer, data) {
            self.discard(buffer)?;
            return Err(e);
        }
        self.send_buffer(buffer)
    }

    /// Transmits a filled transmit buffer and frees its block on completion.
    ///
    /// The block is freed whether or not the transmit succeeds.
    ///
    /// # Errors
    ///
    /// [`NetError::LinkDown`] if the peer is gone.
    pub fn send_buffer(&self, buffer: TxBuffer) -> NetResult<()> {
        // SAFETY: the buffer owns its block; it is freed only after the last use.
        let bytes = unsafe { self.pool.bytes(buffer.block)? };
        let frame = &bytes[..buffer.len];

        let sent = self.port.transmit(frame);
        if sent.is_ok() {
            self.complete_tx(frame);
        }

        self.pool.free(buffer.block)?;
        sent
    }

    fn complete_tx(&self, frame: &[u8]) {
        self.counters.tx_frames.fetch_add(1, Ordering::Relaxed);
        self.counters.tx_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        self.notify(MsgType::TxPacket, frame);
    }

    fn notify(&self, kind: MsgType, frame: &[u8]) {
        if let Some(callback) = &self.callback {
            callback(kind, frame);
        }
    }

    /// Snapshot of the device counters.
    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            rx_frames: self.counters.rx_frames.load(Ordering::Relaxed),
            rx_bytes: self.counters.rx_bytes.load(Ordering::Relaxed),
            rx_dropped: self.counters.rx_dropped.load(Ordering::Relaxed),
            tx_frames: self.counters.tx_frames.load(Ordering::Relaxed),
            tx_bytes: self.counters.tx_bytes.load(Ordering::Relaxed),
        }
    }

    /// Number of blocks currently armed for receive.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.armed.lock().len()
    }

    /// The pool behind this device.
    #[must_use]
    pub const fn pool(&self) -> &'p MemoryPool<R> {
        self.pool
    }
}

impl<R: PoolLock> fmt::Debug for NetDevice<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetDevice")
            .field("pool", &self.pool)
            .field("rx", &self.rx)
            .field("rx_ring", &self.rx_ring)
            .field("zero_copy_tx", &self.zero_copy_tx)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<R: PoolLock> Drop for NetDevice<'_, R> {
    fn drop(&mut self) {
        // Device-held blocks go back; zero-copy packets still out are the caller's.
        let armed = std::mem::take(self.armed.get_mut());
        let mut reclaimed = armed.len();
        for block in armed {
            self.pool.free(block).ok();
        }
        while let Some(block) = self.rx.dequeue() {
            self.pool.free(block).ok();
            reclaimed += 1;
        }
        debug!(reclaimed, "net device down");
    }
}
