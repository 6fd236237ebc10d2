//! # Simulated Wire
//!
//! A full-duplex link made of two bounded crossbeam channels. Each end is a
//! [`Port`]; frames sent on one port arrive at the other.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::{NetError, NetResult};

/// Frames in flight per direction before `transmit` reports backpressure.
pub const WIRE_DEPTH: usize = 64;

/// Constructor for a connected pair of ports.
pub struct Wire;

impl Wire {
    /// Creates two connected ports.
    #[must_use]
    pub fn pair() -> (Port, Port) {
        Self::with_depth(WIRE_DEPTH)
    }

    /// Creates two connected ports holding up to `depth` frames per direction.
    #[must_use]
    pub fn with_depth(depth: usize) -> (Port, Port) {
        let (a_tx, b_rx) = bounded(depth);
        let (b_tx, a_rx) = bounded(depth);
        (Port { tx: a_tx, rx: a_rx }, Port { tx: b_tx, rx: b_rx })
    }
}

/// One end of a [`Wire`].
#[derive(Debug)]
pub struct Port {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl Port {
    /// Puts a frame on the wire, waiting while the peer is backlogged.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkDown`] if the peer port is gone.
    pub fn transmit(&self, frame: &[u8]) -> NetResult<()> {
        self.tx.send(frame.to_vec()).map_err(|_| NetError::LinkDown)
    }

    /// Puts a frame on the wire without waiting.
    ///
    /// Returns `Ok(false)` if the wire is backlogged.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkDown`] if the peer port is gone.
    pub fn try_transmit(&self, frame: &[u8]) -> NetResult<bool> {
        match self.tx.try_send(frame.to_vec()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(NetError::LinkDown),
        }
    }

    /// Takes the next arrived frame, if any.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkDown`] once the peer is gone and every frame
    /// it sent has been taken.
    pub fn try_receive(&self) -> NetResult<Option<Vec<u8>>> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(NetError::LinkDown),
        }
    }

    /// Waits up to `timeout` for the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::LinkDown`] if the peer is gone and the wire is drained.
    pub fn receive_timeout(&self, timeout: Duration) -> NetResult<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(NetError::LinkDown),
        }
    }

    /// Frames waiting to be received on this port.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
