//! # PACKETPOOL Loopback Demo
//!
//! Runs a simulated NIC against a peer thread:
//! - the peer sends numbered frames of random size
//! - the device receives them, alternating copy and zero-copy paths
//! - every eighth frame is acknowledged back to the peer
//!
//! ```bash
//! # Default geometry (1536 x 32)
//! ./loopback_demo
//!
//! # Geometry from a file
//! ./loopback_demo device.toml
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use packetpool::{MsgType, NetDevice, NetDeviceConfig, NetError, NetResult, Port, Wire};
use packetpool_core::MemoryPool;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Frames the peer sends.
const FRAMES: u32 = 10_000;
/// Smallest Ethernet frame without FCS.
const MIN_FRAME: usize = 60;
/// Largest Ethernet frame without FCS.
const MAX_FRAME: usize = 1514;

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                  PACKETPOOL LOOPBACK DEMO v0.1.0");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    let config = match std::env::args().nth(1) {
        Some(arg) if arg == "--help" || arg == "-h" => {
            println!("Usage: loopback_demo [CONFIG.toml]");
            return;
        }
        Some(path) => match NetDeviceConfig::load(&path) {
            Ok(config) => {
                println!("   ✓ Loaded {path}");
                config
            }
            Err(e) => {
                eprintln!("   ✗ FATAL: {e}");
                std::process::exit(1);
            }
        },
        None => NetDeviceConfig::default(),
    };

    if let Err(e) = run(&config) {
        eprintln!("   ✗ FATAL: {e}");
        std::process::exit(1);
    }
}

fn run(config: &NetDeviceConfig) -> NetResult<()> {
    let pool: MemoryPool = MemoryPool::from_config(&config.pool)?;
    println!(
        "   ✓ Pool: {} blocks x {} bytes (requested {})",
        pool.block_count(),
        pool.block_size(),
        pool.requested_block_size()
    );

    let (nic, peer) = Wire::pair();
    let mut device = NetDevice::new(&pool, config, nic)?;

    let rx_events = Arc::new(AtomicU64::new(0));
    let events = Arc::clone(&rx_events);
    device.set_callback(move |kind, _frame| {
        if kind == MsgType::RxPacket {
            events.fetch_add(1, Ordering::Relaxed);
        }
    });

    let armed = device.arm_rx();
    println!("   ✓ RX ring: {armed} blocks armed for hardware");
    println!(
        "   ✓ TX mode: {}",
        if config.zero_copy_tx { "zero-copy" } else { "copy" }
    );
    println!();

    let start = Instant::now();
    let (received, acks) = thread::scope(|s| {
        let producer = s.spawn(move || feed(&peer));
        let received = consume(&device);
        let acks = producer.join().unwrap_or(0);
        (received, acks)
    });
    let elapsed = start.elapsed();

    let stats = device.stats();
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                           RESULTS");
    println!("═══════════════════════════════════════════════════════════════════");
    println!("   Sent by peer:      {FRAMES}");
    println!("   Received:          {received}");
    println!("   RX callbacks:      {}", rx_events.load(Ordering::Relaxed));
    println!("   RX dropped:        {}", stats.rx_dropped);
    println!("   RX bytes:          {}", stats.rx_bytes);
    println!("   TX acks:           {} (peer saw {acks})", stats.tx_frames);
    println!("   Elapsed:           {elapsed:?}");
    println!();
    println!(
        "   Pool: {} used / {} free / {} hw-owned",
        pool.used(),
        pool.available(),
        pool.hw_owned_count()
    );

    drop(device);
    println!(
        "   Pool after device down: {} used / {} free",
        pool.used(),
        pool.available()
    );
    Ok(())
}

/// Peer side: sends numbered frames and counts acknowledgements.
///
/// Never blocks on a full wire, so the device can always make progress.
fn feed(peer: &Port) -> u64 {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut frame = vec![0u8; MAX_FRAME];
    let mut acks = 0;

    for seq in 0..FRAMES {
        let len = rng.gen_range(MIN_FRAME..=MAX_FRAME);
        frame[..4].copy_from_slice(&seq.to_le_bytes());
        rng.fill(&mut frame[4..len]);

        loop {
            match peer.try_transmit(&frame[..len]) {
                Ok(true) => break,
                Ok(false) => {
                    acks += drain_acks(peer);
                    thread::yield_now();
                }
                Err(_) => return acks,
            }
        }
        acks += drain_acks(peer);
    }

    // Let the device finish acknowledging, then hang up.
    while let Ok(Some(_)) = peer.receive_timeout(Duration::from_millis(50)) {
        acks += 1;
    }
    acks
}

fn drain_acks(peer: &Port) -> u64 {
    let mut acks = 0;
    while let Ok(Some(_)) = peer.try_receive() {
        acks += 1;
    }
    acks
}

/// Device side: polls the wire until the peer hangs up and drains the queue.
fn consume(device: &NetDevice<'_>) -> u64 {
    let mut buf = [0u8; MAX_FRAME];
    let mut received = 0u64;

    loop {
        match device.poll_rx() {
            Ok(0) => thread::yield_now(),
            Ok(_) => {}
            Err(NetError::LinkDown) => break,
            Err(e) => {
                eprintln!("   ✗ poll failed: {e}");
                break;
            }
        }

        while device.has_packet() {
            let seq = if received % 2 == 0 {
                match device.receive_into(&mut buf) {
                    Ok(len) if len >= 4 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
                    _ => continue,
                }
            } else {
                let Some(packet) = device.receive_zero_copy() else {
                    continue;
                };
                let mut head = [0u8; 4];
                let seq = match device.copy_payload(&packet, &mut head) {
                    Ok(4) => u32::from_le_bytes(head),
                    _ => u32::MAX,
                };
                if let Err(e) = device.release(packet) {
                    eprintln!("   ✗ release failed: {e}");
                }
                seq
            };
            received += 1;

            if seq % 8 == 0 {
                match device.send(&seq.to_le_bytes()) {
                    // Peer may already have hung up; an ack is best effort.
                    Ok(()) | Err(NetError::NoBuffer | NetError::LinkDown) => {}
                    Err(e) => eprintln!("   ✗ ack {seq} failed: {e}"),
                }
            }
        }
    }
    received
}
