//! Multipart messages from a realtime producer to a non-realtime bridge.
//!
//! The producer builds each message frame by frame directly in the ring,
//! the way a realtime component would, and drops messages when the ring is
//! full instead of waiting. The bridge drains whole messages and logs them.
//!
//! Run with:
//!   cargo run --example message-bridge --features logging

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shmprims::logging::init_logging_from_env;
use shmprims::ring::{
    FrameFlags, FrameType, FramedReader, FramedWriter, PayloadType, RecordRing, RingConfig,
    RingError,
};
use shmprims::segment::{Segment, SharedRegion};
use tracing::{info, warn};

const MESSAGES: u32 = 500;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let config = RingConfig::multipart(4 * 1024);
    let name = format!("/shmprims-bridge-{}", std::process::id());

    let producer_side: Arc<dyn SharedRegion> =
        Arc::new(Segment::create(&name, config.memory_size())?);
    let ring = RecordRing::create(producer_side, &config)?;

    let bridge_side: Arc<dyn SharedRegion> = Arc::new(Segment::open(&name)?);
    let mut bridge = FramedReader::claim(&RecordRing::attach(bridge_side)?)?;

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let producer = s.spawn(|| -> Result<u32, RingError> {
            let mut writer = FramedWriter::claim(&ring)?;
            let mut dropped = 0;
            for seq in 0..MESSAGES {
                match build_message(&mut writer, seq) {
                    Ok(()) => {}
                    Err(err) if err.is_retryable() => {
                        writer.abort();
                        dropped += 1;
                    }
                    Err(err) => return Err(err),
                }
                thread::sleep(Duration::from_micros(200));
            }
            done.store(true, Ordering::Release);
            Ok(dropped)
        });

        let mut received = 0u32;
        loop {
            let finished = done.load(Ordering::Acquire);
            match bridge.read_message() {
                Ok(message) => {
                    received += 1;
                    for frame in &message {
                        info!(
                            flags = %frame.flags,
                            len = frame.payload.len(),
                            "frame"
                        );
                    }
                }
                Err(RingError::Empty) if finished => break,
                Err(RingError::Empty) => thread::sleep(Duration::from_millis(1)),
                Err(err) => {
                    warn!(error = %err, "bridge stopped");
                    break;
                }
            }
        }

        match producer.join() {
            Ok(Ok(dropped)) => info!(received, dropped, "bridge finished"),
            Ok(Err(err)) => warn!(error = %err, "producer failed"),
            Err(_) => warn!("producer panicked"),
        }
    });

    Ok(())
}

/// Originator, target and an encoded body, written in place.
fn build_message(writer: &mut FramedWriter, seq: u32) -> Result<(), RingError> {
    writer.write_frame(b"servo-thread", FrameType::Originator.into())?;
    writer.write_frame(b"status-bridge", FrameType::Target.into())?;

    let flags = FrameFlags::new(FrameType::Protobuf, PayloadType::RtMessage, 1);
    let body = writer.begin_frame(64, flags)?;
    let text = format!("seq={seq}");
    let len = text.len().min(body.len());
    body[..len].copy_from_slice(&text.as_bytes()[..len]);
    writer.end_frame(len)?;

    writer.flush().map(|_| ())
}
