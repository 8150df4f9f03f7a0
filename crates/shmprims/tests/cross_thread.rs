use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use shmprims::ring::{FrameFlags, FramedReader, FramedWriter, RecordRing, RingConfig, RingError};
use shmprims::segment::HeapRegion;
use shmprims::state::{StateError, TripleBuffer};

const COMMITS: u64 = 10_000;
const READERS: usize = 4;
const SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// A value that is only consistent if it was read in one piece.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
struct Canary {
    seq: u64,
    words: [u64; 15],
}

impl Canary {
    fn new(seq: u64) -> Self {
        Self {
            seq,
            words: [seq.wrapping_mul(SPREAD); 15],
        }
    }

    fn is_intact(&self) -> bool {
        let expected = self.seq.wrapping_mul(SPREAD);
        self.words.iter().all(|&w| w == expected)
    }
}

#[test]
fn triple_buffer_snapshots_are_never_torn() {
    let buffer = TripleBuffer::new(Canary::default());
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let mut writer = buffer.writer().unwrap();
        let done_flag = &done;
        s.spawn(move || {
            for seq in 1..=COMMITS {
                writer.publish(Canary::new(seq));
            }
            done_flag.store(true, Ordering::Release);
        });

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                s.spawn(|| {
                    let mut last = 0u64;
                    let mut seen = 0usize;
                    loop {
                        let finished = done.load(Ordering::Acquire);
                        match buffer.try_snapshot() {
                            Ok(Some(canary)) => {
                                assert!(canary.is_intact(), "torn read: {canary:?}");
                                assert!(canary.seq >= last, "went back from {last}");
                                last = canary.seq;
                                seen += 1;
                            }
                            Ok(None) | Err(StateError::ReaderBusy) => {
                                std::hint::spin_loop()
                            }
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                        if finished {
                            return seen;
                        }
                    }
                })
            })
            .collect();

        for reader in readers {
            reader.join().unwrap();
        }
    });

    let last = loop {
        match buffer.try_latest() {
            Ok(canary) => break canary,
            Err(StateError::ReaderBusy) => continue,
            Err(err) => panic!("unexpected error: {err}"),
        }
    };
    assert!(last.is_intact());
    assert_eq!(last.seq, COMMITS);
}

fn record_ring(capacity: u32) -> RecordRing {
    let config = RingConfig::record(capacity);
    let region = Arc::new(HeapRegion::new(config.memory_size()).unwrap());
    RecordRing::create(region, &config).unwrap()
}

fn payload(seq: u32) -> Vec<u8> {
    let len = 4 + (seq as usize * 7) % 250;
    let mut bytes = seq.to_le_bytes().to_vec();
    bytes.extend((4..len).map(|i| (seq as usize + i) as u8));
    bytes
}

#[test]
fn record_ring_spsc_keeps_order_and_content() {
    const RECORDS: u32 = 20_000;
    let ring = record_ring(4096);
    let mut writer = ring.writer().unwrap();
    let mut reader = ring.reader().unwrap();

    let producer = thread::spawn(move || {
        for seq in 0..RECORDS {
            let bytes = payload(seq);
            loop {
                match writer.write(&bytes) {
                    Ok(()) => break,
                    Err(RingError::OutOfSpace { .. }) => thread::yield_now(),
                    Err(err) => panic!("write failed: {err}"),
                }
            }
        }
    });

    let mut expected = 0u32;
    while expected < RECORDS {
        match reader.peek() {
            Ok(record) => {
                assert_eq!(record, payload(expected).as_slice(), "record {expected}");
                reader.consume().unwrap();
                expected += 1;
            }
            Err(RingError::Empty) => thread::yield_now(),
            Err(err) => panic!("read failed: {err}"),
        }
    }

    producer.join().unwrap();
    assert!(ring.is_empty());
}

fn frame_data(seq: u32, part: u32) -> Vec<u8> {
    vec![(seq + part) as u8; 8 + ((seq + part) % 60) as usize]
}

#[test]
fn framed_messages_cross_threads_whole() {
    const MESSAGES: u32 = 5_000;
    let config = RingConfig::multipart(2048);
    let region = Arc::new(HeapRegion::new(config.memory_size()).unwrap());
    let ring = RecordRing::create(region, &config).unwrap();
    let mut writer = FramedWriter::claim(&ring).unwrap();
    let mut reader = FramedReader::claim(&ring).unwrap();

    let producer = thread::spawn(move || {
        for seq in 0..MESSAGES {
            for part in 0..1 + seq % 4 {
                let data = frame_data(seq, part);
                let flags = FrameFlags::from_bits(part as i32);
                // A failed frame leaves the message built so far in place.
                while let Err(err) = writer.write_frame(&data, flags) {
                    assert!(err.is_retryable(), "write_frame failed: {err}");
                    thread::yield_now();
                }
            }
            while let Err(err) = writer.flush() {
                assert!(err.is_retryable(), "flush failed: {err}");
                thread::yield_now();
            }
        }
    });

    let mut seq = 0u32;
    while seq < MESSAGES {
        match reader.read_message() {
            Ok(message) => {
                assert_eq!(message.len() as u32, 1 + seq % 4, "message {seq}");
                for (part, frame) in message.iter().enumerate() {
                    assert_eq!(frame.flags.bits(), part as i32);
                    assert_eq!(frame.payload.as_ref(), frame_data(seq, part as u32).as_slice());
                }
                seq += 1;
            }
            Err(RingError::Empty) => thread::yield_now(),
            Err(err) => panic!("read failed: {err}"),
        }
    }
    producer.join().unwrap();
    assert!(ring.is_empty());
}
