#![cfg(unix)]

use std::sync::Arc;

use shmprims::ring::{
    FrameFlags, FrameType, FramedReader, FramedWriter, Message, RecordRing, RingConfig, RingError,
    RingType, HEADER_SIZE,
};
use shmprims::segment::{Segment, SegmentError, SharedRegion, REGION_ALIGN};
use shmprims::state::{SharedTripleBuffer, StateError, TripleBuffer};

fn unique_name(tag: &str) -> String {
    format!("/shmprims-it-{}-{tag}", std::process::id())
}

/// Create a named segment and attach a second, independent mapping to it.
fn two_mappings(tag: &str, len: usize) -> (Arc<dyn SharedRegion>, Arc<dyn SharedRegion>) {
    let name = unique_name(tag);
    let created = Segment::create(&name, len).unwrap();
    let opened = Segment::open(&name).unwrap();
    (Arc::new(created), Arc::new(opened))
}

#[test]
fn record_ring_across_mappings() {
    let config = RingConfig::record(1024);
    let (producer_side, consumer_side) = two_mappings("ring", config.memory_size());

    let ring = RecordRing::create(producer_side, &config).unwrap();
    let view = RecordRing::attach(consumer_side).unwrap();
    assert_eq!(view.capacity(), 1024);

    let mut writer = ring.writer().unwrap();
    let mut reader = view.reader().unwrap();
    for i in 0..100u32 {
        writer.write(&i.to_ne_bytes()).unwrap();
        assert_eq!(reader.next_size().unwrap(), Some(4));
        assert_eq!(reader.peek().unwrap(), i.to_ne_bytes());
        reader.consume().unwrap();
    }
    assert!(view.is_empty());
}

#[test]
fn claims_are_visible_through_every_mapping() {
    let config = RingConfig::record(256);
    let (a, b) = two_mappings("claims", config.memory_size());
    let ring = RecordRing::create(a, &config).unwrap();
    let view = RecordRing::attach(b).unwrap();

    let writer = ring.writer().unwrap();
    let err = view.writer().unwrap_err();
    assert!(matches!(err, RingError::WriterClaimed { owner } if owner == std::process::id()));
    assert_eq!(view.claims().0, Some(std::process::id()));

    drop(writer);
    assert!(view.writer().is_ok());
}

#[test]
fn crashed_claim_can_be_cleared() {
    let config = RingConfig::record(256);
    let (a, b) = two_mappings("crash", config.memory_size());
    let ring = RecordRing::create(a, &config).unwrap();
    // Stands in for a reader whose process went away.
    let stale = ring.reader().unwrap();

    let view = RecordRing::attach(b).unwrap();
    assert!(matches!(view.reader(), Err(RingError::ReaderClaimed { .. })));
    view.clear_claims();
    assert_eq!(view.claims(), (None, None));
    assert!(view.reader().is_ok());
    drop(stale);
}

#[test]
fn attach_to_uninitialized_segment_fails() {
    let (_a, b) = two_mappings("blank", 4096);
    assert!(matches!(
        RecordRing::attach(b),
        Err(RingError::BadMagic { found: 0 })
    ));
}

#[test]
fn attach_checks_region_size() {
    let config = RingConfig::record(1024);
    let name = unique_name("short");
    let full: Arc<dyn SharedRegion> =
        Arc::new(Segment::create(&name, config.memory_size()).unwrap());
    let _ring = RecordRing::create(Arc::clone(&full), &config).unwrap();

    // A region holding only the header.
    let header_only = Segment::anonymous(HEADER_SIZE).unwrap();
    // SAFETY: both regions are at least HEADER_SIZE bytes and do not overlap.
    unsafe {
        std::ptr::copy_nonoverlapping(full.as_ptr(), header_only.as_ptr(), HEADER_SIZE);
    }
    assert!(matches!(
        RecordRing::attach(Arc::new(header_only)),
        Err(RingError::Segment(SegmentError::OutOfBounds { .. }))
    ));
}

#[test]
fn multipart_ring_across_mappings() {
    let config = RingConfig::multipart(2048);
    let (a, b) = two_mappings("framed", config.memory_size());
    let mut writer = FramedWriter::claim(&RecordRing::create(a, &config).unwrap()).unwrap();
    let mut reader = FramedReader::claim(&RecordRing::attach(b).unwrap()).unwrap();

    let message = Message::new()
        .with(FrameType::Originator, "rt")
        .with(FrameFlags::new(FrameType::Protobuf, Default::default(), 2), vec![9u8; 100]);
    writer.write_message(&message).unwrap();

    assert_eq!(reader.read_message().unwrap(), message);
    assert!(matches!(reader.read_frame(), Err(RingError::Empty)));
}

#[test]
fn stream_ring_and_scratchpad_across_mappings() {
    let config = RingConfig::stream(256).with_scratchpad(64);
    let (a, b) = two_mappings("stream", config.memory_size());
    let ring = RecordRing::create(a, &config).unwrap();
    let view = RecordRing::attach(b).unwrap();
    assert_eq!(view.ring_type(), RingType::Stream);
    assert_eq!(view.scratchpad().len(), 64);

    let mut writer = ring.stream_writer().unwrap();
    let mut reader = view.stream_reader().unwrap();
    let mut received = Vec::new();
    for chunk in 0..40u8 {
        writer.write_all(&[chunk; 13]).unwrap();
        received.extend(reader.read_to_vec().unwrap());
    }
    assert_eq!(received.len(), 40 * 13);
    assert!(received.chunks(13).enumerate().all(|(i, c)| c.iter().all(|&b| b == i as u8)));

    ring.write_scratchpad(0, b"status").unwrap();
    let mut buf = [0u8; 6];
    view.read_scratchpad(0, &mut buf).unwrap();
    assert_eq!(&buf, b"status");
}

#[test]
fn ring_and_triple_buffer_share_one_segment() {
    let config = RingConfig::record(512);
    let state_at = config.memory_size().next_multiple_of(REGION_ALIGN);
    let len = state_at + TripleBuffer::<[u32; 4]>::memory_size();
    let (a, b) = two_mappings("both", len);

    let ring = RecordRing::create(Arc::clone(&a), &config).unwrap();
    let state = SharedTripleBuffer::create_at(a, state_at, [0u32; 4]).unwrap();

    let ring_view = RecordRing::attach(Arc::clone(&b)).unwrap();
    // SAFETY: created above with the same element type; `u32` arrays accept
    // any bit pattern.
    let state_view = unsafe { SharedTripleBuffer::<[u32; 4]>::attach_at(b, state_at) }.unwrap();

    ring.writer().unwrap().write(b"event").unwrap();
    state.writer().unwrap().publish([1, 2, 3, 4]);

    assert_eq!(ring_view.reader().unwrap().peek().unwrap(), b"event");
    assert_eq!(state_view.try_snapshot().unwrap(), Some([1, 2, 3, 4]));
}

#[test]
fn triple_buffer_attach_validates_role_flag() {
    let (_a, b) = two_mappings("flag", TripleBuffer::<u64>::memory_size());
    // SAFETY: `u64` accepts any bit pattern.
    let result = unsafe { SharedTripleBuffer::<u64>::attach_at(b, 0) };
    assert!(matches!(result, Err(StateError::Corrupted(_))));
}
