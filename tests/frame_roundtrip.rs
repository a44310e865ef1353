//! Round-trip coverage for every frame kind
//!
//! `parse(create(kind, args))` must reproduce the arguments for all
//! well-formed inputs, with wrapper kinds accumulating context instead of
//! discarding it.

use bayeos_client::frame::Route;
use bayeos_client::{ChannelKey, Frame, ParseContext, ParsedRecord, Payload};

fn roundtrip(frame: &Frame) -> Frame {
    Frame::from_bytes(&frame.to_bytes().unwrap()).unwrap()
}

fn parse(frame: &Frame) -> ParsedRecord {
    Frame::parse(&frame.to_bytes().unwrap(), ParseContext::at(0.0)).unwrap()
}

#[test]
fn every_kind_survives_the_wire() {
    let data = Frame::data(vec![(1u8, 2.0), (5u8, -3.5)], 0x21, 0).unwrap();
    let kinds = vec![
        data.clone(),
        Frame::command(2, vec![1, 2, 3]),
        Frame::command_response(2, vec![4, 5]),
        Frame::message("status ok"),
        Frame::error_message("sensor offline"),
        Frame::routed(10, 20, data.clone()),
        Frame::delayed(1500, data.clone()),
        Frame::routed_rssi(10, 20, 77, data.clone()),
        Frame::timestamp_sec(500_000_000, data.clone()),
        Frame::binary(vec![0xde, 0xad, 0xbe, 0xef]).unwrap(),
        Frame::origin("station/a", data.clone()),
        Frame::timestamp_ms(1_600_000_000_000, data.clone()),
        Frame::gateway_command(9, vec![]),
        Frame::routed_origin("hop", data.clone()),
        Frame::checksum(data.clone()).unwrap(),
    ];

    for frame in &kinds {
        assert_eq!(&roundtrip(frame), frame, "kind 0x{:x}", frame.tag());
    }

    // tags cover the full defined range exactly once
    let mut tags: Vec<u8> = kinds.iter().map(Frame::tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, (0x1..=0xf).collect::<Vec<u8>>());
}

#[test]
fn nested_context_accumulates_regardless_of_order() {
    let data = Frame::data(vec![(1u8, 3.0)], 0x21, 0).unwrap();

    // origin outside timestamp
    let a = Frame::origin(
        "A",
        Frame::timestamp_ms(1_000_000, data.clone()),
    );
    // timestamp outside origin
    let b = Frame::timestamp_ms(1_000_000, Frame::origin("A", data));

    for frame in [a, b] {
        let record = parse(&frame);
        assert_eq!(record.origin, "A");
        assert_eq!(record.timestamp, 1_000.0);
        assert_eq!(record.values().unwrap(), &[(ChannelKey::Index(1), 3.0)]);
    }
}

#[test]
fn wrapper_stack_keeps_every_contribution() {
    let frame = Frame::checksum(Frame::routed_rssi(
        3,
        4,
        55,
        Frame::origin(
            "base",
            Frame::routed_origin(
                "leaf",
                Frame::timestamp_sec(0, Frame::message("hello")),
            ),
        ),
    ))
    .unwrap();

    let record = parse(&frame);
    assert_eq!(record.origin, "base/leaf");
    assert_eq!(record.timestamp, 946_684_800.0);
    assert_eq!(record.rssi, Some(55));
    assert_eq!(record.route, Some(Route { my_id: 3, pan_id: 4 }));
    assert_eq!(record.checksum_valid, Some(true));
    assert_eq!(record.payload, Payload::Message("hello".to_string()));
}

#[test]
fn labeled_keys_read_back_as_raw_bytes() {
    let frame = Frame::data(vec![("außen", 1.25)], 0x61, 0).unwrap();
    let record = parse(&frame);
    assert_eq!(
        record.values().unwrap(),
        &[(ChannelKey::Label("außen".to_string()), 1.25)]
    );
}

#[test]
fn checksum_of_checksum_nests() {
    let inner = Frame::checksum(Frame::message("twice")).unwrap();
    let outer = Frame::checksum(inner).unwrap();
    let record = parse(&outer);
    assert_eq!(record.checksum_valid, Some(true));
    assert_eq!(record.payload, Payload::Message("twice".to_string()));
}
