use bitcoin::consensus;
use chrono::{TimeZone, Utc};
use rebid_tracker::event::{
    BlockHashEvent, RawTransactionEvent, SequenceSignalEvent, TransactionHashEvent, NO_SEQUENCE,
};
use rebid_tracker::{Event, Frame, MalformedEventError, SequenceLabel, TransactionParseError};

/// Segwit transaction captured from a live `rawtx` feed.
const RAW_TX_HEX: &str = "010000000001019ea7727841f5406dcf219691f3eeeb4d36a775720ba3ec269d33f1c9667638710000000000ffffffff02df11160000000000160014bf9b43b1a62ffcd7edcf336e0d770f7e70971a67a528020000000000160014195d08ab5c31a852319eba303116a537cc45681402483045022100b6b575fa4fdbae86f4f650dac21bc07a4551bf50e000c810068377f7771342d002205a7683aa6ac9f57899e21062bd3475b355d7c5eb170a17f40f7d36613a595d9b01210343c697a0f53f530f064ad7b3eef2f00e4b48b7f24c828b30c2c593574289aa7a00000000";

fn at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

fn sample_events() -> Vec<Event> {
    let t = at() + chrono::Duration::nanoseconds(123_456_789);
    vec![
        Event::RawTransaction(RawTransactionEvent {
            sequence: 564_091,
            tx_bytes: hex::decode(RAW_TX_HEX).unwrap(),
            timestamp: t,
        }),
        Event::TransactionHash(TransactionHashEvent {
            sequence: NO_SEQUENCE,
            tx_hash: [0x66; 32],
            timestamp: t,
        }),
        Event::BlockHash(BlockHashEvent {
            sequence: 0,
            block_hash: [0x00; 32],
            timestamp: at(),
        }),
        Event::SequenceSignal(SequenceSignalEvent {
            sequence: u32::MAX as i64,
            hash: [0xab; 32],
            label: SequenceLabel::TxAdded,
            mempool_sequence: Some(77),
            timestamp: t,
        }),
        Event::SequenceSignal(SequenceSignalEvent {
            sequence: 9,
            hash: [0x01; 32],
            label: SequenceLabel::BlockConnected,
            mempool_sequence: None,
            timestamp: t,
        }),
        Event::SequenceSignal(SequenceSignalEvent {
            sequence: NO_SEQUENCE,
            hash: [0x02; 32],
            label: SequenceLabel::Unlabeled(b')'),
            mempool_sequence: None,
            timestamp: t,
        }),
    ]
}

#[test]
fn decodes_each_topic() {
    let hash = [7u8; 32];
    let seq = 42u32.to_le_bytes();

    let e = Event::decode(&Frame::new("hashtx", hash, seq), at()).unwrap();
    assert_eq!(
        e,
        Event::TransactionHash(TransactionHashEvent {
            sequence: 42,
            tx_hash: hash,
            timestamp: at()
        })
    );

    let e = Event::decode(&Frame::new("hashblock", hash, Vec::new()), at()).unwrap();
    assert_eq!(e.sequence(), NO_SEQUENCE);
    assert!(matches!(e, Event::BlockHash(b) if b.block_hash == hash));

    let raw = hex::decode(RAW_TX_HEX).unwrap();
    let e = Event::decode(&Frame::new("rawtx", raw.clone(), seq), at()).unwrap();
    assert!(matches!(&e, Event::RawTransaction(r) if r.tx_bytes == raw));

    let mut body = hash.to_vec();
    body.push(b'R');
    let e = Event::decode(&Frame::new("sequence", body.clone(), seq), at()).unwrap();
    assert!(matches!(&e, Event::SequenceSignal(s)
        if s.label == SequenceLabel::TxRemoved && s.mempool_sequence.is_none()));

    body.extend_from_slice(&1_000_001u64.to_le_bytes());
    let e = Event::decode(&Frame::new("sequence", body, seq), at()).unwrap();
    assert!(matches!(&e, Event::SequenceSignal(s) if s.mempool_sequence == Some(1_000_001)));
}

#[test]
fn unknown_label_byte_does_not_fail() {
    let mut body = vec![0u8; 32];
    body.push(b'Z');
    let e = Event::decode(&Frame::new("sequence", body, Vec::new()), at()).unwrap();
    assert!(matches!(e, Event::SequenceSignal(s) if s.label == SequenceLabel::Unlabeled(b'Z')));
}

#[test]
fn rejects_malformed_frames() {
    let hash = [7u8; 32];

    assert!(matches!(
        Event::decode(&Frame::new("rawblock", hash, Vec::new()), at()),
        Err(MalformedEventError::UnknownTopic(t)) if t == "rawblock"
    ));
    assert_eq!(
        Event::decode(&Frame::new("hashtx", hash, vec![1, 2]), at()),
        Err(MalformedEventError::SequenceLength(2))
    );
    assert!(matches!(
        Event::decode(&Frame::new("hashtx", &hash[..31], Vec::new()), at()),
        Err(MalformedEventError::PayloadLength { got: 31, .. })
    ));
    assert!(matches!(
        Event::decode(&Frame::new("rawtx", Vec::new(), Vec::new()), at()),
        Err(MalformedEventError::PayloadLength { got: 0, .. })
    ));
    assert!(matches!(
        Event::decode(&Frame::new("sequence", vec![0u8; 37], Vec::new()), at()),
        Err(MalformedEventError::PayloadLength { got: 37, .. })
    ));
}

#[test]
fn wire_round_trip_preserves_fields() {
    for event in sample_events() {
        let back = Event::decode(&event.to_frame(), event.timestamp()).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn text_round_trip_preserves_fields() {
    for event in sample_events() {
        let line = event.to_string();
        let back: Event = line.parse().unwrap();
        assert_eq!(back, event, "line: {line}");
    }
}

#[test]
fn text_format_is_stable() {
    let e = Event::SequenceSignal(SequenceSignalEvent {
        sequence: NO_SEQUENCE,
        hash: [0xab; 32],
        label: SequenceLabel::BlockConnected,
        mempool_sequence: None,
        timestamp: at(),
    });
    assert_eq!(
        e.to_string(),
        format!(
            "SequenceNumber(sequence=-1, seq_hash={}, label=C, mempool_sequence=None, timestamp=2024-03-01T10:00:00Z)",
            "ab".repeat(32)
        )
    );
}

#[test]
fn text_lines_must_match_arity() {
    // older dumps carried no timestamp
    let legacy = "TransactionHash(sequence=564091, tx_hash=662038688ad4727bcbc7d9f5fb3635279435ac83d86d28daa30a4e28aa78e52b)";
    assert_eq!(
        legacy.parse::<Event>(),
        Err(MalformedEventError::FieldCount {
            kind: "TransactionHash",
            expected: 3,
            got: 2
        })
    );

    let swapped = format!(
        "BlockHash(block_hash={}, sequence=1, timestamp=2024-03-01T10:00:00Z)",
        "00".repeat(32)
    );
    assert!(matches!(
        swapped.parse::<Event>(),
        Err(MalformedEventError::Field { field: "sequence", .. })
    ));

    assert!(matches!(
        "RawBlock(sequence=1, raw_block=00, timestamp=2024-03-01T10:00:00Z)".parse::<Event>(),
        Err(MalformedEventError::UnknownTopic(_))
    ));
    assert!(matches!(
        "not an event".parse::<Event>(),
        Err(MalformedEventError::Syntax(_))
    ));
    assert!(matches!(
        "TransactionHash(sequence=1, tx_hash=abcd, timestamp=2024-03-01T10:00:00Z)"
            .parse::<Event>(),
        Err(MalformedEventError::Field { field: "tx_hash", .. })
    ));
}

#[test]
fn deserializes_raw_transaction() {
    let raw = RawTransactionEvent {
        sequence: 564_091,
        tx_bytes: hex::decode(RAW_TX_HEX).unwrap(),
        timestamp: at(),
    };
    let tx = raw.deserialize().unwrap();
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 1_446_367);
    assert_eq!(tx.output[1].value.to_sat(), 141_477);
    assert!(tx.input[0].sequence.is_final());
}

#[test]
fn truncated_or_unsupported_transactions_fail() {
    let mut bytes = hex::decode(RAW_TX_HEX).unwrap();
    bytes.truncate(bytes.len() - 10);
    let truncated = RawTransactionEvent {
        sequence: 1,
        tx_bytes: bytes,
        timestamp: at(),
    };
    assert!(matches!(
        truncated.deserialize(),
        Err(TransactionParseError::Encoding(_))
    ));

    let mut tx = RawTransactionEvent {
        sequence: 1,
        tx_bytes: hex::decode(RAW_TX_HEX).unwrap(),
        timestamp: at(),
    }
    .deserialize()
    .unwrap();
    tx.version = bitcoin::transaction::Version(7);
    let future = RawTransactionEvent {
        sequence: 1,
        tx_bytes: consensus::serialize(&tx),
        timestamp: at(),
    };
    assert!(matches!(
        future.deserialize(),
        Err(TransactionParseError::UnsupportedVersion(7))
    ));
}
