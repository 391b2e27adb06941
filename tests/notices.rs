use std::io::Write;

use chrono::{TimeZone, Utc};
use infinity::error::InfinityError;
use infinity::journal::Journal;
use infinity::notice::{Bout, BoutNotice, Message, MessageNotice, Notice, Participant};
use infinity::wire;

fn bout() -> Bout {
    Bout::new(
        7,
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        "Ünïcode title",
        vec![
            Participant::new("urn:test:bob", false, true),
            Participant::new("urn:test:alice", true, false),
        ],
    )
}

fn message_notice() -> Notice {
    let message = Message::new(42, "urn:test:alice", "hello\nworld", Utc.timestamp_millis_opt(1_700_000_001_000).unwrap());
    Notice::Message(MessageNotice::new(message, bout()))
}

#[test]
fn notices_round_trip() {
    for notice in [Notice::Bout(BoutNotice::new(bout())), message_notice()] {
        let bytes = notice.to_bytes().expect("encode ok");
        assert_eq!(Notice::from_bytes(&bytes).expect("decode ok"), notice);
    }
}

#[test]
fn bout_layout() {
    let mut bytes = Vec::new();
    BoutNotice::new(bout()).write(&mut bytes).unwrap();
    let mut reader = bytes.as_slice();
    assert_eq!(wire::read_i64(&mut reader).unwrap(), 7);
    assert_eq!(wire::read_i64(&mut reader).unwrap(), 1_700_000_000_123);
    assert_eq!(wire::read_utf(&mut reader).unwrap(), "Ünïcode title");
    assert_eq!(wire::read_i32(&mut reader).unwrap(), 2);
    assert_eq!(wire::read_utf(&mut reader).unwrap(), "urn:test:bob");
    assert!(!wire::read_bool(&mut reader).unwrap());
    assert!(wire::read_bool(&mut reader).unwrap());
}

#[test]
fn participants_listed_twice_are_kept_once() {
    let mut bytes = Vec::new();
    wire::write_i64(&mut bytes, 3).unwrap();
    wire::write_i64(&mut bytes, 1_700_000_000_000).unwrap();
    wire::write_utf(&mut bytes, "echo").unwrap();
    wire::write_i32(&mut bytes, 3).unwrap();
    let listed = [
        ("urn:test:a", true, false),
        ("urn:test:b", false, true),
        ("urn:test:a", false, true),
    ];
    for (urn, leader, confirmed) in listed {
        wire::write_utf(&mut bytes, urn).unwrap();
        wire::write_bool(&mut bytes, leader).unwrap();
        wire::write_bool(&mut bytes, confirmed).unwrap();
    }
    let notice = BoutNotice::read(&mut bytes.as_slice()).expect("decode ok");
    let expected = vec![
        Participant::new("urn:test:a", true, false),
        Participant::new("urn:test:b", false, true),
    ];
    assert_eq!(notice.bout().participants(), expected.as_slice());
    assert_eq!(notice.bout().marker(), "urn:test:a urn:test:b");

    let twice = vec![
        Participant::new("urn:test:b", false, true),
        Participant::new("urn:test:b", true, true),
    ];
    let bout = Bout::new(3, Utc::now(), "echo", twice);
    assert_eq!(bout.participants(), [Participant::new("urn:test:b", false, true)].as_slice());
}

#[test]
fn dates_keep_milliseconds_only() {
    let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let message = Message::new(1, "urn:test:a", "x", precise);
    assert_eq!(message.date().timestamp_subsec_nanos(), 123_000_000);
}

#[test]
fn names_and_deps() {
    let notice = message_notice();
    assert_eq!(notice.kind(), "message");
    assert_eq!(notice.name(), "message:42");
    let deps: Vec<String> = notice.deps().unwrap().into_iter().collect();
    assert_eq!(deps, vec!["urn:test:alice", "urn:test:bob"]);
    assert_eq!(bout().marker(), "urn:test:alice urn:test:bob");
}

#[test]
fn bout_without_participants_has_no_deps() {
    let empty = Bout::new(3, Utc::now(), "lonely", Vec::new());
    match Notice::Bout(BoutNotice::new(empty)).deps() {
        Err(InfinityError::Dependency(message)) => assert!(message.contains("bout:3")),
        other => panic!("expected a dependency error, got {other:?}"),
    }
}

#[test]
fn corrupt_notices_are_rejected() {
    let bytes = message_notice().to_bytes().unwrap();
    let truncated = &bytes[..bytes.len() - 3];
    assert!(matches!(Notice::from_bytes(truncated), Err(InfinityError::DataCorruption { .. })));

    let mut padded = bytes.clone();
    padded.push(0);
    assert!(matches!(Notice::from_bytes(&padded), Err(InfinityError::DataCorruption { .. })));

    let mut unknown = Vec::new();
    wire::write_utf(&mut unknown, "poll").unwrap();
    assert!(matches!(Notice::from_bytes(&unknown), Err(InfinityError::DataCorruption { .. })));

    let mut bad_bool = Vec::new();
    wire::write_i64(&mut bad_bool, 1).unwrap();
    wire::write_i64(&mut bad_bool, 0).unwrap();
    wire::write_utf(&mut bad_bool, "t").unwrap();
    wire::write_i32(&mut bad_bool, 1).unwrap();
    wire::write_utf(&mut bad_bool, "urn:x").unwrap();
    bad_bool.push(2);
    bad_bool.push(0);
    assert!(matches!(BoutNotice::read(&mut bad_bool.as_slice()), Err(InfinityError::DataCorruption { .. })));
}

#[test]
fn oversized_utf_fails_to_encode() {
    let long = "x".repeat(wire::UTF_LIMIT + 1);
    let bout = Bout::new(1, Utc::now(), long, vec![Participant::new("urn:x", true, true)]);
    assert!(matches!(
        Notice::Bout(BoutNotice::new(bout)).to_bytes(),
        Err(InfinityError::IllegalArgument(_))
    ));
}

#[test]
fn journal_replays_and_dedups() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notices.journal");
    {
        let (journal, notices) = Journal::open(&path).expect("journal opens");
        assert!(notices.is_empty());
        assert!(journal.append(&message_notice()).unwrap());
        assert!(!journal.append(&message_notice()).unwrap(), "same notice twice");
        assert!(journal.append(&Notice::Bout(BoutNotice::new(bout()))).unwrap());
        assert_eq!(journal.len(), 2);
    }
    let (journal, notices) = Journal::open(&path).expect("journal reopens");
    assert_eq!(notices, vec![message_notice(), Notice::Bout(BoutNotice::new(bout()))]);
    assert!(!journal.append(&message_notice()).unwrap());
}

#[test]
fn truncated_journal_is_corrupt() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("notices.journal");
    {
        let (journal, _) = Journal::open(&path).unwrap();
        journal.append(&message_notice()).unwrap();
    }
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0, 0, 0, 50, 1, 2]).unwrap();
    drop(file);
    assert!(matches!(Journal::open(&path), Err(InfinityError::DataCorruption { .. })));
}
