use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use infinity::error::InfinityError;
use infinity::infinity::Infinity;
use infinity::motors::BOUT_TO_PARTICIPANT;
use infinity::notice::{Bout, BoutNotice, Message, MessageNotice, Notice, Participant};
use infinity::settings::{Backend, Settings};
use infinity::triples::Triples;

fn bout(number: u64, title: &str, urns: &[&str]) -> Bout {
    let participants = urns.iter().map(|u| Participant::new(*u, false, true)).collect();
    Bout::new(number, Utc::now(), title, participants)
}

fn post(engine: &Infinity, number: u64, author: &str, text: &str, bout: &Bout) {
    let message = Message::new(number, author, text, Utc::now());
    let deps: Vec<String> = engine
        .see(Notice::Message(MessageNotice::new(message, bout.clone())))
        .expect("notice accepted")
        .into_iter()
        .collect();
    wait(engine, &deps);
}

fn wait(engine: &Infinity, deps: &[String]) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !engine.eta(deps).is_zero() {
        assert!(Instant::now() < deadline, "notices for {deps:?} never finished");
        thread::sleep(Duration::from_millis(1));
    }
}

fn seed(engine: &Infinity) {
    let greetings = bout(1, "greetings", &["urn:test:alice", "urn:test:bob"]);
    let private = bout(2, "private", &["urn:test:carol"]);
    post(engine, 1, "urn:test:alice", "hello world", &greetings);
    post(engine, 2, "urn:test:bob", "hello back", &greetings);
    post(engine, 3, "urn:test:carol", "note to self", &private);
}

#[test]
fn finds_what_alice_said() {
    let engine = Infinity::open(Settings::memory()).expect("engine opens");
    let chat = bout(1, "chat", &["urn:test:alice"]);
    post(&engine, 7, "urn:test:alice", "hello world", &chat);
    let found = engine.messages("(and (talks-with 'urn:test:alice') (matches 'hello' $text))").unwrap();
    assert_eq!(found, vec![7]);
}

#[test]
fn queries_over_seen_notices() {
    let engine = Infinity::open(Settings::memory()).unwrap();
    seed(&engine);
    assert_eq!(engine.messages("hello").unwrap(), vec![2, 1]);
    assert_eq!(engine.messages("").unwrap(), vec![3, 2, 1]);
    assert_eq!(engine.messages("(talks-with 'urn:test:carol')").unwrap(), vec![3]);
    assert_eq!(engine.messages("(and (always) (limit 2))").unwrap(), vec![3, 2]);
    assert_eq!(engine.universe().len(), 3);

    let mut hits = engine.hits("(not (talks-with 'urn:test:carol'))").unwrap();
    assert!(hits.has_next());
    assert_eq!(hits.next(), Some(2));
}

#[test]
fn empty_bouts_are_refused() {
    let engine = Infinity::open(Settings::memory()).unwrap();
    let err = engine.see(Notice::Bout(BoutNotice::new(bout(5, "empty", &[])))).unwrap_err();
    assert!(matches!(err, InfinityError::Dependency(_)), "{err}");
}

#[test]
fn eta_is_zero_when_idle() {
    let engine = Infinity::open(Settings::memory()).unwrap();
    assert!(engine.eta(&["urn:test:nobody"]).is_zero());
    seed(&engine);
    assert!(engine.eta(&["urn:test:alice", "urn:test:carol"]).is_zero());
    let stats = engine.statistics();
    assert_eq!(stats["messages"], 3);
    assert_eq!(stats["mux"]["waiting"], 0);
}

#[test]
fn bout_notices_update_participants() {
    let engine = Infinity::open(Settings::memory()).unwrap();
    seed(&engine);
    let renamed = bout(2, "private", &["urn:test:carol", "urn:test:dave"]);
    let deps: Vec<String> =
        engine.see(Notice::Bout(BoutNotice::new(renamed))).unwrap().into_iter().collect();
    wait(&engine, &deps);
    assert_eq!(engine.messages("(talks-with 'urn:test:dave')").unwrap(), vec![3]);
}

#[test]
fn racing_bout_notices_settle_on_one_snapshot() {
    let engine = Infinity::open(Settings { threads: 4, ..Settings::memory() }).unwrap();
    let first = ["urn:test:a1", "urn:test:a2", "urn:test:a3"];
    let second = ["urn:test:b1", "urn:test:b2", "urn:test:b3"];
    let mut deps = Vec::new();
    for round in 0..200 {
        let urns = if round % 2 == 0 { &first } else { &second };
        let notice = Notice::Bout(BoutNotice::new(bout(9, "race", urns)));
        deps.extend(engine.see(notice).unwrap());
    }
    wait(&engine, &deps);
    let found: Vec<String> = engine
        .triples()
        .all(9, BOUT_TO_PARTICIPANT)
        .unwrap()
        .into_iter()
        .filter_map(|o| o.as_text().map(str::to_string))
        .collect();
    assert!(found == first || found == second, "mixed participants {found:?}");
}

#[test]
fn journal_is_replayed_on_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    {
        let engine = Infinity::open(Settings::persistent(dir.path())).unwrap();
        seed(&engine);
        engine.close().expect("engine closes");
    }
    assert!(dir.path().join("messages.numbers").exists());
    assert!(dir.path().join("notices.journal").exists());

    let engine = Infinity::open(Settings::persistent(dir.path())).unwrap();
    assert_eq!(engine.universe().len(), 3);
    assert_eq!(engine.messages("(talks-with 'urn:test:bob')").unwrap(), vec![2, 1]);
    assert_eq!(engine.messages("hello").unwrap(), vec![2, 1]);
}

#[test]
fn sqlite_triples_need_no_replay() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = Settings { triples: Backend::Sqlite, ..Settings::persistent(dir.path()) };
    {
        let engine = Infinity::open(settings.clone()).unwrap();
        seed(&engine);
        engine.close().unwrap();
    }
    let engine = Infinity::open(Settings { replay: false, ..settings }).unwrap();
    assert_eq!(engine.messages("(talks-with 'urn:test:alice')").unwrap(), vec![2, 1]);
    assert_eq!(engine.messages("(matches 'note')").unwrap(), vec![3]);
    assert_eq!(engine.messages("(and (always) (bundled))").unwrap(), vec![3, 2]);
}

#[test]
fn invalid_settings_are_refused() {
    let no_threads = Settings { threads: 0, ..Settings::memory() };
    assert!(matches!(Infinity::open(no_threads), Err(InfinityError::Config(_))));
    let no_dir = Settings { triples: Backend::Sqlite, ..Settings::memory() };
    assert!(matches!(Infinity::open(no_dir), Err(InfinityError::Config(_))));
}

#[test]
fn settings_from_a_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("infinity.toml");
    std::fs::write(&path, "threads = 2\ntriples = \"sqlite\"\ndata_dir = \"/var/lib/infinity\"\n").unwrap();
    let settings = Settings::load(Some(&path)).expect("settings load");
    assert_eq!(settings.threads, 2);
    assert_eq!(settings.triples, Backend::Sqlite);
    assert_eq!(settings.data_dir.as_deref(), Some(std::path::Path::new("/var/lib/infinity")));
    assert!(settings.replay);

    let missing = Settings::load(Some(&dir.path().join("missing.toml")));
    assert!(matches!(missing, Err(InfinityError::Config(_))));
}
