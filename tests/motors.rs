use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use infinity::motors::{
    self, Motor, ParticipantsMotor, BOUT_TITLE, BOUT_TO_MARKER, BOUT_TO_PARTICIPANT,
    MESSAGE_AUTHOR, MESSAGE_NAMESPACE, MESSAGE_TO_BOUT, TEXT_WORD, TITLE_WORD,
};
use infinity::notice::{Bout, BoutNotice, Message, MessageNotice, Notice, Participant};
use infinity::numbers::Numbers;
use infinity::query::Compiler;
use infinity::term::Hits;
use infinity::triples::{MemTriples, Object, Triples};

const RELATIONS: [&str; 8] = [
    MESSAGE_TO_BOUT,
    MESSAGE_AUTHOR,
    BOUT_TO_PARTICIPANT,
    BOUT_TO_MARKER,
    BOUT_TITLE,
    TEXT_WORD,
    TITLE_WORD,
    MESSAGE_NAMESPACE,
];

const QUERIES: [&str; 9] = [
    "(talks-with 'urn:test:bob')",
    "(talks-with 'urn:test:carol')",
    "(matches 'greetings' $bout.title)",
    "(matches 'farewell' $bout.title)",
    "(matches 'hello')",
    "(ns 'urn:test:notes')",
    "(equal $author.name 'urn:test:bob')",
    "(and (always) (bundled))",
    "(and (always) (unique $author.name))",
];

fn bout(title: &str, urns: &[&str]) -> Bout {
    let participants = urns.iter().map(|u| Participant::new(*u, false, true)).collect();
    Bout::new(1, Utc::now(), title, participants)
}

fn greetings() -> Bout {
    bout("greetings", &["urn:test:alice", "urn:test:bob"])
}

fn farewell() -> Notice {
    Notice::Bout(BoutNotice::new(bout("farewell", &["urn:test:alice", "urn:test:carol"])))
}

fn message(number: u64, author: &str, text: &str) -> Notice {
    let message = Message::new(number, author, text, Utc::now());
    Notice::Message(MessageNotice::new(message, greetings()))
}

fn hello() -> Notice {
    message(7, "urn:test:alice", "hello world")
}

fn note() -> Notice {
    message(8, "urn:test:bob", r#"<note xmlns="urn:test:notes">hello there</note>"#)
}

struct Index {
    triples: Arc<MemTriples>,
    motors: Vec<Arc<dyn Motor>>,
    universe: Arc<Numbers>,
}

impl Index {
    fn new() -> Self {
        let triples = Arc::new(MemTriples::new());
        let shared: Arc<dyn Triples> = triples.clone();
        Self { triples, motors: motors::defaults(shared), universe: Arc::new(Numbers::new()) }
    }

    fn deliver(&self, notice: &Notice) {
        match notice {
            Notice::Bout(n) => {
                for motor in &self.motors {
                    motor.see_bout(n).expect("bout seen");
                }
            }
            Notice::Message(n) => {
                for motor in &self.motors {
                    motor.see_message(n).expect("message seen");
                }
                self.universe.add(n.message().number()).unwrap();
            }
        }
    }

    /// Every stored triple and the answer to every query.
    fn state(&self) -> (BTreeMap<(&'static str, u64), Vec<Object>>, Vec<Vec<u64>>) {
        let mut triples = BTreeMap::new();
        for relation in RELATIONS {
            for subject in 1..=10 {
                let mut objects = self.triples.all(subject, relation).unwrap();
                if !objects.is_empty() {
                    objects.sort();
                    triples.insert((relation, subject), objects);
                }
            }
        }
        let compiler = Compiler::new(&self.motors);
        let answers = QUERIES
            .iter()
            .map(|q| Hits::new(compiler.compile(q, &self.universe).expect("compiles")).collect())
            .collect();
        (triples, answers)
    }
}

fn after(notices: &[Notice]) -> (BTreeMap<(&'static str, u64), Vec<Object>>, Vec<Vec<u64>>) {
    let index = Index::new();
    for notice in notices {
        index.deliver(notice);
    }
    index.state()
}

#[test]
fn seeing_a_notice_twice_changes_nothing() {
    let bout = Notice::Bout(BoutNotice::new(greetings()));
    for notice in [bout, hello(), note(), farewell()] {
        assert_eq!(after(&[notice.clone()]), after(&[notice.clone(), notice.clone()]), "{notice}");
    }
    assert_eq!(after(&[hello(), note()]), after(&[hello(), note(), note(), hello()]));
}

#[test]
fn redelivery_after_a_bout_notice_changes_nothing() {
    assert_eq!(after(&[hello(), farewell()]), after(&[hello(), farewell(), hello()]));
    assert_eq!(
        after(&[hello(), note(), farewell()]),
        after(&[hello(), note(), farewell(), note(), farewell(), hello()])
    );
    assert_eq!(after(&[farewell(), hello()]), after(&[farewell(), hello(), hello()]));
}

#[test]
fn newer_titles_survive_redelivery() {
    let index = Index::new();
    let title = |q: &str| -> Vec<u64> {
        let compiler = Compiler::new(&index.motors);
        Hits::new(compiler.compile(q, &index.universe).unwrap()).collect()
    };
    index.deliver(&hello());
    assert_eq!(title("(matches 'greetings' $bout.title)"), vec![7]);
    index.deliver(&farewell());
    assert_eq!(title("(matches 'farewell' $bout.title)"), vec![7]);
    index.deliver(&hello());
    assert_eq!(title("(matches 'farewell' $bout.title)"), vec![7]);
    assert!(title("(matches 'greetings' $bout.title)").is_empty());
    assert_eq!(title("(talks-with 'urn:test:carol')"), vec![7]);
    assert!(title("(talks-with 'urn:test:bob')").is_empty());

    // a later message still carrying the old snapshot takes the newest title
    index.deliver(&note());
    assert_eq!(title("(matches 'farewell' $bout.title)"), vec![8, 7]);
}

#[test]
fn concurrent_bout_notices_never_mix_participants() {
    let triples: Arc<dyn Triples> = Arc::new(MemTriples::new());
    let motor = Arc::new(ParticipantsMotor::new(Arc::clone(&triples)));
    let sides: Vec<Vec<String>> = ["a", "b"]
        .iter()
        .map(|side| (1..=4).map(|n| format!("urn:{side}:{n}")).collect())
        .collect();
    let rounds = 1000;
    let barrier = Arc::new(Barrier::new(2));
    let threads: Vec<_> = sides
        .iter()
        .cloned()
        .map(|urns| {
            let motor = Arc::clone(&motor);
            let triples = Arc::clone(&triples);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let urns: Vec<&str> = urns.iter().map(String::as_str).collect();
                let notice = BoutNotice::new(bout("race", &urns));
                let mut seen = Vec::new();
                for _ in 0..rounds {
                    barrier.wait();
                    motor.see_bout(&notice).expect("bout seen");
                    barrier.wait();
                    seen.push(triples.all(1, BOUT_TO_PARTICIPANT).unwrap());
                }
                seen
            })
        })
        .collect();
    let expected: Vec<Vec<Object>> = sides
        .iter()
        .map(|urns| urns.iter().map(|u| Object::from(u.as_str())).collect())
        .collect();
    for thread in threads {
        for found in thread.join().expect("thread finished") {
            assert!(expected.contains(&found), "mixed participants {found:?}");
        }
    }
}
