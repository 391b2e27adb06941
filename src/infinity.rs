//! The engine: notices in, ordered message numbers out.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::journal::Journal;
use crate::motors::{self, Motor};
use crate::mux::Mux;
use crate::notice::Notice;
use crate::numbers::{Number, Numbers};
use crate::persist::SqliteTriples;
use crate::query::Compiler;
use crate::settings::{Backend, Settings};
use crate::term::Hits;
use crate::triples::{MemTriples, Triples};

const MESSAGES_FILE: &str = "messages.numbers";
const JOURNAL_FILE: &str = "notices.journal";
const TRIPLES_FILE: &str = "triples.db";
/// Bouts hash onto this many delivery locks.
const STRIPES: usize = 64;

/// Notices of one bout are delivered one at a time, so a bout notice and a
/// message notice never interleave their motor passes.
struct Stripes(Vec<Mutex<()>>);

impl Stripes {
    fn new() -> Self {
        Self((0..STRIPES).map(|_| Mutex::new(())).collect())
    }

    fn lock(&self, bout: Number) -> MutexGuard<'_, ()> {
        let stripe = (bout % self.0.len() as u64) as usize;
        self.0[stripe].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Infinity {
    settings: Settings,
    triples: Arc<dyn Triples>,
    messages: Arc<Numbers>,
    motors: Arc<Vec<Arc<dyn Motor>>>,
    stripes: Arc<Stripes>,
    compiler: Compiler,
    journal: Option<Journal>,
    mux: Mux,
}

impl Infinity {
    /// Opens an engine with the default motors over the configured triples.
    pub fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let triples: Arc<dyn Triples> = match (settings.triples, &settings.data_dir) {
            (Backend::Sqlite, Some(dir)) => {
                fs::create_dir_all(dir)?;
                Arc::new(SqliteTriples::open(dir.join(TRIPLES_FILE))?)
            }
            _ => Arc::new(MemTriples::new()),
        };
        let motors = motors::defaults(Arc::clone(&triples));
        Self::with_motors(settings, triples, motors)
    }

    /// Opens an engine with an explicit motor list; earlier motors win operator names.
    pub fn with_motors(
        settings: Settings,
        triples: Arc<dyn Triples>,
        motors: Vec<Arc<dyn Motor>>,
    ) -> Result<Self> {
        settings.validate()?;
        let messages = Arc::new(Numbers::new());
        let motors = Arc::new(motors);
        let stripes = Arc::new(Stripes::new());
        let compiler = Compiler::new(&motors);
        let journal = match &settings.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let path = dir.join(MESSAGES_FILE);
                if path.exists() {
                    messages.load(&mut BufReader::new(File::open(&path)?))?;
                    debug!(path = %path.display(), messages = messages.len(), "messages loaded");
                }
                let (journal, notices) = Journal::open(dir.join(JOURNAL_FILE))?;
                if settings.replay {
                    for notice in &notices {
                        deliver(&motors, &stripes, &messages, notice)?;
                    }
                    info!(notices = notices.len(), "journal replayed");
                }
                Some(journal)
            }
            None => None,
        };
        let mux = Mux::new(settings.threads)?;
        Ok(Self { settings, triples, messages, motors, stripes, compiler, journal, mux })
    }

    /// Journals `notice` and queues it for the motors.
    ///
    /// Returns the urns whose results it affects, ready to be passed to [`eta`](Self::eta).
    pub fn see(&self, notice: Notice) -> Result<BTreeSet<String>> {
        let deps = notice.deps()?;
        if let Some(journal) = &self.journal {
            if !journal.append(&notice)? {
                debug!(notice = %notice, "notice already journaled");
            }
        }
        let motors = Arc::clone(&self.motors);
        let stripes = Arc::clone(&self.stripes);
        let messages = Arc::clone(&self.messages);
        let name = notice.name();
        let task = Box::new(move || deliver(&motors, &stripes, &messages, &notice));
        self.mux.submit(deps.clone(), name, task)?;
        Ok(deps)
    }

    /// Zero when nothing concerning `deps` is still being indexed.
    pub fn eta<S: AsRef<str>>(&self, deps: &[S]) -> Duration {
        self.mux.eta(deps)
    }

    pub fn hits(&self, query: &str) -> Result<Hits> {
        Ok(Hits::new(self.compiler.compile(query, &self.messages)?))
    }

    /// All hits of `query`, newest first.
    pub fn messages(&self, query: &str) -> Result<Vec<Number>> {
        Ok(self.hits(query)?.collect())
    }

    /// Every indexed message.
    pub fn universe(&self) -> &Arc<Numbers> {
        &self.messages
    }

    pub fn triples(&self) -> &Arc<dyn Triples> {
        &self.triples
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Saves the message numbers next to the journal.
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.settings.data_dir else {
            return Ok(());
        };
        let path = dir.join(MESSAGES_FILE);
        let draft: PathBuf = dir.join(format!("{MESSAGES_FILE}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&draft)?);
            let bytes = self.messages.save(&mut writer)?;
            writer.flush()?;
            debug!(bytes, "messages flushed");
        }
        fs::rename(&draft, &path)?;
        Ok(())
    }

    pub fn statistics(&self) -> serde_json::Value {
        json!({
            "messages": self.messages.len(),
            "sizeof": self.messages.sizeof(),
            "motors": self.motors.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "operators": self.compiler.operators(),
            "journal": self.journal.as_ref().map(Journal::len),
            "mux": self.mux.statistics(),
        })
    }

    /// Waits for the queued notices, then flushes.
    pub fn close(self) -> Result<()> {
        self.mux.close();
        self.flush()
    }
}

impl Drop for Infinity {
    fn drop(&mut self) {
        self.mux.close();
        if let Err(e) = self.flush() {
            warn!(error = %e, "flush on drop failed");
        }
    }
}

/// Hands `notice` to every motor, then makes a message visible to queries.
fn deliver(
    motors: &[Arc<dyn Motor>],
    stripes: &Stripes,
    messages: &Numbers,
    notice: &Notice,
) -> Result<()> {
    match notice {
        Notice::Bout(n) => {
            let _turn = stripes.lock(n.bout().number());
            for motor in motors {
                motor.see_bout(n)?;
            }
        }
        Notice::Message(n) => {
            let _turn = stripes.lock(n.bout().number());
            for motor in motors {
                motor.see_message(n)?;
            }
            messages.add(n.message().number())?;
        }
    }
    Ok(())
}
