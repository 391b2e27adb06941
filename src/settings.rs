//! Engine configuration.
//!
//! Layers, lowest first: built-in defaults, an optional `infinity.toml`
//! (or the file given explicitly), then `INFINITY_*` environment variables,
//! e.g. `INFINITY_THREADS=8` or `INFINITY_DATA_DIR=/var/lib/infinity`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{InfinityError, Result};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Sqlite,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Where the journal, the message numbers and the SQLite triples live.
    /// Nothing is persisted without it.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Mux worker threads.
    pub threads: usize,
    pub triples: Backend,
    /// Replay the journal into the index when opening.
    pub replay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { data_dir: None, threads: 4, triples: Backend::Memory, replay: true }
    }
}

impl Settings {
    /// In-memory engine with no files at all.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Persistent engine rooted at `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: Some(dir.into()), ..Self::default() }
    }

    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("threads", defaults.threads as u64)?
            .set_default("triples", "memory")?
            .set_default("replay", defaults.replay)?;
        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("infinity").required(false)),
        };
        let settings: Settings = builder
            .add_source(Environment::with_prefix("INFINITY"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(InfinityError::Config("threads must be at least 1".into()));
        }
        if self.triples == Backend::Sqlite && self.data_dir.is_none() {
            return Err(InfinityError::Config("sqlite triples need a data_dir".into()));
        }
        Ok(())
    }
}
