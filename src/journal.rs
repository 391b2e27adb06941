//! Append-only log of the notices an engine has seen.
//!
//! Every record is a big-endian `u32` length followed by the notice bytes.
//! A notice whose fingerprint is already in the log is not written again.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::hash::BuildHasherDefault;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use seahash::SeaHasher;

use crate::error::{InfinityError, Result};
use crate::notice::Notice;

type FingerprintHasher = BuildHasherDefault<SeaHasher>;

pub struct Journal {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
    seen: Mutex<HashSet<String, FingerprintHasher>>,
}

impl Journal {
    /// Opens (or creates) the journal at `path` and returns the notices already in it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<Notice>)> {
        let path = path.as_ref().to_path_buf();
        let notices = if path.exists() {
            Self::read_all(&path)?
        } else {
            Vec::new()
        };
        let mut seen = HashSet::default();
        for notice in &notices {
            seen.insert(notice.fingerprint()?);
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), notices = notices.len(), "journal opened");
        Ok((Self { path, file: Mutex::new(BufWriter::new(file)), seen: Mutex::new(seen) }, notices))
    }

    fn read_all(path: &Path) -> Result<Vec<Notice>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut notices = Vec::new();
        loop {
            if reader.fill_buf()?.is_empty() {
                break;
            }
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            let len = u32::from_be_bytes(len) as usize;
            let mut bytes = Vec::new();
            (&mut reader).take(len as u64).read_to_end(&mut bytes)?;
            if bytes.len() != len {
                return Err(InfinityError::corruption(format!(
                    "journal record #{} is truncated, {len} bytes expected",
                    notices.len() + 1
                )));
            }
            notices.push(Notice::from_bytes(&bytes)?);
        }
        Ok(notices)
    }

    /// Appends `notice`, returning false when an identical one is already logged.
    pub fn append(&self, notice: &Notice) -> Result<bool> {
        let bytes = notice.to_bytes()?;
        let fingerprint = blake3::hash(&bytes).to_hex().to_string();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(&fingerprint) {
            return Ok(false);
        }
        let len = u32::try_from(bytes.len())
            .map_err(|_| InfinityError::IllegalArgument(format!("{notice} is too big to journal")))?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&len.to_be_bytes())?;
        file.write_all(&bytes)?;
        file.flush()?;
        seen.insert(fingerprint);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
