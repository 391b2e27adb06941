//! Worker pool delivering notices to the motors.
//!
//! Work is tagged with the urns it concerns. The pool counts pending tasks
//! per urn, which is what [`Mux::eta`] answers from: an urn with nothing
//! pending is up to date.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::hash::BuildHasherDefault;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use seahash::SeaHasher;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{InfinityError, Result};

/// Durations kept for the running mean.
const WINDOW: usize = 100;

pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct Job {
    deps: BTreeSet<String>,
    name: String,
    task: Task,
}

type UrnHasher = BuildHasherDefault<SeaHasher>;

#[derive(Default)]
struct Watch {
    /// tasks queued or running, each counted once whatever its deps
    tasks: AtomicU64,
    waiting: Mutex<HashMap<String, u64, UrnHasher>>,
    durations: Mutex<VecDeque<Duration>>,
}

impl Watch {
    fn enter(&self, deps: &BTreeSet<String>) {
        self.tasks.fetch_add(1, Ordering::SeqCst);
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        for dep in deps {
            *waiting.entry(dep.clone()).or_insert(0) += 1;
        }
    }

    fn leave(&self, deps: &BTreeSet<String>) {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        self.tasks.fetch_sub(1, Ordering::SeqCst);
        for dep in deps {
            if let Some(count) = waiting.get_mut(dep) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    waiting.remove(dep);
                }
            }
        }
    }

    fn record(&self, elapsed: Duration) {
        let mut durations = self.durations.lock().unwrap_or_else(PoisonError::into_inner);
        if durations.len() == WINDOW {
            durations.pop_front();
        }
        durations.push_back(elapsed);
    }

    fn mean(&self) -> Duration {
        let durations = self.durations.lock().unwrap_or_else(PoisonError::into_inner);
        if durations.is_empty() {
            return Duration::ZERO;
        }
        durations.iter().sum::<Duration>() / durations.len() as u32
    }
}

pub struct Mux {
    threads: usize,
    alive: AtomicBool,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    watch: Arc<Watch>,
}

impl Mux {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(InfinityError::Config("mux needs at least one thread".into()));
        }
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let watch = Arc::new(Watch::default());
        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let receiver = Arc::clone(&receiver);
            let watch = Arc::clone(&watch);
            let worker = thread::Builder::new()
                .name(format!("mux-{id}"))
                .spawn(move || Self::work(receiver, watch))
                .map_err(|e| InfinityError::Io(format!("can't start mux worker: {e}")))?;
            workers.push(worker);
        }
        debug!(threads, "mux started");
        Ok(Self {
            threads,
            alive: AtomicBool::new(true),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            watch,
        })
    }

    fn work(receiver: Arc<Mutex<Receiver<Job>>>, watch: Arc<Watch>) {
        loop {
            let job = {
                let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
                receiver.recv()
            };
            let Ok(Job { deps, name, task }) = job else {
                break;
            };
            let start = Instant::now();
            match catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => debug!(task = %name, "task done"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "task failed"),
                Err(_) => warn!(task = %name, "task panicked"),
            }
            watch.record(start.elapsed());
            watch.leave(&deps);
        }
    }

    /// Queues `task` on behalf of `deps`.
    pub fn submit(
        &self,
        deps: BTreeSet<String>,
        name: impl Into<String>,
        task: Task,
    ) -> Result<()> {
        let name = name.into();
        if !self.alive.load(Ordering::SeqCst) {
            debug!(task = %name, "mux is closed, task ignored");
            return Err(InfinityError::IllegalState(format!("mux is closed, {name} ignored")));
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(InfinityError::IllegalState(format!("mux is closed, {name} ignored")));
        };
        self.watch.enter(&deps);
        let job = Job { deps, name, task };
        if let Err(mpsc::SendError(job)) = sender.send(job) {
            self.watch.leave(&job.deps);
            return Err(InfinityError::IllegalState(format!(
                "mux workers are gone, {} ignored",
                job.name
            )));
        }
        Ok(())
    }

    /// How long until every task concerning `deps` is done; zero when none is pending.
    ///
    /// Tasks run in submission order, so the estimate covers everything
    /// queued ahead: `pending × mean / threads`.
    pub fn eta<S: AsRef<str>>(&self, deps: &[S]) -> Duration {
        let concerned = {
            let waiting = self.watch.waiting.lock().unwrap_or_else(PoisonError::into_inner);
            deps.iter().any(|d| waiting.contains_key(d.as_ref()))
        };
        if !concerned {
            return Duration::ZERO;
        }
        let pending = self.pending().max(1);
        let eta = self.watch.mean().mul_f64(pending as f64 / self.threads as f64);
        eta.max(Duration::from_nanos(1))
    }

    /// Number of tasks queued or running.
    pub fn pending(&self) -> u64 {
        self.watch.tasks.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> serde_json::Value {
        let dependencies = self.watch.waiting.lock().unwrap_or_else(PoisonError::into_inner).len();
        json!({
            "threads": self.threads,
            "dependencies": dependencies,
            "waiting": self.pending(),
            "mean_ms": self.watch.mean().as_secs_f64() * 1000.0,
        })
    }

    /// Stops accepting work, lets the queued tasks finish and joins the workers.
    pub fn close(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let pending = self.pending();
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        let workers: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if worker.join().is_err() {
                warn!("mux worker ended abnormally");
            }
        }
        info!(pending, "mux closed");
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.close();
    }
}
