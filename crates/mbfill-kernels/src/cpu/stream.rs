//! Host execution stream: an ordered job queue drained by one worker thread.
//!
//! Mirrors device stream semantics: enqueueing returns immediately, jobs run
//! in submission order, and failures are only reported by `synchronize`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use mbfill_core::{Device, FillError, Result, Stream};

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Message {
    /// Regular work; skipped once the stream has recorded a failure.
    Run(Job),
    /// Resource release; runs even after a failure.
    Cleanup(Job),
    Barrier(Sender<Result<()>>),
}

/// An in-order host work queue with one dedicated worker thread.
pub struct HostStream {
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    name: String,
}

impl HostStream {
    pub fn new() -> Result<Self> {
        Self::with_name("mbfill-host-stream")
    }

    pub fn with_name(name: &str) -> Result<Self> {
        let (tx, rx) = unbounded::<Message>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx))
            .map_err(|e| FillError::Unavailable(format!("spawn {name}: {e}")))?;
        Ok(Self { tx: Some(tx), worker: Some(worker), name: name.to_string() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue `job` behind everything already on the stream.
    ///
    /// If an earlier job failed and no `synchronize` has observed it yet,
    /// `job` is skipped.
    pub fn enqueue<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.send(Message::Run(Box::new(job)))
    }

    /// Enqueue a job that must run even if earlier work failed.
    pub(crate) fn enqueue_cleanup<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.send(Message::Cleanup(Box::new(job)))
    }

    fn send(&self, msg: Message) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| self.closed())?;
        tx.send(msg).map_err(|_| self.closed())
    }

    fn closed(&self) -> FillError {
        FillError::Execution(format!("host stream '{}' is closed", self.name))
    }
}

impl Stream for HostStream {
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Wait for all enqueued jobs and return the first failure since the
    /// previous synchronization. The stream is usable again afterwards.
    fn synchronize(&self) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Message::Barrier(reply_tx))?;
        reply_rx.recv().map_err(|_| self.closed())?
    }
}

impl Drop for HostStream {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain pending jobs and exit.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(stream = %self.name, "host stream worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostStream").field("name", &self.name).finish_non_exhaustive()
    }
}

fn run_job(job: Job) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result,
        Err(_) => Err(FillError::Execution("host job panicked".into())),
    }
}

fn worker_loop(rx: crossbeam_channel::Receiver<Message>) {
    let mut failure: Option<FillError> = None;
    let mut skipped = 0usize;
    while let Ok(msg) = rx.recv() {
        match msg {
            Message::Run(job) => {
                if failure.is_some() {
                    skipped += 1;
                    continue;
                }
                if let Err(e) = run_job(job) {
                    tracing::warn!(error = %e, "host stream job failed");
                    failure = Some(e);
                }
            }
            Message::Cleanup(job) => {
                if let Err(e) = run_job(job) {
                    tracing::warn!(error = %e, "host stream cleanup failed");
                }
            }
            Message::Barrier(reply) => {
                if skipped > 0 {
                    tracing::debug!(skipped, "jobs skipped after failure");
                    skipped = 0;
                }
                let _ = reply.send(failure.take().map_or(Ok(()), Err));
            }
        }
    }
}
