//! Single dedicated dispatch thread.
//!
//! Jobs run one at a time in submission order. `flush` is a barrier: it
//! returns once every job submitted before it has finished.

use super::job::Job;
use crate::config::Config;
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};

enum Message {
    Run(Job),
    Flush(Sender<()>),
}

pub struct LaunchWorker {
    tx: Option<Sender<Message>>,
    thread: Option<JoinHandle<()>>,
}

impl LaunchWorker {
    pub fn new(config: &Config) -> Result<Self> {
        let (tx, rx) = unbounded();

        let mut builder =
            thread::Builder::new().name(format!("{}-launch", config.thread_name_prefix));
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread = builder
            .spawn(move || run(rx))
            .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn submit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Run(Job::new(f)))
    }

    /// Block until everything submitted so far has run.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.send(Message::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| Error::WorkerPanic("launch worker exited before flush".into()))
    }

    fn send(&self, msg: Message) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::executor("launch worker is shut down"))?;
        tx.send(msg)
            .map_err(|_| Error::WorkerPanic("launch worker is gone".into()))
    }

    pub fn shutdown(&mut self) {
        // closing the channel ends the loop after queued jobs drain
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("launch worker exited with a panic");
            }
        }
    }
}

fn run(rx: Receiver<Message>) {
    for msg in rx {
        match msg {
            Message::Run(job) => {
                let id = job.id;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run()));
                if result.is_err() {
                    log::error!("launch job {:?} panicked", id);
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

impl Drop for LaunchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LaunchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchWorker")
            .field("running", &self.thread.is_some())
            .finish()
    }
}
