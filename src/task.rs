//! Deferred compression.
//!
//! A [`CompressionTask`] owns everything it needs: the entry id, the
//! uncompressed bytes, and the codec options. Workers never touch the
//! archive; they send a [`TaskOutcome`] back over a channel and the archive
//! merges it on its own thread while it holds exclusive access to the range
//! map and the directory.
//!
//! With the `parallel` feature, tasks run on a dedicated rayon pool created
//! on first use. Without it, or with background compression disabled, tasks
//! run on the calling thread at submission and their outcome is queued the
//! same way.

use std::panic::{self, AssertUnwindSafe};

use crate::codec::{self, CompressedPayload, DeflateOptions};
use crate::entry::EntryId;
use crate::{Error, Result};

/// One unit of background compression.
#[derive(Debug)]
pub struct CompressionTask {
    /// Entry the result belongs to.
    pub id: EntryId,
    /// Entry name, for error reporting.
    pub name: String,
    /// Uncompressed data.
    pub data: Vec<u8>,
    /// CRC-32 of `data`, computed when the entry was added.
    pub crc32: u32,
    /// Codec options.
    pub options: DeflateOptions,
}

/// Result of a finished task.
#[derive(Debug)]
pub struct TaskOutcome {
    /// Entry the result belongs to.
    pub id: EntryId,
    /// Entry name.
    pub name: String,
    /// Encoded payload, or why compression failed.
    pub result: Result<CompressedPayload>,
}

impl CompressionTask {
    /// Runs the task to completion. Panics in the codec become errors.
    pub fn run(self) -> TaskOutcome {
        let Self {
            id,
            name,
            data,
            crc32,
            options,
        } = self;

        let result = match panic::catch_unwind(AssertUnwindSafe(|| {
            codec::compress(data, crc32, &options)
        })) {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => Err(Error::Compression {
                name: name.clone(),
                reason: e.to_string(),
            }),
            Err(panic) => Err(Error::Compression {
                name: name.clone(),
                reason: panic_message(panic.as_ref()),
            }),
        };

        TaskOutcome { id, name, result }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("codec panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("codec panicked: {}", s)
    } else {
        "codec panicked".to_string()
    }
}

/// Bounded worker pool plus the channel its results come back on.
pub struct CompressionPool {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
    background: bool,
    threads: usize,
    tx: flume::Sender<TaskOutcome>,
    rx: flume::Receiver<TaskOutcome>,
    outstanding: usize,
}

impl std::fmt::Debug for CompressionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionPool")
            .field("background", &self.background)
            .field("threads", &self.threads)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

impl CompressionPool {
    /// Creates a pool. `threads` of 0 picks the available parallelism.
    ///
    /// Background execution is only possible with the `parallel` feature.
    pub fn new(threads: usize, background: bool) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            #[cfg(feature = "parallel")]
            pool: None,
            background: background && cfg!(feature = "parallel"),
            threads,
            tx,
            rx,
            outstanding: 0,
        }
    }

    /// Returns `true` if tasks run on worker threads.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Number of submitted tasks whose outcome has not been collected.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Schedules a task.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the worker pool cannot be created.
    pub fn submit(&mut self, task: CompressionTask) -> Result<()> {
        log::debug!(
            "scheduling compression of '{}' ({} bytes)",
            task.name,
            task.data.len()
        );

        #[cfg(feature = "parallel")]
        if self.background {
            let tx = self.tx.clone();
            self.worker_pool()?.spawn(move || {
                if let Err(unsent) = tx.send(task.run()) {
                    log::debug!(
                        "dropping compression result for '{}': archive is gone",
                        unsent.0.name
                    );
                }
            });
            self.outstanding += 1;
            return Ok(());
        }

        if let Err(unsent) = self.tx.send(task.run()) {
            log::debug!("dropping compression result for '{}'", unsent.0.name);
        }
        self.outstanding += 1;
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn worker_pool(&mut self) -> Result<&rayon::ThreadPool> {
        if self.pool.is_none() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("zipweave-compress-{}", i))
                .build()
                .map_err(|e| Error::Io(std::io::Error::other(e)))?;
            self.pool = Some(pool);
        }
        match &self.pool {
            Some(pool) => Ok(pool),
            None => Err(Error::Conflict("worker pool unavailable".into())),
        }
    }

    /// Collects outcomes of tasks that have already finished, without blocking.
    pub fn try_collect(&mut self) -> Vec<TaskOutcome> {
        let done: Vec<_> = self.rx.try_iter().collect();
        self.outstanding -= done.len();
        done
    }

    /// Blocks until every submitted task has finished and returns their outcomes.
    pub fn wait_all(&mut self) -> Vec<TaskOutcome> {
        let mut done = Vec::with_capacity(self.outstanding);
        while self.outstanding > 0 {
            match self.rx.recv() {
                Ok(outcome) => {
                    self.outstanding -= 1;
                    done.push(outcome);
                }
                Err(_) => break,
            }
        }
        done
    }
}
