//! Disk Scheduler - asynchronous request queue in front of the disk manager.
//!
//! Callers submit [`DiskRequest`]s and wait on a per-request completion
//! channel. Worker threads drain the queues and perform the I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// Completion side of a disk request.
pub type Completion<T> = oneshot::Sender<Result<T>>;

/// A single read or write handed to the scheduler.
pub enum DiskRequest {
    /// Load a page; completes with its bytes.
    Read {
        page_id: PageId,
        done: Completion<Page>,
    },
    /// Persist `data` as the page's contents.
    Write {
        page_id: PageId,
        data: Page,
        done: Completion<()>,
    },
}

impl DiskRequest {
    /// The page this request targets.
    pub fn page_id(&self) -> PageId {
        match self {
            DiskRequest::Read { page_id, .. } | DiskRequest::Write { page_id, .. } => *page_id,
        }
    }
}

enum Message {
    Request(DiskRequest),
    Shutdown,
}

struct Worker {
    tx: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Routes disk requests to worker threads.
///
/// # Ordering
/// Each page id is pinned to one worker (`page_id % workers`) and each
/// worker serves its queue in FIFO order, so requests for the same page
/// complete in submission order. Requests for different pages may be
/// reordered freely.
///
/// # Shutdown
/// [`shutdown`](DiskScheduler::shutdown) enqueues a stop marker behind all
/// pending work and joins the workers, so everything submitted before it
/// still completes. Dropping the scheduler does the same.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    workers: Vec<Worker>,
    closed: AtomicBool,
}

impl DiskScheduler {
    /// Start `workers` threads serving requests against `disk_manager`.
    ///
    /// # Panics
    /// Panics if `workers` is 0.
    pub fn new(disk_manager: DiskManager, workers: usize) -> Self {
        assert!(workers > 0, "disk scheduler needs at least one worker");

        let disk_manager = Arc::new(disk_manager);
        let workers = (0..workers)
            .map(|id| {
                let (tx, rx) = mpsc::channel::<Message>();
                let dm = Arc::clone(&disk_manager);
                let handle = thread::spawn(move || worker_loop(id, dm, rx));
                Worker {
                    tx,
                    handle: Mutex::new(Some(handle)),
                }
            })
            .collect();

        Self {
            disk_manager,
            workers,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a request without waiting for it.
    ///
    /// # Errors
    /// Returns `Error::SchedulerClosed` after shutdown. The request is
    /// dropped, so its completion reports the same error.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SchedulerClosed);
        }
        let worker = &self.workers[(request.page_id().0 % self.workers.len() as u64) as usize];
        worker
            .tx
            .send(Message::Request(request))
            .map_err(|_| Error::SchedulerClosed)
    }

    /// Read a page and wait for the result.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let (done, rx) = oneshot::channel();
        self.schedule(DiskRequest::Read { page_id, done })?;
        rx.recv().map_err(|_| Error::SchedulerClosed)?
    }

    /// Write a page and wait until it is durable.
    pub fn write_page(&self, page_id: PageId, data: Page) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            done,
        })?;
        rx.recv().map_err(|_| Error::SchedulerClosed)?
    }

    /// The disk manager behind this scheduler.
    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk_manager
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Drain pending requests, then stop and join every worker.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for worker in &self.workers {
            let _ = worker.tx.send(Message::Shutdown);
        }
        for worker in &self.workers {
            if let Some(handle) = worker.handle.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, disk_manager: Arc<DiskManager>, rx: Receiver<Message>) {
    log::debug!("disk worker {id} started");

    while let Ok(message) = rx.recv() {
        match message {
            Message::Request(DiskRequest::Read { page_id, done }) => {
                let _ = done.send(disk_manager.read_page(page_id));
            }
            Message::Request(DiskRequest::Write {
                page_id,
                data,
                done,
            }) => {
                let _ = done.send(disk_manager.write_page(page_id, data.as_slice()));
            }
            Message::Shutdown => break,
        }
    }

    log::debug!("disk worker {id} stopped");
}
