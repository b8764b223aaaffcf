use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use once_cell::sync::OnceCell;

use crate::error::{ErrorKind, VmError, err};
use crate::rt::CancelToken;
use crate::util::sync::lock;

use super::Val;

/// How often blocked channel and task operations look at the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Bounded FIFO handoff between tasks. Capacity 0 is a rendezvous channel.
pub struct ChannelValue {
    id: u64,
    capacity: usize,
    tx: Mutex<Option<Sender<Val>>>,
    rx: Receiver<Val>,
    closed: AtomicBool,
}

impl ChannelValue {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = channel::bounded(capacity);
        Arc::new(Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            tx: Mutex::new(Some(tx)),
            rx,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Blocks while the buffer is full.
    pub fn send(&self, value: Val, cancel: &CancelToken) -> Result<()> {
        let tx = lock(&self.tx)
            .clone()
            .ok_or_else(|| err(ErrorKind::Channel, "send on closed channel"))?;
        let mut pending = value;
        loop {
            match tx.send_timeout(pending, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(v)) => {
                    if self.is_closed() {
                        return Err(err(ErrorKind::Channel, "send on closed channel"));
                    }
                    cancel.check()?;
                    pending = v;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(err(ErrorKind::Channel, "send on closed channel"));
                }
            }
        }
    }

    /// Blocks while the channel is empty and open. `None` once closed and drained.
    pub fn recv(&self, cancel: &CancelToken) -> Result<Option<Val>> {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(v) => return Ok(Some(v)),
                Err(RecvTimeoutError::Timeout) => cancel.check()?,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }

    pub fn close(&self) -> Result<()> {
        let tx = lock(&self.tx).take();
        match tx {
            Some(tx) => {
                self.closed.store(true, Ordering::Release);
                drop(tx);
                tracing::trace!(channel = self.id, "channel closed");
                Ok(())
            }
            None => Err(err(ErrorKind::Channel, "close of closed channel")),
        }
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a spawned task. The result is published once; any number of
/// callers may wait on it.
pub struct TaskValue {
    id: u64,
    result: OnceCell<std::result::Result<Val, VmError>>,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl TaskValue {
    pub fn new() -> Arc<Self> {
        let (done_tx, done_rx) = channel::bounded(0);
        Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            result: OnceCell::new(),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_done(&self) -> bool {
        self.result.get().is_some()
    }

    /// Publish the task outcome and wake every waiter.
    pub fn complete(&self, result: std::result::Result<Val, VmError>) {
        let _ = self.result.set(result);
        lock(&self.done_tx).take();
    }

    pub fn wait(&self, cancel: &CancelToken) -> Result<Val> {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone().map_err(anyhow::Error::new);
            }
            match self.done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => cancel.check()?,
            }
        }
    }
}
