//! Process-wide task runtime and cancellation plumbing.
//!
//! Spawned script tasks run on tokio's blocking pool: a VM dispatch loop is
//! synchronous and may block on channels, so it must never occupy an async
//! worker thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossbeam::channel::{self, RecvTimeoutError};
use once_cell::sync::Lazy;

use crate::error::{ErrorKind, err};
use crate::util::sync::lock;

/// Shared cancellation flag observed by the dispatch loop between instructions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(err(ErrorKind::Cancelled, "context canceled"))
        } else {
            Ok(())
        }
    }
}

/// Ambient context of an evaluation. Clones share the same cancel flag.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    token: CancelToken,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancelToken) -> Self {
        Self { token }
    }

    /// Context that cancels itself once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let ctx = Self::new();
        let token = ctx.token.clone();
        with_runtime(|rt| {
            rt.spawn_timer(timeout, move || token.cancel());
            Ok(())
        })?;
        Ok(ctx)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

/// Wraps the tokio runtime hosting spawned tasks and timers.
#[derive(Debug)]
pub struct Runtime {
    tokio_runtime: tokio::runtime::Runtime,
    spawned: AtomicU64,
    finished: Arc<AtomicU64>,
    multi_threaded: bool,
}

impl Runtime {
    pub fn new_multi_thread() -> Result<Self> {
        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("brook-rt")
            .enable_all()
            .build()
            .map_err(|e| anyhow!("failed to create tokio runtime: {}", e))?;
        Ok(Self::from_tokio(tokio_runtime, true))
    }

    pub fn new_current_thread() -> Result<Self> {
        let tokio_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow!("failed to create tokio runtime: {}", e))?;
        Ok(Self::from_tokio(tokio_runtime, false))
    }

    fn from_tokio(tokio_runtime: tokio::runtime::Runtime, multi_threaded: bool) -> Self {
        Runtime {
            tokio_runtime,
            spawned: AtomicU64::new(0),
            finished: Arc::new(AtomicU64::new(0)),
            multi_threaded,
        }
    }

    /// Run `job` on the blocking pool.
    pub fn spawn_blocking<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let finished = self.finished.clone();
        drop(self.tokio_runtime.spawn_blocking(move || {
            job();
            finished.fetch_add(1, Ordering::Relaxed);
        }));
    }

    /// Run `f` after `delay` on the async workers.
    pub fn spawn_timer<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.tokio_runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }

    pub fn stats(&self) -> RuntimeStats {
        let spawned = self.spawned.load(Ordering::Relaxed);
        let finished = self.finished.load(Ordering::Relaxed);
        RuntimeStats {
            spawned_tasks: spawned,
            active_tasks: spawned.saturating_sub(finished),
            is_multi_threaded: self.multi_threaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    pub spawned_tasks: u64,
    pub active_tasks: u64,
    pub is_multi_threaded: bool,
}

static GLOBAL_RUNTIME: Lazy<Mutex<Option<Arc<Runtime>>>> = Lazy::new(|| Mutex::new(None));

// Dropping a tokio runtime from inside one panics, so hand the last
// reference to a plain thread.
fn drop_runtime_arc(runtime: Arc<Runtime>) {
    if tokio::runtime::Handle::try_current().is_ok() {
        std::thread::spawn(move || drop(runtime));
    } else {
        drop(runtime);
    }
}

fn create_runtime() -> Result<Runtime> {
    match Runtime::new_multi_thread() {
        Ok(runtime) => Ok(runtime),
        Err(err) => {
            tracing::warn!(error = %err, "multi-thread runtime unavailable, using current-thread runtime");
            Runtime::new_current_thread()
        }
    }
}

pub fn init_runtime() -> Result<()> {
    let mut runtime = lock(&GLOBAL_RUNTIME);
    if runtime.is_none() {
        *runtime = Some(Arc::new(create_runtime()?));
    }
    Ok(())
}

/// Run `f` against the global runtime, creating it on first use.
pub fn with_runtime<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&Runtime) -> Result<R>,
{
    let runtime_arc = {
        let mut guard = lock(&GLOBAL_RUNTIME);
        if guard.is_none() {
            *guard = Some(Arc::new(create_runtime()?));
        }
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow!("runtime initialization failed"))?
    };
    let result = f(runtime_arc.as_ref());
    drop_runtime_arc(runtime_arc);
    result
}

/// Sleep on the calling thread, waking early with an error on cancellation.
pub fn sleep(duration: Duration, cancel: &CancelToken) -> Result<()> {
    const POLL: Duration = Duration::from_millis(20);
    let timer = channel::after(duration);
    loop {
        match timer.recv_timeout(POLL) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => cancel.check()?,
        }
    }
}
