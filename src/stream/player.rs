//! Playback engine: public API plus the background prefetch worker.
//!
//! One worker thread performs every read. It opens the container, parses the
//! table of contents, then keeps the [`BufferWindow`] filled ahead of the
//! consumer. Callers only take the window lock for bookkeeping; I/O always
//! happens outside of it.
//!
//! ```ignore
//! use bakestream::prelude::*;
//!
//! let player = Player::open("shot.bake", PlayerOptions::default())?;
//! player.wait_until_ready(Duration::from_secs(5));
//! if let Some(frame) = player.get_frame_at(0, Wait::Blocking) {
//!     println!("{} vertices", frame.vertex_count(0));
//! }
//! ```

use std::io::{BufReader, Seek, SeekFrom};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use super::options::PlayerOptions;
use super::stats::{PlaybackStats, StatsCollector};
use super::window::{BufferWindow, FillPlan};
use crate::container::{open_source, read_toc, ByteSource, PlaybackInfo, TableOfContents, Version};
use crate::frame::{MaterializedFrame, Materializer};
use crate::util::{Error, Result};

/// Backoff between attempts when a frame read fails with an I/O error.
pub const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_millis(10),
    Duration::from_millis(20),
    Duration::from_millis(40),
];

/// Player lifecycle. `Failed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlayerStatus {
    #[default]
    Initializing,
    Ready,
    Failed,
}

/// How long [`Player::get_frame_at`] may wait for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Return at once.
    NonBlocking,
    /// Wait up to [`PlayerOptions::wait_timeout_ms`].
    Blocking,
    /// Wait up to the given duration.
    For(Duration),
}

enum Origin {
    Path { path: PathBuf, use_mmap: bool },
    Source(Box<dyn ByteSource>),
}

#[derive(Default)]
struct Lifecycle {
    status: PlayerStatus,
    toc: Option<Arc<TableOfContents>>,
    fail_message: Option<String>,
}

struct Shared {
    options: PlayerOptions,
    lifecycle: RwLock<Lifecycle>,
    /// Window state; paired with `wake` for the worker.
    window: Mutex<BufferWindow>,
    wake: Condvar,
    /// Bumped whenever a frame lands or the status changes.
    ready: Mutex<u64>,
    frame_ready: Condvar,
    stats: Arc<StatsCollector>,
    constant: OnceLock<Arc<MaterializedFrame>>,
    stop: AtomicBool,
}

impl Shared {
    fn new(options: PlayerOptions) -> Self {
        Self {
            options,
            lifecycle: RwLock::new(Lifecycle::default()),
            window: Mutex::new(BufferWindow::default()),
            wake: Condvar::new(),
            ready: Mutex::new(0),
            frame_ready: Condvar::new(),
            stats: Arc::new(StatsCollector::new()),
            constant: OnceLock::new(),
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn status(&self) -> PlayerStatus {
        self.lifecycle.read().status
    }

    fn generation(&self) -> u64 {
        *self.ready.lock()
    }

    fn signal_frame_ready(&self) {
        let mut generation = self.ready.lock();
        *generation = generation.wrapping_add(1);
        self.frame_ready.notify_all();
    }

    /// Sleep until the generation moves past `seen`, shutdown, or `deadline`.
    /// Returns `false` on timeout.
    fn wait_for_signal(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut generation = self.ready.lock();
        while *generation == seen && !self.stopping() {
            match deadline {
                Some(deadline) => {
                    if self.frame_ready.wait_until(&mut generation, deadline).timed_out() {
                        return *generation != seen;
                    }
                }
                None => self.frame_ready.wait(&mut generation),
            }
        }
        true
    }

    fn set_ready(&self, toc: Arc<TableOfContents>) {
        {
            let mut lifecycle = self.lifecycle.write();
            lifecycle.toc = Some(toc);
            lifecycle.status = PlayerStatus::Ready;
        }
        self.signal_frame_ready();
    }

    fn fail(&self, err: &Error) {
        tracing::error!(error = %err, "player failed");
        {
            let mut lifecycle = self.lifecycle.write();
            lifecycle.status = PlayerStatus::Failed;
            lifecycle.fail_message = Some(err.to_string());
        }
        self.signal_frame_ready();
    }
}

/// Streaming player over one container.
///
/// Dropping the player stops and joins the worker.
pub struct Player {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Start a player for the container at `path`.
    ///
    /// Opening and parsing happen on the worker; the player starts out
    /// [`PlayerStatus::Initializing`] and becomes `Ready` or `Failed`.
    pub fn open(path: impl AsRef<Path>, options: PlayerOptions) -> Result<Self> {
        let origin = Origin::Path {
            path: path.as_ref().to_path_buf(),
            use_mmap: options.use_mmap,
        };
        Self::spawn(origin, options)
    }

    /// Start a player over an already opened byte source.
    pub fn from_source(source: Box<dyn ByteSource>, options: PlayerOptions) -> Result<Self> {
        Self::spawn(Origin::Source(source), options)
    }

    fn spawn(origin: Origin, options: PlayerOptions) -> Result<Self> {
        let shared = Arc::new(Shared::new(options));
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("bakestream-prefetch".into())
            .spawn(move || {
                let guard = Arc::clone(&worker_shared);
                if panic::catch_unwind(AssertUnwindSafe(|| run_worker(worker_shared, origin)))
                    .is_err()
                {
                    guard.fail(&Error::other("prefetch worker panicked"));
                }
            })?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn options(&self) -> &PlayerOptions {
        &self.shared.options
    }

    pub fn status(&self) -> PlayerStatus {
        self.shared.status()
    }

    /// Human-readable reason once `Failed`.
    pub fn fail_message(&self) -> Option<String> {
        self.shared.lifecycle.read().fail_message.clone()
    }

    /// Block until the player leaves `Initializing` or `timeout` expires.
    pub fn wait_until_ready(&self, timeout: Duration) -> PlayerStatus {
        let deadline = Instant::now() + timeout;
        loop {
            let seen = self.shared.generation();
            let status = self.status();
            if status != PlayerStatus::Initializing || self.shared.stopping() {
                return status;
            }
            if !self.shared.wait_for_signal(seen, Some(deadline)) {
                return self.status();
            }
        }
    }

    /// Parsed table of contents, once `Ready`.
    pub fn table_of_contents(&self) -> Option<Arc<TableOfContents>> {
        self.shared.lifecycle.read().toc.clone()
    }

    /// Container version, once `Ready`.
    pub fn file_version(&self) -> Option<Version> {
        self.table_of_contents().map(|toc| toc.version)
    }

    pub fn playback_info(&self) -> Option<PlaybackInfo> {
        self.table_of_contents().map(|toc| PlaybackInfo::from_toc(&toc))
    }

    /// Number of frames; 0 until `Ready`.
    pub fn frame_count(&self) -> u32 {
        self.table_of_contents().map_or(0, |toc| toc.frame_count())
    }

    /// Earliest frame that must be materialized to rebuild `index`.
    pub fn frame_index_dependency(&self, index: u32) -> Option<u32> {
        let toc = self.table_of_contents()?;
        toc.frames.get(index as usize).map(|f| f.dependency)
    }

    pub fn is_forcing_16bit_indices(&self) -> bool {
        self.table_of_contents().is_some_and(|toc| toc.force_16bit_indices)
    }

    pub fn buffered_frame_count(&self) -> u32 {
        self.shared.window.lock().count()
    }

    /// Current window as `(start, count)`.
    pub fn buffered_range(&self) -> (u32, u32) {
        let window = self.shared.window.lock();
        (window.start(), window.count())
    }

    /// Frame 0, cached at startup when any mesh or image sequence is constant.
    pub fn constant_frame(&self) -> Option<Arc<MaterializedFrame>> {
        self.shared.constant.get().cloned()
    }

    /// Fetch frame `index`.
    ///
    /// `None` means out of range, not buffered yet, timed out, failed or shut
    /// down. A request outside the look-ahead range restarts buffering at
    /// `index`.
    pub fn get_frame_at(&self, index: u32, wait: Wait) -> Option<Arc<MaterializedFrame>> {
        let deadline = match wait {
            Wait::NonBlocking => return self.try_frame_at(index),
            Wait::Blocking => self.shared.options.blocking_timeout().map(|t| Instant::now() + t),
            Wait::For(timeout) => Some(Instant::now() + timeout),
        };

        loop {
            let seen = self.shared.generation();
            match self.status() {
                PlayerStatus::Failed => return None,
                PlayerStatus::Ready => {
                    if index >= self.frame_count() {
                        return None;
                    }
                    if let Some(frame) = self.try_frame_at(index) {
                        return Some(frame);
                    }
                }
                PlayerStatus::Initializing => {}
            }
            if self.shared.stopping() || !self.shared.wait_for_signal(seen, deadline) {
                return None;
            }
        }
    }

    fn try_frame_at(&self, index: u32) -> Option<Arc<MaterializedFrame>> {
        if self.shared.stopping() || self.status() != PlayerStatus::Ready {
            return None;
        }
        let mut window = self.shared.window.lock();
        let lookup = window.lookup(index);
        self.shared.wake.notify_one();
        lookup.into_frame()
    }

    /// Throughput of the last completed second plus the current window.
    pub fn collect_stats(&self) -> PlaybackStats {
        let mut stats = self.shared.stats.snapshot();
        let window = self.shared.window.lock();
        stats.buffered_start = window.start();
        stats.buffered_count = window.count();
        stats.memory_usage = window.memory_usage();
        stats
    }

    /// Stop the worker and wait for it. Blocked callers return `None`.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
        {
            let _window = self.shared.window.lock();
            self.shared.wake.notify_all();
        }
        self.shared.signal_frame_ready();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("prefetch worker panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn initialize(origin: Origin) -> Result<(Arc<TableOfContents>, Box<dyn ByteSource>)> {
    let mut source = match origin {
        Origin::Path { path, use_mmap } => open_source(&path, use_mmap)?,
        Origin::Source(source) => source,
    };
    source.seek(SeekFrom::Start(0))?;
    let toc = read_toc(BufReader::new(&mut source))?;
    Ok((Arc::new(toc), source))
}

fn run_worker(shared: Arc<Shared>, origin: Origin) {
    let span = tracing::info_span!("prefetch");
    let _enter = span.enter();

    let (toc, source) = match initialize(origin) {
        Ok(parsed) => parsed,
        Err(e) => return shared.fail(&e),
    };

    let mut materializer =
        Materializer::new(source, Arc::clone(&toc)).with_stats(Arc::clone(&shared.stats));

    if toc.has_constant_streams() && toc.frame_count() > 0 {
        match with_retry(&shared, || materializer.materialize(0, None)) {
            Ok(frame) => {
                let _ = shared.constant.set(Arc::new(frame));
            }
            Err(e) => return shared.fail(&e),
        }
    }

    let frames = toc.frame_count();
    let options = &shared.options;
    let depth = options.effective_depth(frames);
    *shared.window.lock() =
        BufferWindow::new(frames, depth, options.looping, options.buffer_everything);
    shared.set_ready(toc);
    tracing::info!(frames, depth, looping = options.looping, "player ready");

    while let Some(plan) = next_plan(&shared) {
        let loaded = with_retry(&shared, || {
            materializer.materialize_with_chain(plan.target, plan.ancestor.as_deref())
        });
        let frame = match loaded {
            Ok(frame) => Arc::new(frame),
            Err(_) if shared.stopping() => break,
            Err(e) => return shared.fail(&e),
        };

        if !shared.window.lock().commit(plan.target, frame) {
            tracing::debug!(frame = plan.target, "window moved, frame dropped");
        }
        shared.signal_frame_ready();
    }

    tracing::debug!("prefetch loop stopped");
}

/// Wait for fill work. `None` once shutdown was requested.
fn next_plan(shared: &Shared) -> Option<FillPlan> {
    let mut window = shared.window.lock();
    loop {
        if shared.stopping() {
            return None;
        }
        if let Some(plan) = window.next_fill() {
            return Some(plan);
        }
        shared.wake.wait(&mut window);
    }
}

fn with_retry<T>(shared: &Shared, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < RETRY_BACKOFF.len() && !shared.stopping() => {
                tracing::warn!(attempt = attempt + 1, error = %e, "frame read failed, retrying");
                thread::sleep(RETRY_BACKOFF[attempt]);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
