//! Throughput statistics, rotated at most once per second.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot returned by [`Player::collect_stats`](super::Player::collect_stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackStats {
    pub buffered_start: u32,
    pub buffered_count: u32,
    /// Bytes owned by frames resident in the window.
    pub memory_usage: u64,
    pub bytes_read_last_second: u64,
    pub frames_processed_last_second: u32,
    pub avg_read_time: Duration,
    pub avg_process_time: Duration,
    pub total_read_time: Duration,
    pub total_process_time: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    bytes_read: u64,
    frames: u32,
    read_time: Duration,
    process_time: Duration,
}

#[derive(Debug)]
struct Inner {
    current: Counters,
    stored: Counters,
    next_rotation: Instant,
}

/// Running counters fed by the materializer.
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<Inner>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub const ROTATION: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: Counters::default(),
                stored: Counters::default(),
                next_rotation: Instant::now(),
            }),
        }
    }

    pub fn record_frame(&self, bytes: u64, read_time: Duration, process_time: Duration) {
        let mut inner = self.inner.lock();
        inner.current.bytes_read += bytes;
        inner.current.frames += 1;
        inner.current.read_time += read_time;
        inner.current.process_time += process_time;
    }

    /// Last completed one-second window. Window bounds and memory are left
    /// for the caller to fill in.
    pub fn snapshot(&self) -> PlaybackStats {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> PlaybackStats {
        let mut inner = self.inner.lock();
        if now >= inner.next_rotation {
            inner.stored = std::mem::take(&mut inner.current);
            inner.next_rotation = now + Self::ROTATION;
        }
        let s = inner.stored;
        let avg = |total: Duration| {
            if s.frames == 0 {
                Duration::ZERO
            } else {
                total / s.frames
            }
        };
        PlaybackStats {
            bytes_read_last_second: s.bytes_read,
            frames_processed_last_second: s.frames,
            avg_read_time: avg(s.read_time),
            avg_process_time: avg(s.process_time),
            total_read_time: s.read_time,
            total_process_time: s.process_time,
            ..Default::default()
        }
    }
}
