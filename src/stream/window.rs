//! Sliding window of resident frames.
//!
//! The window covers `[start, start + count)`, wrapping modulo the frame
//! count when looping. Resident frames are kept in window order; the front
//! is always frame `start`. `depth` bounds `count` and drives backpressure.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::frame::MaterializedFrame;

/// Outcome of looking up a frame.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Resident; in bounded mode the window now starts at this frame.
    Served(Arc<MaterializedFrame>),
    /// Inside the look-ahead range, not loaded yet.
    Pending,
    /// Outside the look-ahead range; window was cleared and restarted here.
    Jumped,
    /// Index past the end of the sequence.
    OutOfRange,
    /// Buffer-everything mode: not loaded yet.
    NotResident,
}

impl Lookup {
    pub fn into_frame(self) -> Option<Arc<MaterializedFrame>> {
        match self {
            Self::Served(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Next frame the prefetch loop should load.
#[derive(Debug, Clone)]
pub struct FillPlan {
    pub target: u32,
    /// Frame `target - 1` if it is resident.
    pub ancestor: Option<Arc<MaterializedFrame>>,
}

#[derive(Debug, Default)]
pub struct BufferWindow {
    frames: VecDeque<Arc<MaterializedFrame>>,
    start: u32,
    depth: u32,
    total: u32,
    looping: bool,
    retain_all: bool,
    memory: u64,
}

impl BufferWindow {
    /// Window over `total` frames. With `retain_all` the depth covers the
    /// whole sequence and nothing is ever evicted.
    pub fn new(total: u32, depth: u32, looping: bool, retain_all: bool) -> Self {
        let depth = if retain_all {
            total
        } else {
            depth.clamp(1, total.max(1)).min(total)
        };
        Self {
            frames: VecDeque::with_capacity(depth as usize),
            start: 0,
            depth,
            total,
            looping,
            retain_all,
            memory: 0,
        }
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.frames.len() as u32
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Bytes owned by resident frames.
    #[inline]
    pub fn memory_usage(&self) -> u64 {
        self.memory
    }

    /// Frame indices currently resident, in window order.
    pub fn resident(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.index()).collect()
    }

    /// Distance of `index` from `start` in window order, if it can lie ahead.
    fn offset_of(&self, index: u32) -> Option<u32> {
        if index >= self.start {
            Some(index - self.start)
        } else if self.looping {
            Some(index + self.total - self.start)
        } else {
            None
        }
    }

    /// Frame index that would extend the window, if any.
    fn next_target(&self) -> Option<u32> {
        if self.count() >= self.depth {
            return None;
        }
        let next = self.start + self.count();
        if next < self.total {
            Some(next)
        } else if self.looping {
            Some(next - self.total)
        } else {
            None
        }
    }

    /// Work for the prefetch loop; `None` when full or at the end.
    pub fn next_fill(&self) -> Option<FillPlan> {
        let target = self.next_target()?;
        let ancestor = if target > 0 {
            self.frames
                .back()
                .filter(|f| f.index() + 1 == target)
                .cloned()
        } else {
            None
        };
        Some(FillPlan { target, ancestor })
    }

    /// Append a loaded frame if it is still the one the window expects.
    ///
    /// Returns `false` (dropping the frame) when the window moved while the
    /// frame was loading.
    pub fn commit(&mut self, target: u32, frame: Arc<MaterializedFrame>) -> bool {
        if self.next_target() != Some(target) || frame.index() != target {
            return false;
        }
        self.memory += frame.byte_size();
        self.frames.push_back(frame);
        true
    }

    /// Look up `index`, advancing or resetting the window as needed.
    pub fn lookup(&mut self, index: u32) -> Lookup {
        if index >= self.total {
            return Lookup::OutOfRange;
        }

        if self.retain_all {
            return match self.offset_of(index) {
                Some(offset) if offset < self.count() => {
                    Lookup::Served(Arc::clone(&self.frames[offset as usize]))
                }
                _ => Lookup::NotResident,
            };
        }

        match self.offset_of(index) {
            Some(offset) if offset < self.count() => {
                self.evict_front(offset);
                self.start = index;
                self.frames
                    .front()
                    .cloned()
                    .map_or(Lookup::Pending, Lookup::Served)
            }
            Some(offset) if offset < self.depth => Lookup::Pending,
            _ => {
                self.jump(index);
                Lookup::Jumped
            }
        }
    }

    fn evict_front(&mut self, n: u32) {
        for _ in 0..n {
            if let Some(frame) = self.frames.pop_front() {
                self.memory = self.memory.saturating_sub(frame.byte_size());
            }
        }
        if n > 0 {
            tracing::debug!(evicted = n, start = self.start, "window advanced");
        }
    }

    /// Drop every resident frame and restart the window at `index`.
    pub fn jump(&mut self, index: u32) {
        tracing::debug!(from = self.start, to = index, dropped = self.frames.len(), "window jump");
        self.frames.clear();
        self.memory = 0;
        self.start = index;
    }
}
