//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Observes a scan; checked at tile boundaries.
pub trait ProgressMonitor: Send + Sync {
    /// Called once per finished tile with the number of pixels it covered.
    fn worked(&self, _pixels: u64) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressMonitor for NullProgress {}

/// Counts finished pixels and carries a cancellation flag.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    pixels: AtomicU64,
    tiles: AtomicU64,
    cancelled: AtomicBool,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Tiles already running finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn pixels(&self) -> u64 {
        self.pixels.load(Ordering::Relaxed)
    }

    pub fn tiles(&self) -> u64 {
        self.tiles.load(Ordering::Relaxed)
    }
}

impl ProgressMonitor for AtomicProgress {
    fn worked(&self, pixels: u64) {
        self.pixels.fetch_add(pixels, Ordering::Relaxed);
        self.tiles.fetch_add(1, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
