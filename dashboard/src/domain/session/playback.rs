//! Auto-play scheduling and the single-advance guard

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Periodic advance trigger. Ticks that land while an advance is in flight
/// are skipped, never queued.
#[derive(Debug, Clone)]
pub struct AutoPlay {
    playing: bool,
    interval: Duration,
}

impl AutoPlay {
    pub fn new(interval: Duration) -> Self {
        Self {
            playing: false,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn should_fire(&self, busy: bool) -> bool {
        self.playing && !busy
    }
}

/// Set while an advance is outstanding
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Claim the flag, or `None` when already held
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }
}

/// Releases the busy flag on drop
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
