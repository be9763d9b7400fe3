use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Millisecond-resolution time source shared by the broker and every queue.
///
/// Visibility deadlines, dedup windows, retention and purge cooldowns are all
/// computed against this handle, so tests can construct a manual clock and
/// step it instead of sleeping.
#[derive(Clone)]
pub struct Clock(Arc<Source>);

enum Source {
    System,
    Manual(AtomicU64),
}

impl Clock {
    /// Wall clock, used in production.
    pub fn system() -> Self {
        Clock(Arc::new(Source::System))
    }

    /// Fixed clock starting at `start_ms`, stepped with [`Clock::advance`].
    pub fn manual(start_ms: u64) -> Self {
        Clock(Arc::new(Source::Manual(AtomicU64::new(start_ms))))
    }

    /// Current time in epoch milliseconds.
    pub fn now_ms(&self) -> u64 {
        match &*self.0 {
            Source::System => chrono::Utc::now().timestamp_millis() as u64,
            Source::Manual(ms) => ms.load(Ordering::SeqCst),
        }
    }

    /// Step a manual clock forward. No effect on the system clock.
    pub fn advance(&self, delta_ms: u64) {
        if let Source::Manual(ms) = &*self.0 {
            ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.0 {
            Source::System => write!(f, "Clock::System"),
            Source::Manual(ms) => write!(f, "Clock::Manual({})", ms.load(Ordering::SeqCst)),
        }
    }
}
