use std::time::Duration;
use tokio::time::Instant;

/// Trailing-edge debouncer: fires once the window has passed since the last event
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
    pending: usize,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
            pending: 0,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_event = Some(now);
        self.pending += 1;
    }

    /// Number of events since the last fire
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// When the pending events become ready, if any are pending
    pub fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|last| last + self.window)
    }

    /// Consume pending events if the window has elapsed
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Consume pending events regardless of the window
    pub fn flush(&mut self) -> bool {
        let had_pending = self.pending > 0;
        self.reset();
        had_pending
    }

    fn reset(&mut self) {
        self.last_event = None;
        self.pending = 0;
    }
}
