//! Leading-edge debounce for change notifications

use std::time::Duration;

use tokio::time::Instant;

/// Drops events arriving within `window` of the last accepted one.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Returns `true` if the event at `now` should be processed.
    pub fn on_event(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }

    /// When the window opened by the last accepted event closes.
    #[must_use]
    pub fn window_end(&self) -> Option<Instant> {
        self.last_accepted.map(|last| last + self.window)
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
