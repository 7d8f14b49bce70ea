use std::time::Duration;
use tokio::time::Instant;

/// Leading-edge debounce.
///
/// The first update of a burst passes immediately; later updates are
/// suppressed until `window` has elapsed since the last one that passed.
/// Callers holding a suppressed update flush it at [`Self::reopens_at`].
#[derive(Debug, Clone)]
pub struct LeadingDebounce {
    window: Duration,
    last_emit: Option<Instant>,
}

impl LeadingDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if an update at `now` should be emitted, and records it.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// When the gate opens again; `None` before the first emit.
    pub fn reopens_at(&self) -> Option<Instant> {
        self.last_emit.map(|last| last + self.window)
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_bursts() {
        let start = Instant::now();
        let mut debounce = LeadingDebounce::new(Duration::from_millis(100));

        assert!(debounce.ready(start));
        assert!(!debounce.ready(start + Duration::from_millis(10)));
        assert!(!debounce.ready(start + Duration::from_millis(99)));
        assert!(debounce.ready(start + Duration::from_millis(100)));
        assert!(!debounce.ready(start + Duration::from_millis(150)));
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let start = Instant::now();
        let mut debounce = LeadingDebounce::new(Duration::ZERO);
        assert!(debounce.ready(start));
        assert!(debounce.ready(start));
    }

    #[test]
    fn test_reopens_one_window_after_last_emit() {
        let start = Instant::now();
        let mut debounce = LeadingDebounce::new(Duration::from_millis(100));
        assert_eq!(debounce.reopens_at(), None);

        assert!(debounce.ready(start));
        assert!(!debounce.ready(start + Duration::from_millis(40)));
        let reopens = debounce.reopens_at().unwrap();
        assert_eq!(reopens, start + Duration::from_millis(100));
        assert!(debounce.ready(reopens));
    }

    #[test]
    fn test_reset_reopens_the_gate() {
        let start = Instant::now();
        let mut debounce = LeadingDebounce::new(Duration::from_secs(1));
        assert!(debounce.ready(start));
        debounce.reset();
        assert!(debounce.ready(start));
    }
}
