//! Leading-edge throttle with a pending trailing call

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
    trailing: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            trailing: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register a call at `now`. Returns `true` if it should fire right away;
    /// otherwise a trailing call is left pending.
    pub fn hit(&mut self, now: Instant) -> bool {
        let ready = self
            .last_fired
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last_fired = Some(now);
            self.trailing = false;
        } else {
            self.trailing = true;
        }
        ready
    }

    /// Consume the pending trailing call once the interval has elapsed
    pub fn take_trailing(&mut self, now: Instant) -> bool {
        if !self.trailing {
            return false;
        }
        let due = self
            .last_fired
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.trailing = false;
            self.last_fired = Some(now);
        }
        due
    }

    pub fn is_pending(&self) -> bool {
        self.trailing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_then_trailing() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(50));

        assert!(throttle.hit(start));
        assert!(!throttle.hit(start + Duration::from_millis(10)));
        assert!(!throttle.hit(start + Duration::from_millis(20)));
        assert!(throttle.is_pending());

        assert!(!throttle.take_trailing(start + Duration::from_millis(30)));
        assert!(throttle.take_trailing(start + Duration::from_millis(50)));
        assert!(!throttle.is_pending());
        assert!(!throttle.take_trailing(start + Duration::from_millis(200)));
    }

    #[test]
    fn test_fires_again_after_interval() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(50));
        assert!(throttle.hit(start));
        assert!(throttle.hit(start + Duration::from_millis(60)));
        assert!(!throttle.is_pending());
    }
}
