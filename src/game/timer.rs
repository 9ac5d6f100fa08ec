use crate::types::{SystemTimeTick, Tick};

/// Stopwatch for a single round. Starts when the countdown ends and stops
/// when the round concludes, so spectators can be shown the elapsed time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    started_at: Option<Tick>,
    stopped_at: Option<Tick>,
}

impl Timer {
    pub fn start(&mut self, now: Tick) {
        self.started_at = Some(now);
        self.stopped_at = None;
    }

    pub fn stop(&mut self, now: Tick) {
        if self.started_at.is_some() && self.stopped_at.is_none() {
            self.stopped_at = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }

    pub fn elapsed(&self, now: Tick) -> Tick {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_sub(start),
            (Some(start), None) => now.saturating_sub(start),
            _ => 0,
        }
    }

    pub fn format(&self, now: Tick) -> String {
        let elapsed = self.elapsed(now);
        format!("{}:{:02}", elapsed.as_minutes(), elapsed.as_secs() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SECONDS;

    #[test]
    fn test_timer_elapsed() {
        let mut timer = Timer::default();
        assert_eq!(timer.elapsed(5 * SECONDS), 0);

        timer.start(10 * SECONDS);
        assert_eq!(timer.elapsed(25 * SECONDS), 15 * SECONDS);

        timer.stop(70 * SECONDS);
        assert_eq!(timer.elapsed(100 * SECONDS), 60 * SECONDS);
        assert_eq!(timer.format(100 * SECONDS), "1:00");
    }

    #[test]
    fn test_timer_format() {
        let mut timer = Timer::default();
        timer.start(0);
        assert_eq!(timer.format(83 * SECONDS), "1:23");
        assert_eq!(timer.format(9 * SECONDS), "0:09");
    }
}
