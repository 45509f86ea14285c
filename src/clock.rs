//! Fake-timer control (spec §4.4 / `testMode.enableFakeTimers`), built on
//! `tokio::time::pause`/`advance`/`resume` rather than hand-rolling a virtual
//! clock — the crate's `tokio` dependency already carries the `test-util`
//! feature these call into.
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ClockManager {
    paused: bool,
}

impl ClockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes the tokio time source. Only meaningful within the multi-thread
    /// test runtime `tokio::time::pause` requires; calling it twice is a
    /// no-op rather than a panic.
    pub fn pause(&mut self) {
        if !self.paused {
            tokio::time::pause();
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            tokio::time::resume();
            self.paused = false;
        }
    }

    /// Advances the paused clock by `duration`, firing any timers that
    /// become due. No-op if the clock isn't paused.
    pub async fn advance(&self, duration: Duration) {
        if self.paused {
            tokio::time::advance(duration).await;
        }
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn advancing_the_clock_fires_a_pending_sleep() {
        let mut clock = ClockManager::new();
        clock.pause();

        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "woke up"
        });

        clock.advance(Duration::from_secs(60)).await;
        let result = handle.await.expect("task completed");
        assert_eq!(result, "woke up");
    }
}
