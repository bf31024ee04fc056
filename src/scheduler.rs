use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Counting,
    Fetching,
}

/// Refresh countdown, advanced once per elapsed second.
///
/// Reaching zero requests a fetch and restarts at the full interval. Fetches
/// may overlap; the phase reads `Fetching` while any is outstanding.
#[derive(Debug, Clone)]
pub struct Countdown {
    interval: u64,
    remaining: u64,
    started: bool,
    in_flight: usize,
}

impl Countdown {
    pub fn new(interval_secs: u64) -> Self {
        let interval = interval_secs.max(1);
        Countdown {
            interval,
            remaining: interval,
            started: false,
            in_flight: 0,
        }
    }

    pub fn start(&mut self) {
        self.started = true;
        self.remaining = self.interval;
    }

    pub fn stop(&mut self) {
        self.started = false;
        self.in_flight = 0;
    }

    /// One second passed. Returns true when a fetch is due.
    pub fn tick(&mut self) -> bool {
        if !self.started {
            return false;
        }
        if self.remaining <= 1 {
            self.remaining = self.interval;
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    /// Restart the countdown, e.g. after a manual refresh.
    pub fn reset(&mut self) {
        self.remaining = self.interval;
    }

    pub fn fetch_started(&mut self) {
        self.in_flight += 1;
    }

    pub fn fetch_finished(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn phase(&self) -> Phase {
        match (self.started, self.in_flight) {
            (false, _) => Phase::Idle,
            (true, 0) => Phase::Counting,
            (true, _) => Phase::Fetching,
        }
    }
}

/// Spawn a task that sends one `()` per elapsed second until the receiver
/// is dropped or the returned handle is aborted.
///
/// A stalled consumer delays later ticks rather than bursting missed ones.
pub fn spawn_second_ticker(sender: mpsc::UnboundedSender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + SECOND, SECOND);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if sender.send(()).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_after_interval() {
        let mut countdown = Countdown::new(5);
        countdown.start();

        let fired: Vec<bool> = (0..5).map(|_| countdown.tick()).collect();
        assert_eq!(fired, vec![false, false, false, false, true]);
        assert_eq!(countdown.remaining(), 5);

        let fired = (0..10).filter(|_| countdown.tick()).count();
        assert_eq!(fired, 2);
    }

    #[test]
    fn test_counts_down_visibly() {
        let mut countdown = Countdown::new(15);
        countdown.start();
        countdown.tick();
        countdown.tick();
        assert_eq!(countdown.remaining(), 13);
        countdown.reset();
        assert_eq!(countdown.remaining(), 15);
    }

    #[test]
    fn test_idle_until_started() {
        let mut countdown = Countdown::new(1);
        assert_eq!(countdown.phase(), Phase::Idle);
        assert!(!countdown.tick());

        countdown.start();
        assert_eq!(countdown.phase(), Phase::Counting);
        assert!(countdown.tick());

        countdown.stop();
        assert_eq!(countdown.phase(), Phase::Idle);
    }

    #[test]
    fn test_phase_tracks_overlapping_fetches() {
        let mut countdown = Countdown::new(3);
        countdown.start();
        countdown.fetch_started();
        countdown.fetch_started();
        assert_eq!(countdown.phase(), Phase::Fetching);
        countdown.fetch_finished();
        assert_eq!(countdown.phase(), Phase::Fetching);
        countdown.fetch_finished();
        assert_eq!(countdown.phase(), Phase::Counting);
        countdown.fetch_finished();
        assert_eq!(countdown.phase(), Phase::Counting);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(Countdown::new(0).interval(), 1);
    }

    async fn let_tasks_run() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_ticker_sends_once_per_second() {
        let (sender, mut ticks) = mpsc::unbounded_channel();
        let handle = spawn_second_ticker(sender);

        let_tasks_run().await;
        assert!(ticks.try_recv().is_err());

        for _ in 0..2 {
            time::advance(SECOND).await;
            let_tasks_run().await;
        }
        assert!(ticks.try_recv().is_ok());
        assert!(ticks.try_recv().is_ok());
        assert!(ticks.try_recv().is_err());

        drop(ticks);
        time::advance(SECOND).await;
        let_tasks_run().await;
        assert!(handle.is_finished());
    }
}
