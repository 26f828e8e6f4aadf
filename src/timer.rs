//! Round countdown and the periodic wake source that drives it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Paused,
    Running(u32),
    Expired,
}

/// Seconds left before the revealed round moves on.
#[derive(Debug, Clone)]
pub struct Countdown {
    start: u32,
    remaining: u32,
    paused: bool,
}

impl Countdown {
    pub fn new(start: u32) -> Self {
        let start = start.max(1);
        Self {
            start,
            remaining: start,
            paused: false,
        }
    }

    pub fn reset(&mut self) {
        self.remaining = self.start;
        self.paused = false;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// One elapsed second. Reports `Expired` on the step that reaches zero;
    /// the owner is expected to `reset` before ticking again.
    pub fn tick(&mut self) -> CountdownStep {
        if self.paused {
            return CountdownStep::Paused;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            CountdownStep::Expired
        } else {
            CountdownStep::Running(self.remaining)
        }
    }
}

/// A wake-up from a [`Ticker`]. `timer` identifies the ticker that sent it,
/// so ticks still queued after a cancel can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub timer: u64,
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellable periodic timer. Dropping it stops the ticks.
#[derive(Debug)]
pub struct Ticker {
    id: u64,
    task: JoinHandle<()>,
}

impl Ticker {
    /// First tick fires one `period` after the call.
    pub fn spawn(period: Duration, tx: UnboundedSender<Tick>) -> Self {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(Tick { timer: id }).is_err() {
                    break;
                }
            }
        });
        Self { id, task }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {}
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
