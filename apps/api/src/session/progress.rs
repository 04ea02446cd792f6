//! Progress Estimator: a cosmetic stand-in for backend progress we cannot see.
//!
//! While running, the value climbs linearly toward `CAP` over
//! `NOMINAL_DURATION` and then holds there. It never reaches 100 on its own:
//! only `stop(true)` (the real completion signal) does. This is not a timeout;
//! stalled ingestion attempts are failed by the ingestion worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

pub const TICK: Duration = Duration::from_millis(100);
pub const NOMINAL_DURATION: Duration = Duration::from_secs(30);
/// Highest value reported while running.
pub const CAP: u8 = 99;
/// How long 100 stays visible after success before the bar resets.
pub const SETTLE_DELAY: Duration = Duration::from_millis(800);

pub struct ProgressEstimator {
    value: Arc<watch::Sender<u8>>,
    /// Bumped on every start/stop. Background tasks only write while their
    /// epoch is current, so an aborted tick can never land after a stop.
    epoch: Arc<AtomicU64>,
    running: bool,
    ticker: Option<JoinHandle<()>>,
    settle: Option<JoinHandle<()>>,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEstimator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            value: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
            running: false,
            ticker: None,
            settle: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.value.subscribe()
    }

    pub fn value(&self) -> u8 {
        *self.value.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts from 0. No-op while already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        let epoch = self.next_epoch();
        self.cancel_tasks();
        self.running = true;
        self.value.send_replace(0);

        let value = Arc::clone(&self.value);
        let current = Arc::clone(&self.epoch);
        self.ticker = Some(tokio::spawn(async move {
            let total_ticks = (NOMINAL_DURATION.as_millis() / TICK.as_millis()) as u64;
            let mut interval = interval_at(Instant::now() + TICK, TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;

            loop {
                interval.tick().await;
                ticks += 1;
                let estimate = (ticks * CAP as u64 / total_ticks).min(CAP as u64) as u8;
                value.send_if_modified(|v| {
                    if current.load(Ordering::SeqCst) != epoch || *v == estimate {
                        return false;
                    }
                    *v = estimate;
                    true
                });
                if estimate >= CAP {
                    break;
                }
            }
        }));
    }

    /// `stop(true)` snaps to 100 and resets to 0 after `SETTLE_DELAY`;
    /// `stop(false)` resets to 0 immediately.
    pub fn stop(&mut self, success: bool) {
        let epoch = self.next_epoch();
        self.cancel_tasks();
        self.running = false;

        if !success {
            self.value.send_replace(0);
            return;
        }

        self.value.send_replace(100);
        let value = Arc::clone(&self.value);
        let current = Arc::clone(&self.epoch);
        self.settle = Some(tokio::spawn(async move {
            sleep(SETTLE_DELAY).await;
            value.send_if_modified(|v| {
                if current.load(Ordering::SeqCst) != epoch {
                    return false;
                }
                *v = 0;
                true
            });
        }));
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cancel_tasks(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(settle) = self.settle.take() {
            settle.abort();
        }
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        self.next_epoch();
        self.cancel_tasks();
    }
}
