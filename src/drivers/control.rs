use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use crate::types::PinLevel;
/// Physical stop input. Active-low: `PinLevel::Low` means stop.
pub trait StopInput {
    fn level(&mut self) -> PinLevel;
    fn asserted(&mut self) -> bool {
        self.level() == PinLevel::Low
    }
}
/// Stop input driven by a shared flag, e.g. from a signal handler or another thread.
#[derive(Clone, Default)]
pub struct FlagInput {
    pulled_low: Arc<AtomicBool>,
}
impl FlagInput {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn press(&self) {
        self.pulled_low.store(true, Ordering::SeqCst);
    }
    #[cfg(test)]
    pub fn release(&self) {
        self.pulled_low.store(false, Ordering::SeqCst);
    }
}
impl StopInput for FlagInput {
    fn level(&mut self) -> PinLevel {
        if self.pulled_low.load(Ordering::SeqCst) {
            PinLevel::Low
        } else {
            PinLevel::High
        }
    }
}
/// Time source plus the one timed suspension the loops use.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep(&mut self, duration: Duration);
}
pub struct SystemClock {
    started: Instant,
}
impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}
/// Deterministic clock for tests: time only moves when someone sleeps.
#[cfg(test)]
#[derive(Default)]
pub struct ManualClock {
    now_ms: u64,
    pub sleeps: Vec<Duration>,
}
#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}
#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
    fn sleep(&mut self, duration: Duration) {
        self.now_ms += duration.as_millis() as u64;
        self.sleeps.push(duration);
    }
}
