//! Timer service for the RRC layer
//!
//! Named, reconfigurable timers with millisecond resolution, driven by the
//! subframe loop: [`TimerPool::tick`] advances the clock by 1 ms and returns
//! the handles that expired on that tick, exactly once per expiry. The
//! caller routes each handle to the procedure that owns the timer; timers
//! themselves never capture callbacks, so a procedure completing before its
//! timer fires leaves nothing dangling.
//!
//! The standardised connection-control timers (T300, T301, T302, T304, T310,
//! T311 per 3GPP TS 36.331 Sec 7.3) and the implementation-defined timers
//! (SI acquisition retry/timeout, cell-reselection period, RLC flush) are
//! allocated from the same pool; see `RrcTimers` in the `rrc` module.

use std::fmt;

use tracing::debug;

/// Handle identifying a timer within its [`TimerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(usize);

#[derive(Debug)]
struct TimerSlot {
    label: &'static str,
    duration_ms: u32,
    running: bool,
    expired: bool,
    /// Absolute pool time at which the timer was last started.
    started_at: u64,
}

/// Pool of millisecond timers sharing one tick-driven clock.
#[derive(Debug, Default)]
pub struct TimerPool {
    now_ms: u64,
    slots: Vec<TimerSlot>,
}

impl TimerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new stopped timer with zero duration.
    pub fn allocate(&mut self, label: &'static str) -> TimerHandle {
        self.slots.push(TimerSlot {
            label,
            duration_ms: 0,
            running: false,
            expired: false,
            started_at: 0,
        });
        TimerHandle(self.slots.len() - 1)
    }

    /// Reconfigure the timer duration. Allowed at any time; takes effect on
    /// the next [`TimerPool::run`].
    pub fn set(&mut self, handle: TimerHandle, duration_ms: u32) {
        self.slots[handle.0].duration_ms = duration_ms;
    }

    /// Start (or restart) the timer from the current clock.
    pub fn run(&mut self, handle: TimerHandle) {
        let now = self.now_ms;
        let slot = &mut self.slots[handle.0];
        slot.running = true;
        slot.expired = false;
        slot.started_at = now;
    }

    /// Stop the timer without marking it expired.
    pub fn stop(&mut self, handle: TimerHandle) {
        let slot = &mut self.slots[handle.0];
        slot.running = false;
        slot.expired = false;
    }

    pub fn is_running(&self, handle: TimerHandle) -> bool {
        self.slots[handle.0].running
    }

    pub fn is_expired(&self, handle: TimerHandle) -> bool {
        self.slots[handle.0].expired
    }

    pub fn duration(&self, handle: TimerHandle) -> u32 {
        self.slots[handle.0].duration_ms
    }

    /// Milliseconds since the timer was last started; 0 when not running.
    pub fn time_elapsed(&self, handle: TimerHandle) -> u32 {
        let slot = &self.slots[handle.0];
        if slot.running {
            (self.now_ms - slot.started_at) as u32
        } else {
            0
        }
    }

    pub fn label(&self, handle: TimerHandle) -> &'static str {
        self.slots[handle.0].label
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Advance the clock by one millisecond and collect expiries.
    ///
    /// A timer with zero duration expires on the tick after it is started.
    pub fn tick(&mut self) -> Vec<TimerHandle> {
        self.now_ms += 1;
        let now = self.now_ms;
        let mut expired = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.running && now - slot.started_at >= u64::from(slot.duration_ms) {
                slot.running = false;
                slot.expired = true;
                debug!(timer = slot.label, duration_ms = slot.duration_ms, "timer expired");
                expired.push(TimerHandle(idx));
            }
        }
        expired
    }

    /// Stop every running timer.
    pub fn stop_all(&mut self) {
        for slot in &mut self.slots {
            slot.running = false;
            slot.expired = false;
        }
    }

    /// Labels of all currently running timers.
    pub fn running_timers(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|s| s.running)
            .map(|s| s.label)
            .collect()
    }
}

impl fmt::Display for TimerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self.running_timers();
        if running.is_empty() {
            write!(f, "TimerPool {{ no running timers }}")
        } else {
            write!(f, "TimerPool {{ running: {running:?} }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_stopped() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("t300");
        assert!(!pool.is_running(t));
        assert!(!pool.is_expired(t));
        assert_eq!(pool.label(t), "t300");
    }

    #[test]
    fn test_run_and_expire() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("t300");
        pool.set(t, 3);
        pool.run(t);

        assert!(pool.tick().is_empty());
        assert!(pool.tick().is_empty());
        let expired = pool.tick();
        assert_eq!(expired, vec![t]);
        assert!(!pool.is_running(t));
        assert!(pool.is_expired(t));

        // expiry is delivered exactly once
        assert!(pool.tick().is_empty());
        assert!(pool.is_expired(t));
    }

    #[test]
    fn test_stop_clears_expired() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("t311");
        pool.set(t, 1);
        pool.run(t);
        pool.tick();
        assert!(pool.is_expired(t));
        pool.stop(t);
        assert!(!pool.is_expired(t));
    }

    #[test]
    fn test_restart_clears_expired() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("t304");
        pool.set(t, 1);
        pool.run(t);
        pool.tick();
        assert!(pool.is_expired(t));
        pool.run(t);
        assert!(pool.is_running(t));
        assert!(!pool.is_expired(t));
    }

    #[test]
    fn test_reconfigure_duration() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("si_acq_retry");
        pool.set(t, 2);
        pool.run(t);
        pool.tick();
        pool.set(t, 10);
        // running invocation keeps the old deadline until restarted
        assert_eq!(pool.tick(), vec![t]);
        pool.run(t);
        for _ in 0..9 {
            assert!(pool.tick().is_empty());
        }
        assert_eq!(pool.tick(), vec![t]);
    }

    #[test]
    fn test_time_elapsed() {
        let mut pool = TimerPool::new();
        let t = pool.allocate("t301");
        pool.set(t, 100);
        pool.run(t);
        pool.tick();
        pool.tick();
        assert_eq!(pool.time_elapsed(t), 2);
        pool.stop(t);
        assert_eq!(pool.time_elapsed(t), 0);
    }

    #[test]
    fn test_stop_all_and_running_timers() {
        let mut pool = TimerPool::new();
        let a = pool.allocate("t300");
        let b = pool.allocate("t310");
        pool.set(a, 50);
        pool.set(b, 50);
        pool.run(a);
        pool.run(b);
        assert_eq!(pool.running_timers(), vec!["t300", "t310"]);
        pool.stop_all();
        assert!(pool.running_timers().is_empty());
    }

    #[test]
    fn test_two_timers_same_tick() {
        let mut pool = TimerPool::new();
        let a = pool.allocate("a");
        let b = pool.allocate("b");
        pool.set(a, 2);
        pool.set(b, 2);
        pool.run(a);
        pool.run(b);
        pool.tick();
        let expired = pool.tick();
        assert_eq!(expired, vec![a, b]);
    }
}
