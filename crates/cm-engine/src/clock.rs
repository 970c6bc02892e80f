//! Timer virtualization over the output sample count.
//!
//! The mixer has no wall clock of its own. A periodic timer is expressed in
//! milliseconds but fires only once the renderer has consumed the matching
//! number of output samples, so sequencing stays locked to the audio.

use crate::frequency::samples_from_ms;

/// Timer body. Receives the delay it was armed with and returns the next
/// delay in milliseconds; returning 0 removes the timer.
pub type TimerCallback = Box<dyn FnMut(u32) -> u32 + Send>;

/// Opaque identifier for a registered timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(u32);

impl TimerHandle {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

enum ClockState {
    Idle,
    Armed {
        handle: TimerHandle,
        delay_ms: u32,
        /// Samples left before the callback fires (never 0 while armed)
        remaining: u64,
        callback: TimerCallback,
    },
}

/// Single-slot timer driven by consumed samples.
///
/// Holds at most one registration. Arming while another timer is armed
/// replaces it; removing with a handle that is not the armed one does
/// nothing.
pub struct SampleClock {
    sample_rate: u32,
    state: ClockState,
    next_id: u32,
    elapsed: u64,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: ClockState::Idle,
            next_id: 1,
            elapsed: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total samples advanced since creation.
    pub fn elapsed_samples(&self) -> u64 {
        self.elapsed
    }

    /// Register `callback` to fire after `delay_ms`, replacing any armed timer.
    pub fn add_timer(&mut self, delay_ms: u32, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.arm(handle, delay_ms, callback);
        handle
    }

    /// Arm under a handle chosen by the caller.
    ///
    /// Used when handles are issued on a control thread and the clock lives
    /// on the render thread.
    pub fn arm(&mut self, handle: TimerHandle, delay_ms: u32, callback: TimerCallback) {
        self.state = ClockState::Armed {
            handle,
            delay_ms,
            remaining: budget(delay_ms, self.sample_rate),
            callback,
        };
    }

    /// Disarm if `handle` is the armed timer. Returns whether anything was removed.
    pub fn remove_timer(&mut self, handle: TimerHandle) -> bool {
        match &self.state {
            ClockState::Armed { handle: armed, .. } if *armed == handle => {
                self.state = ClockState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, ClockState::Armed { .. })
    }

    /// Handle of the armed timer, if any.
    pub fn armed_handle(&self) -> Option<TimerHandle> {
        match &self.state {
            ClockState::Armed { handle, .. } => Some(*handle),
            ClockState::Idle => None,
        }
    }

    /// Delay the armed timer is currently counting down.
    pub fn pending_delay_ms(&self) -> Option<u32> {
        match &self.state {
            ClockState::Armed { delay_ms, .. } => Some(*delay_ms),
            ClockState::Idle => None,
        }
    }

    /// Samples until the next callback, or `None` when idle.
    pub fn samples_until_event(&self) -> Option<u64> {
        match &self.state {
            ClockState::Armed { remaining, .. } => Some(*remaining),
            ClockState::Idle => None,
        }
    }

    /// Account for `samples` consumed output samples, firing the callback
    /// each time its budget is reached. Returns the number of firings.
    pub fn advance(&mut self, samples: u64) -> u32 {
        self.elapsed += samples;
        let mut left = samples;
        let mut fired = 0;
        loop {
            let ClockState::Armed {
                delay_ms,
                remaining,
                callback,
                ..
            } = &mut self.state
            else {
                break;
            };
            if left < *remaining {
                *remaining -= left;
                break;
            }
            left -= *remaining;
            fired += 1;

            let next = callback(*delay_ms);
            if next == 0 {
                self.state = ClockState::Idle;
                break;
            }
            // Re-armed relative to the firing point.
            *delay_ms = next;
            *remaining = budget(next, self.sample_rate);
        }
        fired
    }
}

impl Default for SampleClock {
    fn default() -> Self {
        Self::new(22050)
    }
}

fn budget(delay_ms: u32, sample_rate: u32) -> u64 {
    samples_from_ms(delay_ms, sample_rate).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    const RATE: u32 = 22050;

    fn counter() -> (Arc<AtomicU32>, TimerCallback) {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cb: TimerCallback = Box::new(move |delay| {
            c.fetch_add(1, Ordering::SeqCst);
            delay
        });
        (count, cb)
    }

    #[test]
    fn fires_only_after_full_second() {
        let mut clock = SampleClock::new(RATE);
        let (count, cb) = counter();
        clock.add_timer(1000, cb);

        assert_eq!(clock.advance(22049), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(clock.samples_until_event(), Some(1));
        assert_eq!(clock.advance(1), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rearms_with_returned_delay() {
        let mut clock = SampleClock::new(RATE);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut next = [500u32, 2000, 1000].into_iter().cycle();
        clock.add_timer(
            1000,
            Box::new(move |delay| {
                log.lock().unwrap().push(delay);
                next.next().unwrap()
            }),
        );

        // 1000 ms, then 500 ms, then 2000 ms.
        assert_eq!(clock.advance(22050), 1);
        assert_eq!(clock.pending_delay_ms(), Some(500));
        assert_eq!(clock.advance(11024), 0);
        assert_eq!(clock.advance(1), 1);
        assert_eq!(clock.pending_delay_ms(), Some(2000));
        assert_eq!(clock.advance(44099), 0);
        assert_eq!(clock.advance(1), 1);

        assert_eq!(*seen.lock().unwrap(), [1000, 500, 2000]);
        assert_eq!(clock.elapsed_samples(), 22050 + 11025 + 44100);
    }

    #[test]
    fn one_advance_can_fire_several_times() {
        let mut clock = SampleClock::new(RATE);
        let (count, cb) = counter();
        clock.add_timer(100, cb);
        // 100 ms = 2205 samples; 3.5 periods
        assert_eq!(clock.advance(2205 * 3 + 1000), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(clock.samples_until_event(), Some(1205));
    }

    #[test]
    fn zero_return_disarms() {
        let mut clock = SampleClock::new(RATE);
        clock.add_timer(10, Box::new(|_| 0));
        assert_eq!(clock.advance(10_000), 1);
        assert!(!clock.is_armed());
        assert_eq!(clock.samples_until_event(), None);
    }

    #[test]
    fn zero_delay_fires_on_next_sample() {
        let mut clock = SampleClock::new(RATE);
        let (count, cb) = counter();
        clock.add_timer(0, cb);
        assert_eq!(clock.samples_until_event(), Some(1));
        clock.advance(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_registration_replaces_first() {
        let mut clock = SampleClock::new(RATE);
        let (first, cb1) = counter();
        let (second, cb2) = counter();
        let h1 = clock.add_timer(10, cb1);
        let h2 = clock.add_timer(10, cb2);
        assert_ne!(h1, h2);

        clock.advance(220);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(clock.armed_handle(), Some(h2));
    }

    #[test]
    fn stale_handle_is_ignored() {
        let mut clock = SampleClock::new(RATE);
        let (_, cb1) = counter();
        let (_, cb2) = counter();
        let stale = clock.add_timer(10, cb1);
        let live = clock.add_timer(10, cb2);

        assert!(!clock.remove_timer(stale));
        assert!(clock.is_armed());
        assert!(clock.remove_timer(live));
        assert!(!clock.is_armed());
        assert!(!clock.remove_timer(live));
    }

    #[test]
    fn idle_clock_only_counts() {
        let mut clock = SampleClock::new(RATE);
        assert_eq!(clock.advance(1_000_000), 0);
        assert_eq!(clock.elapsed_samples(), 1_000_000);
    }
}
