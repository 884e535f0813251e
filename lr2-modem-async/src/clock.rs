//! Millisecond tick counter shared with interrupt context.

use core::cell::Cell;
use critical_section::Mutex;

/// Free-running millisecond counter.
///
/// [`tick`](Ticker::tick) is meant to be called from a periodic (nominally
/// 1 ms) timer interrupt; [`now`](Ticker::now) reads the counter from the
/// main context. `new` is `const`, so a `Ticker` can live in a `static` next
/// to the interrupt handler that drives it.
///
/// The counter wraps at `u32::MAX`. The watchdog computes elapsed time with
/// wrapping arithmetic, so a single wrap during a command cycle is absorbed;
/// a pause spanning a full counter period (about 49 days) can mis-time one
/// cycle, which is accepted rather than corrected.
///
/// [`Lr2Modem`](crate::Lr2Modem) does not use a `Ticker`; it derives its
/// clock from `embassy_time::Instant`. This type serves integrations that
/// drive [`Lr2Engine`](crate::Lr2Engine) from their own loop.
pub struct Ticker {
    ticks: Mutex<Cell<u32>>,
}

impl Ticker {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Advances the counter by one millisecond.
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// The current counter value in milliseconds.
    pub fn now(&self) -> u32 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_ticks() {
        let ticker = Ticker::new();
        assert_eq!(ticker.now(), 0);
        ticker.tick();
        ticker.tick();
        ticker.tick();
        assert_eq!(ticker.now(), 3);
    }

    #[test]
    fn usable_from_a_static() {
        static TICKS: Ticker = Ticker::new();
        TICKS.tick();
        assert!(TICKS.now() >= 1);
    }
}
