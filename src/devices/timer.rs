//! Timer (§4.9): TIMER n arms a periodic wall-clock interrupt every n milliseconds
//! (n=0 disables). Grounded on the teacher's `devices/pit.rs` channel/count idiom,
//! reduced from PIT divisor/BCD/gate machinery to a single period register running
//! on a real wall-clock thread (this architecture has no cycle-accurate timing
//! requirement — §1 lists that as a non-goal).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Fault;
use crate::interrupts::InterruptController;

/// Shared timer state. The TIMER instruction (`executor::system`) calls `set_period`;
/// a background thread owns the actual sleep loop.
#[derive(Debug)]
pub struct Timer {
    period_ms: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
}

impl Timer {
    pub fn new(interrupts: Arc<Mutex<InterruptController>>) -> Self {
        let period_ms = Arc::new(AtomicU64::new(0));
        let generation = Arc::new(AtomicU64::new(0));
        spawn_loop(period_ms.clone(), generation.clone(), interrupts);
        Timer {
            period_ms,
            generation,
        }
    }

    /// TIMER n: n=0 disables without raising a final interrupt (§5 Cancellation).
    /// Resetting to a new nonzero period begins counting from now.
    pub fn set_period_ms(&self, n: u32) {
        self.period_ms.store(n as u64, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn spawn_loop(
    period_ms: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    interrupts: Arc<Mutex<InterruptController>>,
) {
    std::thread::spawn(move || loop {
        let period = period_ms.load(Ordering::SeqCst);
        if period == 0 {
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        let start_gen = generation.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(period));
        // If the period changed (TIMER called again) or was disabled while we slept,
        // this tick does not fire — the new period starts counting from when it was
        // set, not from when the previous sleep began.
        if generation.load(Ordering::SeqCst) == start_gen && period_ms.load(Ordering::SeqCst) == period {
            interrupts.lock().unwrap().raise(Fault::Timer.interrupt_number());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_does_not_raise_a_final_interrupt() {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let timer = Timer::new(ic.clone());
        timer.set_period_ms(5);
        timer.set_period_ms(0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(!ic.lock().unwrap().has_pending());
    }

    #[test]
    fn a_short_period_eventually_raises_the_timer_interrupt() {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let timer = Timer::new(ic.clone());
        timer.set_period_ms(5);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(ic.lock().unwrap().servicable(0xFF), Some(Fault::Timer.interrupt_number()));
    }
}
