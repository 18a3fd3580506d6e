//! Concurrency ceiling for heavy commands.
//!
//! Heavy handlers hold subprocesses and disk for a long time, so the number
//! running at once is capped. A slot is an RAII [`HeavyPermit`]: dropping it
//! releases the slot whether the handler returned, failed or panicked.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ConcurrencyThrottle {
    in_flight: AtomicUsize,
    max: usize,
}

impl ConcurrencyThrottle {
    pub fn new(max: usize) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max,
        }
    }

    /// Claim a slot, or `None` when `max` are already in flight.
    pub fn try_acquire(&self) -> Option<HeavyPermit<'_>> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(HeavyPermit { throttle: self }),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// A held heavy-command slot.
#[must_use = "dropping the permit releases the slot immediately"]
pub struct HeavyPermit<'a> {
    throttle: &'a ConcurrencyThrottle,
}

impl Drop for HeavyPermit<'_> {
    fn drop(&mut self) {
        self.throttle.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_permit_refused_until_one_released() {
        let t = ConcurrencyThrottle::new(3);
        let a = t.try_acquire().unwrap();
        let _b = t.try_acquire().unwrap();
        let _c = t.try_acquire().unwrap();
        assert_eq!(t.in_flight(), 3);
        assert!(t.try_acquire().is_none());
        assert_eq!(t.in_flight(), 3, "a refused acquire must not count");

        drop(a);
        assert_eq!(t.in_flight(), 2);
        assert!(t.try_acquire().is_some());
    }

    #[test]
    fn permit_released_on_panic() {
        let t = ConcurrencyThrottle::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _p = t.try_acquire().unwrap();
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn zero_ceiling_refuses_everything() {
        assert!(ConcurrencyThrottle::new(0).try_acquire().is_none());
    }

    #[test]
    fn contended_acquire_never_exceeds_max() {
        use std::sync::Arc;
        let t = Arc::new(ConcurrencyThrottle::new(4));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let t = Arc::clone(&t);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if let Some(_p) = t.try_acquire() {
                            peak.fetch_max(t.in_flight(), Ordering::AcqRel);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::Acquire) <= 4);
        assert_eq!(t.in_flight(), 0);
    }
}
