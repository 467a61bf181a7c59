use std::fmt;
use std::sync::{Mutex, MutexGuard};

use sigmux_transport::Interrupt;
use tracing::debug;

use crate::error::{Result, StreamError};

/// Nominal sampling rate reported by a channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rate {
    Hz(f64),
    /// Non-uniform channel: no fixed rate.
    Irregular,
}

impl Rate {
    pub fn from_hz(rate: Option<f64>) -> Self {
        match rate {
            Some(hz) => Rate::Hz(hz),
            None => Rate::Irregular,
        }
    }

    pub fn hz(self) -> Option<f64> {
        match self {
            Rate::Hz(hz) => Some(hz),
            Rate::Irregular => None,
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Hz(hz) => write!(f, "{hz} Hz"),
            Rate::Irregular => write!(f, "irregular"),
        }
    }
}

/// First-writer-wins rate slot shared by every channel reader of one
/// multiplexer session.
///
/// The lock is held only for the compare-and-set; the check sits on the
/// hot sample path and must not become a bottleneck.
pub struct RateLock {
    locked: Mutex<Option<Rate>>,
    interrupt: Interrupt,
}

impl RateLock {
    /// A rate supplied up front (e.g. from a definition's `rate` option)
    /// is pre-locked; otherwise the first report wins.
    pub fn new(initial: Option<Rate>, interrupt: Interrupt) -> Self {
        Self {
            locked: Mutex::new(initial),
            interrupt,
        }
    }

    /// Lock in the first reported rate; compare every later report.
    ///
    /// A mismatch is fatal: the session interrupt is set so every other
    /// channel reader observes cancellation promptly, and the mismatch
    /// is returned to the offending reader.
    pub fn check(&self, rate: Rate) -> Result<()> {
        let mut locked = lock(&self.locked);
        match *locked {
            None => {
                *locked = Some(rate);
                debug!(%rate, "rate locked");
                Ok(())
            }
            Some(have) if have == rate => Ok(()),
            Some(have) => {
                drop(locked);
                debug!(locked = %have, offered = %rate, "rate mismatch");
                self.interrupt.set();
                Err(StreamError::RateMismatch {
                    locked: have,
                    offered: rate,
                })
            }
        }
    }

    /// The locked rate, if any report has arrived.
    pub fn rate(&self) -> Option<Rate> {
        *lock(&self.locked)
    }
}

fn lock<'a>(mutex: &'a Mutex<Option<Rate>>) -> MutexGuard<'a, Option<Rate>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_report_locks_the_rate() {
        let rates = RateLock::new(None, Interrupt::new());
        assert!(rates.rate().is_none());
        rates.check(Rate::Hz(100.0)).expect("first report should lock");
        assert_eq!(rates.rate(), Some(Rate::Hz(100.0)));
        rates
            .check(Rate::Hz(100.0))
            .expect("matching report should pass");
    }

    #[test]
    fn mismatch_faults_and_sets_the_interrupt() {
        let interrupt = Interrupt::new();
        let rates = RateLock::new(None, interrupt.clone());
        rates.check(Rate::Hz(100.0)).expect("first report should lock");

        let err = rates
            .check(Rate::Hz(200.0))
            .expect_err("different rate should fault");
        assert!(matches!(err, StreamError::RateMismatch { .. }));
        assert!(interrupt.is_set(), "siblings must observe cancellation");
    }

    #[test]
    fn irregular_is_a_rate_of_its_own() {
        let interrupt = Interrupt::new();
        let rates = RateLock::new(None, interrupt.clone());
        rates
            .check(Rate::Irregular)
            .expect("irregular should lock");
        rates
            .check(Rate::Irregular)
            .expect("irregular should match itself");
        assert!(rates.check(Rate::Hz(10.0)).is_err());
        assert!(interrupt.is_set());
    }

    #[test]
    fn preset_rate_is_already_locked() {
        let rates = RateLock::new(Some(Rate::Hz(256.0)), Interrupt::new());
        rates
            .check(Rate::Hz(256.0))
            .expect("matching report should pass");
        assert!(rates.check(Rate::Hz(250.0)).is_err());
    }

    #[test]
    fn concurrent_reports_agree_on_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let rates = Arc::new(RateLock::new(None, Interrupt::new()));
        let mut reporters = Vec::new();
        for _ in 0..8 {
            let rates = Arc::clone(&rates);
            reporters.push(thread::spawn(move || rates.check(Rate::Hz(500.0)).is_ok()));
        }
        for reporter in reporters {
            assert!(reporter.join().expect("reporter should finish"));
        }
        assert_eq!(rates.rate(), Some(Rate::Hz(500.0)));
    }
}
