use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use sigmux_transport::{Interrupt, POLL_INTERVAL};

use crate::error::{Result, StreamError};

/// Counted startup rendezvous.
///
/// Every output stream registers one waiter before any worker starts;
/// [`StartGate::wait_all`] then holds each arriving stream until all
/// registered streams have arrived, so concurrently-launched pipes
/// begin emitting at approximately the same wall-clock instant. The
/// gate admits exactly as many releases as registrations: it never
/// double-releases and never drops a waiter.
#[derive(Clone, Default)]
pub struct StartGate {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: Mutex<usize>,
    all_in: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more waiter. Must be called before that waiter's
    /// worker starts.
    pub fn register(&self) {
        let mut pending = lock(&self.inner.pending);
        *pending += 1;
    }

    /// Arrive, then block until every registered waiter has arrived.
    /// Interrupt-aware: cancellation releases the wait with an error.
    pub fn wait_all(&self, interrupt: &Interrupt) -> Result<()> {
        let mut pending = lock(&self.inner.pending);
        if *pending > 0 {
            *pending -= 1;
        }
        self.inner.all_in.notify_all();
        while *pending > 0 {
            if interrupt.is_set() {
                return Err(StreamError::Interrupted);
            }
            pending = match self.inner.all_in.wait_timeout(pending, POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        Ok(())
    }

    /// Waiters registered but yet to arrive.
    pub fn pending(&self) -> usize {
        *lock(&self.inner.pending)
    }
}

fn lock<'a>(mutex: &'a Mutex<usize>) -> MutexGuard<'a, usize> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn unregistered_gate_does_not_hold() {
        let gate = StartGate::new();
        gate.wait_all(&Interrupt::new())
            .expect("empty gate should pass immediately");
    }

    #[test]
    fn all_waiters_release_together() {
        let gate = StartGate::new();
        for _ in 0..3 {
            gate.register();
        }
        let released = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let gate = gate.clone();
            let released = Arc::clone(&released);
            waiters.push(thread::spawn(move || {
                gate.wait_all(&Interrupt::new())
                    .expect("waiter should be released");
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Two of three have arrived; nobody may pass yet.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(gate.pending(), 1);

        gate.wait_all(&Interrupt::new())
            .expect("last arrival should be released");
        for waiter in waiters {
            waiter.join().expect("waiter should finish");
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(gate.pending(), 0);
    }

    #[test]
    fn interrupt_releases_a_stuck_waiter() {
        let gate = StartGate::new();
        gate.register();
        gate.register();
        let interrupt = Interrupt::new();

        let waiter_gate = gate.clone();
        let waiter_interrupt = interrupt.clone();
        let waiter =
            thread::spawn(move || waiter_gate.wait_all(&waiter_interrupt));

        thread::sleep(Duration::from_millis(50));
        interrupt.set();
        let result = waiter.join().expect("waiter should finish");
        assert!(matches!(result, Err(StreamError::Interrupted)));
    }
}
