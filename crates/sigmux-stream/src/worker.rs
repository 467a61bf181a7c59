use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use sigmux_transport::Interrupt;
use tracing::{error, warn};

use crate::error::{Result, StreamError};

/// Lifecycle phase of a stream worker, logged as the worker advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Created,
    PipeOpening,
    BarrierWait,
    Streaming,
    Draining,
    Flushing,
    Closed,
}

/// Grace period granted to a worker after cancellation; must exceed the
/// transport poll interval so workers can notice the interrupt.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Join a worker within a bounded wait. A worker that exceeds the bound
/// is detached and reported (`None`); a panicked worker is surfaced as
/// an error.
pub fn join_worker(
    name: &str,
    handle: JoinHandle<Result<()>>,
    timeout: Duration,
) -> Option<Result<()>> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(worker = name, "worker did not stop in time; detaching");
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    finish(name, handle)
}

/// Wait for a worker: unbounded while the pipeline is healthy, bounded
/// by [`JOIN_TIMEOUT`] once the interrupt is set so draining workers
/// get a grace period and stuck ones are detached (`None`).
pub fn collect_worker(
    name: &str,
    handle: JoinHandle<Result<()>>,
    interrupt: &Interrupt,
) -> Option<Result<()>> {
    let mut deadline: Option<Instant> = None;
    while !handle.is_finished() {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!(worker = name, "worker did not stop in time; detaching");
                return None;
            }
            None if interrupt.is_set() => {
                deadline = Some(Instant::now() + JOIN_TIMEOUT);
            }
            _ => {}
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    finish(name, handle)
}

fn finish(name: &str, handle: JoinHandle<Result<()>>) -> Option<Result<()>> {
    match handle.join() {
        Ok(result) => Some(result),
        Err(_) => {
            error!(worker = name, "worker panicked");
            Some(Err(StreamError::WorkerPanic {
                worker: name.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn join_worker_returns_the_result() {
        let handle = thread::spawn(|| Ok(()));
        let result = join_worker("ok", handle, Duration::from_secs(1));
        assert!(matches!(result, Some(Ok(()))));
    }

    #[test]
    fn join_worker_detaches_a_stuck_worker() {
        let handle = thread::spawn(|| {
            thread::sleep(Duration::from_secs(30));
            Ok(())
        });
        let result = join_worker("stuck", handle, Duration::from_millis(50));
        assert!(result.is_none());
    }

    #[test]
    fn panicking_worker_is_surfaced() {
        let handle = thread::spawn(|| -> Result<()> { panic!("boom") });
        let result = join_worker("panics", handle, Duration::from_secs(1));
        assert!(matches!(
            result,
            Some(Err(StreamError::WorkerPanic { .. }))
        ));
    }

    #[test]
    fn collect_worker_waits_until_interrupt_then_bounds() {
        let interrupt = Interrupt::new();
        interrupt.set();
        let handle = thread::spawn(|| {
            thread::sleep(Duration::from_secs(30));
            Ok(())
        });
        let started = Instant::now();
        let result = collect_worker("stuck", handle, &interrupt);
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
