use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide cancellation flag, passed explicitly to every component.
///
/// Clones share one underlying flag. Every blocking loop in the pipeline
/// (pipe polls, queue waits, barrier waits) checks the flag at least once
/// per poll interval, so setting it unwinds all workers promptly through
/// their draining/flushing terminal states.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
