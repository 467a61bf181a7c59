//! Named pipe (FIFO) transport for signal streaming.
//!
//! Provides idempotent FIFO creation and robust pipe I/O: writes bounded
//! to the OS-atomic `PIPE_BUF` chunk size, nonblocking reads, and
//! poll-gated readiness with a bounded timeout so the shared
//! [`Interrupt`] flag is observed promptly at every suspension point.
//!
//! This is the lowest layer of sigmux. Everything else builds on top of
//! the [`PipeWriter`] and [`PipeReader`] endpoints provided here.

pub mod error;
pub mod fifo;
pub mod interrupt;

pub use error::{Result, TransportError};
pub use fifo::{create_fifo, PipeReader, PipeWriter, POLL_INTERVAL};
pub use interrupt::Interrupt;
