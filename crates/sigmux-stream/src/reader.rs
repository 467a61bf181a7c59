use std::sync::Arc;

use sigmux_frame::ChannelHandle;
use sigmux_repo::{SampleBatch, SignalSource};
use sigmux_transport::Interrupt;
use tracing::{debug, error};

use crate::error::{Result, StreamError};
use crate::rate::{Rate, RateLock};

/// Drive one signal channel: pull timed batches from the source, report
/// each batch's rate, and feed the multiplexer until exhaustion,
/// interrupt, or an unrecoverable read fault.
///
/// The end-of-channel sentinel is delivered on every exit path so the
/// multiplexer never stalls waiting on a dead channel. Read faults are
/// absorbed here (logged, returned for bookkeeping) and must not take
/// sibling channels down; a rate mismatch is the exception and has
/// already set the session interrupt by the time it propagates.
pub fn run_reader(
    mut source: Box<dyn SignalSource>,
    handle: ChannelHandle,
    rates: Arc<RateLock>,
    interrupt: Interrupt,
) -> Result<()> {
    let channel = handle.channel();
    debug!(channel, uri = source.uri(), "channel reader started");
    let result = pump(source.as_mut(), &handle, &rates, &interrupt);
    handle.finish();
    match &result {
        Ok(()) => debug!(channel, "channel reader finished"),
        Err(err) if err.is_interrupt() => debug!(channel, "channel reader cancelled"),
        Err(err) => error!(channel, %err, "channel reader failed"),
    }
    result
}

fn pump(
    source: &mut dyn SignalSource,
    handle: &ChannelHandle,
    rates: &RateLock,
    interrupt: &Interrupt,
) -> Result<()> {
    while !interrupt.is_set() {
        let batch = match source.next_batch()? {
            Some(batch) => batch,
            None => return Ok(()),
        };
        match batch {
            SampleBatch::Uniform { rate, values } => {
                rates.check(Rate::Hz(rate))?;
                handle.push_samples(&values)?;
            }
            SampleBatch::Points(points) => {
                rates.check(Rate::Irregular)?;
                handle.push_points(points)?;
            }
        }
    }
    Err(StreamError::Interrupted)
}
