use std::{io, sync::Arc};

use thiserror::Error;

/// Errors that could occur while emitting metrics.
///
/// None of these are ever returned from [`Statsd::emit`][crate::Statsd::emit] or the typed helpers. Instead, they are
/// handed to the exception handler configured with
/// [`StatsdOptions::with_exception_handler`][crate::StatsdOptions::with_exception_handler].
#[derive(Debug, Error)]
pub enum StatsdError {
    /// The channel failed to send a payload.
    ///
    /// The payload is dropped and not retried.
    #[error("failed to send payload: {0}")]
    Send(#[source] io::Error),

    /// The channel could not be reconnected.
    #[error("failed to reconnect channel: {0}")]
    Connect(#[source] io::Error),

    /// The channel reported itself disconnected, so metrics are being dropped.
    ///
    /// Reported once each time the channel goes from connected to disconnected, not for every dropped metric.
    #[error("channel is disconnected; dropping metrics")]
    Disconnected,

    /// The worker queue was full, so the payload was dropped.
    #[error("worker queue is full; payload dropped")]
    QueueFull,

    /// A single metric was not shorter than the maximum payload length, so it could not be batched.
    #[error("metric of {len} bytes does not fit under maximum payload length of {max} bytes")]
    PayloadTooLarge {
        /// Length of the metric, in bytes.
        len: usize,

        /// Configured maximum payload length, in bytes.
        max: usize,
    },

    /// The background worker is no longer running.
    #[error("background worker is not running")]
    WorkerUnavailable,

    /// The worker did not acknowledge a flush within the given timeout.
    #[error("timed out waiting for the worker to flush")]
    FlushTimeout,
}

/// Callback invoked with every error raised while emitting metrics.
pub type ExceptionHandler = Arc<dyn Fn(&StatsdError) + Send + Sync>;
