use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::{
    channel::{Channel, SocketChannel},
    error::StatsdError,
    formatter::{MetricLine, MetricType},
    options::{BuildError, StatsdOptions},
    worker::{Command, Worker, WorkerHandle},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between a client and its background worker.
pub(crate) struct Shared<C> {
    pub options: StatsdOptions,
    pub channel: C,
    batch: Mutex<Vec<u8>>,
    closed: AtomicBool,
    disconnected: AtomicBool,
}

impl<C> Shared<C> {
    /// Hands the error to the exception handler, if one is configured.
    ///
    /// A panicking handler is contained here, so it can never unwind into the caller of `emit` or kill the worker.
    pub fn report(&self, error: &StatsdError) {
        match self.options.exception_handler() {
            Some(handler) => {
                if panic::catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
                    error!(%error, "Exception handler panicked.");
                }
            }
            None => debug!(%error, "No exception handler configured; ignoring error."),
        }
    }

    /// Takes the pending batch, leaving an empty one in its place.
    ///
    /// Returns `None` if nothing is pending.
    pub fn take_pending(&self) -> Option<Vec<u8>> {
        self.take_pending_after(|| ()).1
    }

    /// Runs `f` and then takes the pending batch, without releasing the batch lock in between.
    ///
    /// Full batches are queued while the lock is held, so anything `f` pulls off the queue was filled before the batch
    /// taken here.
    pub fn take_pending_after<T>(&self, f: impl FnOnce() -> T) -> (T, Option<Vec<u8>>) {
        let mut batch = self.batch.lock();
        let before = f();
        let pending = if batch.is_empty() { None } else { Some(std::mem::take(&mut *batch)) };
        (before, pending)
    }
}

/// A statsd client.
///
/// Metrics are formatted on the calling thread and then either queued for the background worker to send one at a
/// time, or appended to a pending batch that the worker flushes when it fills up or when the flush interval elapses.
/// Callers never block on network I/O, and nothing emitted through the client ever returns an error or panics:
/// invalid metrics are dropped silently, and transport failures go to the configured exception handler.
///
/// The client can be shared across threads. Dropping it, or calling [`shutdown`][Statsd::shutdown], flushes any
/// pending metrics and stops the worker.
pub struct Statsd<C: Channel = SocketChannel> {
    shared: Arc<Shared<C>>,
    tx: Sender<Command>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<C> Statsd<C>
where
    C: Channel,
{
    pub(crate) fn spawn(options: StatsdOptions, channel: C) -> Result<Self, BuildError> {
        let (tx, rx) = bounded(options.queue_capacity());
        let (done_tx, done_rx) = bounded(0);

        let batch_capacity = if options.buffer_metrics() { options.max_payload_len() } else { 0 };
        let shared = Arc::new(Shared {
            options,
            channel,
            batch: Mutex::new(Vec::with_capacity(batch_capacity)),
            closed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });

        let worker = Worker::new(Arc::clone(&shared), rx, done_tx);
        let thread = thread::Builder::new()
            .name("statsd-emitter-worker".to_string())
            .spawn(move || worker.run())
            .map_err(BuildError::Backend)?;

        Ok(Statsd { shared, tx, worker: Mutex::new(Some(WorkerHandle::new(thread, done_rx))) })
    }

    /// Returns the options this client was built with.
    pub fn options(&self) -> &StatsdOptions {
        &self.shared.options
    }

    /// Returns the channel this client sends over.
    pub fn channel(&self) -> &C {
        &self.shared.channel
    }

    /// Emits a metric.
    ///
    /// The metric is formatted with the configured prefix and then handed off for sending. If the name, value, or
    /// metric type is empty, the client has been shut down, or the channel is disconnected, the metric is dropped.
    ///
    /// The exception handler hears about a disconnected channel once per disconnect, not once per dropped metric.
    pub fn emit(&self, name: &str, value: &str, metric_type: &str) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }

        let Some(line) = MetricLine::new(name, value, metric_type, self.shared.options.prefix()) else {
            return;
        };

        if !self.shared.channel.is_connected() {
            trace!(metric_name = name, "Channel is disconnected; dropping metric.");
            if !self.shared.disconnected.swap(true, Ordering::AcqRel) {
                self.shared.report(&StatsdError::Disconnected);
            }
            return;
        }

        if self.shared.disconnected.load(Ordering::Relaxed) {
            self.shared.disconnected.store(false, Ordering::Release);
        }

        if self.shared.options.buffer_metrics() {
            self.buffer(&line);
        } else if let Err(e) = self.try_enqueue(line.encode().into_bytes()) {
            self.shared.report(&e);
        }
    }

    fn buffer(&self, line: &MetricLine<'_>) {
        let len = line.encoded_len();
        let max = self.shared.options.max_payload_len();
        if len >= max {
            self.shared.report(&StatsdError::PayloadTooLarge { len, max });
            return;
        }

        let result = {
            let mut batch = self.shared.batch.lock();
            let mut result = Ok(());
            if !batch.is_empty() {
                if batch.len() + 1 + len >= max {
                    // Swap and queue while holding the lock: only one producer can see the batch fill up, and full
                    // batches reach the worker in the order they were filled.
                    let full = std::mem::replace(&mut *batch, Vec::with_capacity(max));
                    result = self.try_enqueue(full);
                } else {
                    batch.push(b'\n');
                }
            }

            line.write_to(&mut batch);
            result
        };

        if let Err(e) = result {
            self.shared.report(&e);
        }
    }

    fn try_enqueue(&self, payload: Vec<u8>) -> Result<(), StatsdError> {
        match self.tx.try_send(Command::Send(payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(StatsdError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(StatsdError::WorkerUnavailable),
        }
    }

    fn send_before(&self, command: Command, deadline: Instant) -> Result<(), StatsdError> {
        self.tx.send_timeout(command, deadline.saturating_duration_since(Instant::now())).map_err(|e| {
            match e {
                SendTimeoutError::Timeout(_) => StatsdError::FlushTimeout,
                SendTimeoutError::Disconnected(_) => StatsdError::WorkerUnavailable,
            }
        })
    }

    /// Flushes pending metrics and waits for the worker to send them.
    ///
    /// The pending batch, if any, is handed to the worker, and then this call blocks until the worker has passed every
    /// payload queued so far to the channel, or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// If the worker does not catch up within `timeout`, [`StatsdError::FlushTimeout`] is returned. If the worker is
    /// no longer running, [`StatsdError::WorkerUnavailable`] is returned.
    pub fn flush(&self, timeout: Duration) -> Result<(), StatsdError> {
        let deadline = Instant::now() + timeout;

        if let Some(payload) = self.shared.take_pending() {
            self.send_before(Command::Send(payload), deadline)?;
        }

        let (ack_tx, ack_rx) = bounded(1);
        self.send_before(Command::Sync(ack_tx), deadline)?;

        match ack_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(StatsdError::FlushTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(StatsdError::WorkerUnavailable),
        }
    }

    /// Shuts down the client.
    ///
    /// New metrics are no longer accepted, the pending batch is handed to the worker, and the worker is stopped. This
    /// waits a bounded amount of time for the worker to finish, so it completes even if other threads are still
    /// emitting metrics or the channel is stuck.
    ///
    /// Calling this more than once has no further effect. It is also called automatically when the client is dropped.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        if let Some(payload) = self.shared.take_pending() {
            if let Err(e) = self.send_before(Command::Send(payload), deadline) {
                self.shared.report(&e);
            }
        }

        // If the queue is too backed up to accept this, the worker stops once the client is dropped instead.
        if let Err(e) = self.send_before(Command::Shutdown, deadline) {
            warn!(error = %e, "Failed to signal the worker to stop; it stops once the client is dropped.");
            self.shared.report(&e);
        }

        if let Some(worker) = self.worker.lock().take() {
            worker.join(deadline.saturating_duration_since(Instant::now()));
        }

        debug!("Statsd client shut down.");
    }

    fn emit_integer(&self, name: &str, value: impl itoa::Integer, metric_type: MetricType) {
        let mut buf = itoa::Buffer::new();
        self.emit(name, buf.format(value), metric_type.as_str());
    }

    fn emit_float(&self, name: &str, value: f64, metric_type: MetricType) {
        if !value.is_finite() {
            trace!(metric_name = name, value, "Dropping non-finite metric value.");
            return;
        }

        let mut buf = ryu::Buffer::new();
        self.emit(name, buf.format_finite(value), metric_type.as_str());
    }

    /// Adds `value` to a counter.
    pub fn count(&self, name: &str, value: i64) {
        self.emit_integer(name, value, MetricType::Counter);
    }

    pub(crate) fn count_unsigned(&self, name: &str, value: u64) {
        self.emit_integer(name, value, MetricType::Counter);
    }

    /// Increments a counter by one.
    pub fn increment(&self, name: &str) {
        self.count(name, 1);
    }

    /// Decrements a counter by one.
    pub fn decrement(&self, name: &str) {
        self.count(name, -1);
    }

    /// Sets a gauge to `value`.
    ///
    /// Statsd servers read a leading sign on a gauge value as a relative change, so negative values adjust the gauge
    /// rather than set it. Non-finite values are dropped.
    pub fn gauge(&self, name: &str, value: f64) {
        self.emit_float(name, value, MetricType::Gauge);
    }

    /// Adjusts a gauge by `delta`.
    ///
    /// The value is always sent with an explicit sign. Non-finite values are dropped.
    pub fn gauge_delta(&self, name: &str, delta: f64) {
        if !delta.is_finite() {
            return;
        }

        let mut buf = ryu::Buffer::new();
        let formatted = buf.format_finite(delta);
        if formatted.starts_with('-') {
            self.emit(name, formatted, MetricType::Gauge.as_str());
        } else {
            let mut value = String::with_capacity(formatted.len() + 1);
            value.push('+');
            value.push_str(formatted);
            self.emit(name, &value, MetricType::Gauge.as_str());
        }
    }

    /// Records a timing, in milliseconds.
    pub fn timing(&self, name: &str, millis: u64) {
        self.emit_integer(name, millis, MetricType::Timing);
    }

    /// Runs `f` and records how long it took as a timing.
    pub fn time<F, R>(&self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let millis = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.timing(name, millis);
        result
    }

    /// Adds `value` to a set of unique values.
    pub fn set(&self, name: &str, value: &str) {
        self.emit(name, value, MetricType::Set.as_str());
    }

    /// Records a value in a histogram.
    pub fn histogram(&self, name: &str, value: f64) {
        self.emit_float(name, value, MetricType::Histogram);
    }

    /// Records a value in a distribution.
    pub fn distribution(&self, name: &str, value: f64) {
        self.emit_float(name, value, MetricType::Distribution);
    }
}

impl<C> Drop for Statsd<C>
where
    C: Channel,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
