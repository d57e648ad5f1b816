use std::{fmt, io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    channel::{Channel, RemoteAddr, SocketChannel},
    client::Statsd,
    error::{ExceptionHandler, StatsdError},
    formatter::normalize_prefix,
    recorder::StatsdRecorder,
};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_PAYLOAD_LEN: usize = 512;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// Errors that could occur while building or installing a statsd client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The maximum payload length is zero or does not fit in 32 bits.
    #[error("invalid maximum payload length: {len}")]
    InvalidPayloadLength {
        /// The configured length.
        len: usize,
    },

    /// The flush interval is zero.
    #[error("flush interval must be greater than zero")]
    InvalidFlushInterval,

    /// The worker queue capacity is zero.
    #[error("queue capacity must be greater than zero")]
    InvalidQueueCapacity,

    /// Failed to connect the default socket channel.
    #[error("failed to connect to remote address: {0}")]
    Connect(#[source] io::Error),

    /// Failed to spawn the background worker thread.
    #[error("failed to spawn background worker thread: {0}")]
    Backend(#[source] io::Error),

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[error("failed to install statsd recorder as global recorder")]
    FailedToInstall,
}

/// Configuration for a statsd client.
///
/// Options are assembled with the `with_*` methods and then consumed by [`build`][StatsdOptions::build],
/// [`build_with_channel`][StatsdOptions::build_with_channel], or [`install`][StatsdOptions::install]. Once a client
/// has been built, its options can no longer be changed: reconfiguring means building a new client.
#[derive(Clone)]
pub struct StatsdOptions {
    remote_addr: RemoteAddr,
    prefix: String,
    buffer_metrics: bool,
    max_payload_len: usize,
    flush_interval: Duration,
    write_timeout: Duration,
    queue_capacity: usize,
    exception_handler: Option<ExceptionHandler>,
}

impl StatsdOptions {
    /// Set the remote address to send metrics to.
    ///
    /// For UDP, the address needs to be in the format of `<host>:<port>`, optionally with a `udp://` scheme. On Linux,
    /// a Unix domain socket in `SOCK_DGRAM` mode can be used with an address of `unixgram://<path>`.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the prefix prepended to every metric name.
    ///
    /// Trailing `.` characters are stripped, as a single `.` is always placed between the prefix and the metric name.
    ///
    /// Defaults to no prefix.
    #[must_use]
    pub fn with_prefix<P>(mut self, prefix: P) -> Self
    where
        P: AsRef<str>,
    {
        self.prefix = normalize_prefix(prefix.as_ref()).to_string();
        self
    }

    /// Sets whether or not to buffer metrics.
    ///
    /// When enabled, metrics are joined with newlines into payloads shorter than the maximum payload length, and
    /// flushed when a payload fills up or when the flush interval elapses. When disabled, every metric is sent as its
    /// own payload.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn with_buffering(mut self, buffer_metrics: bool) -> Self {
        self.buffer_metrics = buffer_metrics;
        self
    }

    /// Set the maximum payload length when buffering metrics.
    ///
    /// Buffered payloads are always strictly shorter than this, so a single metric of this length or longer cannot be
    /// buffered, and is dropped.
    ///
    /// Defaults to 512 bytes, which fits in a single UDP datagram on virtually any network path.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the flush interval when buffering metrics.
    ///
    /// This bounds how long a metric can sit in a partially-filled payload before being sent.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the write timeout for the default socket channel.
    ///
    /// When the write timeout is reached, the payload being sent at the time is dropped without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the number of payloads that can be queued for the background worker.
    ///
    /// When the queue is full, new payloads are dropped rather than blocking the caller.
    ///
    /// Defaults to 8192.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the exception handler.
    ///
    /// Every error raised while buffering or sending metrics is passed to this handler, including the channel going
    /// disconnected. Without one, errors are logged at debug level and otherwise ignored.
    #[must_use]
    pub fn with_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StatsdError) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the configured remote address.
    pub fn remote_addr(&self) -> &RemoteAddr {
        &self.remote_addr
    }

    /// Returns the normalized metric prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `true` if metrics are buffered.
    pub fn buffer_metrics(&self) -> bool {
        self.buffer_metrics
    }

    /// Returns the maximum payload length.
    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    /// Returns the flush interval.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns the worker queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub(crate) fn exception_handler(&self) -> Option<&ExceptionHandler> {
        self.exception_handler.as_ref()
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.max_payload_len == 0 || u32::try_from(self.max_payload_len).is_err() {
            return Err(BuildError::InvalidPayloadLength { len: self.max_payload_len });
        }

        if self.flush_interval.is_zero() {
            return Err(BuildError::InvalidFlushInterval);
        }

        if self.queue_capacity == 0 {
            return Err(BuildError::InvalidQueueCapacity);
        }

        Ok(())
    }

    /// Builds a client that sends to the configured remote address.
    ///
    /// # Errors
    ///
    /// If the options are invalid, the socket cannot be connected, or the background worker cannot be spawned, an
    /// error will be returned.
    pub fn build(self) -> Result<Statsd<SocketChannel>, BuildError> {
        self.validate()?;

        let channel = SocketChannel::connect(self.remote_addr.clone(), self.write_timeout)
            .map_err(BuildError::Connect)?;
        Statsd::spawn(self, channel)
    }

    /// Builds a client that sends over the given channel.
    ///
    /// The remote address and write timeout are ignored, as they only apply to the default socket channel.
    ///
    /// # Errors
    ///
    /// If the options are invalid or the background worker cannot be spawned, an error will be returned.
    pub fn build_with_channel<C>(self, channel: C) -> Result<Statsd<C>, BuildError>
    where
        C: Channel,
    {
        self.validate()?;
        Statsd::spawn(self, channel)
    }

    /// Builds a client and installs it as the global [`metrics`] recorder.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, or if a global recorder is already installed, an error will be returned.
    pub fn install(self) -> Result<(), BuildError> {
        let recorder = StatsdRecorder::new(self.build()?);

        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)
    }
}

impl Default for StatsdOptions {
    fn default() -> Self {
        StatsdOptions {
            remote_addr: RemoteAddr::default(),
            prefix: String::new(),
            buffer_metrics: false,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            exception_handler: None,
        }
    }
}

impl fmt::Debug for StatsdOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdOptions")
            .field("remote_addr", &self.remote_addr)
            .field("prefix", &self.prefix)
            .field("buffer_metrics", &self.buffer_metrics)
            .field("max_payload_len", &self.max_payload_len)
            .field("flush_interval", &self.flush_interval)
            .field("write_timeout", &self.write_timeout)
            .field("queue_capacity", &self.queue_capacity)
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{BuildError, StatsdOptions};
    use crate::channel::NullChannel;

    #[test]
    fn strips_trailing_separator() {
        let options = StatsdOptions::default().with_prefix("awesome.");
        assert_eq!(options.prefix(), "awesome");

        let options = StatsdOptions::default().with_prefix("awesome");
        assert_eq!(options.prefix(), "awesome");
    }

    #[test]
    fn defaults() {
        let options = StatsdOptions::default();
        assert_eq!(options.prefix(), "");
        assert!(!options.buffer_metrics());
        assert_eq!(options.max_payload_len(), 512);
        assert_eq!(options.flush_interval(), Duration::from_secs(1));
        assert_eq!(options.queue_capacity(), 8192);
        assert!(options.exception_handler().is_none());
    }

    #[test]
    fn invalid_remote_address() {
        let result = StatsdOptions::default().with_remote_address("not an address");
        assert!(matches!(result, Err(BuildError::InvalidRemoteAddress { .. })));
    }

    #[test]
    fn rejects_invalid_options() {
        let result = StatsdOptions::default().with_maximum_payload_length(0).build_with_channel(NullChannel);
        assert!(matches!(result, Err(BuildError::InvalidPayloadLength { len: 0 })));

        let result =
            StatsdOptions::default().with_flush_interval(Duration::ZERO).build_with_channel(NullChannel);
        assert!(matches!(result, Err(BuildError::InvalidFlushInterval)));

        let result = StatsdOptions::default().with_queue_capacity(0).build_with_channel(NullChannel);
        assert!(matches!(result, Err(BuildError::InvalidQueueCapacity)));
    }

    #[test]
    fn builds_with_default_channel() {
        let client = StatsdOptions::default()
            .with_remote_address("127.0.0.1:8125")
            .unwrap()
            .build()
            .expect("failed to build client");
        client.count("awesome", 1);
        client.shutdown();
    }
}
