//! A client for sending metrics to a [statsd][statsd]-compatible server.
//!
//! [statsd]: https://github.com/statsd/statsd
//!
//! # Usage
//!
//! ```no_run
//! # use statsd_emitter::StatsdOptions;
//! // Configure the client. Every option has a sensible default, so only what differs needs to be set.
//! let client = StatsdOptions::default()
//!     .with_remote_address("localhost:8125")
//!     .expect("failed to parse remote address")
//!     .with_prefix("myapp")
//!     .with_buffering(true)
//!     .build()
//!     .expect("failed to build statsd client");
//!
//! // Emit metrics. None of these calls block on the network, and none of them can fail.
//! client.increment("requests");
//! client.gauge("queue.depth", 42.0);
//! client.timing("render", 12);
//! client.emit("custom", "1", "c");
//! ```
//!
//! Alternatively, the client can be installed as the global [`metrics`] recorder with
//! [`StatsdOptions::install`], in which case the `counter!`, `gauge!`, and `histogram!` macros send to statsd.
//!
//! # Wire format
//!
//! Metrics are written in the statsd line protocol: `[prefix.]name:value|type`. See [`format_metric`] for the exact
//! rules, including how malformed metrics are handled.
//!
//! # Buffering
//!
//! By default, every metric is sent as its own payload. With buffering enabled, metrics are joined with newlines into
//! payloads of up to a maximum length (512 bytes by default), which are sent when they fill up, and at least once per
//! flush interval otherwise. This cuts down drastically on the number of packets sent for busy applications.
//!
//! # Background worker
//!
//! Each client owns a single background thread that performs all network I/O. Emitting a metric only formats it and
//! either queues it for the worker or appends it to the pending batch. If the worker falls behind, metrics are dropped
//! rather than blocking the caller. Statsd is fire-and-forget: nothing is ever retried.
//!
//! # Errors
//!
//! Failures that happen after a metric is emitted, such as a failed send or a full queue, are passed to the exception
//! handler configured with [`StatsdOptions::with_exception_handler`]. Without a handler they are ignored.
//!
//! # Transports
//!
//! UDP is used by default. On Linux, Unix domain sockets in `SOCK_DGRAM` mode are also supported. Any other transport
//! can be plugged in by implementing [`Channel`] and building the client with [`StatsdOptions::build_with_channel`].

#![deny(clippy::all)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod channel;
pub use self::channel::{Channel, NullChannel, RemoteAddr, SocketChannel};

mod client;
pub use self::client::Statsd;

mod error;
pub use self::error::{ExceptionHandler, StatsdError};

mod formatter;
pub use self::formatter::{format_metric, MetricLine, MetricType};

mod options;
pub use self::options::{BuildError, StatsdOptions};

mod recorder;
pub use self::recorder::StatsdRecorder;

mod worker;

#[cfg(test)]
mod test_util;
