use std::fmt;

/// Separator placed between the prefix and the metric name.
pub(crate) const SEPARATOR: char = '.';

/// Statsd metric type.
///
/// Each variant maps to the type tag that trails a metric on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    /// Counter (`c`).
    Counter,

    /// Gauge (`g`).
    Gauge,

    /// Set of unique values (`s`).
    Set,

    /// Timer, in milliseconds (`ms`).
    Timing,

    /// Histogram (`h`).
    Histogram,

    /// Distribution (`d`).
    Distribution,
}

impl MetricType {
    /// Returns the wire tag for this metric type.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Set => "s",
            MetricType::Timing => "ms",
            MetricType::Histogram => "h",
            MetricType::Distribution => "d",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strips any trailing separators from `prefix`.
pub(crate) fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches(SEPARATOR)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// A borrowed, validated view of a single metric line.
///
/// `MetricLine` knows its exact encoded length up front, which lets callers check it against a payload limit and
/// then write it straight into an existing buffer without building an intermediate `String`.
#[derive(Clone, Copy, Debug)]
pub struct MetricLine<'a> {
    prefix: &'a str,
    name: &'a str,
    value: &'a str,
    metric_type: &'a str,
}

impl<'a> MetricLine<'a> {
    /// Creates a new `MetricLine`.
    ///
    /// Returns `None` if the name, value, or metric type are empty or consist only of whitespace. Trailing separators
    /// on `prefix` are stripped.
    pub fn new(name: &'a str, value: &'a str, metric_type: &'a str, prefix: &'a str) -> Option<Self> {
        if is_blank(name) || is_blank(value) || is_blank(metric_type) {
            return None;
        }

        Some(Self { prefix: normalize_prefix(prefix), name, value, metric_type })
    }

    fn pieces(&self) -> [&'a str; 7] {
        let separator = if self.prefix.is_empty() { "" } else { "." };
        [self.prefix, separator, self.name, ":", self.value, "|", self.metric_type]
    }

    /// Returns the encoded length of this line, in bytes.
    pub fn encoded_len(&self) -> usize {
        self.pieces().iter().map(|piece| piece.len()).sum()
    }

    /// Appends the encoded line to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        for piece in self.pieces() {
            buf.extend_from_slice(piece.as_bytes());
        }
    }

    /// Returns the encoded line as a `String`.
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(self.encoded_len());
        for piece in self.pieces() {
            line.push_str(piece);
        }
        line
    }
}

impl fmt::Display for MetricLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in self.pieces() {
            f.write_str(piece)?;
        }
        Ok(())
    }
}

/// Formats a metric in the statsd line protocol.
///
/// The result is `prefix.name:value|type`, or `name:value|type` when `prefix` is empty. Any trailing `.` on the prefix
/// is dropped so the separator is never doubled up.
///
/// If `name`, `value`, or `metric_type` is empty or only whitespace, an empty string is returned instead. Formatting
/// never fails loudly: malformed metrics are simply not emitted.
///
/// ```
/// # use statsd_emitter::format_metric;
/// assert_eq!(format_metric("awesome.yo", "4", "s", "appname"), "appname.awesome.yo:4|s");
/// assert_eq!(format_metric("", "1", "c", "myPrefix"), "");
/// ```
pub fn format_metric(name: &str, value: &str, metric_type: &str, prefix: &str) -> String {
    MetricLine::new(name, value, metric_type, prefix).map(|line| line.encode()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use proptest::prelude::*;

    use super::{format_metric, normalize_prefix, MetricLine, MetricType};

    #[test]
    fn no_prefix() {
        assert_eq!(format_metric("awesomeMetric.yo", "1", "c", ""), "awesomeMetric.yo:1|c");
    }

    #[test]
    fn with_prefix() {
        // Cases are defined as: name, value, type, prefix, expected output.
        let cases = [
            ("awesome.yo", "1", "c", "", "awesome.yo:1|c"),
            ("awesome.yo", "4", "s", "appname", "appname.awesome.yo:4|s"),
            ("awesomeMetric.yo", "1", "c", "myPrefix", "myPrefix.awesomeMetric.yo:1|c"),
            ("awesomeMetric.yo", "1", "c", "myPrefix.", "myPrefix.awesomeMetric.yo:1|c"),
            ("latency", "250", "ms", "svc..", "svc.latency:250|ms"),
        ];

        for (name, value, metric_type, prefix, expected) in cases {
            assert_eq!(format_metric(name, value, metric_type, prefix), expected);
        }
    }

    #[test]
    fn invalid_inputs() {
        let cases = [
            ("", "1", "c"),
            ("yodawg", "", "c"),
            ("yodawg", "1", ""),
            ("   ", "1", "c"),
            ("yodawg", "\t", "c"),
            ("yodawg", "1", " \n"),
        ];

        for (name, value, metric_type) in cases {
            assert_eq!(format_metric(name, value, metric_type, "myPrefix"), "");
            assert!(MetricLine::new(name, value, metric_type, "myPrefix").is_none());
        }
    }

    #[test]
    fn dot_only_prefix_is_dropped() {
        assert_eq!(normalize_prefix("..."), "");
        assert_eq!(format_metric("a", "0", "g", "."), "a:0|g");
    }

    #[test]
    fn metric_type_tags() {
        let tags = [
            (MetricType::Counter, "c"),
            (MetricType::Gauge, "g"),
            (MetricType::Set, "s"),
            (MetricType::Timing, "ms"),
            (MetricType::Histogram, "h"),
            (MetricType::Distribution, "d"),
        ];

        for (metric_type, tag) in tags {
            assert_eq!(metric_type.as_str(), tag);
            assert_eq!(metric_type.to_string(), tag);
        }
    }

    #[test]
    fn line_writes_into_existing_buffer() {
        let line = MetricLine::new("requests", "3", "c", "web").unwrap();
        let mut buf = b"existing\n".to_vec();
        line.write_to(&mut buf);

        assert_eq!(buf, b"existing\nweb.requests:3|c");
        assert_eq!(line.encoded_len(), "web.requests:3|c".len());
        assert_eq!(line.to_string(), "web.requests:3|c");
    }

    #[test]
    fn formats_quickly() {
        let start = Instant::now();
        for _ in 0..100_000 {
            let line = format_metric("awesomeMetric.yo", "1", "c", "myPrefix");
            assert!(!line.is_empty());
        }

        assert!(start.elapsed() < Duration::from_secs(3));
    }

    proptest! {
        #[test]
        fn valid_inputs_match_wire_format(
            name in "[a-zA-Z][a-zA-Z0-9_.]{0,31}",
            value in "-?[0-9]{1,12}",
            metric_type in prop_oneof![Just("c"), Just("g"), Just("s"), Just("ms")],
            prefix in "([a-z]{1,8}\\.{0,2})?",
        ) {
            let output = format_metric(&name, &value, metric_type, &prefix);
            let trimmed = prefix.trim_end_matches('.');
            let expected = if trimmed.is_empty() {
                format!("{name}:{value}|{metric_type}")
            } else {
                format!("{trimmed}.{name}:{value}|{metric_type}")
            };

            prop_assert_eq!(&output, &expected);
            prop_assert_eq!(output.len(), MetricLine::new(&name, &value, metric_type, &prefix).unwrap().encoded_len());
            prop_assert_eq!(format_metric(&name, &value, metric_type, &prefix), output);
        }

        #[test]
        fn blank_names_never_format(name in "[ \t\n]{0,4}", value in "[0-9]{1,4}") {
            prop_assert_eq!(format_metric(&name, &value, "c", "prefix"), "");
        }
    }
}
