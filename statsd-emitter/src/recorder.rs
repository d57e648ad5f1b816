use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};

use crate::{
    channel::{Channel, SocketChannel},
    client::Statsd,
    formatter::MetricType,
};

/// A [`metrics`] recorder that emits every update through a [`Statsd`] client.
///
/// Updates are not aggregated: each counter increment, gauge update, or histogram sample becomes its own metric line,
/// buffered or not according to the client's options. Statsd has no notion of labels, so only the key name is used.
pub struct StatsdRecorder<C: Channel = SocketChannel> {
    client: Arc<Statsd<C>>,
}

impl<C> StatsdRecorder<C>
where
    C: Channel,
{
    /// Creates a new `StatsdRecorder` that emits through `client`.
    pub fn new(client: Statsd<C>) -> Self {
        StatsdRecorder { client: Arc::new(client) }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &Statsd<C> {
        &self.client
    }

    fn handle(&self, key: &Key) -> Arc<StatsdHandle<C>> {
        Arc::new(StatsdHandle { client: Arc::clone(&self.client), name: key.name().to_string() })
    }
}

impl<C> Recorder for StatsdRecorder<C>
where
    C: Channel,
{
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}

struct StatsdHandle<C: Channel> {
    client: Arc<Statsd<C>>,
    name: String,
}

impl<C> CounterFn for StatsdHandle<C>
where
    C: Channel,
{
    fn increment(&self, value: u64) {
        self.client.count_unsigned(&self.name, value);
    }

    // Statsd counters can't be set outright, so the closest equivalent is a gauge.
    fn absolute(&self, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.client.emit(&self.name, buf.format(value), MetricType::Gauge.as_str());
    }
}

impl<C> GaugeFn for StatsdHandle<C>
where
    C: Channel,
{
    fn increment(&self, value: f64) {
        self.client.gauge_delta(&self.name, value);
    }

    fn decrement(&self, value: f64) {
        self.client.gauge_delta(&self.name, -value);
    }

    fn set(&self, value: f64) {
        self.client.gauge(&self.name, value);
    }
}

impl<C> HistogramFn for StatsdHandle<C>
where
    C: Channel,
{
    fn record(&self, value: f64) {
        self.client.histogram(&self.name, value);
    }
}
