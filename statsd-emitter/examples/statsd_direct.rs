use std::time::Duration;

use statsd_emitter::StatsdOptions;

fn main() {
    tracing_subscriber::fmt::init();

    let client = StatsdOptions::default()
        .with_remote_address("localhost:8125")
        .expect("failed to parse remote address")
        .with_prefix("example")
        .build()
        .expect("failed to build statsd client");

    for i in 0..10 {
        client.increment("ticks");
        client.gauge("progress", f64::from(i) * 10.0);
        client.time("nap", || std::thread::sleep(Duration::from_millis(25)));
        client.set("users", if i % 2 == 0 { "alice" } else { "bob" });
    }

    client.flush(Duration::from_secs(1)).expect("failed to flush metrics");
}
