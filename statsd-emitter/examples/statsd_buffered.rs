use std::time::Duration;

use metrics::{counter, gauge, histogram};
use statsd_emitter::StatsdOptions;

fn main() {
    tracing_subscriber::fmt::init();

    StatsdOptions::default()
        .with_remote_address("localhost:8125")
        .expect("failed to parse remote address")
        .with_prefix("example")
        .with_buffering(true)
        .with_flush_interval(Duration::from_millis(500))
        .with_exception_handler(|e| eprintln!("statsd error: {}", e))
        .install()
        .expect("failed to install statsd recorder");

    counter!("idle_metric").increment(1);
    gauge!("testing").set(42.0);

    let loops = counter!("server_loops");
    let loop_delta_secs = histogram!("server_loop_delta_secs");

    // Loop over and over, pretending to do some work.
    let mut iteration = 0u64;
    loop {
        loops.increment(1);
        loop_delta_secs.record((iteration % 100) as f64 / 100.0);

        let lucky = gauge!("lucky_iterations");
        if iteration % 4 == 0 {
            lucky.decrement(1.0);
        } else {
            lucky.increment(1.0);
        }

        iteration += 1;
        std::thread::sleep(Duration::from_millis(10));
    }
}
