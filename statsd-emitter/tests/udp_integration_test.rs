use std::{net::UdpSocket, time::Duration};

use statsd_emitter::{StatsdError, StatsdOptions};

const TIMEOUT: Duration = Duration::from_secs(5);

fn local_server() -> (UdpSocket, String) {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap_or_else(|e| panic!("failed to bind server: {:?}", e));
    server.set_read_timeout(Some(TIMEOUT)).unwrap();
    let addr = server.local_addr().unwrap().to_string();
    (server, addr)
}

fn recv_string(server: &UdpSocket) -> String {
    let mut buf = [0u8; 1024];
    let len = server.recv(&mut buf).unwrap_or_else(|e| panic!("no datagram received: {:?}", e));
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[test]
fn test_unbuffered_datagrams() {
    let (server, addr) = local_server();
    let client = StatsdOptions::default()
        .with_remote_address(&addr)
        .unwrap()
        .with_prefix("app.")
        .with_exception_handler(|e| panic!("unexpected error: {}", e))
        .build()
        .unwrap();

    client.increment("requests");
    client.timing("render", 12);
    client.flush(TIMEOUT).unwrap();

    assert_eq!(recv_string(&server), "app.requests:1|c");
    assert_eq!(recv_string(&server), "app.render:12|ms");
}

#[test]
fn test_buffered_datagram() {
    let (server, addr) = local_server();
    let client = StatsdOptions::default()
        .with_remote_address(format!("udp://{}", addr))
        .unwrap()
        .with_buffering(true)
        .with_flush_interval(Duration::from_secs(60))
        .build()
        .unwrap();

    client.count("a", 1);
    client.gauge("b", 2.0);
    client.set("c", "user1");
    client.flush(TIMEOUT).unwrap();

    assert_eq!(recv_string(&server), "a:1|c\nb:2.0|g\nc:user1|s");
}

#[test]
fn test_buffered_payloads_respect_limit() {
    let (server, addr) = local_server();
    let client = StatsdOptions::default()
        .with_remote_address(&addr)
        .unwrap()
        .with_buffering(true)
        .with_maximum_payload_length(64)
        .build()
        .unwrap();

    for i in 0..20 {
        client.count(&format!("metric{}", i), i);
    }
    client.flush(TIMEOUT).unwrap();

    let mut lines = Vec::new();
    while lines.len() < 20 {
        let payload = recv_string(&server);
        assert!(payload.len() < 64, "payload not under limit: {:?}", payload);
        lines.extend(payload.split('\n').map(str::to_string));
    }

    let expected = (0..20).map(|i| format!("metric{}:{}|c", i, i)).collect::<Vec<_>>();
    assert_eq!(lines, expected);
}

#[test]
fn test_drop_flushes_pending_metrics() {
    let (server, addr) = local_server();
    let client = StatsdOptions::default()
        .with_remote_address(&addr)
        .unwrap()
        .with_buffering(true)
        .with_flush_interval(Duration::from_secs(60))
        .build()
        .unwrap();

    client.increment("last.words");
    drop(client);

    assert_eq!(recv_string(&server), "last.words:1|c");
}

#[test]
fn test_flush_after_shutdown() {
    let (_server, addr) = local_server();
    let client = StatsdOptions::default().with_remote_address(&addr).unwrap().build().unwrap();

    client.shutdown();
    assert!(matches!(client.flush(TIMEOUT), Err(StatsdError::WorkerUnavailable)));
}
