use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use mockall::mock;
use parking_lot::Mutex;

use crate::channel::Channel;

mock! {
    pub Transport {}

    impl Channel for Transport {
        fn is_connected(&self) -> bool;
        fn send(&self, payload: &[u8]) -> io::Result<usize>;
        fn reconnect(&self) -> io::Result<()>;
    }
}

/// Channel that records every payload it is asked to send.
pub struct CapturingChannel {
    payloads: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    gate: Option<Arc<Mutex<()>>>,
    sent_tx: Sender<()>,
    sent_rx: Receiver<()>,
}

impl CapturingChannel {
    /// Makes every send wait until `gate` is free.
    pub fn with_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Waits up to `timeout` for the next payload to be sent.
    pub fn wait_for_send(&self, timeout: Duration) -> bool {
        self.sent_rx.recv_timeout(timeout).is_ok()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads
            .lock()
            .iter()
            .map(|payload| String::from_utf8(payload.clone()).expect("payload should be UTF-8"))
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .flat_map(|payload| payload.split('\n').map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

impl Default for CapturingChannel {
    fn default() -> Self {
        let (sent_tx, sent_rx) = unbounded();
        CapturingChannel {
            payloads: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            gate: None,
            sent_tx,
            sent_rx,
        }
    }
}

impl Channel for CapturingChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        let _held = self.gate.as_ref().map(|gate| gate.lock());
        self.payloads.lock().push(payload.to_vec());
        let _ = self.sent_tx.send(());
        Ok(payload.len())
    }
}
