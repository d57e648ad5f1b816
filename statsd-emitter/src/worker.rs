use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{select, tick, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace, warn};

use crate::{channel::Channel, client::Shared, error::StatsdError};

/// Instruction handed from the client to its background worker.
pub(crate) enum Command {
    /// Send a single payload over the channel.
    Send(Vec<u8>),

    /// Acknowledge once every command queued before this one has been processed.
    Sync(Sender<()>),

    /// Stop the worker.
    Shutdown,
}

/// Background worker that owns all network I/O for a client.
pub(crate) struct Worker<C> {
    shared: Arc<Shared<C>>,
    rx: Receiver<Command>,

    // Never sent on: dropping it, after everything else the worker holds, is what `WorkerHandle::join` waits for.
    _done: Sender<()>,
}

impl<C> Worker<C>
where
    C: Channel,
{
    pub fn new(shared: Arc<Shared<C>>, rx: Receiver<Command>, done: Sender<()>) -> Self {
        Worker { shared, rx, _done: done }
    }

    /// Runs the worker until it is told to shut down or the client goes away.
    pub fn run(self) {
        let flush_interval = self.shared.options.flush_interval();
        let ticker = tick(flush_interval);
        debug!(?flush_interval, buffered = self.shared.options.buffer_metrics(), "Statsd worker started.");

        loop {
            select! {
                recv(self.rx) -> msg => match msg {
                    Ok(command) => {
                        if !self.process(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => {
                    self.maintain_connection();
                    if !self.flush_pending() {
                        break;
                    }
                }
            }
        }

        debug!("Statsd worker stopped.");
    }

    fn process(&self, command: Command) -> bool {
        match command {
            Command::Send(payload) => {
                self.send(&payload);
                true
            }
            Command::Sync(ack) => {
                let _ = ack.send(());
                true
            }
            Command::Shutdown => false,
        }
    }

    fn maintain_connection(&self) {
        if self.shared.channel.is_connected() {
            return;
        }

        if let Err(e) = self.shared.channel.reconnect() {
            warn!(error = %e, "Failed to reconnect statsd channel.");
            self.shared.report(&StatsdError::Connect(e));
        }
    }

    /// Sends everything queued so far, and then the pending batch.
    ///
    /// Returns `false` if a shutdown command was among the queued commands.
    fn flush_pending(&self) -> bool {
        // Queued batches were filled before the pending one. Pulling them off under the batch lock means no producer can
        // queue another full batch until the pending one has been taken.
        let (queued, pending) = self.shared.take_pending_after(|| self.rx.try_iter().collect::<Vec<_>>());
        let running = queued.into_iter().all(|command| self.process(command));

        if let Some(payload) = pending {
            trace!(payload_len = payload.len(), "Flushing pending batch on interval.");
            self.send(&payload);
        }

        running
    }

    fn send(&self, payload: &[u8]) {
        match self.shared.channel.send(payload) {
            Ok(_) => trace!(payload_len = payload.len(), "Sent payload."),
            Err(e) => {
                error!(error = %e, payload_len = payload.len(), "Failed to send payload.");
                self.shared.report(&StatsdError::Send(e));
            }
        }
    }
}

/// Handle to a running worker thread.
pub(crate) struct WorkerHandle {
    thread: thread::JoinHandle<()>,
    done: Receiver<()>,
}

impl WorkerHandle {
    pub fn new(thread: thread::JoinHandle<()>, done: Receiver<()>) -> Self {
        WorkerHandle { thread, done }
    }

    /// Waits up to `timeout` for the worker to exit.
    ///
    /// If the worker does not exit in time, the thread is detached.
    pub fn join(self, timeout: Duration) {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    error!("Statsd worker panicked.");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "Statsd worker did not stop in time; detaching.");
            }
        }
    }
}
