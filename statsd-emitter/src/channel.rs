use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[cfg(target_os = "linux")]
use std::{os::unix::net::UnixDatagram, path::PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// Transport that carries formatted payloads to the metrics aggregator.
///
/// The client never assumes a specific transport: anything that can report whether it is connected and send a byte
/// payload will do. [`SocketChannel`] is the default implementation, and [`NullChannel`] discards everything.
///
/// `send` is only ever called from the client's background worker, so implementations are free to block for the
/// duration of the write. Returning from `send` signals that the payload has been handed off.
pub trait Channel: Send + Sync + 'static {
    /// Returns `true` if the channel is currently able to send payloads.
    ///
    /// When this returns `false`, the client drops metrics instead of queueing them.
    fn is_connected(&self) -> bool;

    /// Sends a single payload, returning the number of bytes written.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Attempts to re-establish the channel after it has become disconnected.
    ///
    /// Called periodically by the background worker while [`is_connected`][Channel::is_connected] returns `false`.
    fn reconnect(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<C> Channel for Arc<C>
where
    C: Channel + ?Sized,
{
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        (**self).send(payload)
    }

    fn reconnect(&self) -> io::Result<()> {
        (**self).reconnect()
    }
}

impl<C> Channel for Box<C>
where
    C: Channel + ?Sized,
{
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        (**self).send(payload)
    }

    fn reconnect(&self) -> io::Result<()> {
        (**self).reconnect()
    }
}

/// A channel that is always connected and discards every payload.
///
/// Useful for disabling metrics, or for tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullChannel;

impl Channel for NullChannel {
    fn is_connected(&self) -> bool {
        true
    }

    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        Ok(payload.len())
    }
}

/// Remote address of a statsd server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAddr {
    /// UDP, resolved to one or more socket addresses.
    Udp(Vec<SocketAddr>),

    /// Unix domain socket in `SOCK_DGRAM` mode.
    #[cfg(target_os = "linux")]
    Unixgram(PathBuf),
}

impl RemoteAddr {
    /// Returns the transport ID for the remote address, such as `udp` for UDP.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
            #[cfg(target_os = "linux")]
            RemoteAddr::Unixgram(_) => "uds",
        }
    }
}

impl Default for RemoteAddr {
    fn default() -> Self {
        RemoteAddr::Udp(vec![SocketAddr::from(([127, 0, 0, 1], 8125))])
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        if let Some((scheme, path)) = addr.split_once("://") {
            return match scheme {
                #[cfg(target_os = "linux")]
                "unixgram" => Ok(RemoteAddr::Unixgram(PathBuf::from(path))),
                "udp" => Self::try_from(path),
                _ => Err(format!("invalid scheme '{}' (expected 'udp' or 'unixgram')", scheme)),
            };
        }

        match addr.to_socket_addrs() {
            Ok(addrs) => {
                let addrs = addrs.collect::<Vec<_>>();
                if addrs.is_empty() {
                    Err(format!("'{}' did not resolve to any addresses", addr))
                } else {
                    Ok(RemoteAddr::Udp(addrs))
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

enum Client {
    Udp(UdpSocket),

    #[cfg(target_os = "linux")]
    Unixgram(UnixDatagram),
}

impl Client {
    fn connect(remote_addr: &RemoteAddr, write_timeout: Duration) -> io::Result<Self> {
        match remote_addr {
            RemoteAddr::Udp(addrs) => {
                // Bind to the same address family as the first target, otherwise `connect` fails outright.
                let local_addr = match addrs.first() {
                    Some(SocketAddr::V6(_)) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
                    _ => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
                };

                UdpSocket::bind(local_addr).and_then(|socket| {
                    socket.connect(&addrs[..])?;
                    socket.set_write_timeout(Some(write_timeout))?;
                    Ok(Client::Udp(socket))
                })
            }

            #[cfg(target_os = "linux")]
            RemoteAddr::Unixgram(path) => UnixDatagram::unbound().and_then(|socket| {
                socket.connect(path)?;
                socket.set_write_timeout(Some(write_timeout))?;
                Ok(Client::Unixgram(socket))
            }),
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Client::Udp(socket) => socket.send(buf),

            #[cfg(target_os = "linux")]
            Client::Unixgram(socket) => socket.send(buf),
        }
    }
}

enum ClientState {
    Disconnected,
    Ready(Client),
}

impl ClientState {
    fn is_ready(&self) -> bool {
        matches!(self, ClientState::Ready(_))
    }

    fn try_send(
        &mut self,
        remote_addr: &RemoteAddr,
        write_timeout: Duration,
        payload: &[u8],
    ) -> io::Result<usize> {
        if let ClientState::Disconnected = self {
            *self = ClientState::Ready(Client::connect(remote_addr, write_timeout)?);
        }

        let result = match self {
            ClientState::Ready(client) => client.send(payload),
            ClientState::Disconnected => unreachable!("client state should be ready after connecting"),
        };

        if result.is_err() {
            *self = ClientState::Disconnected;
        }

        result
    }
}

/// A channel backed by a datagram socket: UDP, or a Unix domain socket on Linux.
///
/// The socket is connected eagerly when the channel is created. If a send fails, the channel marks itself as
/// disconnected until the background worker successfully reconnects it.
pub struct SocketChannel {
    remote_addr: RemoteAddr,
    write_timeout: Duration,
    state: Mutex<ClientState>,
    connected: AtomicBool,
}

impl SocketChannel {
    /// Creates a new `SocketChannel` connected to the given remote address.
    ///
    /// # Errors
    ///
    /// If the socket cannot be created or connected, an error is returned.
    pub fn connect(remote_addr: RemoteAddr, write_timeout: Duration) -> io::Result<Self> {
        let client = Client::connect(&remote_addr, write_timeout)?;
        debug!(transport = remote_addr.transport_id(), "Connected statsd channel.");

        Ok(Self {
            remote_addr,
            write_timeout,
            state: Mutex::new(ClientState::Ready(client)),
            connected: AtomicBool::new(true),
        })
    }

    /// Returns the remote address this channel sends to.
    pub fn remote_addr(&self) -> &RemoteAddr {
        &self.remote_addr
    }
}

impl Channel for SocketChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let result = state.try_send(&self.remote_addr, self.write_timeout, payload);
        self.connected.store(state.is_ready(), Ordering::Release);
        result
    }

    fn reconnect(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if !state.is_ready() {
            *state = ClientState::Ready(Client::connect(&self.remote_addr, self.write_timeout)?);
            debug!(transport = self.remote_addr.transport_id(), "Reconnected statsd channel.");
        }

        self.connected.store(true, Ordering::Release);
        Ok(())
    }
}
