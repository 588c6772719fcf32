use std::{fmt, io, sync::Arc};

use thiserror::Error;
use tokio::sync::watch;
use tracing::trace;

use crate::{line::LineParser, sink::EventSink, telemetry::Telemetry};

mod tcp;
pub use self::tcp::TcpListener;

mod udp;
pub use self::udp::UdpListener;

#[cfg(unix)]
mod unixgram;
#[cfg(unix)]
pub use self::unixgram::UnixgramListener;

/// The transport a listener receives metrics over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// UDP datagrams carrying StatsD lines.
    Udp,

    /// TCP connections each carrying one binary message.
    Tcp,

    /// Unix domain datagrams carrying StatsD lines.
    Unixgram,
}

impl Transport {
    /// Returns the transport ID.
    ///
    /// This is a short identifier for the transport, such as `udp` for UDP, used in logs and telemetry labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
            Transport::Unixgram => "unixgram",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that stop a listener.
///
/// Closing a listener through its [`CloseHandle`] is not an error: `listen` returns `Ok(())` in that case.
#[derive(Debug, Error)]
pub enum ListenError {
    /// Receiving a datagram failed.
    #[error("failed to receive datagram on {transport} listener: {source}")]
    Receive {
        /// Transport of the failed listener.
        transport: Transport,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("failed to accept TCP connection: {0}")]
    Accept(#[source] io::Error),
}

/// Closes a listener from outside of its serve loop.
///
/// Closing is the only way to stop a running listener. Any blocked receive or accept returns immediately and
/// `listen` returns `Ok(())`. TCP connections that were already accepted are not interrupted and run to completion.
///
/// Handles are cheap to clone, and closing more than once has no further effect.
#[derive(Clone, Debug)]
pub struct CloseHandle {
    state: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Closes the listener.
    pub fn close(&self) {
        self.state.send_replace(true);
    }

    /// Returns `true` if the listener has been closed.
    pub fn is_closed(&self) -> bool {
        *self.state.borrow()
    }
}

pub(crate) struct CloseSignal {
    handle: CloseHandle,
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { handle: CloseHandle { state: Arc::new(tx) }, rx }
    }

    pub(crate) fn handle(&self) -> CloseHandle {
        self.handle.clone()
    }

    /// Waits until the listener is closed.
    ///
    /// The sender lives as long as `self`, so this only completes once `close` has been called.
    pub(crate) async fn closed(&mut self) {
        let _ = self.rx.wait_for(|closed| *closed).await;
    }
}

/// Turns datagrams of newline-delimited StatsD lines into events.
///
/// Shared by the UDP and Unix datagram listeners.
pub(crate) struct DatagramHandler {
    transport: Transport,
    parser: Arc<dyn LineParser>,
    sink: Arc<dyn EventSink>,
    telemetry: Telemetry,
}

impl DatagramHandler {
    pub(crate) fn new(
        transport: Transport,
        parser: Arc<dyn LineParser>,
        sink: Arc<dyn EventSink>,
        telemetry: Telemetry,
    ) -> Self {
        Self { transport, parser, sink, telemetry }
    }

    pub(crate) fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Parses every line in `packet` and queues the resulting events as a single batch.
    ///
    /// A trailing newline produces a final empty line, which is counted like any other line but yields no events.
    pub(crate) fn handle_packet(&self, packet: &[u8]) {
        self.telemetry.track_packet(self.transport);

        let payload = String::from_utf8_lossy(packet);
        let mut events = Vec::new();
        for line in payload.split('\n') {
            self.telemetry.track_line();
            events.extend(self.parser.parse_line(line, &self.telemetry));
        }

        trace!(transport = %self.transport, len = packet.len(), events = events.len(), "Handled datagram.");
        self.sink.queue(events);
    }
}

/// A listener for one of the supported transports.
pub enum Listener {
    /// UDP listener.
    Udp(UdpListener),

    /// TCP listener.
    Tcp(TcpListener),

    /// Unix domain datagram listener.
    #[cfg(unix)]
    Unixgram(UnixgramListener),
}

impl Listener {
    /// Returns the transport this listener receives metrics over.
    pub fn transport(&self) -> Transport {
        match self {
            Listener::Udp(_) => Transport::Udp,
            Listener::Tcp(_) => Transport::Tcp,
            #[cfg(unix)]
            Listener::Unixgram(_) => Transport::Unixgram,
        }
    }

    /// Replaces the sink that events are queued to.
    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        match self {
            Listener::Udp(l) => l.set_event_sink(sink),
            Listener::Tcp(l) => l.set_event_sink(sink),
            #[cfg(unix)]
            Listener::Unixgram(l) => l.set_event_sink(sink),
        }
    }

    /// Returns a handle that can be used to close this listener.
    pub fn close_handle(&self) -> CloseHandle {
        match self {
            Listener::Udp(l) => l.close_handle(),
            Listener::Tcp(l) => l.close_handle(),
            #[cfg(unix)]
            Listener::Unixgram(l) => l.close_handle(),
        }
    }

    /// Runs the listener until it is closed or fails.
    ///
    /// # Errors
    ///
    /// If receiving or accepting fails for any reason other than the listener being closed, the error is logged and
    /// returned. The listener is consumed either way.
    pub async fn listen(self) -> Result<(), ListenError> {
        match self {
            Listener::Udp(l) => l.listen().await,
            Listener::Tcp(l) => l.listen().await,
            #[cfg(unix)]
            Listener::Unixgram(l) => l.listen().await,
        }
    }
}

impl From<UdpListener> for Listener {
    fn from(listener: UdpListener) -> Self {
        Listener::Udp(listener)
    }
}

impl From<TcpListener> for Listener {
    fn from(listener: TcpListener) -> Self {
        Listener::Tcp(listener)
    }
}

#[cfg(unix)]
impl From<UnixgramListener> for Listener {
    fn from(listener: UnixgramListener) -> Self {
        Listener::Unixgram(listener)
    }
}
