use std::{io, net, sync::Arc};

use thiserror::Error;

use crate::{
    line::{LineParser, StatsdLineParser},
    listener::{DatagramHandler, Listener, TcpListener, Transport, UdpListener},
    sink::EventSink,
    telemetry::Telemetry,
};

#[cfg(unix)]
use crate::listener::UnixgramListener;

const DEFAULT_MAX_DATAGRAM_LEN: usize = 65535;
const DEFAULT_MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Errors that could occur while building a listener.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A maximum length was set to zero.
    #[error("maximum {kind} length must be greater than zero")]
    InvalidMaximumLength {
        /// Which length was invalid: `datagram` or `message`.
        kind: &'static str,
    },

    /// The listener was not built from within a Tokio runtime.
    #[error("listeners must be built from within a Tokio runtime")]
    NoRuntime,

    /// The socket could not be prepared for use by the listener.
    #[error("failed to register socket with the runtime: {0}")]
    Io(#[from] io::Error),
}

/// Builder for StatsD listeners.
///
/// The builder doesn't bind sockets itself. Callers bind a standard library socket however they see fit (address,
/// socket options, file permissions for Unix sockets, and so on) and hand it over, along with the sink that events
/// should be queued to. The socket is switched to non-blocking mode and registered with the current Tokio runtime.
///
/// A single builder can build any number of listeners. Listeners built from the same builder share its line parser
/// and telemetry.
pub struct ListenerBuilder {
    max_datagram_len: usize,
    max_message_len: usize,
    parser: Arc<dyn LineParser>,
    telemetry: Option<Telemetry>,
}

impl ListenerBuilder {
    /// Creates a new `ListenerBuilder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum datagram length for the UDP and Unix datagram listeners.
    ///
    /// Datagrams longer than this are truncated by the operating system before they are parsed.
    ///
    /// Defaults to 65535 bytes.
    #[must_use]
    pub fn with_max_datagram_length(mut self, max_datagram_len: usize) -> Self {
        self.max_datagram_len = max_datagram_len;
        self
    }

    /// Sets the maximum message length for the TCP listener.
    ///
    /// Connections that send more than this many bytes are closed and their message discarded.
    ///
    /// Defaults to 1 MiB.
    #[must_use]
    pub fn with_max_message_length(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    /// Sets the line parser used by the UDP and Unix datagram listeners.
    ///
    /// Defaults to [`StatsdLineParser`].
    #[must_use]
    pub fn with_line_parser<P>(mut self, parser: P) -> Self
    where
        P: LineParser + 'static,
    {
        self.parser = Arc::new(parser);
        self
    }

    /// Sets the telemetry that listeners report into.
    ///
    /// When not set, a [`Telemetry`] instance is created the first time a listener is built, registered against the
    /// recorder that is active at that point.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds a UDP listener from an already-bound socket.
    ///
    /// # Errors
    ///
    /// If the maximum datagram length is zero, if this is not called from within a Tokio runtime, or if the socket
    /// cannot be registered with the runtime, an error will be returned.
    pub fn build_udp(&mut self, socket: net::UdpSocket, sink: Arc<dyn EventSink>) -> Result<Listener, BuildError> {
        let max_datagram_len = self.datagram_len()?;
        ensure_runtime()?;

        socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(socket)?;

        let handler = self.datagram_handler(Transport::Udp, sink);
        Ok(UdpListener::new(socket, handler, max_datagram_len).into())
    }

    /// Builds a TCP listener from an already-bound listening socket.
    ///
    /// # Errors
    ///
    /// If the maximum message length is zero, if this is not called from within a Tokio runtime, or if the socket
    /// cannot be registered with the runtime, an error will be returned.
    pub fn build_tcp(&mut self, listener: net::TcpListener, sink: Arc<dyn EventSink>) -> Result<Listener, BuildError> {
        if self.max_message_len == 0 {
            return Err(BuildError::InvalidMaximumLength { kind: "message" });
        }
        ensure_runtime()?;

        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;

        Ok(TcpListener::new(listener, sink, self.telemetry(), self.max_message_len).into())
    }

    /// Builds a Unix datagram listener from an already-bound socket.
    ///
    /// # Errors
    ///
    /// If the maximum datagram length is zero, if this is not called from within a Tokio runtime, or if the socket
    /// cannot be registered with the runtime, an error will be returned.
    #[cfg(unix)]
    #[cfg_attr(docsrs, doc(cfg(unix)))]
    pub fn build_unixgram(
        &mut self,
        socket: std::os::unix::net::UnixDatagram,
        sink: Arc<dyn EventSink>,
    ) -> Result<Listener, BuildError> {
        let max_datagram_len = self.datagram_len()?;
        ensure_runtime()?;

        socket.set_nonblocking(true)?;
        let socket = tokio::net::UnixDatagram::from_std(socket)?;

        let handler = self.datagram_handler(Transport::Unixgram, sink);
        Ok(UnixgramListener::new(socket, handler, max_datagram_len).into())
    }

    fn datagram_len(&self) -> Result<usize, BuildError> {
        if self.max_datagram_len == 0 {
            return Err(BuildError::InvalidMaximumLength { kind: "datagram" });
        }
        Ok(self.max_datagram_len)
    }

    fn datagram_handler(&mut self, transport: Transport, sink: Arc<dyn EventSink>) -> DatagramHandler {
        DatagramHandler::new(transport, Arc::clone(&self.parser), sink, self.telemetry())
    }

    fn telemetry(&mut self) -> Telemetry {
        self.telemetry.get_or_insert_with(Telemetry::new).clone()
    }
}

impl Default for ListenerBuilder {
    fn default() -> Self {
        ListenerBuilder {
            max_datagram_len: DEFAULT_MAX_DATAGRAM_LEN,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            parser: Arc::new(StatsdLineParser::new()),
            telemetry: None,
        }
    }
}

fn ensure_runtime() -> Result<(), BuildError> {
    tokio::runtime::Handle::try_current().map(|_| ()).map_err(|_| BuildError::NoRuntime)
}
