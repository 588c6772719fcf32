use std::{io, net::SocketAddr, sync::Arc};

use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

use crate::sink::EventSink;

use super::{CloseHandle, CloseSignal, DatagramHandler, ListenError, Transport};

/// A listener for StatsD lines over UDP.
///
/// Each datagram is fully parsed and queued before the next one is received, so a slow sink applies backpressure by
/// leaving datagrams in the socket's receive buffer.
pub struct UdpListener {
    socket: UdpSocket,
    handler: DatagramHandler,
    close: CloseSignal,
    max_datagram_len: usize,
}

impl UdpListener {
    pub(crate) fn new(socket: UdpSocket, handler: DatagramHandler, max_datagram_len: usize) -> Self {
        Self { socket, handler, close: CloseSignal::new(), max_datagram_len }
    }

    /// Returns the local address the socket is bound to.
    ///
    /// # Errors
    ///
    /// If the address cannot be read from the socket, an error is returned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Replaces the sink that events are queued to.
    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.handler.set_sink(sink);
    }

    /// Returns a handle that can be used to close this listener.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.handle()
    }

    /// Receives datagrams until the listener is closed or receiving fails.
    ///
    /// # Errors
    ///
    /// If receiving fails, the error is logged and returned.
    pub async fn listen(mut self) -> Result<(), ListenError> {
        let mut buf = vec![0; self.max_datagram_len];
        loop {
            let result = tokio::select! {
                biased;

                () = self.close.closed() => {
                    debug!(transport = %Transport::Udp, "Listener closed.");
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result,
            };

            match result {
                Ok((len, peer)) => {
                    trace!(%peer, len, "Received datagram.");
                    self.handler.handle_packet(&buf[..len]);
                }
                Err(e) => {
                    error!(transport = %Transport::Udp, error = %e, "Failed to receive datagram.");
                    return Err(ListenError::Receive { transport: Transport::Udp, source: e });
                }
            }
        }
    }
}
