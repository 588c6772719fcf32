use std::{io, net::SocketAddr, sync::Arc};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _},
    net::{self, TcpStream},
};
use tracing::{debug, error, trace};

use crate::{
    protobuf::{decode_message, message_to_event, TranslateError},
    sink::EventSink,
    telemetry::{SampleErrorReason, Telemetry},
};

use super::{CloseHandle, CloseSignal, ListenError, Transport};

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("failed to read from connection: {0}")]
    Read(#[source] io::Error),

    #[error("message exceeds the maximum length of {limit} bytes")]
    TooLong { limit: usize },

    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to translate message: {0}")]
    Translate(#[from] TranslateError),
}

/// State shared by every connection handler of a listener.
struct ConnectionContext {
    sink: Arc<dyn EventSink>,
    telemetry: Telemetry,
    max_message_len: usize,
}

impl ConnectionContext {
    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        self.telemetry.track_tcp_connection();

        match self.process(&mut stream).await {
            Ok(()) => trace!(%peer, "Processed TCP message."),
            Err(e) => {
                self.track_failure(&e);
                debug!(%peer, error = %e, "Dropping TCP message.");
            }
        }

        // `stream` is dropped here, closing the connection on every path.
    }

    async fn process(&self, stream: &mut TcpStream) -> Result<(), ConnectionError> {
        let buf = read_message(stream, self.max_message_len).await?;
        let message = decode_message(&buf)?;

        self.telemetry.track_line();
        if !message.tags.is_empty() {
            self.telemetry.track_tags();
        }

        let event = message_to_event(&message)?;
        self.sink.queue(vec![event]);
        Ok(())
    }

    fn track_failure(&self, error: &ConnectionError) {
        match error {
            ConnectionError::Read(_) => self.telemetry.track_tcp_error(),
            ConnectionError::TooLong { .. } => self.telemetry.track_tcp_line_too_long(),
            ConnectionError::Decode(_) => self.telemetry.track_sample_error(SampleErrorReason::MalformedMessage),
            ConnectionError::Translate(e) => self.telemetry.track_sample_error(e.reason()),
        }
    }
}

/// Reads until the peer closes its side, or until more than `max_len` bytes have arrived.
async fn read_message<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take((max_len as u64).saturating_add(1))
        .read_to_end(&mut buf)
        .await
        .map_err(ConnectionError::Read)?;

    if buf.len() > max_len {
        return Err(ConnectionError::TooLong { limit: max_len });
    }
    Ok(buf)
}

/// A listener for binary metric messages over TCP.
///
/// Every accepted connection is handled by its own task and carries exactly one message: the handler reads until the
/// peer closes the connection, decodes the whole buffer, and queues the resulting event, if any. The accept loop never
/// waits on connection handlers, and there is no limit on how many run at once.
pub struct TcpListener {
    listener: net::TcpListener,
    sink: Arc<dyn EventSink>,
    telemetry: Telemetry,
    close: CloseSignal,
    max_message_len: usize,
}

impl TcpListener {
    pub(crate) fn new(
        listener: net::TcpListener,
        sink: Arc<dyn EventSink>,
        telemetry: Telemetry,
        max_message_len: usize,
    ) -> Self {
        Self { listener, sink, telemetry, close: CloseSignal::new(), max_message_len }
    }

    /// Returns the local address the listener is bound to.
    ///
    /// # Errors
    ///
    /// If the address cannot be read from the socket, an error is returned.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Replaces the sink that events are queued to.
    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Returns a handle that can be used to close this listener.
    ///
    /// Closing stops accepting new connections. Connections that were already accepted are left to finish.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.handle()
    }

    /// Accepts connections until the listener is closed or accepting fails.
    ///
    /// # Errors
    ///
    /// If accepting fails, the error is logged and returned.
    pub async fn listen(self) -> Result<(), ListenError> {
        let TcpListener { listener, sink, telemetry, mut close, max_message_len } = self;
        let context = Arc::new(ConnectionContext { sink, telemetry, max_message_len });

        loop {
            let result = tokio::select! {
                biased;

                () = close.closed() => {
                    debug!(transport = %Transport::Tcp, "Listener closed.");
                    return Ok(());
                }
                result = listener.accept() => result,
            };

            match result {
                Ok((stream, peer)) => {
                    trace!(%peer, "Accepted TCP connection.");
                    let context = Arc::clone(&context);
                    tokio::spawn(async move { context.handle_connection(stream, peer).await });
                }
                Err(e) => {
                    error!(transport = %Transport::Tcp, error = %e, "Failed to accept TCP connection.");
                    return Err(ListenError::Accept(e));
                }
            }
        }
    }
}
