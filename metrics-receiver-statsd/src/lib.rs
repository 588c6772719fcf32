//! Listeners for ingesting [StatsD][statsd] metrics over UDP, TCP, and Unix datagram sockets.
//!
//! [statsd]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md
//!
//! Every listener turns what it receives into canonical [`Event`]s (counters, gauges, and timers, each with a name,
//! a value, and a set of labels) and hands them to an [`EventSink`] for downstream processing.
//!
//! # Usage
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use metrics_receiver_statsd::{ChannelSink, ListenerBuilder, Telemetry};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // Sockets are bound by the caller, so any socket options can be applied beforehand.
//! let socket = std::net::UdpSocket::bind("127.0.0.1:9125").expect("failed to bind UDP socket");
//!
//! // A channel-backed sink, with the other end being drained by some downstream consumer.
//! let (sink, events) = ChannelSink::unbounded(Telemetry::new());
//!
//! let listener = ListenerBuilder::default()
//!     .build_udp(socket, Arc::new(sink))
//!     .expect("failed to build listener");
//!
//! // Closing the listener from another task makes `listen` return `Ok(())`.
//! let close = listener.close_handle();
//! # close.close();
//! listener.listen().await.expect("listener failed");
//! # drop(events);
//! # }
//! ```
//!
//! # Transports
//!
//! ## UDP and Unix datagrams
//!
//! Each datagram holds one or more newline-delimited StatsD lines, optionally carrying DogStatsD-style `|#key:value`
//! tags. Lines are parsed by a [`LineParser`], [`StatsdLineParser`] by default, and all events from a single datagram
//! are queued as one batch.
//!
//! ## TCP
//!
//! Each connection carries exactly one protobuf-encoded [`TraceMetric`] message and is closed by the receiver once the
//! message has been handled. Connections are handled concurrently, each on its own task.
//!
//! # Telemetry
//!
//! Listeners report on their own operation through the `metrics` facade: packets and lines received, samples and tags
//! parsed, rejected samples by reason, and TCP connection handling. All internal telemetry is prefixed with
//! `statsd_receiver_`. See [`Telemetry`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, ListenerBuilder};

mod event;
pub use self::event::{CounterEvent, Event, EventError, EventKind, GaugeEvent, Labels, TimerEvent};

mod line;
pub use self::line::{LineParser, StatsdLineParser};

mod listener;
#[cfg(unix)]
pub use self::listener::UnixgramListener;
pub use self::listener::{CloseHandle, ListenError, Listener, TcpListener, Transport, UdpListener};

pub mod protobuf;
pub use self::protobuf::{Tag, TraceMetric};

mod sink;
pub use self::sink::{ChannelSink, EventSink};

mod telemetry;
pub use self::telemetry::{SampleErrorReason, Telemetry};
