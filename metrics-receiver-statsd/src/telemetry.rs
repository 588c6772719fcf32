use metrics::{counter, Counter};

use crate::listener::Transport;

/// The cause of a sample being rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleErrorReason {
    /// The line had no `:` separator or an empty metric name.
    MalformedLine,

    /// A sample had the wrong number of `|`-separated components, or a component was not recognized.
    MalformedComponent,

    /// The sample value was not a valid number.
    MalformedValue,

    /// The sample rate was not a valid number.
    InvalidSampleFactor,

    /// The stat type is valid StatsD, but is not supported.
    UnsupportedType,

    /// The stat type is not known.
    UnknownType,

    /// A binary message could not be decoded.
    MalformedMessage,

    /// A binary message was missing a required field.
    MissingField,
}

impl SampleErrorReason {
    const ALL: [SampleErrorReason; 8] = [
        SampleErrorReason::MalformedLine,
        SampleErrorReason::MalformedComponent,
        SampleErrorReason::MalformedValue,
        SampleErrorReason::InvalidSampleFactor,
        SampleErrorReason::UnsupportedType,
        SampleErrorReason::UnknownType,
        SampleErrorReason::MalformedMessage,
        SampleErrorReason::MissingField,
    ];

    /// Returns the value used for the `reason` label.
    pub const fn as_str(self) -> &'static str {
        match self {
            SampleErrorReason::MalformedLine => "malformed_line",
            SampleErrorReason::MalformedComponent => "malformed_component",
            SampleErrorReason::MalformedValue => "malformed_value",
            SampleErrorReason::InvalidSampleFactor => "invalid_sample_factor",
            SampleErrorReason::UnsupportedType => "unsupported_type",
            SampleErrorReason::UnknownType => "unknown_type",
            SampleErrorReason::MalformedMessage => "malformed_message",
            SampleErrorReason::MissingField => "missing_field",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Receiver telemetry.
///
/// `Telemetry` holds the counters describing the ingestion process itself: packets and lines received, samples and
/// tags parsed, errors by cause, and TCP connection handling. A single instance is created up front and cloned into
/// every listener, parser, and sink, so all of them report into the same counters.
///
/// Counters are registered against the recorder that is active when [`Telemetry::new`] is called.
#[derive(Clone)]
pub struct Telemetry {
    udp_packets: Counter,
    unixgram_packets: Counter,
    lines: Counter,
    events_flushed: Counter,
    events_dropped: Counter,
    sample_errors: [Counter; SampleErrorReason::ALL.len()],
    samples: Counter,
    tag_errors: Counter,
    tags: Counter,
    tcp_connections: Counter,
    tcp_errors: Counter,
    tcp_line_too_long: Counter,
}

impl Telemetry {
    /// Creates a `Telemetry` instance.
    pub fn new() -> Self {
        Self {
            udp_packets: counter!("statsd_receiver_packets_total", "transport" => Transport::Udp.as_str()),
            unixgram_packets: counter!("statsd_receiver_packets_total", "transport" => Transport::Unixgram.as_str()),
            lines: counter!("statsd_receiver_lines_total"),
            events_flushed: counter!("statsd_receiver_events_flushed_total"),
            events_dropped: counter!("statsd_receiver_events_dropped_total"),
            sample_errors: SampleErrorReason::ALL
                .map(|reason| counter!("statsd_receiver_sample_errors_total", "reason" => reason.as_str())),
            samples: counter!("statsd_receiver_samples_total"),
            tag_errors: counter!("statsd_receiver_tag_errors_total"),
            tags: counter!("statsd_receiver_tags_total"),
            tcp_connections: counter!("statsd_receiver_tcp_connections_total"),
            tcp_errors: counter!("statsd_receiver_tcp_connection_errors_total"),
            tcp_line_too_long: counter!("statsd_receiver_tcp_too_long_lines_total"),
        }
    }

    /// Tracks a datagram received on the given transport.
    ///
    /// TCP has no packets: connections are tracked with [`Telemetry::track_tcp_connection`] instead.
    pub fn track_packet(&self, transport: Transport) {
        match transport {
            Transport::Udp => self.udp_packets.increment(1),
            Transport::Unixgram => self.unixgram_packets.increment(1),
            Transport::Tcp => {}
        }
    }

    /// Tracks a line (or binary message) received.
    pub fn track_line(&self) {
        self.lines.increment(1);
    }

    /// Tracks events handed off downstream.
    pub fn track_events_flushed(&self, count: usize) {
        self.events_flushed.increment(count as u64);
    }

    /// Tracks events dropped because the downstream could not accept them.
    pub fn track_events_dropped(&self, count: usize) {
        self.events_dropped.increment(count as u64);
    }

    /// Tracks a rejected sample.
    pub fn track_sample_error(&self, reason: SampleErrorReason) {
        self.sample_errors[reason.index()].increment(1);
    }

    /// Tracks a sample parsed.
    pub fn track_sample(&self) {
        self.samples.increment(1);
    }

    /// Tracks a malformed tag.
    pub fn track_tag_error(&self) {
        self.tag_errors.increment(1);
    }

    /// Tracks a sample carrying a tag section.
    pub fn track_tags(&self) {
        self.tags.increment(1);
    }

    /// Tracks an accepted TCP connection.
    pub fn track_tcp_connection(&self) {
        self.tcp_connections.increment(1);
    }

    /// Tracks a TCP connection that failed while being read.
    pub fn track_tcp_error(&self) {
        self.tcp_errors.increment(1);
    }

    /// Tracks a TCP message that exceeded the maximum message length.
    pub fn track_tcp_line_too_long(&self) {
        self.tcp_line_too_long.increment(1);
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Telemetry::new()
    }
}
