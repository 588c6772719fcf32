use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::{event::Event, telemetry::Telemetry};

/// A destination for events produced by the listeners.
///
/// Sinks are shared between a listener and all of its connection handlers, so `queue` may be called concurrently and
/// must not block for longer than it takes to enqueue the batch.
pub trait EventSink: Send + Sync {
    /// Queues a batch of events for downstream processing.
    fn queue(&self, events: Vec<Event>);
}

/// An event sink backed by a channel.
///
/// Each non-empty batch is sent as a single channel message. When the channel is bounded and full, or the receiver
/// has gone away, the batch is dropped rather than blocking the listener.
pub struct ChannelSink {
    tx: Sender<Vec<Event>>,
    telemetry: Telemetry,
}

impl ChannelSink {
    /// Creates a `ChannelSink` that holds at most `capacity` batches, along with the receiving end.
    pub fn bounded(capacity: usize, telemetry: Telemetry) -> (ChannelSink, Receiver<Vec<Event>>) {
        let (tx, rx) = bounded(capacity);
        (ChannelSink { tx, telemetry }, rx)
    }

    /// Creates a `ChannelSink` with no limit on buffered batches, along with the receiving end.
    ///
    /// If the receiver falls behind, buffered batches will grow without bound.
    pub fn unbounded(telemetry: Telemetry) -> (ChannelSink, Receiver<Vec<Event>>) {
        let (tx, rx) = unbounded();
        (ChannelSink { tx, telemetry }, rx)
    }
}

impl EventSink for ChannelSink {
    fn queue(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let count = events.len();
        match self.tx.try_send(events) {
            Ok(()) => self.telemetry.track_events_flushed(count),
            Err(TrySendError::Full(_)) => {
                warn!(count, "Event channel full. Dropping events.");
                self.telemetry.track_events_dropped(count);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(count, "Event channel disconnected. Dropping events.");
                self.telemetry.track_events_dropped(count);
            }
        }
    }
}
