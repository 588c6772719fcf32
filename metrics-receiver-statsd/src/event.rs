use std::collections::BTreeMap;

use thiserror::Error;

/// Labels attached to an event.
///
/// Keys are unique: when a tag name is repeated in the input, the last value wins.
pub type Labels = BTreeMap<String, String>;

/// Errors that could occur while building an event.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// The metric name was empty.
    #[error("metric name must not be empty")]
    EmptyName,

    /// The stat type is valid StatsD, but has no event representation.
    #[error("no support for StatsD sets")]
    UnsupportedStatType,

    /// The stat type is not a known StatsD stat type.
    #[error("bad stat type {0}")]
    UnknownStatType(String),
}

/// The kind of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A counter increment.
    Counter,

    /// A gauge update.
    Gauge,

    /// A timer observation.
    Timer,
}

/// A counter increment.
#[derive(Clone, Debug, PartialEq)]
pub struct CounterEvent {
    name: String,
    value: f64,
    labels: Labels,
}

impl CounterEvent {
    /// Creates a new `CounterEvent`.
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn new<N: Into<String>>(name: N, value: f64, labels: Labels) -> Result<Self, EventError> {
        Ok(Self { name: validate_name(name)?, value, labels })
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the amount to increment the counter by.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// A gauge update.
///
/// When `relative` is `true`, the value is a delta to apply to the current gauge value rather than the new value
/// itself.
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeEvent {
    name: String,
    value: f64,
    relative: bool,
    labels: Labels,
}

impl GaugeEvent {
    /// Creates a new `GaugeEvent`.
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn new<N: Into<String>>(name: N, value: f64, relative: bool, labels: Labels) -> Result<Self, EventError> {
        Ok(Self { name: validate_name(name)?, value, relative, labels })
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the gauge value, or the delta if this is a relative update.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns `true` if the value is a delta.
    pub fn relative(&self) -> bool {
        self.relative
    }

    /// Returns the labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// A timer observation.
///
/// Timers, histograms, and distributions all collapse into this event.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerEvent {
    name: String,
    value: f64,
    labels: Labels,
}

impl TimerEvent {
    /// Creates a new `TimerEvent`.
    ///
    /// # Errors
    ///
    /// If `name` is empty, an error is returned.
    pub fn new<N: Into<String>>(name: N, value: f64, labels: Labels) -> Result<Self, EventError> {
        Ok(Self { name: validate_name(name)?, value, labels })
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the observed value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

/// A single metric observation.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A counter increment.
    Counter(CounterEvent),

    /// A gauge update.
    Gauge(GaugeEvent),

    /// A timer observation.
    Timer(TimerEvent),
}

impl Event {
    /// Builds an event from a StatsD stat type.
    ///
    /// `c` maps to a counter, `g` to a gauge, and `ms`, `h`, and `d` to a timer. `relative` only applies to gauges.
    ///
    /// # Errors
    ///
    /// Sets (`s`) are not supported and return [`EventError::UnsupportedStatType`]. Any other stat type returns
    /// [`EventError::UnknownStatType`]. An empty name returns [`EventError::EmptyName`].
    pub fn from_stat_type(
        stat_type: &str,
        name: &str,
        value: f64,
        relative: bool,
        labels: Labels,
    ) -> Result<Event, EventError> {
        match stat_type {
            "c" => CounterEvent::new(name, value, labels).map(Event::Counter),
            "g" => GaugeEvent::new(name, value, relative, labels).map(Event::Gauge),
            "ms" | "h" | "d" => TimerEvent::new(name, value, labels).map(Event::Timer),
            "s" => Err(EventError::UnsupportedStatType),
            other => Err(EventError::UnknownStatType(other.to_owned())),
        }
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Counter(_) => EventKind::Counter,
            Event::Gauge(_) => EventKind::Gauge,
            Event::Timer(_) => EventKind::Timer,
        }
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        match self {
            Event::Counter(e) => e.name(),
            Event::Gauge(e) => e.name(),
            Event::Timer(e) => e.name(),
        }
    }

    /// Returns the value.
    pub fn value(&self) -> f64 {
        match self {
            Event::Counter(e) => e.value(),
            Event::Gauge(e) => e.value(),
            Event::Timer(e) => e.value(),
        }
    }

    /// Returns the labels.
    pub fn labels(&self) -> &Labels {
        match self {
            Event::Counter(e) => e.labels(),
            Event::Gauge(e) => e.labels(),
            Event::Timer(e) => e.labels(),
        }
    }
}

fn validate_name<N: Into<String>>(name: N) -> Result<String, EventError> {
    let name = name.into();
    if name.is_empty() {
        return Err(EventError::EmptyName);
    }
    Ok(name)
}
