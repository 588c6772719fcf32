//! Binary metric messages carried over TCP.
//!
//! Each TCP connection carries exactly one [`TraceMetric`], encoded with Protocol Buffers and delimited only by the
//! sender closing the connection.
//!
//! .proto:
//! ```protobuf
//! syntax = "proto2";
//!
//! message TraceMetric {
//!   optional string type  = 1;
//!   optional string name  = 2;
//!   optional double value = 3;
//!   repeated Tag    tags  = 4;
//! }
//!
//! message Tag {
//!   optional string name  = 1;
//!   optional string value = 2;
//! }
//! ```
use prost::Message as _;
use thiserror::Error;

use crate::{
    event::{Event, EventError, Labels},
    line::event_error_reason,
    telemetry::SampleErrorReason,
};

/// A single metric observation.
#[derive(prost::Message, Clone, PartialEq)]
pub struct TraceMetric {
    /// StatsD stat type: `c`, `g`, `ms`, `h`, `d`, or `s`.
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
    /// Metric name.
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    /// Metric value.
    #[prost(double, optional, tag = "3")]
    pub value: Option<f64>,
    /// Tags, in the order they were sent.
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<Tag>,
}

/// A name/value tag.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Tag {
    /// Tag name.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Tag value.
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// Errors that could occur while translating a [`TraceMetric`] into an [`Event`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// A required field was not present in the message.
    #[error("message is missing the `{0}` field")]
    MissingField(&'static str),

    /// The message fields did not form a valid event.
    #[error(transparent)]
    Event(#[from] EventError),
}

impl TranslateError {
    /// Returns the sample error reason this error is counted under.
    pub fn reason(&self) -> SampleErrorReason {
        match self {
            TranslateError::MissingField(_) => SampleErrorReason::MissingField,
            TranslateError::Event(e) => event_error_reason(e),
        }
    }
}

/// Decodes a single `TraceMetric` from `buf`.
///
/// The whole buffer is consumed as one message.
///
/// # Errors
///
/// If the buffer is not a valid encoding of `TraceMetric`, an error is returned.
pub fn decode_message(buf: &[u8]) -> Result<TraceMetric, prost::DecodeError> {
    TraceMetric::decode(buf)
}

/// Translates a decoded `TraceMetric` into an event.
///
/// Tags are flattened into the event labels, with later tags overriding earlier ones of the same name. Tags without a
/// name are ignored, and tags without a value get an empty value. Gauges are always absolute: unlike the text
/// protocol, the binary protocol has no way to express a relative gauge.
///
/// # Errors
///
/// If the type, name, or value is missing, or they cannot be turned into an event (sets, unknown stat types, or an
/// empty name), an error is returned.
pub fn message_to_event(metric: &TraceMetric) -> Result<Event, TranslateError> {
    let stat_type = metric.r#type.as_deref().ok_or(TranslateError::MissingField("type"))?;
    let name = metric.name.as_deref().ok_or(TranslateError::MissingField("name"))?;
    let value = metric.value.ok_or(TranslateError::MissingField("value"))?;

    let labels = metric
        .tags
        .iter()
        .filter_map(|tag| {
            let name = tag.name.clone()?;
            Some((name, tag.value.clone().unwrap_or_default()))
        })
        .collect::<Labels>();

    Event::from_stat_type(stat_type, name, value, false, labels).map_err(TranslateError::from)
}

#[cfg(test)]
mod tests {
    use prost::Message as _;

    use super::*;
    use crate::event::{CounterEvent, GaugeEvent, TimerEvent};

    fn metric(stat_type: &str, name: &str, value: f64, tags: &[(&str, &str)]) -> TraceMetric {
        TraceMetric {
            r#type: Some(stat_type.to_owned()),
            name: Some(name.to_owned()),
            value: Some(value),
            tags: tags
                .iter()
                .map(|(k, v)| Tag { name: Some((*k).to_owned()), value: Some((*v).to_owned()) })
                .collect(),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn counter_with_tags() {
        let encoded = metric("c", "requests", 5.0, &[("env", "prod")]).encode_to_vec();
        let decoded = decode_message(&encoded).unwrap();

        assert_eq!(
            message_to_event(&decoded),
            Ok(Event::Counter(CounterEvent::new("requests", 5.0, labels(&[("env", "prod")])).unwrap()))
        );
    }

    #[test]
    fn gauges_are_never_relative() {
        assert_eq!(
            message_to_event(&metric("g", "temperature", -3.0, &[])),
            Ok(Event::Gauge(GaugeEvent::new("temperature", -3.0, false, Labels::new()).unwrap()))
        );
    }

    #[test]
    fn timer_types_collapse() {
        for stat_type in ["ms", "h", "d"] {
            assert_eq!(
                message_to_event(&metric(stat_type, "latency", 12.0, &[])),
                Ok(Event::Timer(TimerEvent::new("latency", 12.0, Labels::new()).unwrap())),
                "stat type {}",
                stat_type
            );
        }
    }

    #[test]
    fn sets_are_unsupported() {
        let result = message_to_event(&metric("s", "users", 1.0, &[]));
        assert_eq!(result, Err(TranslateError::Event(EventError::UnsupportedStatType)));
        assert_eq!(result.unwrap_err().reason(), SampleErrorReason::UnsupportedType);
    }

    #[test]
    fn unknown_types() {
        let result = message_to_event(&metric("zz", "users", 1.0, &[]));
        assert_eq!(result, Err(TranslateError::Event(EventError::UnknownStatType("zz".to_owned()))));
        assert_eq!(result.unwrap_err().reason(), SampleErrorReason::UnknownType);
    }

    #[test]
    fn duplicate_tags_last_wins() {
        let event = message_to_event(&metric("c", "requests", 1.0, &[("env", "dev"), ("az", "a"), ("env", "prod")]))
            .unwrap();
        assert_eq!(event.labels(), &labels(&[("az", "a"), ("env", "prod")]));
    }

    #[test]
    fn incomplete_tags() {
        let mut message = metric("c", "requests", 1.0, &[]);
        message.tags.push(Tag { name: None, value: Some("orphan".to_owned()) });
        message.tags.push(Tag { name: Some("bare".to_owned()), value: None });

        let event = message_to_event(&message).unwrap();
        assert_eq!(event.labels(), &labels(&[("bare", "")]));
    }

    #[test]
    fn missing_fields() {
        let mut message = metric("c", "requests", 1.0, &[]);
        message.value = None;
        assert_eq!(message_to_event(&message), Err(TranslateError::MissingField("value")));

        message.name = None;
        assert_eq!(message_to_event(&message), Err(TranslateError::MissingField("name")));

        message.r#type = None;
        assert_eq!(message_to_event(&message), Err(TranslateError::MissingField("type")));
        assert_eq!(message_to_event(&message).unwrap_err().reason(), SampleErrorReason::MissingField);

        // An empty buffer is a valid encoding of a message with nothing set.
        let empty = decode_message(&[]).unwrap();
        assert_eq!(message_to_event(&empty), Err(TranslateError::MissingField("type")));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_message(&[0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(decode_message(b"foo:1|c").is_err());
    }

    #[test]
    fn translation_is_deterministic() {
        let encoded = metric("ms", "latency", 4.2, &[("route", "/"), ("env", "prod")]).encode_to_vec();

        let first = message_to_event(&decode_message(&encoded).unwrap()).unwrap();
        let second = message_to_event(&decode_message(&encoded).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
