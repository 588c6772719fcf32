//! Text line parsing.
use tracing::debug;

use crate::{
    event::{Event, Labels},
    telemetry::{SampleErrorReason, Telemetry},
};

/// Upper bound on how many events a single sampled timer expands into.
const MAX_TIMER_REPEAT: usize = 1000;

/// Parses a single line of the StatsD text protocol into events.
///
/// Implementations must never fail the caller: problems with the line are reflected only through `telemetry`, and
/// the offending sample is skipped. An empty line always parses to no events.
pub trait LineParser: Send + Sync {
    /// Parses `line`, returning zero or more events.
    fn parse_line(&self, line: &str, telemetry: &Telemetry) -> Vec<Event>;
}

/// A parser for StatsD lines with DogStatsD-style tags.
///
/// ```text
/// <name>:<value>|<type>[|@<sample rate>][|#<tag>:<value>,...]
/// ```
///
/// Multiple samples for the same name may be given as `<name>:<sample>:<sample>`, as long as the line carries no
/// DogStatsD tag section (tag values may themselves contain `:`).
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsdLineParser;

impl StatsdLineParser {
    /// Creates a new `StatsdLineParser`.
    pub const fn new() -> Self {
        StatsdLineParser
    }

    fn parse_sample(&self, name: &str, sample: &str, telemetry: &Telemetry, events: &mut Vec<Event>) {
        telemetry.track_sample();

        let components = sample.split('|').collect::<Vec<_>>();
        if components.len() < 2 || components.len() > 4 {
            debug!(sample, "Bad component count in StatsD sample.");
            telemetry.track_sample_error(SampleErrorReason::MalformedComponent);
            return;
        }

        let (value_str, stat_type) = (components[0], components[1]);

        let relative = stat_type == "g" && (value_str.starts_with('+') || value_str.starts_with('-'));
        let mut value = match value_str.parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                debug!(value = value_str, "Bad value in StatsD sample.");
                telemetry.track_sample_error(SampleErrorReason::MalformedValue);
                return;
            }
        };

        let mut repeat = 1;
        let mut labels = Labels::new();
        for component in &components[2..] {
            if let Some(rate) = component.strip_prefix('@') {
                // Rates outside of (0, 1] would scale counters and timers arbitrarily, so they're treated as 1.
                let rate = match rate.parse::<f64>() {
                    Ok(rate) if rate == 0.0 => 1.0,
                    Ok(rate) if rate > 0.0 && rate <= 1.0 => rate,
                    _ => {
                        debug!(rate, "Invalid sample rate in StatsD sample.");
                        telemetry.track_sample_error(SampleErrorReason::InvalidSampleFactor);
                        1.0
                    }
                };

                match stat_type {
                    "c" => value /= rate,
                    "ms" | "h" | "d" => {
                        repeat = (1.0 / rate) as usize;
                        if repeat > MAX_TIMER_REPEAT {
                            debug!(rate, max = MAX_TIMER_REPEAT, "Timer sample rate too small. Clamping repetition.");
                            repeat = MAX_TIMER_REPEAT;
                        }
                    }
                    _ => {}
                }
            } else if let Some(tags) = component.strip_prefix('#') {
                parse_dogstatsd_tags(tags, &mut labels, telemetry);
            } else {
                debug!(component, "Unrecognized component in StatsD sample.");
                telemetry.track_sample_error(SampleErrorReason::MalformedComponent);
                return;
            }
        }

        match Event::from_stat_type(stat_type, name, value, relative, labels) {
            Ok(event) => {
                // Timers with a sample rate stand in for several observations.
                for _ in 1..repeat {
                    events.push(event.clone());
                }
                events.push(event);
            }
            Err(e) => {
                debug!(error = %e, "Failed to build event from StatsD sample.");
                telemetry.track_sample_error(event_error_reason(&e));
            }
        }
    }
}

impl LineParser for StatsdLineParser {
    fn parse_line(&self, line: &str, telemetry: &Telemetry) -> Vec<Event> {
        let mut events = Vec::new();
        if line.is_empty() {
            return events;
        }

        let (name, samples) = match line.split_once(':') {
            Some((name, samples)) if !name.is_empty() => (name, samples),
            _ => {
                debug!(line, "Bad line from StatsD.");
                telemetry.track_sample_error(SampleErrorReason::MalformedLine);
                return events;
            }
        };

        if samples.contains("|#") {
            self.parse_sample(name, samples, telemetry, &mut events);
        } else {
            for sample in samples.split(':') {
                self.parse_sample(name, sample, telemetry, &mut events);
            }
        }

        events
    }
}

/// Parses DogStatsD tags in the format `tag1:value1,tag2:value2` into `labels`.
fn parse_dogstatsd_tags(tags: &str, labels: &mut Labels, telemetry: &Telemetry) {
    telemetry.track_tags();

    for tag in tags.split(',') {
        match tag.split_once(':') {
            Some((key, value)) if !key.is_empty() => {
                labels.insert(key.to_owned(), value.to_owned());
            }
            _ => {
                debug!(tag, "Malformed DogStatsD tag.");
                telemetry.track_tag_error();
            }
        }
    }
}

pub(crate) fn event_error_reason(error: &crate::event::EventError) -> SampleErrorReason {
    use crate::event::EventError;

    match error {
        EventError::EmptyName => SampleErrorReason::MalformedLine,
        EventError::UnsupportedStatType => SampleErrorReason::UnsupportedType,
        EventError::UnknownStatType(_) => SampleErrorReason::UnknownType,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        event::{CounterEvent, GaugeEvent, TimerEvent},
        telemetry::test_util::{counter_value, debug_telemetry, CounterTotals},
    };

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    fn sample_errors(snapshotter: &CounterTotals, reason: SampleErrorReason) -> u64 {
        counter_value(snapshotter, "statsd_receiver_sample_errors_total", &[("reason", reason.as_str())])
    }

    #[test]
    fn empty_line_has_no_events() {
        let (telemetry, snapshotter) = debug_telemetry();

        assert!(StatsdLineParser::new().parse_line("", &telemetry).is_empty());
        assert_eq!(counter_value(&snapshotter, "statsd_receiver_samples_total", &[]), 0);
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::MalformedLine), 0);
    }

    #[test]
    fn simple_types() {
        let (telemetry, _) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert_eq!(
            parser.parse_line("foo:1|c", &telemetry),
            vec![Event::Counter(CounterEvent::new("foo", 1.0, Labels::new()).unwrap())]
        );
        assert_eq!(
            parser.parse_line("bar:2|g", &telemetry),
            vec![Event::Gauge(GaugeEvent::new("bar", 2.0, false, Labels::new()).unwrap())]
        );
        for stat_type in ["ms", "h", "d"] {
            let line = format!("baz:3.5|{}", stat_type);
            assert_eq!(
                parser.parse_line(&line, &telemetry),
                vec![Event::Timer(TimerEvent::new("baz", 3.5, Labels::new()).unwrap())]
            );
        }
    }

    #[test]
    fn signed_gauges_are_relative() {
        let (telemetry, _) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert_eq!(
            parser.parse_line("foo:+5|g", &telemetry),
            vec![Event::Gauge(GaugeEvent::new("foo", 5.0, true, Labels::new()).unwrap())]
        );
        assert_eq!(
            parser.parse_line("foo:-5|g", &telemetry),
            vec![Event::Gauge(GaugeEvent::new("foo", -5.0, true, Labels::new()).unwrap())]
        );
        // A signed counter is just a counter.
        assert_eq!(
            parser.parse_line("foo:-5|c", &telemetry),
            vec![Event::Counter(CounterEvent::new("foo", -5.0, Labels::new()).unwrap())]
        );
    }

    #[test]
    fn multiple_samples_on_one_line() {
        let (telemetry, snapshotter) = debug_telemetry();

        let events = StatsdLineParser::new().parse_line("foo:1|c:2|c:3|ms", &telemetry);
        assert_eq!(
            events,
            vec![
                Event::Counter(CounterEvent::new("foo", 1.0, Labels::new()).unwrap()),
                Event::Counter(CounterEvent::new("foo", 2.0, Labels::new()).unwrap()),
                Event::Timer(TimerEvent::new("foo", 3.0, Labels::new()).unwrap()),
            ]
        );
        assert_eq!(counter_value(&snapshotter, "statsd_receiver_samples_total", &[]), 3);
    }

    #[test]
    fn sample_rates() {
        let (telemetry, _) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert_eq!(
            parser.parse_line("foo:1|c|@0.1", &telemetry),
            vec![Event::Counter(CounterEvent::new("foo", 10.0, Labels::new()).unwrap())]
        );

        let timers = parser.parse_line("foo:200|ms|@0.25", &telemetry);
        assert_eq!(timers.len(), 4);
        assert!(timers.iter().all(|e| *e == Event::Timer(TimerEvent::new("foo", 200.0, Labels::new()).unwrap())));

        assert_eq!(
            parser.parse_line("foo:7|g|@0.5", &telemetry),
            vec![Event::Gauge(GaugeEvent::new("foo", 7.0, false, Labels::new()).unwrap())]
        );
    }

    #[test]
    fn tiny_timer_rates_are_clamped() {
        let (telemetry, snapshotter) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert_eq!(parser.parse_line("x:1|ms|@0.000001", &telemetry).len(), MAX_TIMER_REPEAT);
        assert_eq!(parser.parse_line("x:1|d|@1e-12", &telemetry).len(), MAX_TIMER_REPEAT);
        assert_eq!(parser.parse_line("x:1|h|@0.0001", &telemetry).len(), MAX_TIMER_REPEAT);
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::InvalidSampleFactor), 0);

        // Counters scale instead of repeating, so tiny rates stay a single event.
        assert_eq!(
            parser.parse_line("x:1|c|@0.000001", &telemetry),
            vec![Event::Counter(CounterEvent::new("x", 1_000_000.0, Labels::new()).unwrap())]
        );
    }

    #[test]
    fn invalid_sample_rate_is_counted_and_ignored() {
        let (telemetry, snapshotter) = debug_telemetry();

        let events = StatsdLineParser::new().parse_line("foo:1|c|@abc", &telemetry);
        assert_eq!(events, vec![Event::Counter(CounterEvent::new("foo", 1.0, Labels::new()).unwrap())]);
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::InvalidSampleFactor), 1);
    }

    #[test]
    fn dogstatsd_tags() {
        let (telemetry, snapshotter) = debug_telemetry();

        let events = StatsdLineParser::new().parse_line("foo:1|c|#env:prod,url:http://x,env:dev", &telemetry);
        assert_eq!(
            events,
            vec![Event::Counter(
                CounterEvent::new("foo", 1.0, labels(&[("env", "dev"), ("url", "http://x")])).unwrap()
            )]
        );
        assert_eq!(counter_value(&snapshotter, "statsd_receiver_tags_total", &[]), 1);
        assert_eq!(counter_value(&snapshotter, "statsd_receiver_tag_errors_total", &[]), 0);
    }

    #[test]
    fn malformed_tags_are_skipped() {
        let (telemetry, snapshotter) = debug_telemetry();

        let events = StatsdLineParser::new().parse_line("foo:1|c|#novalue,:empty,ok:yes", &telemetry);
        assert_eq!(
            events,
            vec![Event::Counter(CounterEvent::new("foo", 1.0, labels(&[("ok", "yes")])).unwrap())]
        );
        assert_eq!(counter_value(&snapshotter, "statsd_receiver_tag_errors_total", &[]), 2);
    }

    #[test]
    fn malformed_lines() {
        let (telemetry, snapshotter) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert!(parser.parse_line("foo", &telemetry).is_empty());
        assert!(parser.parse_line(":1|c", &telemetry).is_empty());
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::MalformedLine), 2);

        assert!(parser.parse_line("foo:1", &telemetry).is_empty());
        assert!(parser.parse_line("foo:1|c|@1|#a:b|extra", &telemetry).is_empty());
        assert!(parser.parse_line("foo:1|c|x", &telemetry).is_empty());
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::MalformedComponent), 3);

        assert!(parser.parse_line("foo:abc|c", &telemetry).is_empty());
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::MalformedValue), 1);
    }

    #[test]
    fn unsupported_and_unknown_types() {
        let (telemetry, snapshotter) = debug_telemetry();
        let parser = StatsdLineParser::new();

        assert!(parser.parse_line("users:42|s", &telemetry).is_empty());
        assert!(parser.parse_line("users:42|x", &telemetry).is_empty());
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::UnsupportedType), 1);
        assert_eq!(sample_errors(&snapshotter, SampleErrorReason::UnknownType), 1);
    }

    #[test]
    fn one_bad_sample_does_not_spoil_the_line() {
        let (telemetry, _) = debug_telemetry();

        let events = StatsdLineParser::new().parse_line("foo:1|c:nope|c:3|c", &telemetry);
        assert_eq!(
            events,
            vec![
                Event::Counter(CounterEvent::new("foo", 1.0, Labels::new()).unwrap()),
                Event::Counter(CounterEvent::new("foo", 3.0, Labels::new()).unwrap()),
            ]
        );
    }

    proptest! {
        #[test]
        fn never_panics_and_never_yields_unnamed_events(line in "\\PC*") {
            let telemetry = Telemetry::default();
            for event in StatsdLineParser::new().parse_line(&line, &telemetry) {
                prop_assert!(!event.name().is_empty());
            }
        }

        #[test]
        fn well_formed_counters_round_trip(name in "[a-z][a-z0-9_.]{0,15}", value in -1.0e6f64..1.0e6) {
            let telemetry = Telemetry::default();
            let line = format!("{}:{}|c", name, value);
            let events = StatsdLineParser::new().parse_line(&line, &telemetry);
            prop_assert_eq!(events, vec![Event::Counter(CounterEvent::new(name, value, Labels::new()).unwrap())]);
        }
    }
}
