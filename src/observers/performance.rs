//! Page load performance and web vitals
//!
//! The load collector waits for the navigation timing entry to settle after the
//! `load` signal, then reports each positive phase duration. The web vitals
//! observer forwards matching performance timeline entries as they arrive.

use crate::event::{Event, EventKind};
use crate::host::{Host, Subscription};
use crate::signal::{NavigationTiming, PerformanceEntry, Signal, SignalKind};
use crate::tracker::Tracker;
use chrono::Duration;

/// Performance timeline entry types reported as web vitals
pub const WEB_VITAL_ENTRY_TYPES: [&str; 4] = [
    "paint",
    "largest-contentful-paint",
    "first-input",
    "layout-shift",
];

/// One derived load phase duration in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadMetric {
    pub name: &'static str,
    pub millis: f64,
}

fn delta(end: Option<f64>, start: Option<f64>) -> Option<f64> {
    let value = end? - start?;
    value.is_finite().then_some(value)
}

/// Derive the load phase durations from a timing entry.
///
/// Phases with a missing mark or a non-positive duration are left out.
pub fn load_metrics(timing: &NavigationTiming) -> Vec<LoadMetric> {
    let candidates = [
        ("dns_time", delta(timing.domain_lookup_end, timing.domain_lookup_start)),
        ("connection_time", delta(timing.connect_end, timing.connect_start)),
        ("request_time", delta(timing.response_end, timing.request_start)),
        ("dom_processing", delta(timing.dom_content_loaded_event_end, timing.response_end)),
        ("total_time", delta(timing.load_event_end, timing.fetch_start)),
    ];

    candidates
        .into_iter()
        .filter_map(|(name, millis)| millis.filter(|m| *m > 0.0).map(|millis| LoadMetric { name, millis }))
        .collect()
}

/// Event for one load metric on `page_path`
pub fn metric_event(metric: &LoadMetric, page_path: &str) -> Event {
    Event::new(EventKind::PerformanceMetric)
        .with_label(metric.name)
        .with_value(metric.millis.round())
        .with_param("metric_name", metric.name)
        .with_param("page_url", page_path)
}

/// Web vital event for a timeline entry, if its type is tracked
pub fn web_vital_event(entry: &PerformanceEntry) -> Option<Event> {
    if !WEB_VITAL_ENTRY_TYPES.contains(&entry.entry_type.as_str()) {
        return None;
    }
    Some(
        Event::new(EventKind::WebVital)
            .with_label(entry.name.clone())
            .with_optional_value(entry.start_time.is_finite().then(|| entry.start_time.round()))
            .non_interaction(),
    )
}

/// Reports load phase durations after each `load` signal.
///
/// Stopping the collector (or dropping it) cancels a pending settle timer.
#[derive(Debug)]
pub struct PerformanceCollector {
    settle_delay: Duration,
    _subscription: Subscription,
}

impl PerformanceCollector {
    pub fn attach(host: &Host, tracker: &Tracker, settle_delay: Duration) -> Self {
        let tracker = tracker.clone();
        let subscription = host.observe(SignalKind::Load, move |_, ctx| {
            let tracker = tracker.clone();
            ctx.schedule_after(settle_delay, move |ctx| {
                let Some(timing) = ctx.navigation_timing() else {
                    log::debug!("no navigation timing entry after settle delay");
                    return;
                };
                let path = ctx.path();
                for metric in load_metrics(&timing) {
                    tracker.emit(&metric_event(&metric, &path));
                }
            });
        });

        Self {
            settle_delay,
            _subscription: subscription,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn stop(self) {
        log::debug!("performance collector stopped");
    }
}

/// Forward tracked performance timeline entries as web vitals
pub fn observe_web_vitals(host: &Host, tracker: &Tracker) -> Subscription {
    let tracker = tracker.clone();
    host.observe(SignalKind::PerformanceEntry, move |signal, _| {
        let Signal::PerformanceEntry(entry) = signal else {
            return;
        };
        if let Some(event) = web_vital_event(entry) {
            tracker.emit(&event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, TrackingConfig};
    use crate::signal::Navigation;
    use crate::sink::RecordingSink;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn timing() -> NavigationTiming {
        NavigationTiming {
            fetch_start: Some(5.0),
            domain_lookup_start: Some(10.0),
            domain_lookup_end: Some(30.4),
            connect_start: Some(30.0),
            connect_end: Some(30.0),
            request_start: Some(40.0),
            response_end: Some(140.6),
            dom_content_loaded_event_end: Some(400.0),
            load_event_end: Some(905.0),
        }
    }

    #[test]
    fn test_load_metrics_skip_non_positive() {
        let metrics = load_metrics(&timing());
        let names: Vec<&str> = metrics.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["dns_time", "request_time", "dom_processing", "total_time"]);
        assert_eq!(metric_event(&metrics[0], "/").value, Some(20.0));
        assert_eq!(metric_event(&metrics[1], "/").value, Some(101.0));
    }

    #[test]
    fn test_load_metrics_skip_missing_marks() {
        let partial = NavigationTiming {
            fetch_start: Some(0.0),
            load_event_end: None,
            ..timing()
        };
        let names: Vec<&str> = load_metrics(&partial).iter().map(|m| m.name).collect();
        assert!(!names.contains(&"total_time"));
        assert!(load_metrics(&NavigationTiming::default()).is_empty());
    }

    #[test]
    fn test_web_vital_event() {
        let paint = PerformanceEntry::new("paint", "first-contentful-paint", 812.6);
        let event = web_vital_event(&paint).unwrap();
        assert_eq!(event.label.as_deref(), Some("first-contentful-paint"));
        assert_eq!(event.value, Some(813.0));
        assert!(event.non_interaction);

        let resource = PerformanceEntry::new("resource", "app.js", 100.0);
        assert!(web_vital_event(&resource).is_none());
    }

    #[test]
    fn test_collector_waits_for_settle_delay() {
        let host = Host::new(Environment::new("example.dev"), start());
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let _collector = PerformanceCollector::attach(&host, &tracker, Duration::milliseconds(1000));

        host.dispatch(Signal::Navigation(Navigation::to("/blog")), start());
        host.record_navigation_timing(timing());
        host.dispatch(Signal::Load, start());

        host.advance_to(start() + Duration::milliseconds(999));
        assert!(sink.events("performance_metric").is_empty());

        host.advance_to(start() + Duration::milliseconds(1000));
        let calls = sink.events("performance_metric");
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].payload["custom_map"]["page_url"], "/blog");
        assert_eq!(calls[3].payload["event_label"], "total_time");
        assert_eq!(calls[3].payload["value"], 900.0);
    }

    #[test]
    fn test_stopping_collector_cancels_pending_timer() {
        let host = Host::new(Environment::new("example.dev"), start());
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let collector = PerformanceCollector::attach(&host, &tracker, Duration::milliseconds(1000));

        host.record_navigation_timing(timing());
        host.dispatch(Signal::Load, start());
        assert_eq!(host.pending_timers(), 1);

        collector.stop();
        assert_eq!(host.pending_timers(), 0);
        host.advance_to(start() + Duration::seconds(5));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_web_vitals_are_non_interaction() {
        let host = Host::new(Environment::new("example.dev"), start());
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let _vitals = observe_web_vitals(&host, &tracker);

        host.dispatch(
            Signal::PerformanceEntry(PerformanceEntry::new("layout-shift", "", 1204.2)),
            start(),
        );
        host.dispatch(
            Signal::PerformanceEntry(PerformanceEntry::new("navigation", "https://example.dev/", 0.0)),
            start(),
        );

        let calls = sink.events("web_vital");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload["non_interaction"], true);
        assert_eq!(calls[0].payload["value"], 1204.0);
    }
}
