//! Conversion funnel resolution
//!
//! The funnel stage is derived from the current path each time it is checked.
//! Nothing is stored between checks, so re-rendering the same page reports the
//! same stage again.

use crate::event::{Event, EventKind};
use crate::host::{Host, Subscription};
use crate::signal::{Signal, SignalKind};
use crate::tracker::Tracker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Traffic source used when the visit has no referrer
pub const DIRECT_SOURCE: &str = "direct";

/// Ordered marketing funnel stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Awareness,
    Interest,
    Consideration,
    Conversion,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Awareness => "awareness",
            FunnelStage::Interest => "interest",
            FunnelStage::Consideration => "consideration",
            FunnelStage::Conversion => "conversion",
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the funnel stage implied by a navigation path.
///
/// Conversion is never inferred from a path; it is only reached through
/// [`FunnelResolver::advance_to`].
pub fn resolve_stage(path: &str) -> Option<FunnelStage> {
    if path == "/" {
        Some(FunnelStage::Awareness)
    } else if path.trim_start_matches('/').starts_with("blog") {
        Some(FunnelStage::Interest)
    } else if path.contains("contact") || path.contains("services") {
        Some(FunnelStage::Consideration)
    } else {
        None
    }
}

/// Traffic source from a referrer URL: its hostname, or `direct`
pub fn traffic_source(referrer: Option<&str>) -> String {
    referrer
        .filter(|r| !r.trim().is_empty())
        .and_then(super::engagement::parse_hostname)
        .unwrap_or_else(|| DIRECT_SOURCE.to_string())
}

/// Emits funnel stage transitions for the session
#[derive(Debug, Clone)]
pub struct FunnelResolver {
    tracker: Tracker,
    source: String,
}

impl FunnelResolver {
    pub fn new(tracker: &Tracker, referrer: Option<&str>) -> Self {
        Self {
            tracker: tracker.clone(),
            source: traffic_source(referrer),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Emit the stage implied by `path`, if any
    pub fn check(&self, path: &str) -> Option<FunnelStage> {
        let stage = resolve_stage(path)?;
        self.advance_to(stage);
        Some(stage)
    }

    /// Emit `stage` unconditionally; ordering against earlier stages is not checked
    pub fn advance_to(&self, stage: FunnelStage) {
        self.tracker.emit(
            &Event::new(EventKind::FunnelProgression)
                .with_label(format!("{}_{}", stage, self.source))
                .with_param("funnel_stage", stage.as_str())
                .with_param("traffic_source", self.source.as_str()),
        );
    }

    /// Report a service inquiry, then advance to conversion
    pub fn track_service_inquiry(&self, service_type: &str, inquiry_value: Option<f64>) {
        self.tracker.emit(
            &Event::new(EventKind::ServiceInquiry)
                .with_label(service_type)
                .with_optional_value(inquiry_value)
                .with_param("service_type", service_type)
                .with_param("inquiry_source", "website"),
        );
        self.advance_to(FunnelStage::Conversion);
    }

    /// Re-check the stage on every navigation signal
    pub fn observe(&self, host: &Host) -> Subscription {
        let resolver = self.clone();
        host.observe(SignalKind::Navigation, move |signal, _| {
            if let Signal::Navigation(navigation) = signal {
                resolver.check(&navigation.path);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, TrackingConfig};
    use crate::signal::Navigation;
    use crate::sink::RecordingSink;
    use chrono::{TimeZone, Utc};
    use std::rc::Rc;

    #[test]
    fn test_resolve_stage_table() {
        assert_eq!(resolve_stage("/"), Some(FunnelStage::Awareness));
        assert_eq!(resolve_stage("/blog"), Some(FunnelStage::Interest));
        assert_eq!(resolve_stage("/blog/foo"), Some(FunnelStage::Interest));
        assert_eq!(resolve_stage("/contact"), Some(FunnelStage::Consideration));
        assert_eq!(resolve_stage("/our-services"), Some(FunnelStage::Consideration));
        assert_eq!(resolve_stage("/about"), None);
        assert_eq!(resolve_stage(""), None);
    }

    #[test]
    fn test_blog_wins_over_contact() {
        assert_eq!(resolve_stage("/blog/contact-forms"), Some(FunnelStage::Interest));
    }

    #[test]
    fn test_resolution_ignores_call_order() {
        let paths = ["/contact", "/", "/blog/foo", "/"];
        let forward: Vec<_> = paths.iter().map(|p| resolve_stage(p)).collect();
        let backward: Vec<_> = paths.iter().rev().map(|p| resolve_stage(p)).collect();
        assert_eq!(forward, backward.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_stage_ordering() {
        assert!(FunnelStage::Awareness < FunnelStage::Interest);
        assert!(FunnelStage::Consideration < FunnelStage::Conversion);
    }

    #[test]
    fn test_traffic_source() {
        assert_eq!(traffic_source(None), "direct");
        assert_eq!(traffic_source(Some("")), "direct");
        assert_eq!(traffic_source(Some("https://news.ycombinator.com/item?id=1")), "news.ycombinator.com");
    }

    #[test]
    fn test_repeat_navigation_is_not_deduplicated() {
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let host = Host::new(Environment::new("example.dev"), start);
        let resolver = FunnelResolver::new(&tracker, Some("https://www.google.com/"));
        let _sub = resolver.observe(&host);

        host.dispatch(Signal::Navigation(Navigation::to("/")), start);
        host.dispatch(Signal::Navigation(Navigation::to("/")), start);
        host.dispatch(Signal::Navigation(Navigation::to("/about")), start);

        let calls = sink.events("funnel_progression");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].payload["event_label"], "awareness_www.google.com");
        assert_eq!(calls[0].payload["custom_map"]["traffic_source"], "www.google.com");
    }

    #[test]
    fn test_service_inquiry_advances_to_conversion() {
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let resolver = FunnelResolver::new(&tracker, None);

        resolver.track_service_inquiry("rust_consulting", Some(5000.0));

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_event("service_inquiry"));
        assert_eq!(calls[0].payload["value"], 5000.0);
        assert!(calls[1].is_event("funnel_progression"));
        assert_eq!(calls[1].payload["custom_map"]["funnel_stage"], "conversion");
        assert_eq!(calls[1].payload["event_label"], "conversion_direct");
    }
}
