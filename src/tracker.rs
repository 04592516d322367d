//! Emission facade
//!
//! [`Tracker`] is the only component that talks to the sink. Every operation
//! is fire-and-forget and becomes a silent no-op when tracking is disabled, so
//! observers can call it eagerly from any lifecycle point.

use crate::config::TrackingConfig;
use crate::event::Event;
use crate::sink::{Sink, SinkCall, SinkCommand, SinkTarget};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::rc::Rc;

struct TrackerInner {
    tracking_id: Option<String>,
    sink: Rc<dyn Sink>,
}

/// Cheap-to-clone handle to the session's emission facade
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<TrackerInner>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("tracking_id", &self.inner.tracking_id)
            .finish()
    }
}

impl Tracker {
    /// Create a tracker reporting to `sink` under the configured tracking id
    pub fn new(config: &TrackingConfig, sink: Rc<dyn Sink>) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                tracking_id: config.active_tracking_id().map(str::to_string),
                sink,
            }),
        }
    }

    /// A tracker with no tracking id and no sink
    pub fn disabled() -> Self {
        Self::new(&TrackingConfig::disabled(), Rc::new(crate::sink::NoopSink))
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.tracking_id.is_some()
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.inner.tracking_id.as_deref()
    }

    /// Report a discrete event
    pub fn emit(&self, event: &Event) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = event.validate() {
            log::warn!("Dropping malformed event: {}", e);
            return;
        }
        log::trace!("emit {} ({})", event.action(), event.category());
        self.report(SinkCommand::Event, SinkTarget::Id(event.action().to_string()), event.to_payload());
    }

    /// Update session-scoped custom dimensions
    pub fn configure(&self, dimensions: Map<String, Value>) {
        let Some(id) = self.inner.tracking_id.clone() else {
            return;
        };
        self.report(
            SinkCommand::Config,
            SinkTarget::Id(id),
            json!({ "custom_map": Value::Object(dimensions) }),
        );
    }

    /// Record a page view for `url`
    pub fn page_view(&self, url: &str, title: Option<&str>, params: Option<Map<String, Value>>) {
        let Some(id) = self.inner.tracking_id.clone() else {
            return;
        };
        let mut payload = Map::new();
        if let Some(title) = title {
            payload.insert("page_title".to_string(), Value::String(title.to_string()));
        }
        payload.insert("page_location".to_string(), Value::String(url.to_string()));
        if let Some(params) = params {
            payload.insert("custom_map".to_string(), Value::Object(params));
        }
        self.report(SinkCommand::Config, SinkTarget::Id(id), Value::Object(payload));
    }

    /// Bootstrap the reporting library: a `js` call stamped with the session
    /// start, then the initial property configuration declaring the custom
    /// dimensions and metrics the engine fills in later.
    pub fn bootstrap(&self, started_at: DateTime<Utc>, page_location: &str, title: Option<&str>) {
        let Some(id) = self.inner.tracking_id.clone() else {
            return;
        };
        self.report(SinkCommand::Js, SinkTarget::Timestamp(started_at), json!({}));
        self.report(
            SinkCommand::Config,
            SinkTarget::Id(id.clone()),
            json!({
                "page_title": title,
                "page_location": page_location,
                "enhanced_ecommerce": true,
                "custom_map": {
                    "dimension1": "technical_background",
                    "dimension2": "content_category",
                    "dimension3": "geographic_market",
                    "dimension4": "traffic_source",
                    "dimension5": "user_journey_stage",
                },
                "send_page_view": true,
                "site_speed_sample_rate": 10,
                "anonymize_ip": true,
                "respect_dnt": true,
            }),
        );
        self.report(
            SinkCommand::Config,
            SinkTarget::Id(id),
            json!({
                "custom_map": {
                    "metric_1": "cumulative_layout_shift",
                    "metric_2": "first_contentful_paint",
                    "metric_3": "first_input_delay",
                    "metric_4": "largest_contentful_paint",
                }
            }),
        );
    }

    fn report(&self, command: SinkCommand, target: SinkTarget, payload: Value) {
        self.inner.sink.report(&SinkCall {
            command,
            target,
            payload,
        });
    }
}
