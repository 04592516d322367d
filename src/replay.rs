//! Recorded session replay
//!
//! A recorded session is a timestamped stream of host signals and component
//! calls, one JSON object per line (or a JSON array). Replaying it against a
//! fresh [`AnalyticsSession`] reproduces the sink calls the page would have
//! made, which is how the CLI and the FFI layer drive the engine.

use crate::config::{Environment, TrackingConfig};
use crate::error::TrackError;
use crate::host::Host;
use crate::session::{AnalyticsSession, PostView};
use crate::signal::{
    ClickTarget, Navigation, NavigationTiming, PerformanceEntry, ScrollMetrics, Signal,
};
use crate::sink::{RecordingSink, SinkCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Identifier of the recorded session format
pub const REPLAY_FORMAT: &str = "pagepulse.replay.v1";

/// One entry of a recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// When the entry happened
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: ReplayAction,
}

/// What happened at a point in a recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayAction {
    // Host signals
    Navigation(Navigation),
    Scroll(ScrollMetrics),
    Click(ClickTarget),
    Load,
    PerformanceEntry(PerformanceEntry),
    NavigationTiming(NavigationTiming),

    // Component calls
    MountPost {
        slug: String,
    },
    UnmountPost {
        slug: String,
    },
    ManualProgress {
        slug: String,
        percent: u8,
    },
    CodeCopy {
        code: String,
        #[serde(default)]
        language: Option<String>,
    },
    CodeView {
        code: String,
        #[serde(default)]
        language: Option<String>,
    },
    FormView {
        form: String,
    },
    FormSubmit {
        form: String,
        #[serde(default)]
        fields_filled: usize,
    },
    FormSuccess {
        form: String,
        #[serde(default)]
        response_time_ms: Option<f64>,
    },
    Search {
        query: String,
        #[serde(default)]
        results_count: Option<u32>,
    },
    ServiceInquiry {
        service_type: String,
        #[serde(default)]
        value: Option<f64>,
    },
    TechnicalInteraction,
    /// Only moves the clock, firing any timers that fall due
    AdvanceClock,
}

impl ReplayAction {
    pub fn name(&self) -> &'static str {
        match self {
            ReplayAction::Navigation(_) => "navigation",
            ReplayAction::Scroll(_) => "scroll",
            ReplayAction::Click(_) => "click",
            ReplayAction::Load => "load",
            ReplayAction::PerformanceEntry(_) => "performance_entry",
            ReplayAction::NavigationTiming(_) => "navigation_timing",
            ReplayAction::MountPost { .. } => "mount_post",
            ReplayAction::UnmountPost { .. } => "unmount_post",
            ReplayAction::ManualProgress { .. } => "manual_progress",
            ReplayAction::CodeCopy { .. } => "code_copy",
            ReplayAction::CodeView { .. } => "code_view",
            ReplayAction::FormView { .. } => "form_view",
            ReplayAction::FormSubmit { .. } => "form_submit",
            ReplayAction::FormSuccess { .. } => "form_success",
            ReplayAction::Search { .. } => "search",
            ReplayAction::ServiceInquiry { .. } => "service_inquiry",
            ReplayAction::TechnicalInteraction => "technical_interaction",
            ReplayAction::AdvanceClock => "advance_clock",
        }
    }

    /// The host signal this action delivers, if it is one
    fn signal(&self) -> Option<Signal> {
        match self {
            ReplayAction::Navigation(n) => Some(Signal::Navigation(n.clone())),
            ReplayAction::Scroll(m) => Some(Signal::Scroll(*m)),
            ReplayAction::Click(t) => Some(Signal::Click(t.clone())),
            ReplayAction::Load => Some(Signal::Load),
            ReplayAction::PerformanceEntry(e) => Some(Signal::PerformanceEntry(e.clone())),
            _ => None,
        }
    }
}

impl ReplayRecord {
    pub fn new(at: DateTime<Utc>, action: ReplayAction) -> Self {
        Self { at, action }
    }

    /// Check the record is well formed
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.action {
            ReplayAction::Navigation(navigation) => {
                if !navigation.path.starts_with('/') {
                    return Err(ValidationError::InvalidPath(navigation.path.clone()));
                }
            }
            ReplayAction::Scroll(metrics) => {
                for (field, value) in [
                    ("scroll_y", metrics.scroll_y),
                    ("document_height", metrics.document_height),
                    ("viewport_height", metrics.viewport_height),
                ] {
                    if !value.is_finite() {
                        return Err(ValidationError::NonFinite { field });
                    }
                }
            }
            ReplayAction::Click(target) => require_non_empty("tag", &target.tag)?,
            ReplayAction::PerformanceEntry(entry) => {
                require_non_empty("entry_type", &entry.entry_type)?;
                if !entry.start_time.is_finite() {
                    return Err(ValidationError::NonFinite { field: "start_time" });
                }
            }
            ReplayAction::MountPost { slug } | ReplayAction::UnmountPost { slug } => {
                require_non_empty("slug", slug)?
            }
            ReplayAction::ManualProgress { slug, percent } => {
                require_non_empty("slug", slug)?;
                if *percent > 100 {
                    return Err(ValidationError::OutOfRange {
                        field: "percent",
                        value: f64::from(*percent),
                    });
                }
            }
            ReplayAction::FormView { form }
            | ReplayAction::FormSubmit { form, .. }
            | ReplayAction::FormSuccess { form, .. } => require_non_empty("form", form)?,
            ReplayAction::ServiceInquiry {
                service_type,
                value,
            } => {
                require_non_empty("service_type", service_type)?;
                if let Some(value) = value {
                    if !value.is_finite() {
                        return Err(ValidationError::NonFinite { field: "value" });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}

/// Validation errors for replay records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field {field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("Field {field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Navigation path must start with '/': {0}")]
    InvalidPath(String),
}

/// Result of validating one record
#[derive(Debug)]
pub struct RecordValidation {
    pub index: usize,
    pub action: &'static str,
    pub error: ValidationError,
}

/// Parse newline-delimited records, skipping blank lines
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ReplayRecord>, TrackError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(TrackError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Parse a JSON array of records
pub fn parse_array(json: &str) -> Result<Vec<ReplayRecord>, TrackError> {
    serde_json::from_str(json).map_err(|e| TrackError::ParseError(e.to_string()))
}

/// Parse either form, deciding on the first non-blank character
pub fn parse_records(input: &str) -> Result<Vec<ReplayRecord>, TrackError> {
    if input.trim_start().starts_with('[') {
        parse_array(input)
    } else {
        parse_ndjson(input)
    }
}

/// Validate every record, returning only the failures
pub fn validate_records(records: &[ReplayRecord]) -> Vec<RecordValidation> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            record.validate().err().map(|error| RecordValidation {
                index,
                action: record.action.name(),
                error,
            })
        })
        .collect()
}

struct ReplayState {
    host: Host,
    session: AnalyticsSession,
    posts: HashMap<String, PostView>,
}

/// Stateful replay driver.
///
/// The session starts at the timestamp of the first record. Records must be in
/// chronological order across calls.
pub struct ReplayProcessor {
    config: TrackingConfig,
    environment: Environment,
    sink: Rc<RecordingSink>,
    state: Option<ReplayState>,
}

impl ReplayProcessor {
    pub fn new(config: TrackingConfig, environment: Environment) -> Self {
        Self {
            config,
            environment,
            sink: Rc::new(RecordingSink::new()),
            state: None,
        }
    }

    /// The running session, once the first record has been processed
    pub fn session(&self) -> Option<&AnalyticsSession> {
        self.state.as_ref().map(|s| &s.session)
    }

    /// Slugs of the posts currently mounted
    pub fn mounted_posts(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self
            .state
            .as_ref()
            .map(|s| s.posts.keys().cloned().collect())
            .unwrap_or_default();
        slugs.sort();
        slugs
    }

    /// Apply records and return the sink calls they produced.
    ///
    /// On error the calls produced by the records applied before the failing
    /// one are discarded, so they never leak into a later batch.
    pub fn process(&mut self, records: &[ReplayRecord]) -> Result<Vec<SinkCall>, TrackError> {
        for (index, record) in records.iter().enumerate() {
            if let Err(e) = self.apply(record) {
                let discarded = self.sink.drain();
                log::warn!(
                    "replay batch failed at record {}; discarding {} sink calls",
                    index,
                    discarded.len()
                );
                return Err(e);
            }
        }
        Ok(self.sink.drain())
    }

    /// Parse NDJSON (or a JSON array) and apply it
    pub fn process_json(&mut self, input: &str) -> Result<Vec<SinkCall>, TrackError> {
        let records = parse_records(input)?;
        self.process(&records)
    }

    /// Apply a single record
    pub fn apply(&mut self, record: &ReplayRecord) -> Result<(), TrackError> {
        record
            .validate()
            .map_err(|e| TrackError::InvalidRecord(format!("{}: {}", record.action.name(), e)))?;

        let state = self.state_at(record.at);
        if record.at < state.host.now() {
            return Err(TrackError::InvalidRecord(format!(
                "{} at {} is earlier than {}",
                record.action.name(),
                record.at,
                state.host.now()
            )));
        }

        if let Some(signal) = record.action.signal() {
            state.host.dispatch(signal, record.at);
            return Ok(());
        }

        state.host.advance_to(record.at);
        let session = &state.session;
        match &record.action {
            ReplayAction::NavigationTiming(timing) => {
                state.host.record_navigation_timing(timing.clone());
            }
            ReplayAction::MountPost { slug } => {
                let view = session.mount_post(slug);
                if let Some(previous) = state.posts.insert(slug.clone(), view) {
                    previous.unmount();
                }
            }
            ReplayAction::UnmountPost { slug } => {
                let view = state
                    .posts
                    .remove(slug)
                    .ok_or_else(|| TrackError::UnknownContentUnit(slug.clone()))?;
                view.unmount();
            }
            ReplayAction::ManualProgress { slug, percent } => {
                let view = state
                    .posts
                    .get(slug)
                    .ok_or_else(|| TrackError::UnknownContentUnit(slug.clone()))?;
                view.track_manual_progress(*percent);
            }
            ReplayAction::CodeCopy { code, language } => {
                session.code_snippets().track_copy(code, language.as_deref());
            }
            ReplayAction::CodeView { code, language } => {
                session.code_snippets().track_view(code, language.as_deref());
            }
            ReplayAction::FormView { form } => session.form(form).track_view(),
            ReplayAction::FormSubmit {
                form,
                fields_filled,
            } => session.form(form).track_submit(*fields_filled),
            ReplayAction::FormSuccess {
                form,
                response_time_ms,
            } => session.form(form).track_success(*response_time_ms),
            ReplayAction::Search {
                query,
                results_count,
            } => session.search().track_search(query, *results_count),
            ReplayAction::ServiceInquiry {
                service_type,
                value,
            } => session.track_service_inquiry(service_type, *value),
            ReplayAction::TechnicalInteraction => {
                session.record_technical_interaction();
            }
            _ => {}
        }
        Ok(())
    }

    fn state_at(&mut self, at: DateTime<Utc>) -> &mut ReplayState {
        let config = &self.config;
        let environment = &self.environment;
        let sink = &self.sink;
        self.state.get_or_insert_with(|| {
            let host = Host::new(environment.clone(), at);
            let session = AnalyticsSession::start(&host, config, sink.clone());
            ReplayState {
                host,
                session,
                posts: HashMap::new(),
            }
        })
    }

    /// Unmount remaining posts, end the session and return the final calls
    pub fn finish(mut self) -> Vec<SinkCall> {
        if let Some(state) = self.state.take() {
            let mut posts: Vec<(String, PostView)> = state.posts.into_iter().collect();
            posts.sort_by(|a, b| a.0.cmp(&b.0));
            for (_, view) in posts {
                view.unmount();
            }
            state.session.end();
        }
        self.sink.drain()
    }
}

/// Replay a whole recorded session in one call
pub fn replay_session(
    input: &str,
    config: &TrackingConfig,
    environment: &Environment,
) -> Result<Vec<SinkCall>, TrackError> {
    let mut processor = ReplayProcessor::new(config.clone(), environment.clone());
    let mut calls = processor.process_json(input)?;
    calls.extend(processor.finish());
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SESSION: &str = r#"
{"at":"2024-01-15T14:00:00Z","type":"navigation","path":"/blog/rust-ownership"}
{"at":"2024-01-15T14:00:00Z","type":"mount_post","slug":"rust-ownership"}
{"at":"2024-01-15T14:00:05Z","type":"scroll","scroll_y":100.0,"document_height":1800.0,"viewport_height":800.0}

{"at":"2024-01-15T14:01:30Z","type":"scroll","scroll_y":900.0,"document_height":1800.0,"viewport_height":800.0}
{"at":"2024-01-15T14:01:31Z","type":"unmount_post","slug":"rust-ownership"}
"#;

    fn env() -> Environment {
        Environment::new("example.dev").with_timezone("Europe/Berlin")
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let records = parse_ndjson(SESSION).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[1].action.name(), "mount_post");

        let err = parse_ndjson("{\"at\":\"2024-01-15T14:00:00Z\",\"type\":\"load\"}\n{oops}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array_and_detection() {
        let json = r#"[{"at":"2024-01-15T14:00:00Z","type":"load"},
                       {"at":"2024-01-15T14:00:02Z","type":"advance_clock"}]"#;
        let records = parse_records(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, ReplayAction::Load);
    }

    #[test]
    fn test_validation() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let bad = vec![
            ReplayRecord::new(at, ReplayAction::MountPost { slug: " ".to_string() }),
            ReplayRecord::new(at, ReplayAction::Navigation(Navigation::to("blog"))),
            ReplayRecord::new(
                at,
                ReplayAction::ManualProgress {
                    slug: "post".to_string(),
                    percent: 140,
                },
            ),
            ReplayRecord::new(at, ReplayAction::Load),
        ];
        let failures = validate_records(&bad);
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].error, ValidationError::EmptyField { field: "slug" });
        assert_eq!(failures[1].action, "navigation");
    }

    #[test]
    fn test_replay_session_end_to_end() {
        let calls = replay_session(SESSION, &TrackingConfig::new("G-TEST"), &env()).unwrap();

        let milestones: Vec<f64> = calls
            .iter()
            .filter(|c| c.is_event("reading_progress"))
            .filter_map(|c| c.payload["value"].as_f64())
            .collect();
        assert_eq!(milestones, vec![10.0, 90.0]);

        let complete: Vec<_> = calls.iter().filter(|c| c.is_event("blog_post_complete")).collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].payload["value"], 90.0);

        assert!(calls.iter().any(|c| c.is_event("variant_assignment")));
    }

    #[test]
    fn test_disabled_replay_is_silent() {
        let calls = replay_session(SESSION, &TrackingConfig::disabled(), &env()).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_out_of_order_and_unknown_post_rejected() {
        let mut processor = ReplayProcessor::new(TrackingConfig::new("G-TEST"), env());
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 10).unwrap();
        processor.apply(&ReplayRecord::new(at, ReplayAction::Load)).unwrap();

        let earlier = ReplayRecord::new(at - chrono::Duration::seconds(1), ReplayAction::Load);
        assert!(matches!(processor.apply(&earlier), Err(TrackError::InvalidRecord(_))));

        let unmount = ReplayRecord::new(
            at,
            ReplayAction::UnmountPost {
                slug: "missing".to_string(),
            },
        );
        assert!(matches!(
            processor.apply(&unmount),
            Err(TrackError::UnknownContentUnit(_))
        ));
    }

    #[test]
    fn test_failed_batch_does_not_leak_into_next() {
        let mut processor = ReplayProcessor::new(TrackingConfig::new("G-TEST"), env());
        let records = parse_ndjson(SESSION).unwrap();
        let at = records[1].at;

        let failing = vec![
            records[0].clone(),
            records[1].clone(),
            ReplayRecord::new(
                at,
                ReplayAction::UnmountPost {
                    slug: "missing".to_string(),
                },
            ),
        ];
        assert!(matches!(
            processor.process(&failing),
            Err(TrackError::UnknownContentUnit(_))
        ));

        let next = processor
            .process(&[ReplayRecord::new(at, ReplayAction::AdvanceClock)])
            .unwrap();
        assert!(next.is_empty());
        assert_eq!(processor.mounted_posts(), vec!["rust-ownership".to_string()]);
    }

    #[test]
    fn test_processor_keeps_state_across_batches() {
        let mut processor = ReplayProcessor::new(TrackingConfig::new("G-TEST"), env());
        let records = parse_ndjson(SESSION).unwrap();

        let first = processor.process(&records[..2]).unwrap();
        assert!(first.iter().any(|c| c.is_event("funnel_progression")));
        assert_eq!(processor.mounted_posts(), vec!["rust-ownership".to_string()]);

        let second = processor.process(&records[2..]).unwrap();
        assert!(second.iter().any(|c| c.is_event("blog_post_complete")));
        assert!(processor.mounted_posts().is_empty());
        assert!(processor.finish().is_empty());
    }
}
