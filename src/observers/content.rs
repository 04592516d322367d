//! Content-level trackers called from page components
//!
//! Unlike the document listeners these react to explicit calls: a code block
//! being copied or shown, a contact form's lifecycle, a search.

use super::funnel::{FunnelResolver, FunnelStage};
use crate::event::{truncate_chars, Event, EventKind};
use crate::host::Host;
use crate::tracker::Tracker;

/// Language reported when a code block has none
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Characters of code carried in the event label
pub const SNIPPET_LABEL_CHARS: usize = 30;

/// Characters of code carried in the copy preview
pub const SNIPPET_PREVIEW_CHARS: usize = 100;

fn snippet_language(language: Option<&str>) -> &str {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(UNKNOWN_LANGUAGE)
}

fn snippet_label(code: &str, language: &str) -> String {
    format!("{}_{}", language, truncate_chars(code, SNIPPET_LABEL_CHARS))
}

/// Code block copy and view reporting
#[derive(Debug, Clone)]
pub struct CodeSnippetTracker {
    tracker: Tracker,
}

impl CodeSnippetTracker {
    pub fn new(tracker: &Tracker) -> Self {
        Self {
            tracker: tracker.clone(),
        }
    }

    /// Report a copy of `code`, including a short preview
    pub fn track_copy(&self, code: &str, language: Option<&str>) {
        let language = snippet_language(language);
        self.tracker.emit(
            &Event::new(EventKind::CodeSnippetCopy)
                .with_label(snippet_label(code, language))
                .with_param("language", language)
                .with_param("code_length", code.chars().count())
                .with_param("snippet_preview", truncate_chars(code, SNIPPET_PREVIEW_CHARS)),
        );
    }

    /// Report that `code` was rendered
    pub fn track_view(&self, code: &str, language: Option<&str>) {
        let language = snippet_language(language);
        self.tracker.emit(
            &Event::new(EventKind::CodeSnippetView)
                .with_label(snippet_label(code, language))
                .with_param("language", language)
                .with_param("code_length", code.chars().count()),
        );
    }
}

/// Lifecycle of one named form
#[derive(Debug, Clone)]
pub struct FormTracker {
    form_name: String,
    host: Host,
    tracker: Tracker,
    funnel: FunnelResolver,
}

impl FormTracker {
    pub fn new(form_name: &str, host: &Host, tracker: &Tracker, funnel: &FunnelResolver) -> Self {
        Self {
            form_name: form_name.to_string(),
            host: host.clone(),
            tracker: tracker.clone(),
            funnel: funnel.clone(),
        }
    }

    pub fn form_name(&self) -> &str {
        &self.form_name
    }

    pub fn track_view(&self) {
        self.tracker
            .emit(&Event::new(EventKind::ContactFormView).with_label(self.form_name.as_str()));
    }

    /// Report a submission with the number of filled fields
    pub fn track_submit(&self, fields_filled: usize) {
        self.tracker.emit(
            &Event::new(EventKind::ContactFormSubmit)
                .with_label(self.form_name.as_str())
                .with_param("form_name", self.form_name.as_str())
                .with_param("fields_filled", fields_filled)
                .with_param("submission_timestamp", self.host.now().timestamp_millis()),
        );
    }

    /// Report a successful submission, then advance the funnel to conversion
    pub fn track_success(&self, response_time_ms: Option<f64>) {
        let mut event = Event::new(EventKind::ContactFormSuccess)
            .with_label(self.form_name.as_str())
            .with_optional_value(response_time_ms)
            .with_param("form_name", self.form_name.as_str());
        if let Some(response_time) = response_time_ms {
            event = event.with_param("response_time_ms", response_time);
        }
        self.tracker.emit(&event);
        self.funnel.advance_to(FunnelStage::Conversion);
    }
}

/// Site search reporting
#[derive(Debug, Clone)]
pub struct SearchTracker {
    host: Host,
    tracker: Tracker,
}

impl SearchTracker {
    pub fn new(host: &Host, tracker: &Tracker) -> Self {
        Self {
            host: host.clone(),
            tracker: tracker.clone(),
        }
    }

    pub fn track_search(&self, query: &str, results_count: Option<u32>) {
        let mut event = Event::new(EventKind::SearchPerform)
            .with_label(query)
            .with_optional_value(results_count.map(f64::from))
            .with_param("search_query", query)
            .with_param("search_timestamp", self.host.now().timestamp_millis());
        if let Some(count) = results_count {
            event = event.with_param("results_count", count);
        }
        self.tracker.emit(&event);
    }
}
