//! Event taxonomy
//!
//! Every event the engine can report is drawn from the closed [`EventKind`]
//! catalog, which fixes its action and category strings. Free-form context goes
//! into the flat `parameters` map.

use crate::error::TrackError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed catalog of reportable event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Code interaction
    CodeSnippetCopy,
    CodeSnippetView,
    CodeInteraction,

    // Blog engagement
    BlogPostRead,
    BlogPostComplete,
    ReadingProgress,
    ScrollDepth,

    // Technical content
    DiagramInteraction,
    TechnicalDemoView,
    ApiDocumentationView,

    // Contact and conversion
    ContactFormView,
    ContactFormSubmit,
    ContactFormSuccess,
    ServiceInquiry,
    FunnelProgression,

    // Navigation and search
    ExternalLinkClick,
    SearchPerform,

    // Geography
    VariantAssignment,

    // Performance
    PerformanceMetric,
    WebVital,
}

impl EventKind {
    /// Action name reported to the sink
    pub fn action(&self) -> &'static str {
        match self {
            EventKind::CodeSnippetCopy => "code_snippet_copy",
            EventKind::CodeSnippetView => "code_snippet_view",
            EventKind::CodeInteraction => "code_interaction",
            EventKind::BlogPostRead => "blog_post_read",
            EventKind::BlogPostComplete => "blog_post_complete",
            EventKind::ReadingProgress => "reading_progress",
            EventKind::ScrollDepth => "scroll_depth",
            EventKind::DiagramInteraction => "diagram_interaction",
            EventKind::TechnicalDemoView => "technical_demo_view",
            EventKind::ApiDocumentationView => "api_docs_view",
            EventKind::ContactFormView => "contact_form_view",
            EventKind::ContactFormSubmit => "contact_form_submit",
            EventKind::ContactFormSuccess => "contact_form_success",
            EventKind::ServiceInquiry => "service_inquiry",
            EventKind::FunnelProgression => "funnel_progression",
            EventKind::ExternalLinkClick => "external_link_click",
            EventKind::SearchPerform => "search_perform",
            EventKind::VariantAssignment => "variant_assignment",
            EventKind::PerformanceMetric => "performance_metric",
            EventKind::WebVital => "web_vital",
        }
    }

    /// Category the action is filed under
    pub fn category(&self) -> &'static str {
        match self {
            EventKind::CodeSnippetCopy
            | EventKind::CodeSnippetView
            | EventKind::CodeInteraction
            | EventKind::DiagramInteraction
            | EventKind::TechnicalDemoView
            | EventKind::ApiDocumentationView => "technical_engagement",
            EventKind::BlogPostRead | EventKind::BlogPostComplete | EventKind::ReadingProgress => {
                "content_engagement"
            }
            EventKind::ScrollDepth => "engagement",
            EventKind::ContactFormView
            | EventKind::ContactFormSubmit
            | EventKind::ContactFormSuccess
            | EventKind::ServiceInquiry
            | EventKind::FunnelProgression => "conversion",
            EventKind::ExternalLinkClick => "navigation",
            EventKind::SearchPerform => "search",
            EventKind::VariantAssignment => "geographic_testing",
            EventKind::PerformanceMetric => "site_performance",
            EventKind::WebVital => "web_vitals",
        }
    }
}

/// A semantic analytics event.
///
/// Built at the moment an observer detects a signal and never mutated after it
/// is handed to the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Excluded from interaction counts downstream (web vitals)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub non_interaction: bool,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            label: None,
            value: None,
            parameters: Map::new(),
            non_interaction: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the value only when one is known
    pub fn with_optional_value(mut self, value: Option<f64>) -> Self {
        self.value = value;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn non_interaction(mut self) -> Self {
        self.non_interaction = true;
        self
    }

    pub fn action(&self) -> &'static str {
        self.kind.action()
    }

    pub fn category(&self) -> &'static str {
        self.kind.category()
    }

    /// Check the emission preconditions: a finite value and a flat parameter map
    pub fn validate(&self) -> Result<(), TrackError> {
        if let Some(value) = self.value {
            if !value.is_finite() {
                return Err(self.invalid(format!("value {} is not finite", value)));
            }
        }

        for (key, value) in &self.parameters {
            if key.is_empty() {
                return Err(self.invalid("empty parameter name".to_string()));
            }
            if !is_flat(value) {
                return Err(self.invalid(format!("parameter {} is nested", key)));
            }
        }

        Ok(())
    }

    /// Payload of an `event` sink call
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "event_category".to_string(),
            Value::String(self.category().to_string()),
        );
        if let Some(label) = &self.label {
            payload.insert("event_label".to_string(), Value::String(label.clone()));
        }
        if let Some(value) = self.value {
            payload.insert("value".to_string(), Value::from(value));
        }
        if !self.parameters.is_empty() {
            payload.insert(
                "custom_map".to_string(),
                Value::Object(self.parameters.clone()),
            );
        }
        if self.non_interaction {
            payload.insert("non_interaction".to_string(), Value::Bool(true));
        }
        Value::Object(payload)
    }

    fn invalid(&self, reason: String) -> TrackError {
        TrackError::InvalidEvent {
            action: self.action().to_string(),
            reason,
        }
    }
}

/// Scalars and arrays of scalars are flat; nested objects are not
fn is_flat(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|item| !matches!(item, Value::Object(_) | Value::Array(_))),
        _ => true,
    }
}

/// Truncate to at most `max` characters (not bytes)
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
