//! Host signal types
//!
//! These are the raw inputs the hosting page feeds into the engine: route
//! changes, scroll positions, clicks, the load event and performance entries.

use serde::{Deserialize, Serialize};

/// Signal category, used to route signals to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Navigation,
    Scroll,
    Click,
    Load,
    PerformanceEntry,
}

/// Route change reported by the page router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    /// Path of the new route (e.g. "/blog/rust-ownership")
    pub path: String,
    /// Serialized query string without the leading '?'
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Document title after the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Navigation {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            title: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Path plus `?query` when the query is non-empty
    pub fn location(&self) -> String {
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

/// Scroll position snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    /// Vertical scroll offset in pixels
    pub scroll_y: f64,
    /// Full scrollable height of the document
    pub document_height: f64,
    /// Height of the visible viewport
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_y: f64, document_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_y,
            document_height,
            viewport_height,
        }
    }

    /// Scroll position as a whole percentage in [0, 100].
    ///
    /// Content that fits the viewport, or non-finite input, reads as 0%.
    pub fn percent(&self) -> u8 {
        let scrollable = self.document_height - self.viewport_height;
        if !scrollable.is_finite() || scrollable <= 0.0 || !self.scroll_y.is_finite() {
            return 0;
        }
        // Half-up rounding
        let percent = (self.scroll_y / scrollable * 100.0 + 0.5).floor();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Element that received a click
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    /// Element tag name, case-insensitive ("a", "code", "span", ...)
    pub tag: String,
    /// Text content of the element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Resolved `href` for anchors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Whether the anchor carries a `download` attribute
    #[serde(default)]
    pub download: bool,
    /// Tag names of the element's ancestors, nearest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<String>,
}

impl ClickTarget {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Anchor element pointing at `href`
    pub fn anchor(href: impl Into<String>) -> Self {
        Self {
            tag: "a".to_string(),
            href: Some(href.into()),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_download(mut self) -> Self {
        self.download = true;
        self
    }

    pub fn within(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Whether the element or one of its ancestors has the given tag
    pub fn closest(&self, tag: &str) -> bool {
        self.is(tag) || self.ancestors.iter().any(|a| a.eq_ignore_ascii_case(tag))
    }
}

/// Entry from the browser performance timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    /// Entry type ("paint", "layout-shift", ...)
    pub entry_type: String,
    /// Entry name ("first-contentful-paint", ...)
    pub name: String,
    /// Start time in milliseconds relative to navigation start
    pub start_time: f64,
}

impl PerformanceEntry {
    pub fn new(entry_type: impl Into<String>, name: impl Into<String>, start_time: f64) -> Self {
        Self {
            entry_type: entry_type.into(),
            name: name.into(),
            start_time,
        }
    }
}

/// Navigation timing marks for the current page load, in milliseconds.
///
/// Marks the browser has not filled in yet are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    #[serde(default)]
    pub fetch_start: Option<f64>,
    #[serde(default)]
    pub domain_lookup_start: Option<f64>,
    #[serde(default)]
    pub domain_lookup_end: Option<f64>,
    #[serde(default)]
    pub connect_start: Option<f64>,
    #[serde(default)]
    pub connect_end: Option<f64>,
    #[serde(default)]
    pub request_start: Option<f64>,
    #[serde(default)]
    pub response_end: Option<f64>,
    #[serde(default)]
    pub dom_content_loaded_event_end: Option<f64>,
    #[serde(default)]
    pub load_event_end: Option<f64>,
}

/// A signal delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    Navigation(Navigation),
    Scroll(ScrollMetrics),
    Click(ClickTarget),
    Load,
    PerformanceEntry(PerformanceEntry),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Navigation(_) => SignalKind::Navigation,
            Signal::Scroll(_) => SignalKind::Scroll,
            Signal::Click(_) => SignalKind::Click,
            Signal::Load => SignalKind::Load,
            Signal::PerformanceEntry(_) => SignalKind::PerformanceEntry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_percent_rounding_and_clamping() {
        assert_eq!(ScrollMetrics::new(0.0, 2000.0, 1000.0).percent(), 0);
        assert_eq!(ScrollMetrics::new(350.0, 2000.0, 1000.0).percent(), 35);
        assert_eq!(ScrollMetrics::new(347.0, 2000.0, 1000.0).percent(), 35);
        assert_eq!(ScrollMetrics::new(6.0, 2000.0, 1000.0).percent(), 1);
        assert_eq!(ScrollMetrics::new(1500.0, 2000.0, 1000.0).percent(), 100);
        assert_eq!(ScrollMetrics::new(-50.0, 2000.0, 1000.0).percent(), 0);
    }

    #[test]
    fn test_scroll_percent_content_fits_viewport() {
        assert_eq!(ScrollMetrics::new(0.0, 800.0, 800.0).percent(), 0);
        assert_eq!(ScrollMetrics::new(10.0, 600.0, 800.0).percent(), 0);
        assert_eq!(ScrollMetrics::new(f64::NAN, 2000.0, 800.0).percent(), 0);
    }

    #[test]
    fn test_click_target_closest() {
        let target = ClickTarget::element("SPAN").within("code").within("PRE");
        assert!(target.closest("pre"));
        assert!(target.closest("span"));
        assert!(!target.closest("a"));
    }

    #[test]
    fn test_navigation_location() {
        assert_eq!(Navigation::to("/blog").location(), "/blog");
        assert_eq!(Navigation::to("/blog").with_query("tag=rust").location(), "/blog?tag=rust");
        assert_eq!(Navigation::to("/blog").with_query("").location(), "/blog");
    }

    #[test]
    fn test_signal_deserialization() {
        let json = r#"{"signal": "scroll", "scroll_y": 450.0, "document_height": 3000.0, "viewport_height": 900.0}"#;
        let signal: Signal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.kind(), SignalKind::Scroll);

        let json = r#"{"signal": "performance_entry", "entryType": "paint", "name": "first-paint", "startTime": 812.4}"#;
        let signal: Signal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.kind(), SignalKind::PerformanceEntry);
    }
}
