//! Document-level engagement listeners
//!
//! Code interaction, external link clicks and page-wide scroll depth. Each
//! listener is independent and keeps at most one piece of state.

use super::background::BackgroundClassifier;
use crate::event::{truncate_chars, Event, EventKind};
use crate::host::{Host, Subscription};
use crate::signal::{ClickTarget, ScrollMetrics, Signal, SignalKind};
use crate::tracker::Tracker;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::LazyLock;

/// Maximum characters of element text carried in a payload
pub const TEXT_PREVIEW_CHARS: usize = 50;

/// Scroll depth grid in percent
pub const SCROLL_DEPTH_STEP: u8 = 25;

/// Destination reported when a link's host cannot be determined
pub const UNKNOWN_HOST: &str = "unknown";

/// URL authority, scheme-qualified or protocol-relative ("//host/path");
/// captures the host (bracketed IPv6 or name)
static AUTHORITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*:)?//(?:[^@/?#]*@)?(\[[^\]/?#]*\]|[^:/?#]*)").unwrap()
});

/// Any URL scheme prefix ("https:", "mailto:", "javascript:")
static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());

/// Binary and media downloads
static DOWNLOAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(pdf|doc|docx|zip|mp4|mp3)$").unwrap());

/// Host name of an absolute or protocol-relative URL, lowercased.
///
/// Returns `None` for path-relative references and for URLs without an
/// authority.
pub fn parse_hostname(href: &str) -> Option<String> {
    let captures = AUTHORITY_RE.captures(href.trim())?;
    let host = captures.get(1)?.as_str();
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Whether an anchor points at a downloadable file
pub fn is_download(href: &str, download_attribute: bool) -> bool {
    download_attribute || DOWNLOAD_RE.is_match(href)
}

/// Destination of a link as seen from `document_host`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDestination {
    /// Same host, or a relative reference
    Internal,
    /// Another host (`unknown` when the URL has a scheme but no parsable host)
    External(String),
}

/// Classify an href relative to the current document host
pub fn classify_link(href: &str, document_host: &str) -> LinkDestination {
    let trimmed = href.trim();
    match parse_hostname(trimmed) {
        Some(host) if host.eq_ignore_ascii_case(document_host) => LinkDestination::Internal,
        Some(host) => LinkDestination::External(host),
        None if SCHEME_RE.is_match(trimmed) => {
            LinkDestination::External(UNKNOWN_HOST.to_string())
        }
        None => LinkDestination::Internal,
    }
}

/// Build the external-link event for a clicked anchor, if it leaves the site
pub fn external_link_event(target: &ClickTarget, document_host: &str) -> Option<Event> {
    if !target.is("a") {
        return None;
    }
    let href = target.href.as_deref().filter(|h| !h.trim().is_empty())?;

    let LinkDestination::External(destination) = classify_link(href, document_host) else {
        return None;
    };

    let link_text = target
        .text
        .as_deref()
        .map(|t| truncate_chars(t, TEXT_PREVIEW_CHARS))
        .unwrap_or_default();

    Some(
        Event::new(EventKind::ExternalLinkClick)
            .with_label(href)
            .with_param("link_text", link_text)
            .with_param("destination_domain", destination)
            .with_param("is_download", is_download(href, target.download)),
    )
}

/// Build the code-interaction event for a click on code, if the target is code
pub fn code_interaction_event(target: &ClickTarget) -> Option<Event> {
    if !(target.is("code") || target.closest("pre")) {
        return None;
    }
    let preview = target
        .text
        .as_deref()
        .map(|t| truncate_chars(t, TEXT_PREVIEW_CHARS))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "code_snippet".to_string());

    Some(Event::new(EventKind::CodeInteraction).with_label(preview))
}

/// Listen for clicks on code and feed the technical background classifier
pub fn observe_code_interactions(
    host: &Host,
    tracker: &Tracker,
    classifier: &Rc<RefCell<BackgroundClassifier>>,
) -> Subscription {
    let tracker = tracker.clone();
    let classifier = classifier.clone();
    host.observe(SignalKind::Click, move |signal, _| {
        let Signal::Click(target) = signal else {
            return;
        };
        if let Some(event) = code_interaction_event(target) {
            tracker.emit(&event);
            classifier.borrow_mut().record_interaction();
        }
    })
}

/// Listen for anchor clicks that leave the current host
pub fn observe_external_links(host: &Host, tracker: &Tracker) -> Subscription {
    let tracker = tracker.clone();
    host.observe(SignalKind::Click, move |signal, ctx| {
        let Signal::Click(target) = signal else {
            return;
        };
        if let Some(event) = external_link_event(target, &ctx.environment().hostname) {
            tracker.emit(&event);
        }
    })
}

/// Page-wide maximum scroll depth on a 25% grid
#[derive(Debug, Default)]
pub struct ScrollDepth {
    max_depth: Cell<u8>,
}

impl ScrollDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth.get()
    }

    /// Return the new threshold crossed by this sample, if any
    pub fn observe(&self, metrics: &ScrollMetrics) -> Option<u8> {
        let percent = metrics.percent();
        if percent > self.max_depth.get() && percent % SCROLL_DEPTH_STEP == 0 {
            self.max_depth.set(percent);
            Some(percent)
        } else {
            None
        }
    }
}

/// Listen for scroll signals and report each new depth threshold
pub fn observe_scroll_depth(host: &Host, tracker: &Tracker) -> Subscription {
    let tracker = tracker.clone();
    let depth = ScrollDepth::new();
    host.observe(SignalKind::Scroll, move |signal, _| {
        let Signal::Scroll(metrics) = signal else {
            return;
        };
        if let Some(percent) = depth.observe(metrics) {
            tracker.emit(
                &Event::new(EventKind::ScrollDepth)
                    .with_label(format!("{}%", percent))
                    .with_value(percent as f64),
            );
        }
    })
}
