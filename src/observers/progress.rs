//! Reading progress sampling
//!
//! Turns the continuous scroll stream for one content unit (a blog post) into
//! monotonic 10% milestones plus a single completion event.

use crate::event::{Event, EventKind};
use crate::host::{Host, Subscription};
use crate::signal::{ScrollMetrics, Signal, SignalKind};
use crate::tracker::Tracker;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;

/// Milestone grid in percent
pub const MILESTONE_STEP: u8 = 10;

/// Scroll percentage at which a post counts as read
pub const COMPLETION_THRESHOLD: u8 = 90;

/// Progress state for one content unit activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingProgress {
    pub post_slug: String,
    pub started_at: DateTime<Utc>,
    pub max_milestone: u8,
    pub completed: bool,
}

impl ReadingProgress {
    pub fn new(post_slug: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            post_slug: post_slug.into(),
            started_at,
            max_milestone: 0,
            completed: false,
        }
    }

    /// Whole seconds since activation
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let millis = (now - self.started_at).num_milliseconds().max(0);
        (millis + 500) / 1000
    }

    /// Advance the state for one scroll sample and return the events it yields.
    ///
    /// Both checks read the state as it was before this sample.
    pub fn observe(&mut self, metrics: &ScrollMetrics, now: DateTime<Utc>) -> Vec<Event> {
        let percent = metrics.percent();
        let previous_max = self.max_milestone;
        let elapsed = self.elapsed_seconds(now);
        let mut events = Vec::new();

        if percent > previous_max && percent % MILESTONE_STEP == 0 {
            self.max_milestone = percent;
            events.push(progress_event(&self.post_slug, percent, elapsed));
        }

        if percent >= COMPLETION_THRESHOLD && previous_max < COMPLETION_THRESHOLD && !self.completed {
            self.completed = true;
            events.push(
                Event::new(EventKind::BlogPostComplete)
                    .with_label(self.post_slug.clone())
                    .with_value(elapsed as f64)
                    .with_param("reading_time_seconds", elapsed)
                    .with_param("completion_percentage", percent),
            );
        }

        events
    }
}

fn progress_event(post_slug: &str, percent: u8, elapsed: i64) -> Event {
    Event::new(EventKind::ReadingProgress)
        .with_label(post_slug)
        .with_value(percent as f64)
        .with_param("time_spent_seconds", elapsed)
        .with_param("progress_percentage", percent)
}

/// Scroll listener bound to one content unit.
///
/// Dropping the sampler (or calling [`ProgressSampler::deactivate`]) detaches
/// the listener and discards the progress state.
pub struct ProgressSampler {
    state: Rc<RefCell<ReadingProgress>>,
    tracker: Tracker,
    host: Host,
    _subscription: Subscription,
}

impl ProgressSampler {
    /// Start sampling scroll signals for `post_slug`
    pub fn activate(host: &Host, tracker: &Tracker, post_slug: &str) -> Self {
        let state = Rc::new(RefCell::new(ReadingProgress::new(post_slug, host.now())));

        let listener_state = state.clone();
        let listener_tracker = tracker.clone();
        let subscription = host.observe(SignalKind::Scroll, move |signal, ctx| {
            let Signal::Scroll(metrics) = signal else {
                return;
            };
            let events = listener_state.borrow_mut().observe(metrics, ctx.now());
            for event in &events {
                listener_tracker.emit(event);
            }
        });

        log::debug!("progress sampler active for {}", post_slug);

        Self {
            state,
            tracker: tracker.clone(),
            host: host.clone(),
            _subscription: subscription,
        }
    }

    /// Snapshot of the current progress state
    pub fn progress(&self) -> ReadingProgress {
        self.state.borrow().clone()
    }

    pub fn post_slug(&self) -> String {
        self.state.borrow().post_slug.clone()
    }

    /// Report an explicit progress percentage without touching the sampler state
    pub fn track_manual_progress(&self, percent: u8) {
        let state = self.state.borrow();
        let elapsed = state.elapsed_seconds(self.host.now());
        self.tracker
            .emit(&progress_event(&state.post_slug, percent.min(100), elapsed));
    }

    /// Detach the scroll listener
    pub fn deactivate(self) {
        log::debug!("progress sampler detached for {}", self.post_slug());
    }
}
