//! Session orchestration
//!
//! [`AnalyticsSession`] wires every observer to one [`Host`] and one
//! [`Tracker`]. It is the Rust counterpart of mounting the analytics layer on a
//! page: start it once, feed the host signals, end it on teardown.

use crate::config::TrackingConfig;
use crate::host::{Host, Subscription};
use crate::observers::background::{BackgroundClassifier, TechnicalBackground};
use crate::observers::content::{CodeSnippetTracker, FormTracker, SearchTracker};
use crate::observers::engagement::{
    observe_code_interactions, observe_external_links, observe_scroll_depth,
};
use crate::observers::funnel::{FunnelResolver, FunnelStage};
use crate::observers::geo::{assign_variant, report_market, GeoMarket, GeoVariant};
use crate::observers::performance::{observe_web_vitals, PerformanceCollector};
use crate::observers::progress::{ProgressSampler, ReadingProgress};
use crate::signal::{Signal, SignalKind};
use crate::sink::Sink;
use crate::tracker::Tracker;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// One page session's analytics state
pub struct AnalyticsSession {
    session_id: Uuid,
    host: Host,
    tracker: Tracker,
    funnel: FunnelResolver,
    classifier: Rc<RefCell<BackgroundClassifier>>,
    market: GeoMarket,
    variant: GeoVariant,
    performance: Option<PerformanceCollector>,
    subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for AnalyticsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsSession")
            .field("session_id", &self.session_id)
            .field("tracker", &self.tracker)
            .field("market", &self.market)
            .field("variant", &self.variant)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl AnalyticsSession {
    /// Start a session on `host`.
    ///
    /// Bootstraps the reporting library, reports the geographic dimensions,
    /// assigns the experiment variant and resolves the funnel stage of the
    /// current route. Document listeners are attached only when tracking is
    /// enabled.
    pub fn start(host: &Host, config: &TrackingConfig, sink: Rc<dyn Sink>) -> Self {
        let session_id = Uuid::new_v4();
        let tracker = Tracker::new(config, sink);
        let environment = host.environment();

        tracker.bootstrap(host.now(), &host.location(), environment.title.as_deref());
        let market = report_market(&tracker, environment);
        let variant = assign_variant(&tracker, environment);

        let funnel = FunnelResolver::new(&tracker, environment.referrer.as_deref());
        let classifier = Rc::new(RefCell::new(BackgroundClassifier::new(&tracker)));

        let mut session = Self {
            session_id,
            host: host.clone(),
            tracker,
            funnel,
            classifier,
            market,
            variant,
            performance: None,
            subscriptions: Vec::new(),
        };

        if !session.tracker.is_enabled() {
            log::debug!("session {}: tracking disabled, no observers attached", session_id);
            return session;
        }

        session.funnel.check(&host.path());
        session.attach_observers(config);

        log::debug!(
            "session {} started on {} ({}, variant {}, source {})",
            session_id,
            environment.hostname,
            market.market,
            variant,
            session.funnel.source()
        );
        session
    }

    fn attach_observers(&mut self, config: &TrackingConfig) {
        let host = &self.host;
        let tracker = &self.tracker;

        self.subscriptions.push(observe_page_views(host, tracker));
        self.subscriptions.push(self.funnel.observe(host));
        self.subscriptions
            .push(observe_code_interactions(host, tracker, &self.classifier));
        self.subscriptions.push(observe_external_links(host, tracker));
        self.subscriptions.push(observe_scroll_depth(host, tracker));
        self.subscriptions.push(observe_web_vitals(host, tracker));

        self.performance = Some(PerformanceCollector::attach(
            host,
            tracker,
            config.settle_delay(),
        ));
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn is_enabled(&self) -> bool {
        self.tracker.is_enabled()
    }

    pub fn market(&self) -> GeoMarket {
        self.market
    }

    pub fn variant(&self) -> GeoVariant {
        self.variant
    }

    pub fn funnel(&self) -> &FunnelResolver {
        &self.funnel
    }

    pub fn technical_background(&self) -> TechnicalBackground {
        self.classifier.borrow().background()
    }

    pub fn technical_interactions(&self) -> u32 {
        self.classifier.borrow().interactions()
    }

    /// Seconds accumulated on technical content across unmounted posts
    pub fn technical_seconds(&self) -> f64 {
        self.classifier.borrow().technical_seconds()
    }

    /// Number of listeners currently attached on behalf of this session
    pub fn active_listeners(&self) -> usize {
        self.subscriptions.len() + usize::from(self.performance.is_some())
    }

    /// Count one technical interaction outside the click listener
    pub fn record_technical_interaction(&self) -> TechnicalBackground {
        self.classifier.borrow_mut().record_interaction()
    }

    /// Report a service inquiry and advance the funnel to conversion
    pub fn track_service_inquiry(&self, service_type: &str, inquiry_value: Option<f64>) {
        self.funnel.track_service_inquiry(service_type, inquiry_value);
    }

    /// Mount a blog post: interest stage, one technical interaction and a
    /// progress sampler scoped to the returned view
    pub fn mount_post(&self, post_slug: &str) -> PostView {
        self.funnel.advance_to(FunnelStage::Interest);
        self.classifier.borrow_mut().record_interaction();

        let sampler = self
            .tracker
            .is_enabled()
            .then(|| ProgressSampler::activate(&self.host, &self.tracker, post_slug));

        PostView {
            post_slug: post_slug.to_string(),
            mounted_at: self.host.now(),
            host: self.host.clone(),
            classifier: self.classifier.clone(),
            sampler,
        }
    }

    pub fn code_snippets(&self) -> CodeSnippetTracker {
        CodeSnippetTracker::new(&self.tracker)
    }

    pub fn form(&self, form_name: &str) -> FormTracker {
        FormTracker::new(form_name, &self.host, &self.tracker, &self.funnel)
    }

    pub fn search(&self) -> SearchTracker {
        SearchTracker::new(&self.host, &self.tracker)
    }

    /// Detach every listener and cancel pending timers
    pub fn end(self) {
        log::debug!(
            "session {} ended: {} technical interactions ({})",
            self.session_id,
            self.technical_interactions(),
            self.technical_background()
        );
    }
}

/// Record a page view for every route change
fn observe_page_views(host: &Host, tracker: &Tracker) -> Subscription {
    let tracker = tracker.clone();
    host.observe(SignalKind::Navigation, move |signal, ctx| {
        let Signal::Navigation(navigation) = signal else {
            return;
        };
        let title = navigation
            .title
            .as_deref()
            .or(ctx.environment().title.as_deref());
        tracker.page_view(&navigation.location(), title, None);
    })
}

/// A mounted blog post.
///
/// Unmounting (or dropping) the view detaches its progress sampler. Only an
/// explicit [`PostView::unmount`] credits the reading time to the session's
/// technical time.
pub struct PostView {
    post_slug: String,
    mounted_at: DateTime<Utc>,
    host: Host,
    classifier: Rc<RefCell<BackgroundClassifier>>,
    sampler: Option<ProgressSampler>,
}

impl std::fmt::Debug for PostView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostView")
            .field("post_slug", &self.post_slug)
            .field("mounted_at", &self.mounted_at)
            .field("sampling", &self.sampler.is_some())
            .finish()
    }
}

impl PostView {
    pub fn post_slug(&self) -> &str {
        &self.post_slug
    }

    pub fn mounted_at(&self) -> DateTime<Utc> {
        self.mounted_at
    }

    /// Current progress, or `None` when tracking is disabled
    pub fn progress(&self) -> Option<ReadingProgress> {
        self.sampler.as_ref().map(ProgressSampler::progress)
    }

    pub fn track_manual_progress(&self, percent: u8) {
        if let Some(sampler) = &self.sampler {
            sampler.track_manual_progress(percent);
        }
    }

    /// Detach the sampler and add the time spent to the technical time
    pub fn unmount(self) -> f64 {
        let elapsed = (self.host.now() - self.mounted_at).num_milliseconds() as f64 / 1000.0;
        let seconds = elapsed.max(0.0);
        self.classifier.borrow_mut().add_technical_time(seconds);
        if let Some(sampler) = self.sampler {
            sampler.deactivate();
        }
        seconds
    }
}
