//! Signal observers
//!
//! Each observer turns one family of host signals (or explicit component
//! calls) into semantic events on the session's [`Tracker`](crate::Tracker).

pub mod background;
pub mod content;
pub mod engagement;
pub mod funnel;
pub mod geo;
pub mod performance;
pub mod progress;

pub use background::{BackgroundClassifier, TechnicalBackground};
pub use content::{CodeSnippetTracker, FormTracker, SearchTracker};
pub use engagement::{
    classify_link, is_download, observe_code_interactions, observe_external_links,
    observe_scroll_depth, parse_hostname, LinkDestination, ScrollDepth,
};
pub use funnel::{resolve_stage, traffic_source, FunnelResolver, FunnelStage};
pub use geo::{assign_variant, infer_market, report_market, GeoMarket, GeoVariant};
pub use performance::{load_metrics, observe_web_vitals, LoadMetric, PerformanceCollector};
pub use progress::{ProgressSampler, ReadingProgress};
