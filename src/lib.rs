//! Pagepulse - Client-side behavioral analytics engine
//!
//! Pagepulse turns raw page signals (route changes, scroll positions, clicks,
//! load timing) into a stream of semantic analytics events: reading progress
//! milestones, conversion funnel stages, an inferred technical background,
//! geographic market dimensions, engagement and performance metrics.
//!
//! ## Modules
//!
//! - **Session**: [`AnalyticsSession`] wires every observer to a [`Host`]
//! - **Observers**: progress sampler, funnel resolver, background classifier,
//!   geographic inference, engagement and performance listeners
//! - **Replay**: drive a session from a recorded signal stream (CLI and FFI)

pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod observers;
pub mod replay;
pub mod session;
pub mod signal;
pub mod sink;
pub mod tracker;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{Environment, TrackingConfig};
pub use error::TrackError;
pub use event::{Event, EventKind};
pub use host::{Host, SignalContext, Subscription};
pub use session::{AnalyticsSession, PostView};
pub use signal::{ClickTarget, Navigation, NavigationTiming, PerformanceEntry, ScrollMetrics, Signal};
pub use sink::{JsonLinesSink, NoopSink, RecordingSink, Sink, SinkCall, SinkCommand, SinkTarget};
pub use tracker::Tracker;

// Replay exports
pub use replay::{replay_session, ReplayAction, ReplayProcessor, ReplayRecord, REPLAY_FORMAT};

/// Pagepulse version
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI layer
pub const PRODUCER_NAME: &str = "pagepulse";
