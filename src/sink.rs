//! Analytics sink capability
//!
//! The sink is the single outbound edge of the engine. It receives
//! `(command, target, payload)` calls and owns everything about delivery; the
//! engine never waits on it and never learns whether a call succeeded.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::io::Write;

/// Sink command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkCommand {
    /// Library bootstrap, targeted at the session start timestamp
    Js,
    /// Session-scoped dimension update, targeted at the tracking id
    Config,
    /// Discrete occurrence, targeted at the action name
    Event,
}

/// Second argument of a sink call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SinkTarget {
    Timestamp(DateTime<Utc>),
    Id(String),
}

impl SinkTarget {
    pub fn as_id(&self) -> Option<&str> {
        match self {
            SinkTarget::Id(id) => Some(id),
            SinkTarget::Timestamp(_) => None,
        }
    }
}

/// One outbound call to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkCall {
    pub command: SinkCommand,
    pub target: SinkTarget,
    pub payload: Value,
}

impl SinkCall {
    /// Whether this is an `event` call for the given action
    pub fn is_event(&self, action: &str) -> bool {
        self.command == SinkCommand::Event && self.target.as_id() == Some(action)
    }

    /// `custom_map` entries of a config or event payload
    pub fn custom_map(&self) -> Option<&serde_json::Map<String, Value>> {
        self.payload.get("custom_map").and_then(Value::as_object)
    }

    /// Render as a JSON array `[command, target, payload]`, the wire shape of
    /// the browser reporting function
    pub fn to_wire(&self) -> Value {
        let target = match &self.target {
            SinkTarget::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            SinkTarget::Id(id) => Value::String(id.clone()),
        };
        let command = match self.command {
            SinkCommand::Js => "js",
            SinkCommand::Config => "config",
            SinkCommand::Event => "event",
        };
        Value::Array(vec![
            Value::String(command.to_string()),
            target,
            self.payload.clone(),
        ])
    }
}

/// Injected reporting capability
pub trait Sink {
    /// Deliver one call. Failures stay inside the implementation.
    fn report(&self, call: &SinkCall);
}

/// Sink that drops every call
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn report(&self, _call: &SinkCall) {}
}

/// Sink that keeps every call in memory, in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: RefCell<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded calls
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.borrow().clone()
    }

    /// Remove and return all recorded calls
    pub fn drain(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Recorded `event` calls for one action
    pub fn events(&self, action: &str) -> Vec<SinkCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.is_event(action))
            .cloned()
            .collect()
    }

    /// Recorded `config` calls
    pub fn configs(&self) -> Vec<SinkCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.command == SinkCommand::Config)
            .cloned()
            .collect()
    }
}

impl Sink for RecordingSink {
    fn report(&self, call: &SinkCall) {
        self.calls.borrow_mut().push(call.clone());
    }
}

/// Sink writing one JSON line per call
pub struct JsonLinesSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn report(&self, call: &SinkCall) {
        let mut writer = self.writer.borrow_mut();
        if let Err(e) = writeln!(writer, "{}", call.to_wire()) {
            log::warn!("Dropping sink call {:?}: {}", call.command, e);
        }
    }
}
