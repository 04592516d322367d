//! Technical background inference

use crate::tracker::Tracker;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Ordinal sophistication inferred from interaction volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalBackground {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl TechnicalBackground {
    /// Classify an interaction count
    pub fn from_interactions(count: u32) -> Self {
        match count {
            c if c > 20 => TechnicalBackground::Expert,
            c if c > 10 => TechnicalBackground::Advanced,
            c if c > 5 => TechnicalBackground::Intermediate,
            _ => TechnicalBackground::Beginner,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TechnicalBackground::Beginner => "beginner",
            TechnicalBackground::Intermediate => "intermediate",
            TechnicalBackground::Advanced => "advanced",
            TechnicalBackground::Expert => "expert",
        }
    }
}

impl fmt::Display for TechnicalBackground {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session interaction counter.
///
/// The classification is recomputed and re-reported on every interaction, not
/// only when it crosses a threshold.
#[derive(Debug)]
pub struct BackgroundClassifier {
    tracker: Tracker,
    interactions: u32,
    technical_seconds: f64,
}

impl BackgroundClassifier {
    pub fn new(tracker: &Tracker) -> Self {
        Self {
            tracker: tracker.clone(),
            interactions: 0,
            technical_seconds: 0.0,
        }
    }

    /// Count one qualifying interaction and report the resulting category
    pub fn record_interaction(&mut self) -> TechnicalBackground {
        self.interactions = self.interactions.saturating_add(1);
        let background = TechnicalBackground::from_interactions(self.interactions);

        let mut dimensions = Map::new();
        dimensions.insert(
            "technical_background".to_string(),
            Value::String(background.as_str().to_string()),
        );
        self.tracker.configure(dimensions);

        background
    }

    /// Accumulate time spent on technical content
    pub fn add_technical_time(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.technical_seconds += seconds;
        }
    }

    pub fn interactions(&self) -> u32 {
        self.interactions
    }

    pub fn technical_seconds(&self) -> f64 {
        self.technical_seconds
    }

    /// Current category without recording anything
    pub fn background(&self) -> TechnicalBackground {
        TechnicalBackground::from_interactions(self.interactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::sink::RecordingSink;
    use std::rc::Rc;

    #[test]
    fn test_thresholds() {
        assert_eq!(TechnicalBackground::from_interactions(0), TechnicalBackground::Beginner);
        assert_eq!(TechnicalBackground::from_interactions(1), TechnicalBackground::Beginner);
        assert_eq!(TechnicalBackground::from_interactions(5), TechnicalBackground::Beginner);
        assert_eq!(TechnicalBackground::from_interactions(6), TechnicalBackground::Intermediate);
        assert_eq!(TechnicalBackground::from_interactions(10), TechnicalBackground::Intermediate);
        assert_eq!(TechnicalBackground::from_interactions(11), TechnicalBackground::Advanced);
        assert_eq!(TechnicalBackground::from_interactions(20), TechnicalBackground::Advanced);
        assert_eq!(TechnicalBackground::from_interactions(21), TechnicalBackground::Expert);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let mut previous = TechnicalBackground::Beginner;
        for count in 0..100 {
            let current = TechnicalBackground::from_interactions(count);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_reports_on_every_interaction() {
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let mut classifier = BackgroundClassifier::new(&tracker);

        let mut seen = Vec::new();
        for _ in 0..21 {
            seen.push(classifier.record_interaction());
        }

        assert_eq!(seen[0], TechnicalBackground::Beginner);
        assert_eq!(seen[5], TechnicalBackground::Intermediate);
        assert_eq!(seen[10], TechnicalBackground::Advanced);
        assert_eq!(seen[20], TechnicalBackground::Expert);

        let configs = sink.configs();
        assert_eq!(configs.len(), 21);
        assert_eq!(configs[0].payload["custom_map"]["technical_background"], "beginner");
        assert_eq!(configs[20].payload["custom_map"]["technical_background"], "expert");
    }

    #[test]
    fn test_technical_time_ignores_invalid_input() {
        let mut classifier = BackgroundClassifier::new(&Tracker::disabled());
        classifier.add_technical_time(30.0);
        classifier.add_technical_time(-5.0);
        classifier.add_technical_time(f64::NAN);
        assert_eq!(classifier.technical_seconds(), 30.0);
        assert_eq!(classifier.interactions(), 0);
    }
}
