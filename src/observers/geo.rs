//! Geographic inference from the browser timezone
//!
//! Two deliberately separate classifiers read the same timezone string: a
//! fine-grained market table reported as session dimensions, and a coarse
//! continent bucket used for variant testing.

use crate::config::Environment;
use crate::event::{Event, EventKind};
use crate::tracker::Tracker;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Inferred market and region pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoMarket {
    pub market: &'static str,
    pub region: &'static str,
}

impl GeoMarket {
    pub const UNKNOWN: GeoMarket = GeoMarket {
        market: "unknown",
        region: "unknown",
    };
}

/// Ordered market table; the first row with a matching substring wins
const MARKET_TABLE: &[(&[&str], GeoMarket)] = &[
    (
        &["America/New_York", "America/Chicago"],
        GeoMarket {
            market: "north_america_east",
            region: "US",
        },
    ),
    (
        &["America/Los_Angeles", "America/Denver"],
        GeoMarket {
            market: "north_america_west",
            region: "US",
        },
    ),
    (
        &["Europe/London"],
        GeoMarket {
            market: "europe_uk",
            region: "UK",
        },
    ),
    (
        &["Europe/"],
        GeoMarket {
            market: "europe_continental",
            region: "EU",
        },
    ),
    (
        &["Asia/"],
        GeoMarket {
            market: "asia_pacific",
            region: "APAC",
        },
    ),
];

/// Map a timezone to its market, falling back to unknown
pub fn infer_market(timezone: &str) -> GeoMarket {
    MARKET_TABLE
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| timezone.contains(p)))
        .map(|(_, market)| *market)
        .unwrap_or(GeoMarket::UNKNOWN)
}

/// Experiment variant bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoVariant {
    Europe,
    Asia,
    Americas,
    #[default]
    Default,
}

impl GeoVariant {
    /// Bucket a timezone by its continent prefix
    pub fn from_timezone(timezone: &str) -> Self {
        if timezone.contains("Europe/") {
            GeoVariant::Europe
        } else if timezone.contains("Asia/") {
            GeoVariant::Asia
        } else if timezone.contains("America/") {
            GeoVariant::Americas
        } else {
            GeoVariant::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoVariant::Europe => "europe",
            GeoVariant::Asia => "asia",
            GeoVariant::Americas => "americas",
            GeoVariant::Default => "default",
        }
    }
}

impl fmt::Display for GeoVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report timezone, locale and inferred market as session dimensions
pub fn report_market(tracker: &Tracker, environment: &Environment) -> GeoMarket {
    let market = infer_market(&environment.timezone);

    let mut dimensions = Map::new();
    dimensions.insert("timezone".to_string(), Value::String(environment.timezone.clone()));
    dimensions.insert("language".to_string(), Value::String(environment.locale.clone()));
    dimensions.insert("inferred_market".to_string(), Value::String(market.market.to_string()));
    dimensions.insert("inferred_region".to_string(), Value::String(market.region.to_string()));
    tracker.configure(dimensions);

    market
}

/// Assign the session's variant and report the assignment
pub fn assign_variant(tracker: &Tracker, environment: &Environment) -> GeoVariant {
    let variant = GeoVariant::from_timezone(&environment.timezone);
    tracker.emit(
        &Event::new(EventKind::VariantAssignment)
            .with_label(variant.as_str())
            .with_param("timezone", environment.timezone.as_str())
            .with_param("variant", variant.as_str()),
    );
    variant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::sink::RecordingSink;
    use std::rc::Rc;

    #[test]
    fn test_market_table() {
        assert_eq!(infer_market("America/New_York").market, "north_america_east");
        assert_eq!(infer_market("America/Chicago").region, "US");
        assert_eq!(infer_market("America/Denver").market, "north_america_west");
        assert_eq!(infer_market("Europe/London").market, "europe_uk");
        assert_eq!(infer_market("Europe/Berlin").market, "europe_continental");
        assert_eq!(infer_market("Europe/Berlin").region, "EU");
        assert_eq!(infer_market("Asia/Tokyo").region, "APAC");
        assert_eq!(infer_market("America/Sao_Paulo"), GeoMarket::UNKNOWN);
        assert_eq!(infer_market("UTC"), GeoMarket::UNKNOWN);
    }

    #[test]
    fn test_variant_is_coarser_than_market() {
        assert_eq!(GeoVariant::from_timezone("America/Sao_Paulo"), GeoVariant::Americas);
        assert_eq!(GeoVariant::from_timezone("Europe/London"), GeoVariant::Europe);
        assert_eq!(GeoVariant::from_timezone("Asia/Kolkata"), GeoVariant::Asia);
        assert_eq!(GeoVariant::from_timezone("Australia/Sydney"), GeoVariant::Default);
    }

    #[test]
    fn test_reports() {
        let sink = Rc::new(RecordingSink::new());
        let tracker = Tracker::new(&TrackingConfig::new("G-TEST"), sink.clone());
        let env = Environment::new("example.dev")
            .with_timezone("Europe/London")
            .with_locale("en-GB");

        let market = report_market(&tracker, &env);
        let variant = assign_variant(&tracker, &env);
        assert_eq!(market.region, "UK");
        assert_eq!(variant, GeoVariant::Europe);

        let configs = sink.configs();
        assert_eq!(configs.len(), 1);
        let dims = configs[0].custom_map().unwrap();
        assert_eq!(dims["language"], "en-GB");
        assert_eq!(dims["inferred_market"], "europe_uk");

        let events = sink.events("variant_assignment");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["event_label"], "europe");
        assert_eq!(events[0].payload["custom_map"]["timezone"], "Europe/London");
    }
}
