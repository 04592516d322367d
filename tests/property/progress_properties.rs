use chrono::{Duration, TimeZone, Utc};
use pagepulse::observers::{ReadingProgress, ScrollDepth};
use pagepulse::{EventKind, ScrollMetrics};
use proptest::prelude::*;

fn samples() -> impl Strategy<Value = Vec<ScrollMetrics>> {
    prop::collection::vec(-200.0f64..2400.0, 0..80)
        .prop_map(|ys| ys.into_iter().map(|y| ScrollMetrics::new(y, 2100.0, 100.0)).collect())
}

proptest! {
    #[test]
    fn milestones_strictly_increase_on_the_grid(metrics in samples()) {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let mut progress = ReadingProgress::new("post", start);

        let mut milestones = Vec::new();
        let mut completions = 0;
        for (i, m) in metrics.iter().enumerate() {
            for event in progress.observe(m, start + Duration::seconds(i as i64)) {
                match event.kind {
                    EventKind::ReadingProgress => milestones.push(event.value.unwrap_or(-1.0)),
                    EventKind::BlogPostComplete => completions += 1,
                    other => prop_assert!(false, "unexpected event {:?}", other),
                }
            }
        }

        let max_sample = metrics.iter().map(ScrollMetrics::percent).max().unwrap_or(0);
        prop_assert!(milestones.windows(2).all(|w| w[0] < w[1]), "not increasing: {:?}", milestones);
        for m in &milestones {
            prop_assert!(*m > 0.0 && *m % 10.0 == 0.0, "off grid: {}", m);
            prop_assert!(*m <= f64::from(max_sample), "{} above max sample {}", m, max_sample);
        }
        prop_assert!(completions <= 1);
        prop_assert_eq!(completions == 1, max_sample >= 90);
        prop_assert_eq!(progress.completed, max_sample >= 90);
    }

    #[test]
    fn scroll_depth_strictly_increases_on_quarters(metrics in samples()) {
        let depth = ScrollDepth::new();
        let reported: Vec<u8> = metrics.iter().filter_map(|m| depth.observe(m)).collect();

        let max_sample = metrics.iter().map(ScrollMetrics::percent).max().unwrap_or(0);
        prop_assert!(reported.windows(2).all(|w| w[0] < w[1]), "not increasing: {:?}", reported);
        for d in &reported {
            prop_assert!(*d > 0 && *d % 25 == 0 && *d <= max_sample);
        }
        prop_assert_eq!(depth.max_depth(), reported.last().copied().unwrap_or(0));
    }
}
