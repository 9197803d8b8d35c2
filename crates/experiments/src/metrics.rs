//! Live metric ingestion and point-in-time aggregation for running
//! tests. Events are append-only; snapshots are derived views kept as a
//! capped per-test time series.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use nurture_core::clock::Clock;
use nurture_core::{NurtureError, NurtureResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// 24 hours at 5-minute resolution.
const SNAPSHOT_HISTORY_CAP: usize = 288;

/// Discrete performance event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Impression,
    Open,
    Click,
    Response,
    Conversion,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Open => "open",
            Self::Click => "click",
            Self::Response => "response",
            Self::Conversion => "conversion",
        }
    }
}

/// One append-only performance event. `count` is always 1; batch
/// ingestion appends repeated events rather than folding counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub test_id: String,
    pub variant_id: String,
    pub kind: MetricKind,
    pub count: u32,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Unit counts for batch ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricCounts {
    pub impressions: u32,
    pub opens: u32,
    pub clicks: u32,
    pub responses: u32,
    pub conversions: u32,
}

/// Aggregated counts and derived rates for one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub variant_id: String,
    pub impressions: u64,
    pub opens: u64,
    pub clicks: u64,
    pub responses: u64,
    pub conversions: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub response_rate: f64,
    pub conversion_rate: f64,
}

/// Cross-variant summary. Rates are unweighted arithmetic means across
/// variants, not volume-weighted — callers comparing high- and
/// low-traffic variants must account for that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    pub total_impressions: u64,
    pub total_conversions: u64,
    pub avg_open_rate: f64,
    pub avg_click_rate: f64,
    pub avg_response_rate: f64,
    pub avg_conversion_rate: f64,
}

/// Point-in-time aggregation across all events for one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPerformanceSnapshot {
    pub test_id: String,
    pub variants: Vec<VariantSnapshot>,
    pub summary: TestSummary,
    pub captured_at: DateTime<Utc>,
}

/// Append-only event store with snapshot derivation. DashMap shards
/// serialize concurrent mutation per test without a global lock.
pub struct MetricTracker {
    events: DashMap<String, Vec<PerformanceMetric>>,
    history: DashMap<String, VecDeque<TestPerformanceSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl MetricTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: DashMap::new(),
            history: DashMap::new(),
            clock,
        }
    }

    /// Append one event. Rejects empty identifiers.
    pub fn track(
        &self,
        test_id: &str,
        variant_id: &str,
        kind: MetricKind,
        metadata: Option<Value>,
    ) -> NurtureResult<()> {
        if test_id.is_empty() || variant_id.is_empty() {
            return Err(NurtureError::Validation(
                "test_id and variant_id must be non-empty".to_string(),
            ));
        }
        self.events
            .entry(test_id.to_string())
            .or_default()
            .push(PerformanceMetric {
                test_id: test_id.to_string(),
                variant_id: variant_id.to_string(),
                kind,
                count: 1,
                timestamp: self.clock.now(),
                metadata,
            });
        metrics::counter!("experiments.events", "kind" => kind.as_str()).increment(1);
        Ok(())
    }

    /// Append one event per unit count.
    pub fn track_batch(
        &self,
        test_id: &str,
        variant_id: &str,
        counts: MetricCounts,
        metadata: Option<Value>,
    ) -> NurtureResult<()> {
        let kinds = [
            (MetricKind::Impression, counts.impressions),
            (MetricKind::Open, counts.opens),
            (MetricKind::Click, counts.clicks),
            (MetricKind::Response, counts.responses),
            (MetricKind::Conversion, counts.conversions),
        ];
        for (kind, count) in kinds {
            for _ in 0..count {
                self.track(test_id, variant_id, kind, metadata.clone())?;
            }
        }
        Ok(())
    }

    /// Aggregate all events for a test, or `None` if it has none.
    /// Variants come back in ascending id order for deterministic output.
    pub fn current_snapshot(&self, test_id: &str) -> Option<TestPerformanceSnapshot> {
        let events = self.events.get(test_id)?;
        if events.is_empty() {
            return None;
        }

        let mut counts: BTreeMap<String, [u64; 5]> = BTreeMap::new();
        for event in events.iter() {
            let slot = counts.entry(event.variant_id.clone()).or_default();
            let idx = match event.kind {
                MetricKind::Impression => 0,
                MetricKind::Open => 1,
                MetricKind::Click => 2,
                MetricKind::Response => 3,
                MetricKind::Conversion => 4,
            };
            slot[idx] += event.count as u64;
        }
        drop(events);

        let variants: Vec<VariantSnapshot> = counts
            .into_iter()
            .map(|(variant_id, [impressions, opens, clicks, responses, conversions])| {
                VariantSnapshot {
                    variant_id,
                    impressions,
                    opens,
                    clicks,
                    responses,
                    conversions,
                    open_rate: rate(opens, impressions),
                    click_rate: rate(clicks, impressions),
                    response_rate: rate(responses, impressions),
                    conversion_rate: rate(conversions, impressions),
                }
            })
            .collect();

        let n = variants.len() as f64;
        let summary = TestSummary {
            total_impressions: variants.iter().map(|v| v.impressions).sum(),
            total_conversions: variants.iter().map(|v| v.conversions).sum(),
            avg_open_rate: variants.iter().map(|v| v.open_rate).sum::<f64>() / n,
            avg_click_rate: variants.iter().map(|v| v.click_rate).sum::<f64>() / n,
            avg_response_rate: variants.iter().map(|v| v.response_rate).sum::<f64>() / n,
            avg_conversion_rate: variants.iter().map(|v| v.conversion_rate).sum::<f64>() / n,
        };

        Some(TestPerformanceSnapshot {
            test_id: test_id.to_string(),
            variants,
            summary,
            captured_at: self.clock.now(),
        })
    }

    /// Capture the current snapshot into the per-test history, evicting
    /// the oldest entry once the cap is reached.
    pub fn record_snapshot(&self, test_id: &str) {
        if let Some(snapshot) = self.current_snapshot(test_id) {
            let mut history = self.history.entry(test_id.to_string()).or_default();
            history.push_back(snapshot);
            while history.len() > SNAPSHOT_HISTORY_CAP {
                history.pop_front();
            }
        }
    }

    /// Retained snapshot series, oldest first.
    pub fn snapshot_history(&self, test_id: &str) -> Vec<TestPerformanceSnapshot> {
        self.history
            .get(test_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All tests that have recorded events.
    pub fn test_ids(&self) -> Vec<String> {
        self.events.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop events older than the retention window. Returns the number
    /// removed.
    pub fn cleanup(&self, max_age_days: i64) -> usize {
        let cutoff = self.clock.now() - Duration::days(max_age_days);
        let mut removed = 0;
        for mut entry in self.events.iter_mut() {
            let before = entry.len();
            entry.retain(|event| event.timestamp >= cutoff);
            removed += before - entry.len();
        }
        if removed > 0 {
            info!(removed, max_age_days, "cleaned up expired metric events");
        }
        removed
    }
}

fn rate(count: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        0.0
    } else {
        count as f64 / impressions as f64
    }
}

/// Periodic snapshot timer: captures every known test on each tick.
/// Hosts with their own scheduler can call `record_snapshot` directly
/// instead.
pub fn spawn_snapshot_task(
    tracker: Arc<MetricTracker>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            for test_id in tracker.test_ids() {
                tracker.record_snapshot(&test_id);
            }
            debug!("snapshot tick complete");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nurture_core::clock::FixedClock;
    use serde_json::json;

    fn make_tracker() -> (Arc<FixedClock>, MetricTracker) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let tracker = MetricTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn empty_ids_are_rejected() {
        let (_, tracker) = make_tracker();
        assert!(matches!(
            tracker.track("", "a", MetricKind::Impression, None),
            Err(NurtureError::Validation(_))
        ));
        assert!(matches!(
            tracker.track("t1", "", MetricKind::Open, None),
            Err(NurtureError::Validation(_))
        ));
    }

    #[test]
    fn snapshot_aggregates_counts_and_rates() {
        let (_, tracker) = make_tracker();
        tracker
            .track_batch(
                "t1",
                "a",
                MetricCounts {
                    impressions: 100,
                    opens: 40,
                    clicks: 10,
                    responses: 5,
                    conversions: 2,
                },
                None,
            )
            .unwrap();

        let snapshot = tracker.current_snapshot("t1").unwrap();
        assert_eq!(snapshot.variants.len(), 1);
        let variant = &snapshot.variants[0];
        assert_eq!(variant.impressions, 100);
        assert!((variant.open_rate - 0.4).abs() < 1e-9);
        assert!((variant.click_rate - 0.1).abs() < 1e-9);
        assert!((variant.conversion_rate - 0.02).abs() < 1e-9);
    }

    #[test]
    fn variant_with_no_impressions_has_zero_rates() {
        let (_, tracker) = make_tracker();
        tracker
            .track("t1", "a", MetricKind::Conversion, None)
            .unwrap();
        let snapshot = tracker.current_snapshot("t1").unwrap();
        assert_eq!(snapshot.variants[0].conversions, 1);
        assert_eq!(snapshot.variants[0].conversion_rate, 0.0);
    }

    #[test]
    fn summary_rates_are_unweighted_means() {
        let (_, tracker) = make_tracker();
        // Variant a: 100 impressions, 10 conversions (10%).
        // Variant b: 1000 impressions, 20 conversions (2%).
        tracker
            .track_batch(
                "t1",
                "a",
                MetricCounts {
                    impressions: 100,
                    conversions: 10,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        tracker
            .track_batch(
                "t1",
                "b",
                MetricCounts {
                    impressions: 1000,
                    conversions: 20,
                    ..Default::default()
                },
                None,
            )
            .unwrap();

        let snapshot = tracker.current_snapshot("t1").unwrap();
        // (0.10 + 0.02) / 2, not 30/1100.
        assert!((snapshot.summary.avg_conversion_rate - 0.06).abs() < 1e-9);
        assert_eq!(snapshot.summary.total_impressions, 1100);
    }

    #[test]
    fn unknown_test_has_no_snapshot() {
        let (_, tracker) = make_tracker();
        assert!(tracker.current_snapshot("nope").is_none());
    }

    #[test]
    fn snapshot_history_is_fifo_capped() {
        let (_, tracker) = make_tracker();
        tracker
            .track("t1", "a", MetricKind::Impression, None)
            .unwrap();
        for _ in 0..(SNAPSHOT_HISTORY_CAP + 10) {
            tracker.record_snapshot("t1");
        }
        let history = tracker.snapshot_history("t1");
        assert_eq!(history.len(), SNAPSHOT_HISTORY_CAP);
    }

    #[test]
    fn cleanup_removes_only_expired_events() {
        let (clock, tracker) = make_tracker();
        tracker
            .track("t1", "a", MetricKind::Impression, Some(json!({"src": "old"})))
            .unwrap();
        clock.advance(Duration::days(40));
        tracker
            .track("t1", "a", MetricKind::Impression, None)
            .unwrap();

        let removed = tracker.cleanup(30);
        assert_eq!(removed, 1);
        let snapshot = tracker.current_snapshot("t1").unwrap();
        assert_eq!(snapshot.variants[0].impressions, 1);
    }

    #[tokio::test]
    async fn snapshot_task_records_on_ticks() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let tracker = Arc::new(MetricTracker::new(clock));
        tracker
            .track("t1", "a", MetricKind::Impression, None)
            .unwrap();

        let handle = spawn_snapshot_task(tracker.clone(), std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        assert!(!tracker.snapshot_history("t1").is_empty());
    }
}
