//! Heuristic performance alerts for running tests: early winners,
//! flat results, weak conversion, and thin samples.

use crate::metrics::MetricTracker;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nurture_core::clock::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Conversion-rate multiple over the cross-variant average that marks
/// an early winner.
const EARLY_WINNER_MULTIPLE: f64 = 1.2;
/// Impressions a variant needs before the winner heuristic trusts it.
const EARLY_WINNER_MIN_IMPRESSIONS: u64 = 1000;
/// Average conversion rate below which the test is flagged weak.
const LOW_CONVERSION_RATE: f64 = 0.01;
/// Total impressions before the weak-conversion heuristic fires.
const LOW_CONVERSION_MIN_IMPRESSIONS: u64 = 5000;
/// Half-width of the flat band around the average rate, in points.
const NO_DIFFERENCE_BAND: f64 = 0.005;
/// Per-variant impressions before the flat heuristic fires.
const NO_DIFFERENCE_MIN_IMPRESSIONS: u64 = 2000;
/// Per-variant impressions below which the sample is considered thin.
const SAMPLE_SIZE_FLOOR: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    EarlyWinner,
    NoDifference,
    HighVariance,
    LowConversion,
    SampleSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: Uuid,
    pub test_id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommendation: String,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Evaluates alert heuristics against current snapshots and keeps the
/// per-test alert log. Alerts persist until explicitly resolved; a
/// heuristic that keeps matching keeps appending.
pub struct AlertEngine {
    tracker: Arc<MetricTracker>,
    alerts: DashMap<String, Vec<PerformanceAlert>>,
    clock: Arc<dyn Clock>,
}

impl AlertEngine {
    pub fn new(tracker: Arc<MetricTracker>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tracker,
            alerts: DashMap::new(),
            clock,
        }
    }

    /// Run every heuristic against the test's current snapshot and
    /// append at most one alert per heuristic. Returns the new alerts.
    pub fn check_alerts(&self, test_id: &str) -> Vec<PerformanceAlert> {
        let Some(snapshot) = self.tracker.current_snapshot(test_id) else {
            return Vec::new();
        };

        let avg_rate = snapshot.summary.avg_conversion_rate;
        let mut new_alerts = Vec::new();

        // Best qualifying variant well above the pack.
        let winner = snapshot
            .variants
            .iter()
            .filter(|v| {
                v.impressions >= EARLY_WINNER_MIN_IMPRESSIONS
                    && avg_rate > 0.0
                    && v.conversion_rate > avg_rate * EARLY_WINNER_MULTIPLE
            })
            .max_by(|a, b| a.conversion_rate.total_cmp(&b.conversion_rate));
        if let Some(v) = winner {
            new_alerts.push(self.build_alert(
                test_id,
                AlertType::EarlyWinner,
                AlertSeverity::High,
                format!(
                    "variant {} converts at {:.2}% against a {:.2}% average",
                    v.variant_id,
                    v.conversion_rate * 100.0,
                    avg_rate * 100.0
                ),
                "consider concluding the test and promoting this variant".to_string(),
            ));
        }

        if snapshot.summary.total_impressions >= LOW_CONVERSION_MIN_IMPRESSIONS
            && avg_rate < LOW_CONVERSION_RATE
        {
            new_alerts.push(self.build_alert(
                test_id,
                AlertType::LowConversion,
                AlertSeverity::High,
                format!(
                    "average conversion rate {:.2}% across {} impressions",
                    avg_rate * 100.0,
                    snapshot.summary.total_impressions
                ),
                "revisit the base template; no variant is converting".to_string(),
            ));
        }

        let all_flat = snapshot.variants.len() >= 2
            && snapshot.variants.iter().all(|v| {
                v.impressions >= NO_DIFFERENCE_MIN_IMPRESSIONS
                    && (v.conversion_rate - avg_rate).abs() < NO_DIFFERENCE_BAND
            });
        if all_flat {
            new_alerts.push(self.build_alert(
                test_id,
                AlertType::NoDifference,
                AlertSeverity::Medium,
                format!(
                    "all {} variants convert within {:.1} points of the average",
                    snapshot.variants.len(),
                    NO_DIFFERENCE_BAND * 100.0
                ),
                "stop the test; the variations are not moving the metric".to_string(),
            ));
        }

        let thin = snapshot
            .variants
            .iter()
            .filter(|v| v.impressions < SAMPLE_SIZE_FLOOR)
            .count();
        if thin > 0 {
            new_alerts.push(self.build_alert(
                test_id,
                AlertType::SampleSize,
                AlertSeverity::Low,
                format!("{thin} variant(s) below {SAMPLE_SIZE_FLOOR} impressions"),
                "keep the test running before drawing conclusions".to_string(),
            ));
        }

        if !new_alerts.is_empty() {
            for alert in &new_alerts {
                info!(
                    test_id,
                    alert_type = ?alert.alert_type,
                    severity = ?alert.severity,
                    "performance alert triggered"
                );
            }
            self.alerts
                .entry(test_id.to_string())
                .or_default()
                .extend(new_alerts.clone());
        }
        new_alerts
    }

    /// Unresolved alerts for a test.
    pub fn active_alerts(&self, test_id: &str) -> Vec<PerformanceAlert> {
        self.alerts
            .get(test_id)
            .map(|alerts| {
                alerts
                    .iter()
                    .filter(|a| a.resolved_at.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark one alert resolved. Returns false when the id is unknown or
    /// already resolved.
    pub fn resolve(&self, test_id: &str, alert_id: Uuid) -> bool {
        let Some(mut alerts) = self.alerts.get_mut(test_id) else {
            return false;
        };
        match alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.resolved_at.is_none())
        {
            Some(alert) => {
                alert.resolved_at = Some(self.clock.now());
                true
            }
            None => false,
        }
    }

    fn build_alert(
        &self,
        test_id: &str,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: String,
        recommendation: String,
    ) -> PerformanceAlert {
        PerformanceAlert {
            id: Uuid::new_v4(),
            test_id: test_id.to_string(),
            alert_type,
            severity,
            message,
            recommendation,
            triggered_at: self.clock.now(),
            resolved_at: None,
        }
    }
}
