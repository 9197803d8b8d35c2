//! Normal-approximation test statistics: per-variant conversion rates,
//! confidence intervals, required sample sizes, and achieved power.
//! Deliberately not a full inference engine.

use crate::metrics::MetricTracker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// z for 95% two-sided significance.
const Z_ALPHA: f64 = 1.96;
/// z for 80% power.
const Z_BETA: f64 = 0.84;
/// Fixed detectable effect: 10 conversion-rate points.
const MIN_DETECTABLE_EFFECT: f64 = 0.10;

/// One arm of a running test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestArm {
    pub variant_id: String,
    pub is_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalAnalysis {
    pub variant_id: String,
    pub is_control: bool,
    pub sample_size: u64,
    pub conversion_rate: f64,
    pub standard_error: f64,
    pub confidence_interval_lower: f64,
    pub confidence_interval_upper: f64,
    pub required_sample_size: u64,
    pub power: f64,
    pub relative_improvement: f64,
}

pub struct StatisticalAnalyzer {
    tracker: Arc<MetricTracker>,
}

impl StatisticalAnalyzer {
    pub fn new(tracker: Arc<MetricTracker>) -> Self {
        Self { tracker }
    }

    /// Analyze every arm of a test against its current event counts.
    /// Arms without any recorded events come back fully zeroed.
    pub fn analyze(&self, test_id: &str, arms: &[TestArm]) -> Vec<StatisticalAnalysis> {
        let snapshot = self.tracker.current_snapshot(test_id);

        let counts_for = |variant_id: &str| -> (u64, u64) {
            snapshot
                .as_ref()
                .and_then(|s| s.variants.iter().find(|v| v.variant_id == variant_id))
                .map(|v| (v.impressions, v.conversions))
                .unwrap_or((0, 0))
        };

        let control_rate = arms.iter().find(|a| a.is_control).map(|control| {
            let (n, conv) = counts_for(&control.variant_id);
            if n > 0 {
                conv as f64 / n as f64
            } else {
                0.0
            }
        });

        arms.iter()
            .map(|arm| {
                let (n, conversions) = counts_for(&arm.variant_id);
                let analysis = analyze_arm(arm, n, conversions, control_rate);
                debug!(
                    test_id,
                    variant_id = %arm.variant_id,
                    rate = analysis.conversion_rate,
                    power = analysis.power,
                    "analyzed test arm"
                );
                analysis
            })
            .collect()
    }
}

fn analyze_arm(
    arm: &TestArm,
    impressions: u64,
    conversions: u64,
    control_rate: Option<f64>,
) -> StatisticalAnalysis {
    if impressions == 0 {
        return StatisticalAnalysis {
            variant_id: arm.variant_id.clone(),
            is_control: arm.is_control,
            sample_size: 0,
            conversion_rate: 0.0,
            standard_error: 0.0,
            confidence_interval_lower: 0.0,
            confidence_interval_upper: 0.0,
            required_sample_size: required_sample_size(0.0),
            power: 0.0,
            relative_improvement: 0.0,
        };
    }

    let n = impressions as f64;
    let p = conversions as f64 / n;
    let se = (p * (1.0 - p) / n).sqrt();

    let power = if se == 0.0 {
        0.0
    } else {
        1.0 - normal_cdf(Z_ALPHA - MIN_DETECTABLE_EFFECT / se)
    };

    let relative_improvement = match control_rate {
        Some(cr) if !arm.is_control && cr > 0.0 => (p - cr) / cr,
        _ => 0.0,
    };

    StatisticalAnalysis {
        variant_id: arm.variant_id.clone(),
        is_control: arm.is_control,
        sample_size: impressions,
        conversion_rate: p,
        standard_error: se,
        confidence_interval_lower: (p - Z_ALPHA * se).max(0.0),
        confidence_interval_upper: (p + Z_ALPHA * se).min(1.0),
        required_sample_size: required_sample_size(p),
        power,
        relative_improvement,
    }
}

/// Per-arm sample size to detect the fixed effect at 80% power and 5%
/// significance, from the two-proportion normal approximation.
fn required_sample_size(p1: f64) -> u64 {
    let p2 = (p1 + MIN_DETECTABLE_EFFECT).min(1.0);
    let effect = p2 - p1;
    if effect == 0.0 {
        return 0;
    }
    let variance = p1 * (1.0 - p1) + p2 * (1.0 - p2);
    let n = (Z_ALPHA + Z_BETA).powi(2) * variance / (effect * effect);
    n.ceil() as u64
}

/// Standard normal CDF via the Abramowitz-Stegun 26.2.17 polynomial.
fn normal_cdf(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.2316419 * z);
    let d = 0.3989422804014327;
    let tail = d
        * (-z * z / 2.0).exp()
        * (t * (0.3193815
            + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274)))));
    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}
