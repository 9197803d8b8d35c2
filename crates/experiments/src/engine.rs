//! Facade wiring the tracker, analyzer, alert engine, and variant
//! generator behind one service object. Owns the test registry and the
//! insights cache; the composition root constructs exactly one.

use crate::alerts::{AlertEngine, PerformanceAlert};
use crate::metrics::{MetricCounts, MetricKind, MetricTracker, TestPerformanceSnapshot};
use crate::statistics::{StatisticalAnalysis, StatisticalAnalyzer, TestArm};
use crate::variants::{Suggestion, TargetMetric, TestVariant, VariantGenerator};
use dashmap::DashMap;
use nurture_cache::TtlCache;
use nurture_core::clock::Clock;
use nurture_core::config::EngineConfig;
use nurture_core::types::Template;
use nurture_core::{NurtureError, NurtureResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub struct ExperimentEngine {
    tracker: Arc<MetricTracker>,
    analyzer: StatisticalAnalyzer,
    alert_engine: AlertEngine,
    generator: VariantGenerator,
    tests: DashMap<String, Vec<TestArm>>,
    insights: TtlCache<String, Vec<StatisticalAnalysis>>,
    insights_ttl: Duration,
    retention_days: i64,
}

impl ExperimentEngine {
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let tracker = Arc::new(MetricTracker::new(clock.clone()));
        info!(
            insights_ttl_secs = config.cache.insights_ttl_secs,
            retention_days = config.tracking.retention_days,
            "experiment engine initialized"
        );
        Self {
            analyzer: StatisticalAnalyzer::new(tracker.clone()),
            alert_engine: AlertEngine::new(tracker.clone(), clock.clone()),
            generator: VariantGenerator::new(clock.clone()),
            tests: DashMap::new(),
            insights: TtlCache::new(config.cache.max_entries),
            insights_ttl: Duration::from_secs(config.cache.insights_ttl_secs),
            retention_days: config.tracking.retention_days,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<MetricTracker> {
        &self.tracker
    }

    pub fn generator(&self) -> &VariantGenerator {
        &self.generator
    }

    /// Register a test and its arms. At most one arm may be the control.
    pub fn create_test(&self, test_id: &str, variants: &[TestVariant]) -> NurtureResult<()> {
        if test_id.is_empty() {
            return Err(NurtureError::Validation(
                "test_id must be non-empty".to_string(),
            ));
        }
        if variants.is_empty() {
            return Err(NurtureError::Validation(
                "a test needs at least one variant".to_string(),
            ));
        }
        if variants.iter().filter(|v| v.is_control).count() > 1 {
            return Err(NurtureError::Validation(
                "a test may have at most one control variant".to_string(),
            ));
        }
        let arms: Vec<TestArm> = variants
            .iter()
            .map(|v| TestArm {
                variant_id: v.variant_id.clone(),
                is_control: v.is_control,
            })
            .collect();
        info!(test_id, arms = arms.len(), "registered test");
        self.tests.insert(test_id.to_string(), arms);
        Ok(())
    }

    /// Record one event, invalidate cached insights, and run the alert
    /// heuristics. Returns any newly triggered alerts.
    pub fn track(
        &self,
        test_id: &str,
        variant_id: &str,
        kind: MetricKind,
        metadata: Option<Value>,
    ) -> NurtureResult<Vec<PerformanceAlert>> {
        self.tracker.track(test_id, variant_id, kind, metadata)?;
        self.insights.invalidate(&test_id.to_string());
        Ok(self.alert_engine.check_alerts(test_id))
    }

    pub fn track_batch(
        &self,
        test_id: &str,
        variant_id: &str,
        counts: MetricCounts,
        metadata: Option<Value>,
    ) -> NurtureResult<Vec<PerformanceAlert>> {
        self.tracker
            .track_batch(test_id, variant_id, counts, metadata)?;
        self.insights.invalidate(&test_id.to_string());
        Ok(self.alert_engine.check_alerts(test_id))
    }

    pub fn snapshot(&self, test_id: &str) -> Option<TestPerformanceSnapshot> {
        self.tracker.current_snapshot(test_id)
    }

    pub fn record_snapshot(&self, test_id: &str) {
        self.tracker.record_snapshot(test_id);
    }

    /// Analyze a registered test against its registered arms.
    pub fn analyze(&self, test_id: &str) -> NurtureResult<Vec<StatisticalAnalysis>> {
        let arms = self
            .tests
            .get(test_id)
            .ok_or_else(|| NurtureError::NotFound(format!("test {test_id}")))?;
        Ok(self.analyzer.analyze(test_id, &arms))
    }

    /// Analysis with a short TTL cache in front, for read-heavy callers
    /// (dashboards). Stale entries are recomputed, not served.
    pub fn insights(&self, test_id: &str) -> NurtureResult<Vec<StatisticalAnalysis>> {
        let key = test_id.to_string();
        if let Some((cached, false)) = self.insights.get(&key) {
            return Ok(cached);
        }
        let fresh = self.analyze(test_id)?;
        self.insights.set(key, fresh.clone(), self.insights_ttl);
        Ok(fresh)
    }

    pub fn suggest(
        &self,
        template: &Template,
        target: TargetMetric,
        count: usize,
    ) -> Vec<Suggestion> {
        self.generator.generate_suggestions(template, target, count)
    }

    pub fn build_variants(
        &self,
        template: &Template,
        suggestions: &[Suggestion],
    ) -> NurtureResult<Vec<TestVariant>> {
        self.generator.generate_test_variants(template, suggestions)
    }

    pub fn active_alerts(&self, test_id: &str) -> Vec<PerformanceAlert> {
        self.alert_engine.active_alerts(test_id)
    }

    pub fn resolve_alert(&self, test_id: &str, alert_id: Uuid) -> bool {
        self.alert_engine.resolve(test_id, alert_id)
    }

    /// Retention sweep over raw events. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        self.tracker.cleanup(self.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nurture_core::clock::FixedClock;

    fn make_engine() -> ExperimentEngine {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        ExperimentEngine::new(&EngineConfig::default(), clock)
    }

    fn make_variants() -> Vec<TestVariant> {
        vec![
            TestVariant {
                variant_id: "control".to_string(),
                weight: 50,
                is_control: true,
                variation: None,
            },
            TestVariant {
                variant_id: "variant_1".to_string(),
                weight: 50,
                is_control: false,
                variation: None,
            },
        ]
    }

    #[test]
    fn create_test_rejects_bad_input() {
        let engine = make_engine();
        assert!(engine.create_test("", &make_variants()).is_err());
        assert!(engine.create_test("t1", &[]).is_err());

        let mut two_controls = make_variants();
        two_controls[1].is_control = true;
        assert!(engine.create_test("t1", &two_controls).is_err());
    }

    #[test]
    fn analyze_requires_a_registered_test() {
        let engine = make_engine();
        assert!(matches!(
            engine.analyze("ghost"),
            Err(NurtureError::NotFound(_))
        ));
    }

    #[test]
    fn tracking_feeds_analysis() {
        let engine = make_engine();
        engine.create_test("t1", &make_variants()).unwrap();
        engine
            .track_batch(
                "t1",
                "control",
                MetricCounts {
                    impressions: 100,
                    conversions: 5,
                    ..Default::default()
                },
                None,
            )
            .unwrap();

        let analyses = engine.analyze("t1").unwrap();
        assert_eq!(analyses.len(), 2);
        let control = analyses.iter().find(|a| a.is_control).unwrap();
        assert_eq!(control.sample_size, 100);
        assert!((control.conversion_rate - 0.05).abs() < 1e-9);
    }

    #[test]
    fn insights_are_cached_until_invalidated_by_tracking() {
        let engine = make_engine();
        engine.create_test("t1", &make_variants()).unwrap();
        engine
            .track("t1", "control", MetricKind::Impression, None)
            .unwrap();

        let first = engine.insights("t1").unwrap();
        let cached = engine.insights("t1").unwrap();
        assert_eq!(first.len(), cached.len());
        assert_eq!(
            first.iter().find(|a| a.is_control).unwrap().sample_size,
            1
        );

        engine
            .track("t1", "control", MetricKind::Impression, None)
            .unwrap();
        let refreshed = engine.insights("t1").unwrap();
        assert_eq!(
            refreshed.iter().find(|a| a.is_control).unwrap().sample_size,
            2
        );
    }

    #[test]
    fn tracking_a_thin_test_surfaces_the_sample_size_alert() {
        let engine = make_engine();
        engine.create_test("t1", &make_variants()).unwrap();
        let alerts = engine
            .track("t1", "control", MetricKind::Impression, None)
            .unwrap();
        assert!(!alerts.is_empty());
        assert!(!engine.active_alerts("t1").is_empty());

        let id = alerts[0].id;
        assert!(engine.resolve_alert("t1", id));
    }
}
