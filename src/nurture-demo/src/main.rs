//! Nurture engine demo — seeds a template catalog, runs selection for a
//! few sample leads, then drives a simulated A/B test end to end.

use chrono::Utc;
use clap::Parser;
use nurture_core::clock::{Clock, SystemClock};
use nurture_core::config::EngineConfig;
use nurture_core::types::{
    Channel, Condition, ConditionOperator, EngagementLevel, LeadCharacteristics, LeadStage,
    Template, TemplateCategory, TemplatePerformance, TemplateStatus, Timeline, UrgencyLevel,
};
use nurture_experiments::{
    spawn_snapshot_task, ExperimentEngine, MetricCounts, TargetMetric,
};
use nurture_matching::{
    CachedCatalog, CatalogFilter, InMemoryCatalog, SelectionOptions, TemplateCatalog,
    TemplateSelector,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "nurture-demo")]
#[command(about = "Template selection and experimentation engine demo")]
#[command(version)]
struct Cli {
    /// Impressions to simulate across the test
    #[arg(long, default_value_t = 6000)]
    impressions: u32,

    /// Suggestions to test against the base template
    #[arg(long, default_value_t = 2)]
    suggestions: usize,

    /// RNG seed for the traffic simulation
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nurture_demo=info,nurture_matching=info,nurture_experiments=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config = EngineConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        EngineConfig::default()
    });
    info!(
        min_score = config.selection.min_score,
        max_results = config.selection.max_results,
        template_ttl_secs = config.cache.template_ttl_secs,
        snapshot_interval_secs = config.tracking.snapshot_interval_secs,
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let catalog = CachedCatalog::new(
        seed_catalog(),
        std::time::Duration::from_secs(config.cache.template_ttl_secs),
        config.cache.max_entries,
    );
    let selector = TemplateSelector::new();

    // Selection pass over a few representative leads.
    let candidates = catalog.list(&CatalogFilter::active());
    for (label, lead) in sample_leads() {
        let options = SelectionOptions {
            min_score: config.selection.min_score,
            max_results: config.selection.max_results,
            include_fallbacks: config.selection.include_fallbacks,
            ..Default::default()
        };
        let results = selector.select(&lead, &candidates, &options);
        match results.first() {
            Some(best) => info!(
                lead = label,
                template = %best.template_name,
                score = best.score,
                confidence = ?best.confidence,
                matched_rules = best.matched_rules.len(),
                "selected template"
            ),
            None => warn!(lead = label, "no template cleared the threshold"),
        }
    }

    // Experimentation pass on the default follow-up template.
    let engine = ExperimentEngine::new(&config, clock);
    let base = catalog
        .list(&CatalogFilter {
            category: Some(TemplateCategory::FollowUp),
            channel: Some(Channel::Email),
            status: Some(TemplateStatus::Active),
        })
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("seed catalog is missing the follow-up template"))?;

    let suggestions = engine.suggest(&base, TargetMetric::OpenRate, cli.suggestions);
    for s in &suggestions {
        info!(name = %s.name, confidence = s.confidence, impact = ?s.expected_impact, "suggestion");
    }

    let variants = engine.build_variants(&base, &suggestions)?;
    let test_id = "demo-open-rate-test";
    engine.create_test(test_id, &variants)?;

    let snapshot_task = spawn_snapshot_task(
        engine.tracker().clone(),
        std::time::Duration::from_secs(config.tracking.snapshot_interval_secs),
    );

    // Simulated traffic: the first non-control variant genuinely
    // converts better, the rest track the control.
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let per_variant = cli.impressions / variants.len() as u32;
    for (idx, variant) in variants.iter().enumerate() {
        let open_p = if idx == 1 { 0.48 } else { 0.40 };
        let conv_p = if idx == 1 { 0.045 } else { 0.025 };
        let counts = simulate_counts(&mut rng, per_variant, open_p, conv_p);
        let alerts = engine.track_batch(
            test_id,
            &variant.variant_id,
            counts,
            Some(json!({"source": "simulation"})),
        )?;
        for alert in alerts {
            info!(
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                message = %alert.message,
                recommendation = %alert.recommendation,
                "alert triggered"
            );
        }
    }

    engine.record_snapshot(test_id);

    if let Some(snapshot) = engine.snapshot(test_id) {
        info!(
            total_impressions = snapshot.summary.total_impressions,
            total_conversions = snapshot.summary.total_conversions,
            avg_conversion_rate = snapshot.summary.avg_conversion_rate,
            "test snapshot"
        );
    }

    for analysis in engine.insights(test_id)? {
        info!(
            variant = %analysis.variant_id,
            is_control = analysis.is_control,
            n = analysis.sample_size,
            rate = analysis.conversion_rate,
            ci_lower = analysis.confidence_interval_lower,
            ci_upper = analysis.confidence_interval_upper,
            required_n = analysis.required_sample_size,
            power = analysis.power,
            improvement = analysis.relative_improvement,
            "analysis"
        );
    }

    let removed = engine.cleanup();
    info!(removed, active_alerts = engine.active_alerts(test_id).len(), "demo complete");

    snapshot_task.abort();
    Ok(())
}

fn simulate_counts(rng: &mut StdRng, impressions: u32, open_p: f64, conv_p: f64) -> MetricCounts {
    let mut counts = MetricCounts {
        impressions,
        ..Default::default()
    };
    for _ in 0..impressions {
        if rng.gen_bool(open_p) {
            counts.opens += 1;
            if rng.gen_bool(0.3) {
                counts.clicks += 1;
            }
            if rng.gen_bool(0.2) {
                counts.responses += 1;
            }
        }
        if rng.gen_bool(conv_p) {
            counts.conversions += 1;
        }
    }
    counts
}

fn make_template(
    name: &str,
    category: TemplateCategory,
    channel: Channel,
    subject: Option<&str>,
    content: &str,
    priority: u8,
    is_default: bool,
) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category,
        channel,
        status: TemplateStatus::Active,
        subject: subject.map(str::to_string),
        content: content.to_string(),
        variables: vec![],
        conditions: vec![],
        priority,
        is_default,
        performance: TemplatePerformance::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn seed_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();

    let mut follow_up = make_template(
        "follow-up-email",
        TemplateCategory::FollowUp,
        Channel::Email,
        Some("Checking in on your home search"),
        "Hi {{first_name}},\n\nJust checking in on your search. A few new listings \
         match what you described.\n\nBest,\n{{agent_name}}",
        7,
        true,
    );
    follow_up.conditions = vec![Condition {
        variable: "lead_score".to_string(),
        operator: ConditionOperator::GreaterThan,
        value: json!(50),
        weight: 60,
    }];

    let templates = vec![
        follow_up,
        make_template(
            "showing-invite",
            TemplateCategory::PropertyShowing,
            Channel::Email,
            Some("Want to see it in person?"),
            "Hi {{first_name}}, the property at {{address}} has an open house this \
             weekend. Would you like a private showing?",
            6,
            false,
        ),
        make_template(
            "nurture-drip",
            TemplateCategory::Nurturing,
            Channel::Email,
            Some("This month in your market"),
            "Hi {{first_name}}, here is what changed in {{city}} this month: \
             inventory, median price, and days on market.",
            4,
            false,
        ),
        make_template(
            "re-engage-sms",
            TemplateCategory::ReEngagement,
            Channel::Sms,
            None,
            "Hi {{first_name}}, it's been a while! Still thinking about \
             {{city}}? New listings just came up.",
            5,
            false,
        ),
    ];

    for template in templates {
        if let Err(e) = catalog.upsert(template) {
            warn!(error = %e, "failed to seed template");
        }
    }
    catalog
}

fn sample_leads() -> Vec<(&'static str, LeadCharacteristics)> {
    vec![
        (
            "hot-buyer",
            LeadCharacteristics {
                urgency_level: UrgencyLevel::High,
                timeline: Timeline::OneToThreeMonths,
                engagement_level: EngagementLevel::High,
                lead_score: 85,
                lead_stage: LeadStage::Contacted,
                days_since_last_contact: 3,
                preferred_channel: Some(Channel::Email),
                ..Default::default()
            },
        ),
        (
            "browsing",
            LeadCharacteristics {
                urgency_level: UrgencyLevel::Low,
                timeline: Timeline::SixToTwelveMonths,
                engagement_level: EngagementLevel::Medium,
                lead_score: 55,
                lead_stage: LeadStage::New,
                days_since_last_contact: 14,
                ..Default::default()
            },
        ),
        (
            "dormant",
            LeadCharacteristics {
                urgency_level: UrgencyLevel::Low,
                engagement_level: EngagementLevel::Low,
                lead_score: 45,
                lead_stage: LeadStage::Dormant,
                days_since_last_contact: 120,
                ..Default::default()
            },
        ),
    ]
}
