//! Integration test for the full catalog -> filter -> score -> rank flow.

use chrono::Utc;
use nurture_core::types::{
    Channel, Condition, ConditionOperator, EngagementLevel, LeadCharacteristics, LeadStage,
    Template, TemplateCategory, TemplatePerformance, TemplateStatus, Timeline, UrgencyLevel,
};
use nurture_matching::{
    CatalogFilter, Confidence, InMemoryCatalog, SelectionOptions, TemplateCatalog,
    TemplateSelector,
};
use serde_json::json;
use uuid::Uuid;

fn template(
    name: &str,
    category: TemplateCategory,
    channel: Channel,
    priority: u8,
    is_default: bool,
) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category,
        channel,
        status: TemplateStatus::Active,
        subject: Some("Your home search".to_string()),
        content: "Hi {{first_name}}, here is an update on your search.".to_string(),
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
    catalog
        .upsert(template(
            "follow-up-email",
            TemplateCategory::FollowUp,
            Channel::Email,
            7,
            true,
        ))
        .unwrap();
    catalog
        .upsert(template(
            "showing-invite",
            TemplateCategory::PropertyShowing,
            Channel::Email,
            6,
            false,
        ))
        .unwrap();
    catalog
        .upsert(template(
            "nurture-drip",
            TemplateCategory::Nurturing,
            Channel::Email,
            4,
            false,
        ))
        .unwrap();
    catalog
        .upsert(template(
            "re-engage-sms",
            TemplateCategory::ReEngagement,
            Channel::Sms,
            5,
            false,
        ))
        .unwrap();
    catalog
}

#[test]
fn engaged_lead_gets_the_follow_up_ranked_first() {
    let catalog = seed_catalog();
    let selector = TemplateSelector::new();
    let lead = LeadCharacteristics {
        urgency_level: UrgencyLevel::High,
        timeline: Timeline::OneToThreeMonths,
        engagement_level: EngagementLevel::High,
        lead_score: 85,
        lead_stage: LeadStage::Contacted,
        days_since_last_contact: 3,
        ..Default::default()
    };

    let candidates = catalog.list(&CatalogFilter {
        channel: Some(Channel::Email),
        status: Some(TemplateStatus::Active),
        ..Default::default()
    });
    let results = selector.select(&lead, &candidates, &SelectionOptions::new());

    assert!(!results.is_empty());
    assert_eq!(results[0].template_name, "follow-up-email");
    assert!(results[0].score > 50.0);
    assert_ne!(results[0].confidence, Confidence::Low);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn dormant_lead_routes_to_re_engagement() {
    let catalog = seed_catalog();
    let selector = TemplateSelector::new();
    let lead = LeadCharacteristics {
        urgency_level: UrgencyLevel::Low,
        engagement_level: EngagementLevel::Low,
        lead_score: 45,
        lead_stage: LeadStage::Dormant,
        days_since_last_contact: 120,
        ..Default::default()
    };

    let candidates = catalog.list(&CatalogFilter::active());
    let best = selector
        .select_best(&lead, &candidates, &SelectionOptions::new())
        .unwrap();
    assert_eq!(best.template_name, "re-engage-sms");
}

#[test]
fn declared_conditions_shift_the_ranking() {
    let catalog = seed_catalog();
    let mut targeted = template(
        "targeted-follow-up",
        TemplateCategory::FollowUp,
        Channel::Email,
        7,
        false,
    );
    targeted.conditions = vec![Condition {
        variable: "lead_score".to_string(),
        operator: ConditionOperator::GreaterThan,
        value: json!(70),
        weight: 100,
    }];
    catalog.upsert(targeted).unwrap();

    let selector = TemplateSelector::new();
    let lead = LeadCharacteristics {
        urgency_level: UrgencyLevel::High,
        timeline: Timeline::OneToThreeMonths,
        engagement_level: EngagementLevel::High,
        lead_score: 85,
        lead_stage: LeadStage::Contacted,
        days_since_last_contact: 3,
        ..Default::default()
    };

    let candidates = catalog.list(&CatalogFilter::active());
    let results = selector.select(&lead, &candidates, &SelectionOptions::new());
    assert_eq!(results[0].template_name, "targeted-follow-up");
    assert_eq!(results[0].matched_conditions.len(), 1);
}

#[test]
fn fallback_accessor_survives_a_hopeless_lead() {
    let catalog = seed_catalog();
    let selector = TemplateSelector::new();
    let lead = LeadCharacteristics::default();

    let candidates = catalog.list(&CatalogFilter::active());
    let strict = SelectionOptions {
        min_score: 95.0,
        max_results: 5,
        ..Default::default()
    };
    assert!(selector.select(&lead, &candidates, &strict).is_empty());

    let fallback = selector
        .fallback_template(&candidates, TemplateCategory::FollowUp, Channel::Email)
        .unwrap();
    assert_eq!(fallback.name, "follow-up-email");
    assert!(fallback.is_default);
}
