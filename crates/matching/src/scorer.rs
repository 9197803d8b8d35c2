//! Weighted template scoring: folds the rule catalog over one
//! (lead, template) pair into a clamped 0-100 score with a reasoning
//! trail and a performance projection.

use crate::conditions;
use crate::rules::{MatchRule, RULE_CATALOG};
use nurture_core::types::{Channel, Condition, LeadCharacteristics, Template};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Confidence bucket derived purely from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Confidence::High
        } else if score >= 60.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Expected engagement rates if this template is sent to this lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceProjection {
    pub open_rate: f64,
    pub response_rate: f64,
    pub conversion_rate: f64,
}

/// Immutable per-call scoring result. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub template_id: Uuid,
    pub template_name: String,
    /// Clamped to [0, 100].
    pub score: f64,
    pub confidence: Confidence,
    /// Labels of rules whose gate held, in catalog order.
    pub matched_rules: Vec<String>,
    pub matched_conditions: Vec<String>,
    pub missing_conditions: Vec<String>,
    pub reasoning: Vec<String>,
    pub projection: PerformanceProjection,
}

/// Applies the fixed rule catalog to a (lead, template) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateScorer;

impl TemplateScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, lead: &LeadCharacteristics, template: &Template) -> MatchResult {
        let mut total = 0.0;
        let mut matched_rules = Vec::new();
        let mut reasoning = Vec::new();

        for spec in RULE_CATALOG {
            match spec.rule.factor(lead, template) {
                Some(factor) => {
                    let contribution = spec.weight * factor;
                    total += contribution;
                    matched_rules.push(spec.label.to_string());
                    reasoning.push(format!(
                        "{}: factor {:.2} contributes {:.1}",
                        spec.label, factor, contribution
                    ));
                }
                None => {
                    reasoning.push(format!("{}: no signal", spec.label));
                }
            }
        }

        let score = total.clamp(0.0, 100.0);
        let (matched_conditions, missing_conditions) =
            split_conditions(lead, &template.conditions);

        debug!(
            template_id = %template.id,
            score,
            matched = matched_rules.len(),
            "scored template"
        );

        MatchResult {
            template_id: template.id,
            template_name: template.name.clone(),
            score,
            confidence: Confidence::from_score(score),
            matched_rules,
            matched_conditions,
            missing_conditions,
            reasoning,
            projection: project_performance(template, score),
        }
    }
}

fn split_conditions(
    lead: &LeadCharacteristics,
    declared: &[Condition],
) -> (Vec<String>, Vec<String>) {
    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for condition in declared {
        let label = format!(
            "{} {} {}",
            condition.variable,
            condition.operator.as_str(),
            condition.value
        );
        if conditions::evaluate(condition, lead) {
            matched.push(label);
        } else {
            missing.push(label);
        }
    }
    (matched, missing)
}

/// Nominal per-channel engagement baselines used until a template has
/// enough history of its own.
fn channel_baseline(channel: Channel) -> PerformanceProjection {
    match channel {
        Channel::Email => PerformanceProjection {
            open_rate: 0.25,
            response_rate: 0.08,
            conversion_rate: 0.03,
        },
        Channel::Sms => PerformanceProjection {
            open_rate: 0.90,
            response_rate: 0.12,
            conversion_rate: 0.04,
        },
        Channel::InApp => PerformanceProjection {
            open_rate: 0.45,
            response_rate: 0.10,
            conversion_rate: 0.03,
        },
        Channel::Push => PerformanceProjection {
            open_rate: 0.35,
            response_rate: 0.05,
            conversion_rate: 0.02,
        },
    }
}

/// Projects engagement for this pairing: the template's own history when
/// it has one, the channel baseline otherwise, scaled by match quality.
fn project_performance(template: &Template, score: f64) -> PerformanceProjection {
    let base = if template.performance.usage_count >= 10 {
        PerformanceProjection {
            open_rate: template.performance.open_rate,
            response_rate: template.performance.response_rate,
            conversion_rate: template.performance.conversion_rate,
        }
    } else {
        channel_baseline(template.channel)
    };
    let scale = 0.75 + 0.5 * (score / 100.0);
    PerformanceProjection {
        open_rate: (base.open_rate * scale).min(1.0),
        response_rate: (base.response_rate * scale).min(1.0),
        conversion_rate: (base.conversion_rate * scale).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nurture_core::types::{
        BudgetRange, ConditionOperator, ContentType, EngagementLevel, LeadStage,
        TemplateCategory, TemplatePerformance, TemplateStatus, Timeline, UrgencyLevel,
    };
    use serde_json::json;

    fn make_template(category: TemplateCategory, channel: Channel) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "Market update follow-up".to_string(),
            category,
            channel,
            status: TemplateStatus::Active,
            subject: Some("Quick market update".to_string()),
            content: "Hi {{first_name}}, a few new listings came up this week.".to_string(),
            variables: vec![],
            conditions: vec![],
            priority: 5,
            is_default: false,
            performance: TemplatePerformance::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn hot_lead() -> LeadCharacteristics {
        LeadCharacteristics {
            urgency_level: UrgencyLevel::High,
            timeline: Timeline::OneToThreeMonths,
            engagement_level: EngagementLevel::High,
            lead_score: 85,
            ..Default::default()
        }
    }

    #[test]
    fn hot_follow_up_lead_scores_above_fifty_with_medium_confidence() {
        let scorer = TemplateScorer::new();
        let template = make_template(TemplateCategory::FollowUp, Channel::Email);
        let result = scorer.score(&hot_lead(), &template);

        assert!(result.score > 50.0, "score was {}", result.score);
        if result.score >= 80.0 {
            assert_eq!(result.confidence, Confidence::High);
        } else {
            assert_eq!(result.confidence, Confidence::Medium);
        }
        assert!(result.matched_rules.contains(&"urgency".to_string()));
        assert!(result.matched_rules.contains(&"timeline".to_string()));
        assert!(result.matched_rules.contains(&"engagement".to_string()));
    }

    #[test]
    fn score_is_clamped_to_one_hundred_when_everything_matches() {
        let scorer = TemplateScorer::new();
        let mut template = make_template(TemplateCategory::FollowUp, Channel::Email);
        template.content =
            "Hi {{first_name}}, 3 new condo listings in your $300k range this week.".to_string();
        template.performance = TemplatePerformance {
            usage_count: 100,
            open_rate: 0.5,
            response_rate: 0.2,
            conversion_rate: 0.1,
            last_used: Some(Utc::now()),
        };
        template.conditions = vec![nurture_core::types::Condition {
            variable: "lead_score".to_string(),
            operator: ConditionOperator::GreaterThan,
            value: json!(50),
            weight: 100,
        }];

        let lead = LeadCharacteristics {
            urgency_level: UrgencyLevel::High,
            timeline: Timeline::Immediate,
            engagement_level: EngagementLevel::High,
            lead_score: 95,
            property_type: Some("condo".to_string()),
            budget_range: Some(BudgetRange {
                min: 250_000.0,
                max: 350_000.0,
            }),
            preferred_channel: Some(Channel::Email),
            lead_stage: LeadStage::Contacted,
            days_since_last_contact: 2,
            preferred_content_type: Some(ContentType::Concise),
        };

        let result = scorer.score(&lead, &template);
        assert_eq!(result.score, 100.0);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn score_stays_in_bounds_for_arbitrary_pairs() {
        let scorer = TemplateScorer::new();
        let categories = [
            TemplateCategory::InitialContact,
            TemplateCategory::Nurturing,
            TemplateCategory::ReEngagement,
            TemplateCategory::Closing,
        ];
        let leads = [
            LeadCharacteristics::default(),
            hot_lead(),
            LeadCharacteristics {
                urgency_level: UrgencyLevel::Low,
                engagement_level: EngagementLevel::None,
                lead_stage: LeadStage::Dormant,
                days_since_last_contact: 400,
                ..Default::default()
            },
        ];
        for category in categories {
            let template = make_template(category, Channel::Push);
            for lead in &leads {
                let result = scorer.score(lead, &template);
                assert!((0.0..=100.0).contains(&result.score));
            }
        }
    }

    #[test]
    fn condition_labels_split_into_matched_and_missing() {
        let scorer = TemplateScorer::new();
        let mut template = make_template(TemplateCategory::FollowUp, Channel::Email);
        template.conditions = vec![
            nurture_core::types::Condition {
                variable: "lead_score".to_string(),
                operator: ConditionOperator::GreaterThan,
                value: json!(50),
                weight: 60,
            },
            nurture_core::types::Condition {
                variable: "property_type".to_string(),
                operator: ConditionOperator::Exists,
                value: json!(null),
                weight: 40,
            },
        ];
        let result = scorer.score(&hot_lead(), &template);
        assert_eq!(result.matched_conditions.len(), 1);
        assert_eq!(result.missing_conditions.len(), 1);
        assert!(result.matched_conditions[0].starts_with("lead_score greater_than"));
    }

    #[test]
    fn projection_uses_history_once_the_template_has_enough_sends() {
        let scorer = TemplateScorer::new();
        let mut template = make_template(TemplateCategory::FollowUp, Channel::Email);
        template.performance = TemplatePerformance {
            usage_count: 40,
            open_rate: 0.6,
            response_rate: 0.2,
            conversion_rate: 0.08,
            last_used: Some(Utc::now()),
        };
        let result = scorer.score(&hot_lead(), &template);
        // Scaled history, not the 0.25 email baseline.
        assert!(result.projection.open_rate > 0.45);
        assert!(result.projection.open_rate <= 1.0);
    }
}
