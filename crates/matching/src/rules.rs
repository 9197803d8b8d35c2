//! The weighted matching-rule catalog. Each rule is a pure gate plus a
//! contribution factor in [0, 1]; a rule that cannot express an opinion
//! about the pair returns `None` and contributes nothing.
//!
//! The catalog is ordered data, not code branches: appending a new rule
//! means adding an enum variant and one table row, without touching the
//! existing factors. Order only matters for the reasoning trail.

use crate::conditions;
use nurture_core::types::{
    ContentType, EngagementLevel, LeadCharacteristics, LeadStage, Template, TemplateCategory,
    Timeline, UrgencyLevel,
};

/// Closed set of matching rules, evaluated independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Urgency,
    Timeline,
    Engagement,
    LeadScore,
    PropertyType,
    Budget,
    ChannelPreference,
    FunnelStage,
    ContentPreference,
    HistoricalPerformance,
    Recency,
    DeclaredConditions,
}

/// One catalog entry: the rule, its maximum contribution, and the label
/// used in reasoning trails.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub rule: MatchRule,
    pub weight: f64,
    pub label: &'static str,
}

/// Priority-ordered catalog. Maximum contributions sum past 100 by
/// design; the scorer clamps the total.
pub const RULE_CATALOG: &[RuleSpec] = &[
    RuleSpec { rule: MatchRule::Urgency, weight: 15.0, label: "urgency" },
    RuleSpec { rule: MatchRule::Timeline, weight: 12.0, label: "timeline" },
    RuleSpec { rule: MatchRule::Engagement, weight: 12.0, label: "engagement" },
    RuleSpec { rule: MatchRule::LeadScore, weight: 10.0, label: "lead_score" },
    RuleSpec { rule: MatchRule::PropertyType, weight: 8.0, label: "property_type" },
    RuleSpec { rule: MatchRule::Budget, weight: 8.0, label: "budget" },
    RuleSpec { rule: MatchRule::ChannelPreference, weight: 10.0, label: "channel_preference" },
    RuleSpec { rule: MatchRule::FunnelStage, weight: 10.0, label: "funnel_stage" },
    RuleSpec { rule: MatchRule::ContentPreference, weight: 5.0, label: "content_preference" },
    RuleSpec { rule: MatchRule::HistoricalPerformance, weight: 10.0, label: "historical_performance" },
    RuleSpec { rule: MatchRule::Recency, weight: 8.0, label: "recency" },
    RuleSpec { rule: MatchRule::DeclaredConditions, weight: 15.0, label: "conditions" },
];

// Nominal channel-agnostic baselines used to normalize historical rates.
const BASELINE_OPEN_RATE: f64 = 0.25;
const BASELINE_RESPONSE_RATE: f64 = 0.10;
const BASELINE_CONVERSION_RATE: f64 = 0.05;

// Templates with fewer sends than this carry no usable history.
const MIN_HISTORY_USAGE: u64 = 10;

impl MatchRule {
    /// Contribution factor in [0, 1], or `None` when the gate fails.
    pub fn factor(&self, lead: &LeadCharacteristics, template: &Template) -> Option<f64> {
        match self {
            MatchRule::Urgency => Some(urgency_factor(lead.urgency_level, template.category)),
            MatchRule::Timeline => timeline_factor(lead.timeline, template.category),
            MatchRule::Engagement => Some(engagement_factor(
                lead.engagement_level,
                template.category,
            )),
            MatchRule::LeadScore => lead_score_factor(lead.lead_score),
            MatchRule::PropertyType => property_type_factor(lead, template),
            MatchRule::Budget => budget_factor(lead, template.category),
            MatchRule::ChannelPreference => {
                let preferred = lead.preferred_channel?;
                (preferred == template.channel).then_some(1.0)
            }
            MatchRule::FunnelStage => stage_factor(lead.lead_stage, template.category),
            MatchRule::ContentPreference => content_factor(lead.preferred_content_type?, template),
            MatchRule::HistoricalPerformance => history_factor(template),
            MatchRule::Recency => recency_factor(lead.days_since_last_contact, template.category),
            MatchRule::DeclaredConditions => condition_weight_fraction(lead, template),
        }
    }
}

/// How well the template category fits the lead's urgency. Always gates
/// open: every pairing has some affinity.
fn urgency_factor(urgency: UrgencyLevel, category: TemplateCategory) -> f64 {
    use TemplateCategory::*;
    match urgency {
        UrgencyLevel::High => match category {
            InitialContact | FollowUp | Proposal | Negotiation | Closing => 1.0,
            PropertyShowing => 0.8,
            _ => 0.3,
        },
        UrgencyLevel::Medium => match category {
            FollowUp | PropertyShowing | Nurturing => 1.0,
            _ => 0.5,
        },
        UrgencyLevel::Low => match category {
            Nurturing | ReEngagement | ThankYou => 1.0,
            _ => 0.4,
        },
    }
}

/// Purchase-timeline affinity; gates closed when the lead never stated one.
fn timeline_factor(timeline: Timeline, category: TemplateCategory) -> Option<f64> {
    use TemplateCategory::*;
    let factor = match timeline {
        Timeline::Immediate => match category {
            InitialContact | FollowUp | PropertyShowing | Proposal | Negotiation | Closing => 1.0,
            _ => 0.2,
        },
        Timeline::OneToThreeMonths => match category {
            FollowUp | PropertyShowing | Proposal => 1.0,
            InitialContact | Nurturing => 0.6,
            _ => 0.3,
        },
        Timeline::ThreeToSixMonths => match category {
            Nurturing | FollowUp => 1.0,
            PropertyShowing => 0.6,
            _ => 0.4,
        },
        Timeline::SixToTwelveMonths => match category {
            Nurturing | ReEngagement => 1.0,
            _ => 0.3,
        },
        Timeline::Unspecified => return None,
    };
    Some(factor)
}

fn engagement_factor(engagement: EngagementLevel, category: TemplateCategory) -> f64 {
    use TemplateCategory::*;
    match engagement {
        EngagementLevel::High => 1.0,
        EngagementLevel::Medium => 0.7,
        EngagementLevel::Low => match category {
            Nurturing | ReEngagement => 1.0,
            _ => 0.4,
        },
        EngagementLevel::None => match category {
            InitialContact | ReEngagement => 0.8,
            _ => 0.2,
        },
    }
}

/// Stepped factor; cold leads below 20 contribute nothing.
fn lead_score_factor(score: u8) -> Option<f64> {
    match score {
        80..=u8::MAX => Some(1.0),
        60..=79 => Some(0.75),
        40..=59 => Some(0.5),
        20..=39 => Some(0.25),
        _ => None,
    }
}

/// Gate passes when the template's copy actually speaks to the lead's
/// property type.
fn property_type_factor(lead: &LeadCharacteristics, template: &Template) -> Option<f64> {
    let property = lead.property_type.as_deref()?.to_lowercase();
    if property.is_empty() {
        return None;
    }
    let mentioned = template.content.to_lowercase().contains(&property)
        || template.name.to_lowercase().contains(&property);
    mentioned.then_some(1.0)
}

/// A stated budget marks a qualified lead; later-funnel categories
/// benefit the most from that signal.
fn budget_factor(lead: &LeadCharacteristics, category: TemplateCategory) -> Option<f64> {
    use TemplateCategory::*;
    lead.budget_range.as_ref()?;
    let factor = match category {
        Proposal | Negotiation | Closing => 1.0,
        PropertyShowing => 0.8,
        _ => 0.5,
    };
    Some(factor)
}

fn stage_factor(stage: LeadStage, category: TemplateCategory) -> Option<f64> {
    use TemplateCategory::*;
    let factor = match stage {
        LeadStage::New => match category {
            InitialContact => 1.0,
            FollowUp => 0.6,
            Nurturing => 0.4,
            _ => return None,
        },
        LeadStage::Contacted => match category {
            FollowUp => 1.0,
            PropertyShowing => 0.7,
            Nurturing => 0.5,
            _ => return None,
        },
        LeadStage::Qualified => match category {
            PropertyShowing => 1.0,
            FollowUp => 0.8,
            Proposal => 0.6,
            _ => return None,
        },
        LeadStage::Touring => match category {
            PropertyShowing => 1.0,
            Proposal => 0.8,
            FollowUp => 0.6,
            _ => return None,
        },
        LeadStage::Negotiating => match category {
            Negotiation => 1.0,
            Proposal => 0.8,
            Closing => 0.6,
            _ => return None,
        },
        LeadStage::UnderContract => match category {
            Closing => 1.0,
            ThankYou => 0.5,
            _ => return None,
        },
        LeadStage::Closed => match category {
            ThankYou => 1.0,
            Nurturing => 0.6,
            ReEngagement => 0.4,
            _ => return None,
        },
        LeadStage::Dormant => match category {
            ReEngagement => 1.0,
            Nurturing => 0.8,
            _ => return None,
        },
    };
    Some(factor)
}

fn content_factor(preference: ContentType, template: &Template) -> Option<f64> {
    use nurture_core::types::Channel;
    let factor = match preference {
        ContentType::Detailed => {
            if template.content.len() >= 400 {
                1.0
            } else {
                0.4
            }
        }
        ContentType::Concise => {
            if template.content.len() <= 200 {
                1.0
            } else {
                0.4
            }
        }
        ContentType::Visual => match template.channel {
            Channel::Email | Channel::InApp => 1.0,
            _ => 0.3,
        },
        ContentType::DataDriven => {
            if template.content.bytes().any(|b| b.is_ascii_digit()) {
                1.0
            } else {
                0.4
            }
        }
    };
    Some(factor)
}

/// Historical rates normalized against nominal baselines. Gates closed
/// until the template has seen enough sends to trust the rates.
fn history_factor(template: &Template) -> Option<f64> {
    let perf = &template.performance;
    if perf.usage_count < MIN_HISTORY_USAGE {
        return None;
    }
    let open = (perf.open_rate / BASELINE_OPEN_RATE).min(1.0);
    let response = (perf.response_rate / BASELINE_RESPONSE_RATE).min(1.0);
    let conversion = (perf.conversion_rate / BASELINE_CONVERSION_RATE).min(1.0);
    Some(0.4 * open + 0.3 * response + 0.3 * conversion)
}

/// Contact recency: fresh contacts warrant follow-ups, long-silent leads
/// warrant re-engagement.
fn recency_factor(days: u32, category: TemplateCategory) -> Option<f64> {
    use TemplateCategory::*;
    let factor = match days {
        0..=7 => match category {
            FollowUp => 1.0,
            ThankYou => 0.8,
            PropertyShowing => 0.6,
            _ => return None,
        },
        8..=30 => match category {
            Nurturing => 1.0,
            FollowUp => 0.8,
            _ => return None,
        },
        31..=90 => match category {
            Nurturing => 1.0,
            ReEngagement => 0.8,
            _ => return None,
        },
        _ => match category {
            ReEngagement => 1.0,
            Nurturing => 0.5,
            _ => return None,
        },
    };
    Some(factor)
}

/// Fraction of total declared-condition weight that the lead satisfies.
/// Gates closed when the template declares no conditions (or only
/// zero-weight ones).
fn condition_weight_fraction(lead: &LeadCharacteristics, template: &Template) -> Option<f64> {
    let total: u32 = template.conditions.iter().map(|c| c.weight as u32).sum();
    if total == 0 {
        return None;
    }
    let satisfied: u32 = template
        .conditions
        .iter()
        .filter(|c| conditions::evaluate(c, lead))
        .map(|c| c.weight as u32)
        .sum();
    Some(satisfied as f64 / total as f64)
}
