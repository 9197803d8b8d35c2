use crate::error::NurtureResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

// ─── Templates ──────────────────────────────────────────────────────────

/// A nurture message template for one owned channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub category: TemplateCategory,
    pub channel: Channel,
    pub status: TemplateStatus,
    pub subject: Option<String>,
    pub content: String,
    pub variables: Vec<TemplateVariable>,
    pub conditions: Vec<Condition>,
    /// 1 (lowest) to 10 (highest), used to break score ties.
    pub priority: u8,
    /// Fallback-eligible when no candidate clears the minimum score.
    pub is_default: bool,
    #[serde(default)]
    pub performance: TemplatePerformance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn is_active(&self) -> bool {
        self.status == TemplateStatus::Active
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    InitialContact,
    FollowUp,
    PropertyShowing,
    Proposal,
    Negotiation,
    Closing,
    ThankYou,
    Nurturing,
    ReEngagement,
}

impl TemplateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialContact => "initial_contact",
            Self::FollowUp => "follow_up",
            Self::PropertyShowing => "property_showing",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::Closing => "closing",
            Self::ThankYou => "thank_you",
            Self::Nurturing => "nurturing",
            Self::ReEngagement => "re_engagement",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    InApp,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::InApp => "in_app",
            Self::Push => "push",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Active,
    Testing,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    pub kind: VariableKind,
    pub required: bool,
    #[serde(default)]
    pub fallback: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Text,
    Number,
    Date,
    Boolean,
    Url,
}

/// Lifetime usage aggregate, updated by the host after each send.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemplatePerformance {
    pub usage_count: u64,
    pub open_rate: f64,
    pub response_rate: f64,
    pub conversion_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
}

// ─── Conditions ─────────────────────────────────────────────────────────

/// Declared targeting predicate attached to a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: ConditionOperator,
    pub value: Value,
    /// Relative importance 0-100 when computing the satisfied fraction.
    pub weight: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Between,
    In,
    NotIn,
    Exists,
    NotExists,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        }
    }
}

// ─── Leads ──────────────────────────────────────────────────────────────

/// Read-only scoring snapshot of one lead, produced by the host CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadCharacteristics {
    pub urgency_level: UrgencyLevel,
    pub timeline: Timeline,
    pub engagement_level: EngagementLevel,
    pub lead_score: u8,
    pub property_type: Option<String>,
    pub budget_range: Option<BudgetRange>,
    pub preferred_channel: Option<Channel>,
    pub lead_stage: LeadStage,
    pub days_since_last_contact: u32,
    pub preferred_content_type: Option<ContentType>,
}

impl LeadCharacteristics {
    /// Resolves a canonical attribute name to its JSON value.
    ///
    /// Returns `None` for unknown names and for optional fields that are
    /// absent on this lead, which condition evaluation treats as
    /// "variable unresolved".
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "urgency_level" => Some(json!(self.urgency_level.as_str())),
            "timeline" => Some(json!(self.timeline.as_str())),
            "engagement_level" => Some(json!(self.engagement_level.as_str())),
            "lead_score" => Some(json!(self.lead_score)),
            "property_type" => self.property_type.as_ref().map(|p| json!(p)),
            "budget_range" => self
                .budget_range
                .as_ref()
                .map(|b| json!({ "min": b.min, "max": b.max })),
            "preferred_channel" => self.preferred_channel.map(|c| json!(c.as_str())),
            "lead_stage" => Some(json!(self.lead_stage.as_str())),
            "days_since_last_contact" => Some(json!(self.days_since_last_contact)),
            "preferred_content_type" => {
                self.preferred_content_type.map(|c| json!(c.as_str()))
            }
            _ => None,
        }
    }
}

impl Default for LeadCharacteristics {
    fn default() -> Self {
        Self {
            urgency_level: UrgencyLevel::Low,
            timeline: Timeline::Unspecified,
            engagement_level: EngagementLevel::None,
            lead_score: 0,
            property_type: None,
            budget_range: None,
            preferred_channel: None,
            lead_stage: LeadStage::New,
            days_since_last_contact: 0,
            preferred_content_type: None,
        }
    }
}

/// Source of derived lead snapshots. Implemented by the host CRM; the
/// engine never mutates what it is handed.
pub trait LeadCharacteristicsProvider: Send + Sync {
    fn characteristics(&self, lead_id: &str) -> NurtureResult<LeadCharacteristics>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    Immediate,
    OneToThreeMonths,
    ThreeToSixMonths,
    SixToTwelveMonths,
    Unspecified,
}

impl Timeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OneToThreeMonths => "one_to_three_months",
            Self::ThreeToSixMonths => "three_to_six_months",
            Self::SixToTwelveMonths => "six_to_twelve_months",
            Self::Unspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    None,
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    Contacted,
    Qualified,
    Touring,
    Negotiating,
    UnderContract,
    Closed,
    Dormant,
}

impl LeadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Touring => "touring",
            Self::Negotiating => "negotiating",
            Self::UnderContract => "under_contract",
            Self::Closed => "closed",
            Self::Dormant => "dormant",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Detailed,
    Concise,
    Visual,
    DataDriven,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detailed => "detailed",
            Self::Concise => "concise",
            Self::Visual => "visual",
            Self::DataDriven => "data_driven",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetRange {
    pub min: f64,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_resolves_enum_fields_as_snake_case_strings() {
        let lead = LeadCharacteristics {
            urgency_level: UrgencyLevel::High,
            timeline: Timeline::OneToThreeMonths,
            lead_stage: LeadStage::UnderContract,
            ..Default::default()
        };
        assert_eq!(lead.attribute("urgency_level"), Some(json!("high")));
        assert_eq!(lead.attribute("timeline"), Some(json!("one_to_three_months")));
        assert_eq!(lead.attribute("lead_stage"), Some(json!("under_contract")));
    }

    #[test]
    fn attribute_returns_none_for_absent_optionals_and_unknown_names() {
        let lead = LeadCharacteristics::default();
        assert_eq!(lead.attribute("property_type"), None);
        assert_eq!(lead.attribute("budget_range"), None);
        assert_eq!(lead.attribute("favorite_color"), None);
    }

    #[test]
    fn attribute_exposes_budget_range_as_min_max_object() {
        let lead = LeadCharacteristics {
            budget_range: Some(BudgetRange { min: 250_000.0, max: 400_000.0 }),
            ..Default::default()
        };
        assert_eq!(
            lead.attribute("budget_range"),
            Some(json!({ "min": 250_000.0, "max": 400_000.0 }))
        );
    }
}
