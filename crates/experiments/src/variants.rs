//! Variant derivation: apply declared field edits to a copy of a base
//! template, propose deterministic improvement suggestions, and build
//! weighted test variants from them.

use chrono::{DateTime, Duration, Utc};
use nurture_core::clock::Clock;
use nurture_core::types::{Condition, Template, TemplatePerformance, TemplateVariable};
use nurture_core::{NurtureError, NurtureResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Traffic share reserved for the control variant.
const CONTROL_WEIGHT: u8 = 50;

/// Which template field a change targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ChangeField {
    Content,
    Subject,
    Variable { name: String },
    Condition { variable: String },
}

/// A requested edit: the target field plus its new value. For variable
/// and condition edits the value is the full replacement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    #[serde(flatten)]
    pub field: ChangeField,
    pub value: Value,
}

/// An applied edit with the old value captured from the base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationChange {
    #[serde(flatten)]
    pub field: ChangeField,
    pub old_value: Value,
    pub new_value: Value,
}

/// The derived fields produced by applying a change list to a base
/// template. Exposed so callers can verify a variation independently.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChanges {
    pub content: String,
    pub subject: Option<String>,
    pub variables: Vec<TemplateVariable>,
    pub conditions: Vec<Condition>,
    pub changes: Vec<VariationChange>,
}

/// A derived template version competing in an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariation {
    pub id: Uuid,
    pub base_template_id: Uuid,
    pub changes: Vec<VariationChange>,
    pub content: String,
    pub subject: Option<String>,
    pub variables: Vec<TemplateVariable>,
    pub conditions: Vec<Condition>,
    pub is_active: bool,
    pub performance: Option<TemplatePerformance>,
    pub created_at: DateTime<Utc>,
}

impl TemplateVariation {
    /// Fold in a fresh performance snapshot from the host.
    pub fn record_performance(&mut self, performance: TemplatePerformance) {
        self.performance = Some(performance);
    }
}

/// Metric an experiment is trying to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    OpenRate,
    ClickRate,
    ResponseRate,
    ConversionRate,
}

/// Qualitative expected impact of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

/// A proposed edit with a fixed confidence and impact estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    pub change: ChangeRequest,
    pub rationale: String,
    pub confidence: f64,
    pub expected_impact: ImpactLevel,
}

/// One arm of a generated A/B test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVariant {
    pub variant_id: String,
    /// Traffic share. Weights need not sum to 100: the non-control
    /// share is divided by integer division and the remainder dropped.
    pub weight: u8,
    pub is_control: bool,
    pub variation: Option<TemplateVariation>,
}

/// Derives template variations and test setups. Deterministic: the same
/// template and inputs always produce the same suggestions.
pub struct VariantGenerator {
    clock: Arc<dyn Clock>,
}

impl VariantGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Apply an ordered change list to a deep copy of the base template,
    /// capturing old values. The base is never mutated.
    pub fn apply_changes(
        &self,
        base: &Template,
        requests: &[ChangeRequest],
    ) -> NurtureResult<AppliedChanges> {
        let mut content = base.content.clone();
        let mut subject = base.subject.clone();
        let mut variables = base.variables.clone();
        let mut conditions = base.conditions.clone();
        let mut changes = Vec::with_capacity(requests.len());

        for request in requests {
            let (old_value, new_value) = match &request.field {
                ChangeField::Content => {
                    let new_content = request.value.as_str().ok_or_else(|| {
                        NurtureError::Validation("content change value must be a string".into())
                    })?;
                    let old = json!(content);
                    content = new_content.to_string();
                    (old, request.value.clone())
                }
                ChangeField::Subject => {
                    let new_subject = match &request.value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        _ => {
                            return Err(NurtureError::Validation(
                                "subject change value must be a string or null".into(),
                            ))
                        }
                    };
                    let old = subject.as_deref().map(|s| json!(s)).unwrap_or(Value::Null);
                    subject = new_subject;
                    (old, request.value.clone())
                }
                ChangeField::Variable { name } => {
                    let replacement: TemplateVariable =
                        serde_json::from_value(request.value.clone())?;
                    let slot = variables.iter_mut().find(|v| v.name == *name).ok_or_else(
                        || {
                            NurtureError::Validation(format!(
                                "template declares no variable named '{name}'"
                            ))
                        },
                    )?;
                    let old = serde_json::to_value(&*slot)?;
                    *slot = replacement;
                    (old, request.value.clone())
                }
                ChangeField::Condition { variable } => {
                    let replacement: Condition = serde_json::from_value(request.value.clone())?;
                    let slot = conditions
                        .iter_mut()
                        .find(|c| c.variable == *variable)
                        .ok_or_else(|| {
                            NurtureError::Validation(format!(
                                "template declares no condition on '{variable}'"
                            ))
                        })?;
                    let old = serde_json::to_value(&*slot)?;
                    *slot = replacement;
                    (old, request.value.clone())
                }
            };
            changes.push(VariationChange {
                field: request.field.clone(),
                old_value,
                new_value,
            });
        }

        Ok(AppliedChanges {
            content,
            subject,
            variables,
            conditions,
            changes,
        })
    }

    /// Build a variation from a base template plus a change list.
    pub fn create_variation(
        &self,
        base: &Template,
        requests: &[ChangeRequest],
    ) -> NurtureResult<TemplateVariation> {
        if base.content.trim().is_empty() {
            return Err(NurtureError::Validation(
                "base template content must not be empty".into(),
            ));
        }
        let applied = self.apply_changes(base, requests)?;
        let variation = TemplateVariation {
            id: Uuid::new_v4(),
            base_template_id: base.id,
            changes: applied.changes,
            content: applied.content,
            subject: applied.subject,
            variables: applied.variables,
            conditions: applied.conditions,
            is_active: true,
            performance: None,
            created_at: self.clock.now(),
        };
        info!(
            base = %base.id,
            variation = %variation.id,
            changes = variation.changes.len(),
            "created template variation"
        );
        Ok(variation)
    }

    /// Rule-based suggestions for moving the target metric, sorted by
    /// expected impact then confidence, truncated to `count`.
    pub fn generate_suggestions(
        &self,
        template: &Template,
        metric: TargetMetric,
        count: usize,
    ) -> Vec<Suggestion> {
        let subject = template
            .subject
            .clone()
            .unwrap_or_else(|| template.name.clone());
        let mut suggestions = match metric {
            TargetMetric::OpenRate => vec![
                Suggestion {
                    name: "reply_style_subject".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Subject,
                        value: json!(format!("Re: {subject}")),
                    },
                    rationale: "Reply-style subject lines read as personal mail and lift opens"
                        .to_string(),
                    confidence: 0.7,
                    expected_impact: ImpactLevel::High,
                },
                Suggestion {
                    name: "read_time_subject".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Subject,
                        value: json!(format!("{subject} (2-minute read)")),
                    },
                    rationale: "A stated read time sets expectations and lowers open friction"
                        .to_string(),
                    confidence: 0.55,
                    expected_impact: ImpactLevel::Medium,
                },
            ],
            TargetMetric::ClickRate | TargetMetric::ConversionRate => vec![
                Suggestion {
                    name: "direct_cta".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Content,
                        value: json!(format!(
                            "{}\n\nReady for the next step? Reply here or pick a time that works for you.",
                            template.content
                        )),
                    },
                    rationale: "A single direct call to action at the end lifts clicks".to_string(),
                    confidence: 0.65,
                    expected_impact: ImpactLevel::High,
                },
                Suggestion {
                    name: "social_proof".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Content,
                        value: json!(format!(
                            "{}\n\nLast quarter we helped 14 families close in this area.",
                            template.content
                        )),
                    },
                    rationale: "Concrete social proof raises trust before the ask".to_string(),
                    confidence: 0.5,
                    expected_impact: ImpactLevel::Medium,
                },
            ],
            TargetMetric::ResponseRate => vec![
                Suggestion {
                    name: "closing_question".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Content,
                        value: json!(format!(
                            "{}\n\nWould Tuesday or Thursday work better for a quick call?",
                            template.content
                        )),
                    },
                    rationale: "Ending on an either-or question makes replying easy".to_string(),
                    confidence: 0.6,
                    expected_impact: ImpactLevel::High,
                },
                Suggestion {
                    name: "shorter_body".to_string(),
                    change: ChangeRequest {
                        field: ChangeField::Content,
                        value: json!(first_paragraph(&template.content)),
                    },
                    rationale: "Shorter messages get answered more often".to_string(),
                    confidence: 0.5,
                    expected_impact: ImpactLevel::Medium,
                },
            ],
        };

        // Every metric also gets a structural reorder to test.
        suggestions.push(Suggestion {
            name: "reorder_paragraphs".to_string(),
            change: ChangeRequest {
                field: ChangeField::Content,
                value: json!(rotate_paragraphs(&template.content)),
            },
            rationale: "Leading with the final point tests whether readers drop off early"
                .to_string(),
            confidence: 0.4,
            expected_impact: ImpactLevel::Low,
        });

        suggestions.sort_by(|a, b| {
            b.expected_impact.cmp(&a.expected_impact).then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        suggestions.truncate(count);
        suggestions
    }

    /// Build a control plus one variant per suggestion. The control gets
    /// half the traffic; the rest is split evenly with integer division,
    /// so the weights may sum below 100.
    pub fn generate_test_variants(
        &self,
        template: &Template,
        suggestions: &[Suggestion],
    ) -> NurtureResult<Vec<TestVariant>> {
        let mut variants = vec![TestVariant {
            variant_id: "control".to_string(),
            weight: CONTROL_WEIGHT,
            is_control: true,
            variation: None,
        }];
        if suggestions.is_empty() {
            return Ok(variants);
        }
        if suggestions.len() > CONTROL_WEIGHT as usize {
            return Err(NurtureError::Validation(format!(
                "cannot split {} traffic share across {} variants",
                CONTROL_WEIGHT,
                suggestions.len()
            )));
        }
        let per_variant = (CONTROL_WEIGHT as usize / suggestions.len()) as u8;
        for (i, suggestion) in suggestions.iter().enumerate() {
            let variation = self.create_variation(template, &[suggestion.change.clone()])?;
            variants.push(TestVariant {
                variant_id: format!("variant_{}", i + 1),
                weight: per_variant,
                is_control: false,
                variation: Some(variation),
            });
        }
        Ok(variants)
    }

    /// Deactivate variations older than the retention window. Returns
    /// how many were retired.
    pub fn retire_stale(
        &self,
        variations: &mut [TemplateVariation],
        max_age_days: i64,
    ) -> usize {
        let cutoff = self.clock.now() - Duration::days(max_age_days);
        let mut retired = 0;
        for variation in variations.iter_mut() {
            if variation.is_active && variation.created_at < cutoff {
                variation.is_active = false;
                retired += 1;
            }
        }
        if retired > 0 {
            info!(retired, max_age_days, "retired stale variations");
        }
        retired
    }
}

fn first_paragraph(content: &str) -> String {
    content
        .split("\n\n")
        .next()
        .unwrap_or(content)
        .to_string()
}

/// Move the last paragraph to the front; single-paragraph content is
/// returned unchanged.
fn rotate_paragraphs(content: &str) -> String {
    let mut paragraphs: Vec<&str> = content.split("\n\n").collect();
    if paragraphs.len() < 2 {
        return content.to_string();
    }
    let last = paragraphs.pop().unwrap_or_default();
    let mut reordered = vec![last];
    reordered.extend(paragraphs);
    reordered.join("\n\n")
}
