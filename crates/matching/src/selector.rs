//! Candidate filtering, ranking, and fallback selection.

use crate::scorer::{MatchResult, TemplateScorer};
use nurture_core::types::{Channel, Template, TemplateCategory};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// How many candidates the fallback path returns when nothing clears
/// the minimum score.
const FALLBACK_LIMIT: usize = 3;

/// Per-call selection options.
#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    pub category: Option<TemplateCategory>,
    pub channel: Option<Channel>,
    pub exclude: Vec<Uuid>,
    pub min_score: f64,
    pub max_results: usize,
    pub include_fallbacks: bool,
    /// Raw lead data for the required-variable populate check. When
    /// absent the check is skipped entirely.
    pub lead_data: Option<HashMap<String, Value>>,
}

impl SelectionOptions {
    pub fn new() -> Self {
        Self {
            max_results: 5,
            ..Default::default()
        }
    }
}

/// Ranks a candidate template set for one lead. Pure reads; the catalog
/// snapshot is passed in per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSelector {
    scorer: TemplateScorer,
}

impl TemplateSelector {
    pub fn new() -> Self {
        Self {
            scorer: TemplateScorer::new(),
        }
    }

    /// Filter, score, and rank candidates. Returns at most
    /// `max_results` matches at or above `min_score`; when nothing
    /// clears the threshold and `include_fallbacks` is set, returns the
    /// best few candidates regardless.
    pub fn select(
        &self,
        lead: &nurture_core::types::LeadCharacteristics,
        templates: &[Template],
        options: &SelectionOptions,
    ) -> Vec<MatchResult> {
        let mut results: Vec<(MatchResult, u8, Option<chrono::DateTime<chrono::Utc>>)> = templates
            .iter()
            .filter(|t| self.eligible(t, options))
            .map(|t| {
                (
                    self.scorer.score(lead, t),
                    t.priority,
                    t.performance.last_used,
                )
            })
            .collect();

        // Deterministic order: score desc, priority desc, last_used
        // desc (never-used last), id asc.
        results.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.template_id.cmp(&b.0.template_id))
        });

        let max_results = if options.max_results == 0 {
            5
        } else {
            options.max_results
        };

        let above: Vec<MatchResult> = results
            .iter()
            .filter(|(r, _, _)| r.score >= options.min_score)
            .take(max_results)
            .map(|(r, _, _)| r.clone())
            .collect();

        if !above.is_empty() {
            return above;
        }
        if options.include_fallbacks {
            debug!(
                min_score = options.min_score,
                candidates = results.len(),
                "no candidate cleared the threshold, returning fallbacks"
            );
            return results
                .into_iter()
                .take(FALLBACK_LIMIT)
                .map(|(r, _, _)| r)
                .collect();
        }
        Vec::new()
    }

    /// The single best match, if any.
    pub fn select_best(
        &self,
        lead: &nurture_core::types::LeadCharacteristics,
        templates: &[Template],
        options: &SelectionOptions,
    ) -> Option<MatchResult> {
        self.select(lead, templates, options).into_iter().next()
    }

    /// The designated default template for a (category, channel),
    /// independent of scoring. Guaranteed-non-empty path for callers
    /// that must always send something.
    pub fn fallback_template(
        &self,
        templates: &[Template],
        category: TemplateCategory,
        channel: Channel,
    ) -> Option<Template> {
        templates
            .iter()
            .find(|t| {
                t.is_active() && t.is_default && t.category == category && t.channel == channel
            })
            .cloned()
    }

    fn eligible(&self, template: &Template, options: &SelectionOptions) -> bool {
        if !template.is_active() {
            return false;
        }
        if options.category.is_some_and(|c| c != template.category) {
            return false;
        }
        if options.channel.is_some_and(|c| c != template.channel) {
            return false;
        }
        if options.exclude.contains(&template.id) {
            return false;
        }
        if let Some(lead_data) = &options.lead_data {
            // Every required variable must be populatable: present and
            // non-null in the lead data, or covered by a fallback.
            let populatable = template.variables.iter().all(|v| {
                !v.required
                    || v.fallback.is_some()
                    || lead_data.get(&v.name).is_some_and(|val| !val.is_null())
            });
            if !populatable {
                return false;
            }
        }
        true
    }
}
