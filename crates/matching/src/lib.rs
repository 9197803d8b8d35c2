//! Template matching: condition evaluation, weighted rule scoring, and
//! candidate selection against a lead's characteristics.

pub mod catalog;
pub mod conditions;
pub mod rules;
pub mod scorer;
pub mod selector;

pub use catalog::{CachedCatalog, CatalogFilter, InMemoryCatalog, TemplateCatalog};
pub use conditions::evaluate;
pub use rules::{MatchRule, RuleSpec, RULE_CATALOG};
pub use scorer::{Confidence, MatchResult, PerformanceProjection, TemplateScorer};
pub use selector::{SelectionOptions, TemplateSelector};
