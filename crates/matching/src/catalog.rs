//! Template catalog: the injected persistence seam. The engine only
//! ever reads a snapshot per call; storage is the host's concern.

use dashmap::DashMap;
use nurture_cache::TtlCache;
use nurture_core::types::{Channel, Template, TemplateCategory, TemplateStatus};
use nurture_core::{NurtureError, NurtureResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// List-query filter, all fields conjunctive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub category: Option<TemplateCategory>,
    pub channel: Option<Channel>,
    pub status: Option<TemplateStatus>,
}

impl CatalogFilter {
    pub fn active() -> Self {
        Self {
            status: Some(TemplateStatus::Active),
            ..Default::default()
        }
    }

    fn matches(&self, template: &Template) -> bool {
        self.category.is_none_or(|c| c == template.category)
            && self.channel.is_none_or(|c| c == template.channel)
            && self.status.is_none_or(|s| s == template.status)
    }

    fn cache_key(&self) -> String {
        format!("{:?}|{:?}|{:?}", self.category, self.channel, self.status)
    }
}

/// Storage seam for templates.
pub trait TemplateCatalog: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<Template>;
    fn list(&self, filter: &CatalogFilter) -> Vec<Template>;
    fn upsert(&self, template: Template) -> NurtureResult<()>;
    fn delete(&self, id: &Uuid) -> NurtureResult<()>;
}

/// In-process catalog with structural validation on every upsert.
pub struct InMemoryCatalog {
    templates: DashMap<Uuid, Template>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn validate(&self, template: &Template) -> NurtureResult<()> {
        if template.content.trim().is_empty() {
            return Err(NurtureError::Validation(
                "template content must not be empty".to_string(),
            ));
        }
        if !(1..=10).contains(&template.priority) {
            return Err(NurtureError::Validation(format!(
                "template priority {} outside 1-10",
                template.priority
            )));
        }
        if let Some(condition) = template.conditions.iter().find(|c| c.weight > 100) {
            return Err(NurtureError::Validation(format!(
                "condition '{}' weight {} exceeds 100",
                condition.variable, condition.weight
            )));
        }
        // At most one active default per (category, channel).
        if template.is_default && template.status == TemplateStatus::Active {
            let conflict = self.templates.iter().any(|entry| {
                let other = entry.value();
                other.id != template.id
                    && other.is_default
                    && other.status == TemplateStatus::Active
                    && other.category == template.category
                    && other.channel == template.channel
            });
            if conflict {
                return Err(NurtureError::Validation(format!(
                    "an active default already exists for ({}, {})",
                    template.category.as_str(),
                    template.channel.as_str()
                )));
            }
        }
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCatalog for InMemoryCatalog {
    fn get(&self, id: &Uuid) -> Option<Template> {
        self.templates.get(id).map(|entry| entry.clone())
    }

    fn list(&self, filter: &CatalogFilter) -> Vec<Template> {
        self.templates
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn upsert(&self, template: Template) -> NurtureResult<()> {
        self.validate(&template)?;
        info!(id = %template.id, name = %template.name, "upserting template");
        self.templates.insert(template.id, template);
        Ok(())
    }

    fn delete(&self, id: &Uuid) -> NurtureResult<()> {
        self.templates
            .remove(id)
            .ok_or_else(|| NurtureError::NotFound(format!("template {id}")))?;
        info!(%id, "deleted template");
        Ok(())
    }
}

/// TTL caching wrapper over any catalog. List results are served from
/// cache until they expire; writes clear the cache so readers never see
/// a deleted template past the TTL.
pub struct CachedCatalog<C: TemplateCatalog> {
    inner: C,
    lists: TtlCache<String, Arc<Vec<Template>>>,
    ttl: Duration,
}

impl<C: TemplateCatalog> CachedCatalog<C> {
    pub fn new(inner: C, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            lists: TtlCache::new(max_entries),
            ttl,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: TemplateCatalog> TemplateCatalog for CachedCatalog<C> {
    fn get(&self, id: &Uuid) -> Option<Template> {
        self.inner.get(id)
    }

    fn list(&self, filter: &CatalogFilter) -> Vec<Template> {
        let key = filter.cache_key();
        if let Some((cached, expired)) = self.lists.get(&key) {
            if !expired {
                return cached.as_ref().clone();
            }
        }
        let fresh = self.inner.list(filter);
        self.lists.set(key, Arc::new(fresh.clone()), self.ttl);
        fresh
    }

    fn upsert(&self, template: Template) -> NurtureResult<()> {
        self.inner.upsert(template)?;
        self.lists.clear();
        Ok(())
    }

    fn delete(&self, id: &Uuid) -> NurtureResult<()> {
        self.inner.delete(id)?;
        self.lists.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nurture_core::types::TemplatePerformance;

    fn make_template(category: TemplateCategory, channel: Channel) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            category,
            channel,
            status: TemplateStatus::Active,
            subject: None,
            content: "Hello {{first_name}}".to_string(),
            variables: vec![],
            conditions: vec![],
            priority: 5,
            is_default: false,
            performance: TemplatePerformance::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_get_list_delete_round_trip() {
        let catalog = InMemoryCatalog::new();
        let template = make_template(TemplateCategory::FollowUp, Channel::Email);
        let id = template.id;
        catalog.upsert(template).unwrap();

        assert!(catalog.get(&id).is_some());
        assert_eq!(catalog.list(&CatalogFilter::active()).len(), 1);
        catalog.delete(&id).unwrap();
        assert!(catalog.get(&id).is_none());
        assert!(matches!(
            catalog.delete(&id),
            Err(NurtureError::NotFound(_))
        ));
    }

    #[test]
    fn structural_validation_rejects_bad_templates() {
        let catalog = InMemoryCatalog::new();

        let mut empty = make_template(TemplateCategory::FollowUp, Channel::Email);
        empty.content = "   ".to_string();
        assert!(matches!(
            catalog.upsert(empty),
            Err(NurtureError::Validation(_))
        ));

        let mut bad_priority = make_template(TemplateCategory::FollowUp, Channel::Email);
        bad_priority.priority = 0;
        assert!(matches!(
            catalog.upsert(bad_priority),
            Err(NurtureError::Validation(_))
        ));
    }

    #[test]
    fn second_active_default_for_same_pair_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let mut first = make_template(TemplateCategory::FollowUp, Channel::Email);
        first.is_default = true;
        catalog.upsert(first.clone()).unwrap();

        let mut second = make_template(TemplateCategory::FollowUp, Channel::Email);
        second.is_default = true;
        assert!(matches!(
            catalog.upsert(second.clone()),
            Err(NurtureError::Validation(_))
        ));

        // Different channel is fine, and re-upserting the same template is fine.
        second.channel = Channel::Sms;
        catalog.upsert(second).unwrap();
        catalog.upsert(first).unwrap();
    }

    #[test]
    fn cached_catalog_serves_lists_and_invalidates_on_write() {
        let catalog = CachedCatalog::new(InMemoryCatalog::new(), Duration::from_secs(60), 64);
        let template = make_template(TemplateCategory::FollowUp, Channel::Email);
        catalog.upsert(template).unwrap();

        let filter = CatalogFilter::active();
        assert_eq!(catalog.list(&filter).len(), 1);

        // A second upsert clears the cached list.
        let another = make_template(TemplateCategory::Nurturing, Channel::Email);
        catalog.upsert(another).unwrap();
        assert_eq!(catalog.list(&filter).len(), 2);
    }

    #[test]
    fn filters_are_conjunctive() {
        let catalog = InMemoryCatalog::new();
        catalog
            .upsert(make_template(TemplateCategory::FollowUp, Channel::Email))
            .unwrap();
        catalog
            .upsert(make_template(TemplateCategory::FollowUp, Channel::Sms))
            .unwrap();
        catalog
            .upsert(make_template(TemplateCategory::Nurturing, Channel::Email))
            .unwrap();

        let filter = CatalogFilter {
            category: Some(TemplateCategory::FollowUp),
            channel: Some(Channel::Email),
            status: Some(TemplateStatus::Active),
        };
        assert_eq!(catalog.list(&filter).len(), 1);
    }
}
