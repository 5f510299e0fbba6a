//! Segment registry: saved audience definitions per service, with
//! recomputed contact counts and send-time recipient expansion.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use postbox_core::{Contact, PostboxError, PostboxResult, PreferenceMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine;
use crate::filter::{validate_filters, SegmentFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<SegmentFilter>,
    /// Last computed match count. A display hint only; recompute with
    /// [`SegmentRegistry::refresh_contact_count`] before relying on it.
    #[serde(default)]
    pub contact_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct SegmentRegistry {
    segments: DashMap<Uuid, Segment>,
    max_filters: usize,
}

impl SegmentRegistry {
    pub fn new(max_filters: usize) -> Self {
        Self {
            segments: DashMap::new(),
            max_filters,
        }
    }

    /// Store a new segment after validating its filters.
    pub fn create_segment(&self, segment: Segment) -> PostboxResult<Uuid> {
        self.check_filters(&segment.filters)?;
        let id = segment.id;
        info!(
            segment_id = %id,
            service_id = %segment.service_id,
            name = %segment.name,
            filters = segment.filters.len(),
            "Segment created"
        );
        metrics::counter!("segment.created").increment(1);
        self.segments.insert(id, segment);
        Ok(id)
    }

    /// Store a previously persisted segment as-is. Malformed filters are
    /// kept and simply never match.
    pub fn restore_segment(&self, segment: Segment) {
        if let Err(e) = validate_filters(&segment.filters) {
            warn!(segment_id = %segment.id, error = %e, "Restored segment has malformed filters");
        }
        self.segments.insert(segment.id, segment);
    }

    pub fn get_segment(&self, id: &Uuid) -> Option<Segment> {
        self.segments.get(id).map(|s| s.clone())
    }

    /// Segments owned by a service, sorted by name.
    pub fn list_segments(&self, service_id: &Uuid) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| &s.service_id == service_id)
            .map(|s| s.value().clone())
            .collect();
        segments.sort_by(|a, b| a.name.cmp(&b.name));
        segments
    }

    /// Replace a segment's filters. The cached count is cleared.
    pub fn update_filters(&self, id: &Uuid, filters: Vec<SegmentFilter>) -> PostboxResult<()> {
        self.check_filters(&filters)?;
        let mut segment = self
            .segments
            .get_mut(id)
            .ok_or_else(|| PostboxError::NotFound(format!("segment {id}")))?;
        segment.filters = filters;
        segment.contact_count = None;
        segment.updated_at = Utc::now();
        debug!(segment_id = %id, filters = segment.filters.len(), "Segment filters updated");
        Ok(())
    }

    pub fn delete_segment(&self, id: &Uuid) -> PostboxResult<Segment> {
        self.segments
            .remove(id)
            .map(|(_, segment)| segment)
            .ok_or_else(|| PostboxError::NotFound(format!("segment {id}")))
    }

    /// Count matches for filters being edited but not yet saved, over the
    /// contacts of `service_id`. Agrees with what the saved segment will
    /// later refresh to and resolve.
    pub fn preview_count(
        &self,
        service_id: &Uuid,
        filters: &[SegmentFilter],
        contacts: &[Contact],
        prefs: &PreferenceMap,
    ) -> usize {
        matching(service_id, filters, contacts, prefs).len()
    }

    /// Recompute and store the segment's contact count.
    pub fn refresh_contact_count(
        &self,
        id: &Uuid,
        contacts: &[Contact],
        prefs: &PreferenceMap,
    ) -> PostboxResult<u64> {
        let mut segment = self
            .segments
            .get_mut(id)
            .ok_or_else(|| PostboxError::NotFound(format!("segment {id}")))?;
        let count = matching(&segment.service_id, &segment.filters, contacts, prefs).len() as u64;
        segment.contact_count = Some(count);
        debug!(segment_id = %id, count = count, "Segment contact count refreshed");
        Ok(count)
    }

    /// Expand a segment into the matching contacts of its own service.
    pub fn resolve_recipients<'a>(
        &self,
        id: &Uuid,
        contacts: &'a [Contact],
        prefs: &PreferenceMap,
    ) -> PostboxResult<Vec<&'a Contact>> {
        let segment = self
            .segments
            .get(id)
            .ok_or_else(|| PostboxError::NotFound(format!("segment {id}")))?;
        let recipients = matching(&segment.service_id, &segment.filters, contacts, prefs);

        info!(
            segment_id = %id,
            candidates = contacts.len(),
            recipients = recipients.len(),
            "Segment resolved to recipients"
        );
        metrics::counter!("segment.recipients_resolved").increment(recipients.len() as u64);

        Ok(recipients)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn check_filters(&self, filters: &[SegmentFilter]) -> PostboxResult<()> {
        if filters.len() > self.max_filters {
            return Err(PostboxError::Validation(format!(
                "segment has {} filters, limit is {}",
                filters.len(),
                self.max_filters
            )));
        }
        validate_filters(filters)
    }
}

impl Default for SegmentRegistry {
    fn default() -> Self {
        Self::new(postbox_core::config::SegmentConfig::default().max_filters)
    }
}

/// Contacts of `service_id` that `filters` select. Every count and
/// expansion the registry hands out goes through here.
pub fn matching<'a>(
    service_id: &Uuid,
    filters: &[SegmentFilter],
    contacts: &'a [Contact],
    prefs: &PreferenceMap,
) -> Vec<&'a Contact> {
    let owned = contacts.iter().filter(|c| &c.service_id == service_id);
    engine::match_contacts(filters, owned, prefs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SegmentBuilder;
    use crate::filter::{FilterField, FilterOperator};
    use postbox_core::{Channel, ContactPreferences};

    fn tagged(service_id: Uuid, tags: &[&str]) -> Contact {
        let mut c = Contact::new(service_id);
        for tag in tags {
            c.add_tag(*tag);
        }
        c
    }

    #[test]
    fn test_create_and_resolve_scoped_to_service() {
        let registry = SegmentRegistry::default();
        let service = Uuid::new_v4();
        let other_service = Uuid::new_v4();

        let segment = SegmentBuilder::new(service, "VIPs").has_tag("vip").build();
        let id = registry.create_segment(segment).unwrap();

        let contacts = vec![
            tagged(service, &["vip"]),
            tagged(service, &["regular"]),
            tagged(other_service, &["vip"]),
        ];
        let recipients = registry
            .resolve_recipients(&id, &contacts, &PreferenceMap::new())
            .unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].id, contacts[0].id);
    }

    #[test]
    fn test_create_rejects_invalid_filters() {
        let registry = SegmentRegistry::new(2);
        let service = Uuid::new_v4();

        let unknown = SegmentBuilder::new(service, "Bad")
            .filter(FilterField::Unknown, FilterOperator::Equals, "x")
            .build();
        assert!(matches!(
            registry.create_segment(unknown),
            Err(PostboxError::Validation(_))
        ));

        let too_many = SegmentBuilder::new(service, "Long")
            .has_tag("a")
            .has_tag("b")
            .has_tag("c")
            .build();
        assert!(matches!(
            registry.create_segment(too_many),
            Err(PostboxError::Validation(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_restore_keeps_malformed_segment() {
        let registry = SegmentRegistry::default();
        let service = Uuid::new_v4();
        let segment = SegmentBuilder::new(service, "Legacy")
            .filter(FilterField::Unknown, FilterOperator::Contains, "")
            .build();
        let id = segment.id;
        registry.restore_segment(segment);

        let contacts = vec![tagged(service, &[])];
        let recipients = registry
            .resolve_recipients(&id, &contacts, &PreferenceMap::new())
            .unwrap();
        assert!(recipients.is_empty());
    }

    #[test]
    fn test_refresh_count_and_update_clears_it() {
        let registry = SegmentRegistry::default();
        let service = Uuid::new_v4();
        let contacts = vec![tagged(service, &["vip"]), tagged(service, &["vip", "beta"])];
        let prefs = ContactPreferences::index(vec![ContactPreferences {
            contact_id: contacts[1].id,
            email: true,
            sms: true,
            letter: false,
        }]);

        let id = registry
            .create_segment(SegmentBuilder::new(service, "VIP").has_tag("vip").build())
            .unwrap();
        assert_eq!(registry.refresh_contact_count(&id, &contacts, &prefs).unwrap(), 2);
        assert_eq!(registry.get_segment(&id).unwrap().contact_count, Some(2));

        let narrowed = vec![
            SegmentFilter::new(FilterField::Tags, FilterOperator::Contains, "vip"),
            SegmentFilter::preference(Channel::Sms, true),
        ];
        assert_eq!(registry.preview_count(&service, &narrowed, &contacts, &prefs), 1);

        registry.update_filters(&id, narrowed).unwrap();
        assert_eq!(registry.get_segment(&id).unwrap().contact_count, None);
        assert_eq!(registry.refresh_contact_count(&id, &contacts, &prefs).unwrap(), 1);
    }

    #[test]
    fn test_preview_refresh_and_resolve_agree_across_services() {
        let registry = SegmentRegistry::default();
        let service = Uuid::new_v4();
        let contacts = vec![
            tagged(service, &["vip"]),
            tagged(Uuid::new_v4(), &["vip"]),
            tagged(service, &["regular"]),
        ];
        let prefs = PreferenceMap::new();

        let segment = SegmentBuilder::new(service, "VIP").has_tag("vip").build();
        let filters = segment.filters.clone();
        let id = registry.create_segment(segment).unwrap();

        let preview = registry.preview_count(&service, &filters, &contacts, &prefs);
        let refreshed = registry.refresh_contact_count(&id, &contacts, &prefs).unwrap();
        let resolved = registry.resolve_recipients(&id, &contacts, &prefs).unwrap();

        assert_eq!(preview, 1);
        assert_eq!(refreshed, 1);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, contacts[0].id);
    }

    #[test]
    fn test_list_sorted_and_delete() {
        let registry = SegmentRegistry::default();
        let service = Uuid::new_v4();
        registry
            .create_segment(SegmentBuilder::new(service, "Zebra").build())
            .unwrap();
        let id = registry
            .create_segment(SegmentBuilder::new(service, "Alpha").build())
            .unwrap();
        registry
            .create_segment(SegmentBuilder::new(Uuid::new_v4(), "Other").build())
            .unwrap();

        let names: Vec<String> = registry
            .list_segments(&service)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zebra"]);

        assert_eq!(registry.delete_segment(&id).unwrap().name, "Alpha");
        assert!(matches!(
            registry.delete_segment(&id),
            Err(PostboxError::NotFound(_))
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_segment_not_found() {
        let registry = SegmentRegistry::default();
        let missing = Uuid::new_v4();
        assert!(registry.get_segment(&missing).is_none());
        assert!(matches!(
            registry.resolve_recipients(&missing, &[], &PreferenceMap::new()),
            Err(PostboxError::NotFound(_))
        ));
        assert!(matches!(
            registry.update_filters(&missing, vec![]),
            Err(PostboxError::NotFound(_))
        ));
    }
}
