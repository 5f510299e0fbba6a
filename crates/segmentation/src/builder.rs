//! Segment builder: fluent API for constructing segment filter chains.

use crate::filter::{FilterField, FilterOperator, LogicalOperator, SegmentFilter};
use crate::registry::Segment;
use postbox_core::Channel;
use uuid::Uuid;

pub struct SegmentBuilder {
    service_id: Uuid,
    name: String,
    description: Option<String>,
    filters: Vec<SegmentFilter>,
}

impl SegmentBuilder {
    pub fn new(service_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            service_id,
            name: name.into(),
            description: None,
            filters: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn filter(
        mut self,
        field: FilterField,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        self.filters.push(SegmentFilter::new(field, operator, value));
        self
    }

    pub fn has_tag(self, tag: impl Into<String>) -> Self {
        self.filter(FilterField::Tags, FilterOperator::Contains, tag)
    }

    pub fn prefers(mut self, channel: Channel, wanted: bool) -> Self {
        self.filters.push(SegmentFilter::preference(channel, wanted));
        self
    }

    /// Join the last added filter to the next one with OR.
    pub fn or(self) -> Self {
        self.connect(LogicalOperator::Or)
    }

    /// Join the last added filter to the next one with AND (the default).
    pub fn and(self) -> Self {
        self.connect(LogicalOperator::And)
    }

    fn connect(mut self, logic: LogicalOperator) -> Self {
        if let Some(last) = self.filters.last_mut() {
            last.logic = Some(logic);
        }
        self
    }

    pub fn build(self) -> Segment {
        let now = chrono::Utc::now();
        Segment {
            id: Uuid::new_v4(),
            service_id: self.service_id,
            name: self.name,
            description: self.description,
            filters: self.filters,
            contact_count: None,
            created_at: now,
            updated_at: now,
        }
    }
}
