//! Audience segmentation: ordered filter chains evaluated against
//! contacts, saved segments per service, and a fluent segment builder.

pub mod builder;
pub mod engine;
pub mod filter;
pub mod registry;

pub use builder::SegmentBuilder;
pub use engine::{contact_matches, count_matches, match_contacts};
pub use filter::{FilterField, FilterOperator, LogicalOperator, SegmentFilter};
pub use registry::{Segment, SegmentRegistry};
