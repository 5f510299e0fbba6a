//! Outbound channel helpers.
//!
//! SMS: charset classification and billable segment estimation for draft text.
//! Recipients: per-channel address resolution and consent filtering.

pub mod recipients;
pub mod sms;

pub use recipients::{filter_by_consent, resolve_channel_recipients, RecipientResolution};
pub use sms::{estimate_batch, estimate_sms_segments, SmsBatchEstimate, SmsEstimate};
