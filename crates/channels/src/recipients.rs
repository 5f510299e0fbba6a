//! Per-channel recipient resolution: turns matched contacts into the
//! addresses a notification provider needs, skipping unreachable ones.

use postbox_core::{Channel, Contact, PreferenceMap};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Address lines (including the postcode) a letter needs at minimum.
const MIN_LETTER_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecipientAddress {
    Email(String),
    Phone(String),
    /// Non-empty address lines in order, postcode last.
    Postal(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub contact_id: Uuid,
    pub address: RecipientAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingEmail,
    MissingPhone,
    IncompleteAddress,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientResolution {
    pub recipients: Vec<Recipient>,
    pub skipped: Vec<(Uuid, SkipReason)>,
}

/// Build the deliverable address of every contact for `channel`.
pub fn resolve_channel_recipients<'a, I>(channel: Channel, contacts: I) -> RecipientResolution
where
    I: IntoIterator<Item = &'a Contact>,
{
    let mut resolution = RecipientResolution::default();
    for contact in contacts {
        match address_for(channel, contact) {
            Ok(address) => resolution.recipients.push(Recipient {
                contact_id: contact.id,
                address,
            }),
            Err(reason) => resolution.skipped.push((contact.id, reason)),
        }
    }
    debug!(
        channel = channel.display_name(),
        recipients = resolution.recipients.len(),
        skipped = resolution.skipped.len(),
        "Channel recipients resolved"
    );
    resolution
}

/// Keep only contacts that opted in to `channel`. Contacts without a
/// preference row are dropped, matching how preference filters behave.
pub fn filter_by_consent<'a, I>(
    channel: Channel,
    contacts: I,
    prefs: &PreferenceMap,
) -> Vec<&'a Contact>
where
    I: IntoIterator<Item = &'a Contact>,
{
    contacts
        .into_iter()
        .filter(|c| prefs.get(&c.id).is_some_and(|p| p.allows(channel)))
        .collect()
}

fn address_for(channel: Channel, contact: &Contact) -> Result<RecipientAddress, SkipReason> {
    match channel {
        Channel::Email => non_blank(contact.email.as_deref())
            .map(|e| RecipientAddress::Email(e.to_string()))
            .ok_or(SkipReason::MissingEmail),
        Channel::Sms => non_blank(contact.phone.as_deref())
            .map(|p| RecipientAddress::Phone(p.to_string()))
            .ok_or(SkipReason::MissingPhone),
        Channel::Letter => postal_lines(contact)
            .map(RecipientAddress::Postal)
            .ok_or(SkipReason::IncompleteAddress),
    }
}

fn postal_lines(contact: &Contact) -> Option<Vec<String>> {
    let postcode = non_blank(contact.postcode.as_deref())?;
    let mut lines: Vec<String> = contact
        .address_lines()
        .into_iter()
        .filter_map(non_blank)
        .map(str::to_string)
        .collect();
    lines.push(postcode.to_string());
    (lines.len() >= MIN_LETTER_LINES).then_some(lines)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
