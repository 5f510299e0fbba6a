//! Segment predicate engine: decides which contacts a filter chain selects.
//!
//! Filters fold strictly left to right with no precedence: the result of
//! the first filter is combined with each following filter using the
//! connector stored on the filter before it. The same functions back the
//! live preview count and send-time recipient expansion.

use postbox_core::{Contact, ContactPreferences, PreferenceMap};
use tracing::warn;

use crate::filter::{FilterField, FilterOperator, LogicalOperator, SegmentFilter};

/// Return the contacts matching `filters`, in input order. An empty
/// filter list matches every contact.
pub fn match_contacts<'a, I>(
    filters: &[SegmentFilter],
    contacts: I,
    prefs: &PreferenceMap,
) -> Vec<&'a Contact>
where
    I: IntoIterator<Item = &'a Contact>,
{
    report_malformed(filters);
    contacts
        .into_iter()
        .filter(|contact| contact_matches(filters, contact, prefs))
        .collect()
}

pub fn count_matches<'a, I>(filters: &[SegmentFilter], contacts: I, prefs: &PreferenceMap) -> usize
where
    I: IntoIterator<Item = &'a Contact>,
{
    report_malformed(filters);
    contacts
        .into_iter()
        .filter(|contact| contact_matches(filters, contact, prefs))
        .count()
}

/// Evaluate the whole filter chain against one contact.
pub fn contact_matches(
    filters: &[SegmentFilter],
    contact: &Contact,
    prefs: &PreferenceMap,
) -> bool {
    let Some((first, rest)) = filters.split_first() else {
        return true;
    };

    let contact_prefs = prefs.get(&contact.id);
    let mut acc = filter_matches(first, contact, contact_prefs);
    let mut previous = first;

    for filter in rest {
        let is_match = filter_matches(filter, contact, contact_prefs);
        acc = match previous.connector() {
            LogicalOperator::Or => acc || is_match,
            LogicalOperator::And => acc && is_match,
        };
        previous = filter;
    }

    acc
}

/// Evaluate a single filter. Unknown fields and operators never match.
pub fn filter_matches(
    filter: &SegmentFilter,
    contact: &Contact,
    prefs: Option<&ContactPreferences>,
) -> bool {
    if let Some(channel) = filter.field.preference_channel() {
        // No preference row at all fails closed, whatever was asked for.
        let Some(prefs) = prefs else {
            return false;
        };
        let wanted = filter.value == "true";
        return prefs.allows(channel) == wanted;
    }

    let Some(actual) = field_value(filter.field, contact) else {
        return false;
    };

    let expected = filter.value.to_lowercase();
    filter
        .operator
        .apply(&actual.to_lowercase(), &expected)
        .unwrap_or(false)
}

/// Indices of filters that can never match: an unknown field, or an
/// unknown operator on a string field.
pub fn malformed_filters(filters: &[SegmentFilter]) -> Vec<usize> {
    filters
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            f.field == FilterField::Unknown
                || (f.field.preference_channel().is_none()
                    && f.operator == FilterOperator::Unknown)
        })
        .map(|(index, _)| index)
        .collect()
}

/// Warn once per evaluation about filters that will never match.
fn report_malformed(filters: &[SegmentFilter]) {
    let malformed = malformed_filters(filters);
    if !malformed.is_empty() {
        warn!(
            filters = ?malformed,
            "Segment filters use an unknown field or operator, treating them as no match"
        );
    }
}

/// The string a non-preference field compares against. Unset contact
/// fields read as empty. `None` for preference and unknown fields.
fn field_value(field: FilterField, contact: &Contact) -> Option<String> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    match field {
        FilterField::Tags => Some(contact.tags.join(" ")),
        FilterField::Address => Some(format!(
            "{} {}",
            text(&contact.address_line_1),
            text(&contact.postcode)
        )),
        FilterField::Email => Some(text(&contact.email)),
        FilterField::Phone => Some(text(&contact.phone)),
        FilterField::Name => Some(format!(
            "{} {}",
            text(&contact.first_name),
            text(&contact.last_name)
        )),
        FilterField::EmailPreference
        | FilterField::SmsPreference
        | FilterField::LetterPreference
        | FilterField::Unknown => None,
    }
}
