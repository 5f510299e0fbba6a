//! Segment filter types and validation.

use postbox_core::{Channel, PostboxError, PostboxResult};
use serde::{Deserialize, Serialize};

/// How a filter combines with the one that follows it. Stored on the
/// preceding filter, so `filters[i - 1].logic` joins `filters[i]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Tags,
    Address,
    Email,
    Phone,
    Name,
    EmailPreference,
    SmsPreference,
    LetterPreference,
    /// Any field name this version does not recognise.
    #[serde(other)]
    Unknown,
}

impl FilterField {
    /// The channel a preference field tests, if it is one.
    pub fn preference_channel(&self) -> Option<Channel> {
        match self {
            FilterField::EmailPreference => Some(Channel::Email),
            FilterField::SmsPreference => Some(Channel::Sms),
            FilterField::LetterPreference => Some(Channel::Letter),
            _ => None,
        }
    }

    pub fn for_preference(channel: Channel) -> Self {
        match channel {
            Channel::Email => FilterField::EmailPreference,
            Channel::Sms => FilterField::SmsPreference,
            Channel::Letter => FilterField::LetterPreference,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    NotContains,
    #[serde(other)]
    Unknown,
}

impl FilterOperator {
    /// Apply the operator to already lower-cased operands. `None` for
    /// `Unknown`, which callers treat as no match.
    pub fn apply(&self, actual: &str, expected: &str) -> Option<bool> {
        match self {
            FilterOperator::Contains => Some(actual.contains(expected)),
            FilterOperator::Equals => Some(actual == expected),
            FilterOperator::StartsWith => Some(actual.starts_with(expected)),
            FilterOperator::EndsWith => Some(actual.ends_with(expected)),
            FilterOperator::NotContains => Some(!actual.contains(expected)),
            FilterOperator::Unknown => None,
        }
    }
}

/// One condition in a segment definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentFilter {
    pub field: FilterField,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<LogicalOperator>,
}

impl SegmentFilter {
    pub fn new(field: FilterField, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            logic: None,
        }
    }

    /// Filter on a channel preference. The operator is ignored for
    /// preference fields; `equals` is stored for readability.
    pub fn preference(channel: Channel, wanted: bool) -> Self {
        Self::new(
            FilterField::for_preference(channel),
            FilterOperator::Equals,
            wanted.to_string(),
        )
    }

    pub fn with_logic(mut self, logic: LogicalOperator) -> Self {
        self.logic = Some(logic);
        self
    }

    /// Connector joining this filter to the next one.
    pub fn connector(&self) -> LogicalOperator {
        self.logic.unwrap_or_default()
    }
}

/// Check that every filter uses a known field and operator and that
/// preference filters carry `true` or `false`.
pub fn validate_filters(filters: &[SegmentFilter]) -> PostboxResult<()> {
    let mut problems = Vec::new();

    for (index, filter) in filters.iter().enumerate() {
        if filter.field == FilterField::Unknown {
            problems.push(format!("filter {index}: unknown field"));
            continue;
        }
        if filter.field.preference_channel().is_some() {
            // The engine compares the value verbatim, so only the exact
            // lowercase forms are accepted.
            if filter.value != "true" && filter.value != "false" {
                problems.push(format!(
                    "filter {index}: preference value must be true or false, got '{}'",
                    filter.value
                ));
            }
        } else if filter.operator == FilterOperator::Unknown {
            problems.push(format!("filter {index}: unknown operator"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(PostboxError::Validation(problems.join("; ")))
    }
}
