use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Contact preferences keyed by contact id. A missing entry means the
/// contact never recorded a preference, which is not the same as `false`.
pub type PreferenceMap = HashMap<Uuid, ContactPreferences>;

/// Delivery channels a notification can go out on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Letter,
}

impl Channel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Email => "Email",
            Channel::Sms => "SMS",
            Channel::Letter => "Letter",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "letter" => Ok(Channel::Letter),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// A recipient record owned by a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub service_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address_line_1: Option<String>,
    #[serde(default)]
    pub address_line_2: Option<String>,
    #[serde(default)]
    pub address_line_3: Option<String>,
    #[serde(default)]
    pub address_line_4: Option<String>,
    #[serde(default)]
    pub address_line_5: Option<String>,
    #[serde(default)]
    pub address_line_6: Option<String>,
    #[serde(default)]
    pub address_line_7: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    /// Distinct, in insertion order. Duplicates in stored rows are dropped
    /// on load.
    #[serde(default, deserialize_with = "distinct_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn new(service_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            created_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Adds a tag unless an identical one is already present.
    /// Returns whether the tag was added.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Address lines 1 through 7 in order, including unset ones.
    pub fn address_lines(&self) -> [Option<&str>; 7] {
        [
            self.address_line_1.as_deref(),
            self.address_line_2.as_deref(),
            self.address_line_3.as_deref(),
            self.address_line_4.as_deref(),
            self.address_line_5.as_deref(),
            self.address_line_6.as_deref(),
            self.address_line_7.as_deref(),
        ]
    }

    /// Looks up a named contact field as used by template placeholders.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => self.title.as_deref(),
            "first_name" => self.first_name.as_deref(),
            "last_name" => self.last_name.as_deref(),
            "email" => self.email.as_deref(),
            "phone" => self.phone.as_deref(),
            "postcode" => self.postcode.as_deref(),
            "address_line_1" => self.address_line_1.as_deref(),
            "address_line_2" => self.address_line_2.as_deref(),
            "address_line_3" => self.address_line_3.as_deref(),
            "address_line_4" => self.address_line_4.as_deref(),
            "address_line_5" => self.address_line_5.as_deref(),
            "address_line_6" => self.address_line_6.as_deref(),
            "address_line_7" => self.address_line_7.as_deref(),
            _ => None,
        }
    }
}

fn distinct_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Per-contact channel consent flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactPreferences {
    pub contact_id: Uuid,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub letter: bool,
}

impl ContactPreferences {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Letter => self.letter,
        }
    }

    /// Index a list of preference rows by contact id. Later rows win.
    pub fn index(rows: impl IntoIterator<Item = ContactPreferences>) -> PreferenceMap {
        rows.into_iter().map(|p| (p.contact_id, p)).collect()
    }
}
