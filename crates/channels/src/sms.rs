//! SMS length and cost estimation: charset classification and billable
//! segment counts for draft message text.

use postbox_core::config::SmsConfig;
use postbox_core::templates::personalise;
use postbox_core::Contact;
use serde::{Deserialize, Serialize};

/// Per-message character cap for the standard charset.
pub const STANDARD_CHARACTER_LIMIT: u32 = 160;
/// Per-message character cap once extended characters are present.
pub const EXTENDED_CHARACTER_LIMIT: u32 = 70;

/// Characters that always force extended billing and occupy two units.
const SPECIAL_CHARS: [char; 9] = ['[', ']', '{', '}', '^', '\\', '|', '~', '\u{20AC}'];

/// Accented letters the provider carries without switching charset.
const SAFE_ACCENTED: [char; 13] = [
    '\u{00C4}', // A-umlaut
    '\u{00C9}', // E-acute
    '\u{00D6}', // O-umlaut
    '\u{00DC}', // U-umlaut
    '\u{00E0}', // a-grave
    '\u{00E4}', // a-umlaut
    '\u{00E9}', // e-acute
    '\u{00E8}', // e-grave
    '\u{00EC}', // i-grave
    '\u{00F2}', // o-grave
    '\u{00F6}', // o-umlaut
    '\u{00F9}', // u-grave
    '\u{00FC}', // u-umlaut
];

/// Length and billing estimate for one message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsEstimate {
    pub uses_extended_charset: bool,
    /// 70 for extended, 160 for standard.
    pub character_limit: u32,
    /// Billable segments. Zero for empty content.
    pub segment_count: u32,
    /// Length shown to the user, in UTF-16 code units.
    pub raw_length: u32,
    /// Length used for banding: raw length plus one per special character.
    pub effective_length: u32,
    /// Distinct characters that triggered extended billing, first-seen order.
    pub extended_chars: Vec<char>,
}

impl SmsEstimate {
    /// Composer warnings for this estimate under the given settings.
    pub fn warnings(&self, config: &SmsConfig) -> Vec<String> {
        let mut warnings = Vec::new();
        if config.warn_on_extended_charset && self.uses_extended_charset {
            let chars: String = self.extended_chars.iter().collect();
            warnings.push(format!(
                "Message contains special characters ({chars}); limit is {} characters per message",
                self.character_limit
            ));
        }
        if self.segment_count > config.max_segments_warning {
            warnings.push(format!(
                "Message will be sent as {} parts",
                self.segment_count
            ));
        }
        warnings
    }
}

/// Totals for one template rendered for many recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsBatchEstimate {
    pub recipients: u32,
    pub total_segments: u64,
    pub extended_recipients: u32,
    pub max_segments: u32,
}

pub fn is_special_char(c: char) -> bool {
    SPECIAL_CHARS.contains(&c)
}

fn forces_extended(c: char) -> bool {
    is_special_char(c) || (!c.is_ascii() && !SAFE_ACCENTED.contains(&c))
}

/// Whether `content` needs the extended charset.
pub fn uses_extended_charset(content: &str) -> bool {
    content.chars().any(forces_extended)
}

/// Distinct characters in `content` that force the extended charset.
pub fn extended_chars(content: &str) -> Vec<char> {
    let mut found: Vec<char> = Vec::new();
    for c in content.chars().filter(|c| forces_extended(*c)) {
        if !found.contains(&c) {
            found.push(c);
        }
    }
    found
}

/// Estimate billing for a draft message. Pure function of `content`.
pub fn estimate_sms_segments(content: &str) -> SmsEstimate {
    let extended = extended_chars(content);
    let uses_extended_charset = !extended.is_empty();
    let raw_length = content.encode_utf16().count() as u32;
    let special = content.chars().filter(|c| is_special_char(*c)).count() as u32;
    let effective_length = raw_length + special;

    let segment_count = if content.is_empty() {
        0
    } else if uses_extended_charset {
        extended_segments(effective_length)
    } else {
        standard_segments(effective_length)
    };

    SmsEstimate {
        uses_extended_charset,
        character_limit: if uses_extended_charset {
            EXTENDED_CHARACTER_LIMIT
        } else {
            STANDARD_CHARACTER_LIMIT
        },
        segment_count,
        raw_length,
        effective_length,
        extended_chars: extended,
    }
}

fn extended_segments(length: u32) -> u32 {
    match length {
        0..=70 => 1,
        71..=134 => 2,
        135..=201 => 3,
        202..=268 => 4,
        _ => 4 + (length - 268).div_ceil(67),
    }
}

fn standard_segments(length: u32) -> u32 {
    match length {
        0..=160 => 1,
        161..=306 => 2,
        307..=459 => 3,
        460..=612 => 4,
        613..=765 => 5,
        766..=918 => 6,
        _ => length.div_ceil(153),
    }
}

/// Render `template` for every recipient and total the billable segments.
pub fn estimate_batch<'a, I>(template: &str, recipients: I) -> SmsBatchEstimate
where
    I: IntoIterator<Item = &'a Contact>,
{
    let mut batch = SmsBatchEstimate::default();
    for contact in recipients {
        let estimate = estimate_sms_segments(&personalise(template, contact));
        batch.recipients += 1;
        batch.total_segments += u64::from(estimate.segment_count);
        if estimate.uses_extended_charset {
            batch.extended_recipients += 1;
        }
        batch.max_segments = batch.max_segments.max(estimate.segment_count);
    }
    tracing::debug!(
        recipients = batch.recipients,
        total_segments = batch.total_segments,
        "SMS batch estimated"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Extended-charset text with the given effective length.
    fn extended_of(effective: usize) -> String {
        format!("[{}", "a".repeat(effective - 2))
    }

    #[test]
    fn test_standard_banding_boundaries() {
        for (len, segments) in [
            (1, 1),
            (160, 1),
            (161, 2),
            (306, 2),
            (307, 3),
            (459, 3),
            (460, 4),
            (612, 4),
            (765, 5),
            (918, 6),
            (919, 7),
            (1071, 7),
            (1072, 8),
        ] {
            let estimate = estimate_sms_segments(&"a".repeat(len));
            assert!(!estimate.uses_extended_charset);
            assert_eq!(estimate.segment_count, segments, "length {len}");
        }
    }

    #[test]
    fn test_extended_banding_boundaries() {
        for (len, segments) in [
            (70, 1),
            (71, 2),
            (134, 2),
            (135, 3),
            (201, 3),
            (202, 4),
            (268, 4),
            (269, 5),
            (335, 5),
            (336, 6),
        ] {
            let estimate = estimate_sms_segments(&extended_of(len));
            assert!(estimate.uses_extended_charset);
            assert_eq!(estimate.effective_length, len as u32);
            assert_eq!(estimate.segment_count, segments, "length {len}");
        }
    }

    #[test]
    fn test_special_char_counts_double() {
        let text = format!("[{}", "a".repeat(68));
        let estimate = estimate_sms_segments(&text);
        assert!(estimate.uses_extended_charset);
        assert_eq!(estimate.raw_length, 69);
        assert_eq!(estimate.effective_length, 70);
        assert_eq!(estimate.character_limit, 70);
        assert_eq!(estimate.segment_count, 1);

        assert_eq!(estimate_sms_segments(&format!("{text}a")).segment_count, 2);
        assert_eq!(estimate_sms_segments(&format!("{text}]")).segment_count, 2);
    }

    #[test]
    fn test_euro_sign_is_special() {
        let estimate = estimate_sms_segments("Total: 5\u{20AC}");
        assert!(estimate.uses_extended_charset);
        assert_eq!(estimate.raw_length, 9);
        assert_eq!(estimate.effective_length, 10);
        assert_eq!(estimate.extended_chars, vec!['\u{20AC}']);
    }

    #[test]
    fn test_safe_accented_letters_stay_standard() {
        let estimate = estimate_sms_segments("caf\u{00E9}");
        assert!(!estimate.uses_extended_charset);
        assert_eq!(estimate.character_limit, 160);
        assert_eq!(estimate.raw_length, 4);

        let whitelist: String = SAFE_ACCENTED.iter().collect();
        assert!(!uses_extended_charset(&whitelist));
        assert!(!uses_extended_charset("Plain ASCII: 100% <ok> @home #1 $2"));
    }

    #[test]
    fn test_other_non_ascii_is_extended() {
        let estimate = estimate_sms_segments("na\u{00EF}ve\u{00F1}");
        assert!(estimate.uses_extended_charset);
        assert_eq!(estimate.extended_chars, vec!['\u{00EF}', '\u{00F1}']);
        // Uppercase forms outside the whitelist are not exempt.
        assert!(uses_extended_charset("\u{00C0}"));
    }

    #[test]
    fn test_raw_length_counts_utf16_units() {
        let estimate = estimate_sms_segments("hi \u{1F600}");
        assert!(estimate.uses_extended_charset);
        assert_eq!(estimate.raw_length, 5);
        assert_eq!(estimate.effective_length, 5);
    }

    #[test]
    fn test_empty_content_has_no_segments() {
        let estimate = estimate_sms_segments("");
        assert_eq!(estimate.segment_count, 0);
        assert_eq!(estimate.raw_length, 0);
        assert!(!estimate.uses_extended_charset);
        assert_eq!(estimate.character_limit, 160);
    }

    #[test]
    fn test_estimate_is_repeatable() {
        let text = "Reminder: {appointment} at 10:00 \u{00F1}";
        assert_eq!(estimate_sms_segments(text), estimate_sms_segments(text));
    }

    #[test]
    fn test_warnings() {
        let config = SmsConfig::default();
        assert!(estimate_sms_segments("hello").warnings(&config).is_empty());

        let warnings = estimate_sms_segments("a|b").warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains('|'));

        let long = estimate_sms_segments(&"a".repeat(500));
        assert_eq!(long.segment_count, 4);
        assert_eq!(long.warnings(&config), vec!["Message will be sent as 4 parts"]);

        let quiet = SmsConfig {
            max_segments_warning: 10,
            warn_on_extended_charset: false,
        };
        assert!(estimate_sms_segments("a|b").warnings(&quiet).is_empty());
    }

    #[test]
    fn test_batch_estimate_personalises_each_recipient() {
        let service = Uuid::new_v4();
        let mut short = Contact::new(service);
        short.first_name = Some("Al".to_string());
        let mut long = Contact::new(service);
        long.first_name = Some("J\u{00F8}rgen".to_string());

        let template = format!("Hi {{{{first_name}}}}, {}", "x".repeat(55));
        let batch = estimate_batch(&template, [&short, &long]);

        assert_eq!(batch.recipients, 2);
        assert_eq!(batch.extended_recipients, 1);
        // 62 standard units and 66 extended units: one segment each.
        assert_eq!(batch.total_segments, 2);
        assert_eq!(batch.max_segments, 1);

        let empty = estimate_batch(&template, std::iter::empty());
        assert_eq!(empty, SmsBatchEstimate::default());
    }
}
