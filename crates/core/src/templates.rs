//! Message personalisation using `{{placeholder}}` syntax.

use crate::types::Contact;

/// Render `template` for one contact. Placeholders resolve against the
/// contact's own fields first, then its metadata; anything unresolved
/// renders as an empty string. An unterminated `{{` is copied verbatim.
pub fn personalise(template: &str, contact: &Contact) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                if let Some(value) = resolve(contact, name) {
                    result.push_str(value);
                }
                rest = &after_open[end + 2..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Distinct placeholder names in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };
        let name = after_open[..end].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after_open[end + 2..];
    }

    names
}

fn resolve<'a>(contact: &'a Contact, name: &str) -> Option<&'a str> {
    contact
        .field(name)
        .or_else(|| contact.metadata.get(name).map(String::as_str))
}
