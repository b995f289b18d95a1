//! Parsing of the free-form author list a story is started with.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{StoryError, StoryResult};

static MAILBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:(?:"(?P<quoted>[^"]*)"|(?P<name>[^"<>]*?))\s*<(?P<angle>[^<>\s@]+@[^<>\s@]+)>|(?P<bare>[^<>\s@]+@[^<>\s@]+))$"#)
        .expect("mailbox regex is valid")
});

/// One entry of an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

/// Canonical form of an author identity. Addresses are compared and stored
/// lowercased.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Split on commas and line breaks that sit outside a `"..."` display name.
fn split_entries(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in input.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' | '\n' | '\r' if !quoted => {
                entries.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    entries.push(&input[start..]);
    entries
}

/// Parse `Name <a@b>` / `a@b` entries separated by commas or line breaks.
/// A quoted name may itself contain commas.
///
/// Blank entries are skipped. Addresses come back normalized, and the result
/// is non-empty and free of duplicates, since each author holds exactly one
/// place in the rotation.
pub fn parse_address_list(input: &str) -> StoryResult<Vec<Mailbox>> {
    let mut mailboxes: Vec<Mailbox> = Vec::new();
    for entry in split_entries(input).into_iter().map(str::trim).filter(|e| !e.is_empty()) {
        let caps = MAILBOX.captures(entry).ok_or_else(|| {
            StoryError::Validation(format!("Could not parse author email address: {}", entry))
        })?;
        let mailbox = match (caps.name("angle"), caps.name("bare")) {
            (Some(addr), _) => Mailbox {
                name: caps
                    .name("quoted")
                    .or_else(|| caps.name("name"))
                    .map(|n| n.as_str().trim().to_string())
                    .filter(|n| !n.is_empty()),
                address: normalize_address(addr.as_str()),
            },
            (None, Some(addr)) => Mailbox {
                name: None,
                address: normalize_address(addr.as_str()),
            },
            (None, None) => {
                return Err(StoryError::Validation(format!(
                    "Could not parse author email address: {}",
                    entry
                )));
            }
        };
        if mailboxes.iter().any(|m| m.address == mailbox.address) {
            return Err(StoryError::Validation(format!(
                "Author listed more than once: {}",
                mailbox.address
            )));
        }
        mailboxes.push(mailbox);
    }
    if mailboxes.is_empty() {
        return Err(StoryError::Validation("No authors".to_string()));
    }
    Ok(mailboxes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_named_and_bare_addresses() {
        let list = parse_address_list("Alice Smith <alice@example.com>, bob@example.com\n\"Carol\" <carol@example.com>").unwrap();
        assert_eq!(
            list,
            vec![
                Mailbox {
                    name: Some("Alice Smith".into()),
                    address: "alice@example.com".into()
                },
                Mailbox {
                    name: None,
                    address: "bob@example.com".into()
                },
                Mailbox {
                    name: Some("Carol".into()),
                    address: "carol@example.com".into()
                },
            ]
        );
    }

    #[test]
    fn test_skips_blank_entries_and_crlf() {
        let list = parse_address_list("a@example.com,\r\n\r\n, b@example.com,").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_angle_without_name() {
        let list = parse_address_list("<a@example.com>").unwrap();
        assert_eq!(list[0].name, None);
        assert_eq!(list[0].address, "a@example.com");
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["not an address", "Alice <alice>", "a@b@c", "<>"] {
            assert!(
                matches!(parse_address_list(bad), Err(StoryError::Validation(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(parse_address_list(" ,\n "), Err(StoryError::Validation(_))));
        let err = parse_address_list("a@example.com, A <A@example.com>").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_quoted_name_may_contain_comma() {
        let list = parse_address_list(r#""Smith, Alice" <alice@example.com>, bob@example.com"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("Smith, Alice"));
        assert_eq!(list[0].address, "alice@example.com");
        assert_eq!(list[1].address, "bob@example.com");
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        assert!(parse_address_list(r#""Smith, Alice <alice@example.com>"#).is_err());
    }

    #[test]
    fn test_addresses_are_lowercased() {
        let list = parse_address_list("Alice <Alice@Example.com>\nBOB@example.COM").unwrap();
        assert_eq!(list[0].address, "alice@example.com");
        assert_eq!(list[0].name.as_deref(), Some("Alice"));
        assert_eq!(list[1].address, "bob@example.com");
        assert_eq!(normalize_address("  Carol@Example.com "), "carol@example.com");
    }
}
