//! Recipient addresses (RFC 5322 §3.4).

/// Placeholder used when a recipient carries neither an address nor a name.
pub const UNKNOWN_RECIPIENT: &str = "Unknown Recipient";

/// One recipient as read from a source container.
///
/// Either field may be missing; containers frequently store only a display
/// name for distribution lists or only an address for external contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Recipient {
    /// The bare email address (`user@domain`).
    pub address: Option<String>,
    /// Human-readable display name.
    pub display_name: Option<String>,
}

impl Recipient {
    /// Build a recipient, treating blank strings as absent.
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            address: non_blank(address.into()),
            display_name: non_blank(display_name.into()),
        }
    }

    /// Parse a single mailbox from a header-style string.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    /// - `"Display Name"` (no address at all)
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self::new(
                    trimmed[open + 1..close].trim(),
                    strip_quotes(&trimmed[..open]),
                );
            }
        }

        if trimmed.contains('@') {
            Self::new(trimmed, "")
        } else {
            Self::new("", strip_quotes(trimmed))
        }
    }

    /// Parse a comma-separated list, honoring commas inside quotes and angle brackets.
    ///
    /// Empty segments are dropped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        split_mailboxes(raw)
            .into_iter()
            .map(Self::parse)
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// `true` when neither an address nor a display name is present.
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.display_name.is_none()
    }

    /// The text used in a `To:` header: the address if present, else the
    /// display name, else [`UNKNOWN_RECIPIENT`].
    pub fn rendered(&self) -> &str {
        self.address
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(UNKNOWN_RECIPIENT)
    }
}

/// Split an address list on top-level commas.
pub fn split_mailboxes(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut start = 0;

    for (i, ch) in raw.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                segments.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&raw[start..]);

    segments
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let r = Recipient::parse("user@example.com");
        assert_eq!(r.address.as_deref(), Some("user@example.com"));
        assert_eq!(r.display_name, None);
    }

    #[test]
    fn test_parse_name_and_address() {
        let r = Recipient::parse("\"Last, First\" <user@example.com>");
        assert_eq!(r.address.as_deref(), Some("user@example.com"));
        assert_eq!(r.display_name.as_deref(), Some("Last, First"));
    }

    #[test]
    fn test_parse_name_only() {
        let r = Recipient::parse("Sales Team");
        assert_eq!(r.address, None);
        assert_eq!(r.display_name.as_deref(), Some("Sales Team"));
        assert_eq!(r.rendered(), "Sales Team");
    }

    #[test]
    fn test_parse_list_with_quoted_comma() {
        let list = Recipient::parse_list("\"Last, First\" <a@b.com>, other@c.com, ");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name.as_deref(), Some("Last, First"));
        assert_eq!(list[1].address.as_deref(), Some("other@c.com"));
    }

    #[test]
    fn test_rendered_precedence() {
        assert_eq!(Recipient::new("a@x.com", "Alice").rendered(), "a@x.com");
        assert_eq!(Recipient::new("", "Alice").rendered(), "Alice");
        assert_eq!(Recipient::new("  ", "").rendered(), UNKNOWN_RECIPIENT);
    }
}
