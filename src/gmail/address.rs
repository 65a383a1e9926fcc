//! Email address header parsing
//!
//! Header values arrive as `Name <user@example.com>`, a bare address, or a
//! comma-separated list of either.

use schemars::JsonSchema;
use serde::Serialize;

/// An email address with optional display name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct EmailAddress {
    /// Display name, without surrounding quotes
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// The address itself
    pub email: String,
}

impl EmailAddress {
    /// Parse a single address header value.
    ///
    /// With an angle bracket, the name is the text before `<` and the address
    /// is the text up to the next `>` (empty when `>` is missing). Without one
    /// the whole trimmed value is the address.
    pub fn parse(value: &str) -> Self {
        let mut address = Self::default();

        match value.find('<') {
            Some(open) => {
                address.name = value[..open].trim().to_string();
                let rest = &value[open + 1..];
                if let Some(close) = rest.find('>') {
                    address.email = rest[..close].trim().to_string();
                }
            }
            None => address.email = value.trim().to_string(),
        }

        address.name = address.name.trim_matches('"').to_string();
        address
    }

    /// Parse a comma-separated address list, skipping blank entries.
    ///
    /// Display names containing commas are split too; quoted-string handling
    /// is out of scope for a summary view.
    pub fn parse_list(value: &str) -> Vec<Self> {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("John Doe <john@example.com>");
        assert_eq!(addr.name, "John Doe");
        assert_eq!(addr.email, "john@example.com");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Doe, Jane\" <jane@example.com>");
        assert_eq!(addr.name, "Doe, Jane");
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("  someone@example.com ");
        assert_eq!(addr.name, "");
        assert_eq!(addr.email, "someone@example.com");
    }

    #[test]
    fn test_parse_angle_only() {
        let addr = EmailAddress::parse("<noreply@example.com>");
        assert_eq!(addr.name, "");
        assert_eq!(addr.email, "noreply@example.com");
    }

    #[test]
    fn test_parse_unclosed_bracket_has_no_address() {
        let addr = EmailAddress::parse("Broken <broken@example.com");
        assert_eq!(addr.name, "Broken");
        assert_eq!(addr.email, "");
    }

    #[test]
    fn test_parse_list() {
        let list = EmailAddress::parse_list("a@example.com, Bob <bob@example.com>,, ");
        assert_eq!(
            list,
            vec![
                EmailAddress {
                    name: String::new(),
                    email: "a@example.com".to_string()
                },
                EmailAddress {
                    name: "Bob".to_string(),
                    email: "bob@example.com".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_list_empty() {
        assert!(EmailAddress::parse_list("").is_empty());
        assert!(EmailAddress::parse_list(" , ").is_empty());
    }

    #[test]
    fn test_empty_name_omitted_from_json() {
        let json = serde_json::to_string(&EmailAddress::parse("x@example.com")).unwrap();
        assert_eq!(json, r#"{"email":"x@example.com"}"#);
    }
}
