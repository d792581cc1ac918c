//! Domain-API-key authentication
//!
//! Widget embeds authenticate with an `X-API-Key` / `X-Origin-Domain`
//! header pair, validated against a trust table loaded once at startup
//! (`DOMAIN_API_MAPPINGS`, format `domain1:key1,key2;domain2:key3`).
//! The table is immutable for the process lifetime, so validation needs
//! no locking and is safe to call from any number of request tasks.

use std::collections::HashMap;

/// Required prefix for widget API keys.
pub const API_KEY_PREFIX: &str = "widget_";

/// Minimum accepted API key length.
pub const MIN_API_KEY_LEN: usize = 10;

/// Authentication failures, ordered from caller mistakes to server
/// misconfiguration. All map to HTTP 401 except [`AuthError::ConfigurationMissing`],
/// which is the operator's fault and maps to 500.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("API key must start with \"{API_KEY_PREFIX}\" and be at least {MIN_API_KEY_LEN} characters")]
    MalformedApiKey,

    #[error("Domain is required for API key validation")]
    MissingDomain,

    #[error("domain-API key trust table not configured")]
    ConfigurationMissing,

    #[error("Domain '{0}' is not authorized")]
    UntrustedDomain(String),

    #[error("API key is not authorized for domain '{0}'")]
    KeyNotAuthorizedForDomain(String),
}

/// One domain's entry in the trust table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEntry {
    pub domain: String,
    pub api_keys: Vec<String>,
}

/// The static domain -> authorized-keys mapping.
#[derive(Debug, Clone, Default)]
pub struct TrustTable {
    entries: HashMap<String, TrustEntry>,
}

impl TrustTable {
    /// Parse the `domain1:key1,key2;domain2:key3` mapping format.
    ///
    /// Entries missing a domain or a key list are skipped; surrounding
    /// whitespace on domains and keys is trimmed.
    pub fn parse(mappings: &str) -> Self {
        let mut entries = HashMap::new();
        for raw_entry in mappings.split(';') {
            let Some((domain, keys_str)) = raw_entry.split_once(':') else {
                continue;
            };
            let domain = domain.trim();
            let api_keys: Vec<String> = keys_str
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            if domain.is_empty() || api_keys.is_empty() {
                continue;
            }
            entries.insert(
                domain.to_string(),
                TrustEntry {
                    domain: domain.to_string(),
                    api_keys,
                },
            );
        }
        TrustTable { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn domain_count(&self) -> usize {
        self.entries.len()
    }

    /// Domains present in the table (for the config-inspection command).
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }

    /// Validate an (API key, origin domain) pair against the table.
    ///
    /// Returns the matched [`TrustEntry`] for downstream logging and
    /// attribution. There is no keyless trust path: both values are
    /// mandatory.
    pub fn validate(
        &self,
        api_key: Option<&str>,
        domain: Option<&str>,
    ) -> Result<&TrustEntry, AuthError> {
        let api_key = match api_key {
            Some(k) if !k.is_empty() => k,
            _ => return Err(AuthError::MissingApiKey),
        };
        if !api_key.starts_with(API_KEY_PREFIX) || api_key.len() < MIN_API_KEY_LEN {
            return Err(AuthError::MalformedApiKey);
        }
        let domain = match domain {
            Some(d) if !d.is_empty() => d,
            _ => return Err(AuthError::MissingDomain),
        };
        if self.entries.is_empty() {
            return Err(AuthError::ConfigurationMissing);
        }
        let entry = self
            .entries
            .get(domain)
            .ok_or_else(|| AuthError::UntrustedDomain(domain.to_string()))?;
        if entry.api_keys.iter().any(|k| timing_safe_eq(k, api_key)) {
            Ok(entry)
        } else {
            Err(AuthError::KeyNotAuthorizedForDomain(domain.to_string()))
        }
    }
}

/// Timing-safe string equality.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut out = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        out |= x ^ y;
    }
    out == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_table() -> TrustTable {
        TrustTable::parse("example.com:widget_good,widget_alt;localhost:widget_devkey1")
    }

    // ==================== parse tests ====================

    #[test]
    fn test_parse_multiple_domains() {
        let table = fixture_table();
        assert_eq!(table.domain_count(), 2);
        assert_eq!(table.domains(), vec!["example.com", "localhost"]);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let table = TrustTable::parse(" example.com : widget_good , widget_alt ");
        let entry = table
            .validate(Some("widget_good"), Some("example.com"))
            .unwrap();
        assert_eq!(entry.api_keys, vec!["widget_good", "widget_alt"]);
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let table = TrustTable::parse("no-colon-here;:widget_x;empty.dom:;ok.com:widget_fine1");
        assert_eq!(table.domain_count(), 1);
        assert_eq!(table.domains(), vec!["ok.com"]);
    }

    #[test]
    fn test_parse_empty_mappings() {
        assert!(TrustTable::parse("").is_empty());
    }

    // ==================== validate tests ====================

    #[test]
    fn test_missing_api_key() {
        let table = fixture_table();
        assert_eq!(
            table.validate(None, Some("example.com")),
            Err(AuthError::MissingApiKey)
        );
        assert_eq!(
            table.validate(Some(""), Some("example.com")),
            Err(AuthError::MissingApiKey)
        );
    }

    #[test]
    fn test_malformed_api_key() {
        let table = fixture_table();
        // wrong prefix
        assert_eq!(
            table.validate(Some("apikey_something"), Some("example.com")),
            Err(AuthError::MalformedApiKey)
        );
        // too short
        assert_eq!(
            table.validate(Some("widget_x"), Some("example.com")),
            Err(AuthError::MalformedApiKey)
        );
    }

    #[test]
    fn test_missing_domain() {
        let table = fixture_table();
        assert_eq!(
            table.validate(Some("widget_good"), None),
            Err(AuthError::MissingDomain)
        );
    }

    #[test]
    fn test_configuration_missing() {
        let table = TrustTable::default();
        assert_eq!(
            table.validate(Some("widget_good"), Some("example.com")),
            Err(AuthError::ConfigurationMissing)
        );
    }

    #[test]
    fn test_untrusted_domain() {
        let table = fixture_table();
        assert_eq!(
            table.validate(Some("widget_good"), Some("evil.com")),
            Err(AuthError::UntrustedDomain("evil.com".to_string()))
        );
    }

    #[test]
    fn test_key_not_authorized_for_domain() {
        let table = fixture_table();
        // widget_devkey1 is valid for localhost but not example.com
        assert_eq!(
            table.validate(Some("widget_devkey1"), Some("example.com")),
            Err(AuthError::KeyNotAuthorizedForDomain("example.com".to_string()))
        );
    }

    #[test]
    fn test_exhaustive_over_fixture() {
        let table = fixture_table();
        let keys = ["widget_good", "widget_alt", "widget_devkey1"];
        let domains = ["example.com", "localhost"];
        let authorized: &[(&str, &str)] = &[
            ("widget_good", "example.com"),
            ("widget_alt", "example.com"),
            ("widget_devkey1", "localhost"),
        ];

        for key in keys {
            for domain in domains {
                let result = table.validate(Some(key), Some(domain));
                if authorized.contains(&(key, domain)) {
                    let entry = result.unwrap();
                    assert_eq!(entry.domain, domain);
                } else {
                    assert_eq!(
                        result,
                        Err(AuthError::KeyNotAuthorizedForDomain(domain.to_string()))
                    );
                }
            }
        }
    }

    // ==================== timing_safe_eq tests ====================

    #[test]
    fn test_timing_safe_eq() {
        assert!(timing_safe_eq("widget_abc", "widget_abc"));
        assert!(!timing_safe_eq("widget_abc", "widget_abd"));
        assert!(!timing_safe_eq("widget_abc", "widget_ab"));
        assert!(timing_safe_eq("", ""));
    }
}
