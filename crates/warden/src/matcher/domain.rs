//! Domain matching for fetch rules

use url::Url;

/// Prefix that marks a fetch specifier as a host pattern
pub const DOMAIN_PREFIX: &str = "domain:";

/// Extract the lowercase hostname from a URL or bare host
///
/// URLs without a scheme are parsed as `https://`.
pub fn extract_host(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&with_scheme).ok()?;
    url.host_str()
        .map(|host| host.trim_end_matches('.').to_lowercase())
}

/// Check a URL against a `domain:<pattern>` specifier
///
/// `*.example.com` matches true subdomains only; the bare root must be
/// listed on its own. Port, scheme and path are ignored.
pub fn matches_domain(url: &str, specifier: &str) -> bool {
    let Some(pattern) = specifier.strip_prefix(DOMAIN_PREFIX) else {
        return false;
    };
    let pattern = pattern.trim().to_lowercase();
    let Some(host) = extract_host(url) else {
        return false;
    };

    match pattern.strip_prefix("*.") {
        Some(root) => host.len() > root.len() + 1 && host.ends_with(&format!(".{}", root)),
        None => host == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host() {
        assert_eq!(extract_host("https://API.Example.com:8443/x?y=1").as_deref(), Some("api.example.com"));
        assert_eq!(extract_host("example.com/path").as_deref(), Some("example.com"));
        assert_eq!(extract_host(""), None);
    }

    #[test]
    fn test_wildcard_subdomains() {
        assert!(matches_domain("https://api.example.com/x", "domain:*.example.com"));
        assert!(matches_domain("http://a.b.example.com", "domain:*.example.com"));
        assert!(!matches_domain("https://example.com", "domain:*.example.com"));
        assert!(!matches_domain("https://badexample.com", "domain:*.example.com"));
    }

    #[test]
    fn test_exact_domain() {
        assert!(matches_domain("example.com:8080/docs", "domain:example.com"));
        assert!(!matches_domain("https://api.example.com", "domain:example.com"));
        assert!(!matches_domain("https://example.com", "example.com"));
    }
}
