//! Backend-neutral cookie types (§9 redesign flag: the source exposes
//! library-specific cookie objects; this crate owns a plain serde struct
//! instead so `Session` never depends on an HTTP client's cookie jar type).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<chrono::DateTime<chrono::Utc>>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires.is_some_and(|exp| now >= exp)
    }
}

/// Per-domain cookie set owned by exactly one `Session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieJar {
    /// domain -> (name -> Cookie)
    by_domain: HashMap<String, HashMap<String, Cookie>>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cookie: Cookie) {
        self.by_domain
            .entry(cookie.domain.clone())
            .or_default()
            .insert(cookie.name.clone(), cookie);
    }

    /// Cookies applicable to `url`: exact domain match or a parent domain
    /// (`sub.example.com` also receives cookies set for `example.com`).
    #[must_use]
    pub fn get(&self, url: &str) -> Vec<&Cookie> {
        let Ok(parsed) = url::Url::parse(url) else {
            return Vec::new();
        };
        let Some(host) = parsed.host_str() else {
            return Vec::new();
        };
        let now = chrono::Utc::now();

        self.by_domain
            .iter()
            .filter(|(domain, _)| host == domain.as_str() || host.ends_with(&format!(".{domain}")))
            .flat_map(|(_, cookies)| cookies.values())
            .filter(|c| !c.is_expired(now))
            .collect()
    }

    #[must_use]
    pub fn serialize(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    #[must_use]
    pub fn deserialize(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_matches_subdomain_against_parent_domain_cookie() {
        let mut jar = CookieJar::new();
        jar.set(Cookie::new("session", "abc", "example.com"));
        let cookies = jar.get("https://sub.example.com/path");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "abc");
    }

    #[test]
    fn expired_cookies_are_excluded() {
        let mut jar = CookieJar::new();
        let mut cookie = Cookie::new("old", "v", "example.com");
        cookie.expires = Some(chrono::Utc::now() - chrono::Duration::seconds(10));
        jar.set(cookie);
        assert!(jar.get("https://example.com").is_empty());
    }

    #[test]
    fn serialize_round_trip() {
        let mut jar = CookieJar::new();
        jar.set(Cookie::new("a", "b", "example.com"));
        let value = jar.serialize();
        let restored = CookieJar::deserialize(value);
        assert_eq!(restored.get("https://example.com").len(), 1);
    }
}
