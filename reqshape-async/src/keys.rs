//! Cache and resource key derivation.

use sha2::{Digest, Sha256};
use std::fmt::Write;
use url::Url;

use crate::request::Method;

const PAYLOAD_DIGEST_LEN: usize = 16;

/// Resource key shared by targets that do not name a host themselves.
pub const DEFAULT_RESOURCE: &str = "default";

/// Derives the cache slot for a request.
///
/// Identical `(method, target, payload)` triples always produce the identical
/// key. JSON objects serialize with sorted keys, so payloads that differ only
/// in field order share a slot.
///
/// # Examples
///
/// ```
/// use reqshape_async::{keys::cache_key, Method};
/// use serde_json::json;
///
/// assert_eq!(cache_key(Method::Get, "/api/users", None), "GET:/api/users");
///
/// let a = cache_key(Method::Post, "/api/search", Some(&json!({"q": "x", "page": 1})));
/// let b = cache_key(Method::Post, "/api/search", Some(&json!({"page": 1, "q": "x"})));
/// assert_eq!(a, b);
/// ```
pub fn cache_key(method: Method, target: &str, payload: Option<&serde_json::Value>) -> String {
    let mut key = format!("{}:{}", method.as_str(), target);
    if let Some(payload) = payload {
        key.push(':');
        key.push_str(&payload_digest(payload));
    }
    key
}

/// Prefix shared by every cache key of `target`, across read methods.
pub fn target_prefix(method: Method, target: &str) -> String {
    format!("{}:{}", method.as_str(), target)
}

/// Whether `key` is a cache key of the target that produced `prefix`.
///
/// The prefix must be followed by the end of the key, a payload digest
/// (`:`), a sub-path (`/`) or a query (`?`), so `/users` covers
/// `/users/7` and `/users?page=2` but not `/users-archive`.
///
/// ```
/// use reqshape_async::keys::{covers_key, target_prefix};
/// use reqshape_async::Method;
///
/// let prefix = target_prefix(Method::Get, "/users");
/// assert!(covers_key(&prefix, "GET:/users"));
/// assert!(covers_key(&prefix, "GET:/users/7"));
/// assert!(!covers_key(&prefix, "GET:/usersettings"));
/// ```
pub fn covers_key(prefix: &str, key: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with([':', '/', '?']),
        None => false,
    }
}

/// Key used for rate limiting and pooling: the URL host (with port when
/// explicit), or [`DEFAULT_RESOURCE`] when `target` is not an absolute URL.
pub fn resource_key(target: &str) -> String {
    Url::parse(target)
        .ok()
        .and_then(|url| url_resource_key(&url))
        .unwrap_or_else(|| DEFAULT_RESOURCE.to_string())
}

/// Host of `url`, with the port when one is given explicitly.
pub fn url_resource_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn payload_digest(payload: &serde_json::Value) -> String {
    // serde_json's default map is ordered, so this is canonical
    let canonical = payload.to_string();
    let digest = Sha256::digest(canonical.as_bytes());

    let mut hex = String::with_capacity(PAYLOAD_DIGEST_LEN);
    for byte in digest.iter().take(PAYLOAD_DIGEST_LEN / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_without_payload() {
        assert_eq!(
            cache_key(Method::Get, "https://api.test/v1/metrics", None),
            "GET:https://api.test/v1/metrics"
        );
    }

    #[test]
    fn test_payload_changes_key() {
        let a = cache_key(Method::Post, "/q", Some(&json!({"a": 1})));
        let b = cache_key(Method::Post, "/q", Some(&json!({"a": 2})));
        assert_ne!(a, b);
        assert_eq!(a.len(), "POST:/q:".len() + PAYLOAD_DIGEST_LEN);
    }

    #[test]
    fn test_method_changes_key() {
        assert_ne!(
            cache_key(Method::Get, "/x", None),
            cache_key(Method::Head, "/x", None)
        );
    }

    #[test]
    fn test_deterministic() {
        let payload = json!({"filters": ["a", "b"], "range": {"from": 1, "to": 9}});
        let first = cache_key(Method::Post, "/report", Some(&payload));
        for _ in 0..10 {
            assert_eq!(cache_key(Method::Post, "/report", Some(&payload)), first);
        }
    }

    #[test]
    fn test_resource_key() {
        assert_eq!(resource_key("https://api.test/v1/users?id=3"), "api.test");
        assert_eq!(resource_key("http://db.local:5432/query"), "db.local:5432");
        assert_eq!(resource_key("/relative/path"), DEFAULT_RESOURCE);
        assert_eq!(resource_key("/another"), resource_key("/relative/path"));
    }

    #[test]
    fn test_covers_key_stops_at_boundaries() {
        let prefix = target_prefix(Method::Get, "/users");
        let with_payload = cache_key(Method::Get, "/users", Some(&json!({"page": 2})));

        assert!(covers_key(&prefix, &with_payload));
        assert!(covers_key(&prefix, "GET:/users?page=2"));
        assert!(!covers_key(&prefix, "GET:/users-archive"));
        assert!(!covers_key(&prefix, "GET:/usersettings"));
        assert!(!covers_key(&prefix, "HEAD:/users"));
    }

    #[test]
    fn test_target_prefix_matches_keys() {
        let key = cache_key(Method::Get, "/users", Some(&json!({"page": 2})));
        assert!(key.starts_with(&target_prefix(Method::Get, "/users")));
    }
}
