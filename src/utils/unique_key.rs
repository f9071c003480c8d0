//! URL normalization used to derive a `Request::unique_key` when the caller
//! doesn't supply one explicitly.

/// Normalize a URL into a dedup key: lowercase scheme/host, drop a default
/// port, drop a trailing slash on the path, and sort query parameters.
///
/// Falls back to the raw, trimmed string if the URL doesn't parse — a
/// non-URL "url" (rare, but not forbidden by the data model) still needs a
/// stable key.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let _ = parsed.set_fragment(None);

            let mut pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.sort();
            if pairs.is_empty() {
                parsed.set_query(None);
            } else {
                let query = pairs
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&");
                parsed.set_query(Some(&query));
            }

            let mut normalized = parsed.to_string();
            if normalized.ends_with('/') && parsed.path() == "/" && parsed.query().is_none() {
                normalized.pop();
            }
            normalized
        }
        Err(_) => url.trim().to_string(),
    }
}
