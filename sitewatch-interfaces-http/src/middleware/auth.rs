use axum::http::HeaderMap;

use sitewatch_application::commands::watch_commands::ActingAdmin;
use sitewatch_domain::RuntimeConfig;

pub fn authorize(config: &RuntimeConfig, headers: &HeaderMap) -> bool {
    if let Some(api_token) = &config.api_token {
        return extract_bearer(headers)
            .map(|v| v == *api_token)
            .unwrap_or(false);
    }
    true
}

/// Identity of the operator behind a bearer token, taken from the
/// reverse proxy's identity headers. Falls back to a generic operator
/// when the proxy does not forward them.
pub fn acting_admin(headers: &HeaderMap) -> ActingAdmin {
    let id = headers
        .get("X-Admin-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);
    let username = headers
        .get("X-Admin-Name")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "operator".to_string());
    ActingAdmin { id, username }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let prefix = "Bearer ";
    if !value.starts_with(prefix) {
        return None;
    }
    let token = value[prefix.len()..].trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn authorize_passes_without_configured_token() {
        let config = RuntimeConfig::default();
        assert!(authorize(&config, &HeaderMap::new()));
    }

    #[test]
    fn authorize_requires_matching_bearer() {
        let config = RuntimeConfig {
            api_token: Some("secret".to_string()),
            ..RuntimeConfig::default()
        };

        assert!(!authorize(&config, &HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong"));
        assert!(!authorize(&config, &headers));

        headers.insert("Authorization", HeaderValue::from_static("Bearer secret"));
        assert!(authorize(&config, &headers));
    }

    #[test]
    fn acting_admin_reads_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Admin-Id", HeaderValue::from_static("42"));
        headers.insert("X-Admin-Name", HeaderValue::from_static("rboyd"));
        let admin = acting_admin(&headers);
        assert_eq!(admin.id, 42);
        assert_eq!(admin.username, "rboyd");

        let fallback = acting_admin(&HeaderMap::new());
        assert_eq!(fallback.id, 0);
        assert_eq!(fallback.username, "operator");
    }
}
