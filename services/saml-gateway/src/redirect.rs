use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Sets `key=value` on `base`, replacing any earlier `key` and keeping the rest
/// of the query string and the fragment.
pub fn with_query_param(base: &Url, key: &str, value: &str) -> String {
    let mut url = base.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != key)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(retained);
        pairs.append_pair(key, value);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_bare_url() {
        let base = Url::parse("https://app.example.com").unwrap();
        assert_eq!(
            with_query_param(&base, "jwt", "a.b.c"),
            "https://app.example.com/?jwt=a.b.c"
        );
    }

    #[test]
    fn keeps_existing_params_and_fragment() {
        let base = Url::parse("https://app.example.com/login?lang=fr&jwt=stale#/devices").unwrap();
        assert_eq!(
            with_query_param(&base, "jwt", "fresh"),
            "https://app.example.com/login?lang=fr&jwt=fresh#/devices"
        );
    }

    #[test]
    fn found_sets_location() {
        let response = found("/auth/saml/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/auth/saml/");
    }
}
