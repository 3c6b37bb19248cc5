//! Identity profile asserted by the IdP.
//!
//! The attribute set is whatever the IdP chose to release, so the profile is
//! kept as a JSON object and only `email` is validated before use.

use serde::Serialize;
use serde_json::{Map, Value};

pub const EMAIL_KEY: &str = "email";

/// Attribute names some IdPs use instead of a plain `email`, in lookup order.
pub const EMAIL_FALLBACK_KEYS: &[&str] = &[
    "mail",
    "urn:oid:0.9.2342.19200300.100.1.3",
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SamlProfile(Map<String, Value>);

impl SamlProfile {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builds a profile from the pieces of a validated assertion.
    ///
    /// Single-valued attributes become strings, multi-valued ones arrays.
    pub fn from_assertion_parts(
        issuer: Option<String>,
        name_id: Option<String>,
        name_id_format: Option<String>,
        session_index: Option<String>,
        attributes: Vec<(String, Vec<String>)>,
    ) -> Self {
        let mut map = Map::new();
        for (key, value) in [
            ("issuer", issuer),
            ("nameID", name_id),
            ("nameIDFormat", name_id_format),
            ("sessionIndex", session_index),
        ] {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value));
            }
        }

        for (name, mut values) in attributes {
            let value = match values.len() {
                0 => continue,
                1 => Value::String(values.remove(0)),
                _ => Value::Array(values.into_iter().map(Value::String).collect()),
            };
            map.insert(name, value);
        }

        if !map.contains_key(EMAIL_KEY) {
            let fallback = EMAIL_FALLBACK_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str).map(str::to_string));
            if let Some(email) = fallback {
                map.insert(EMAIL_KEY.to_string(), Value::String(email));
            }
        }

        Self(map)
    }

    /// The asserted email, if present as a non-empty string.
    pub fn email(&self) -> Option<&str> {
        self.0
            .get(EMAIL_KEY)
            .and_then(Value::as_str)
            .filter(|email| !email.trim().is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(value: Value) -> SamlProfile {
        match value {
            Value::Object(map) => SamlProfile::from_map(map),
            _ => panic!("profile fixture must be an object"),
        }
    }

    #[test]
    fn email_must_be_non_empty_string() {
        assert_eq!(
            profile(json!({"email": "user@example.com"})).email(),
            Some("user@example.com")
        );
        assert_eq!(profile(json!({"email": ""})).email(), None);
        assert_eq!(profile(json!({"email": "  "})).email(), None);
        assert_eq!(profile(json!({"email": ["a@b.c"]})).email(), None);
        assert_eq!(profile(json!({"email": 42})).email(), None);
        assert_eq!(profile(json!({"nameID": "someone"})).email(), None);
    }

    #[test]
    fn attributes_are_flattened() {
        let profile = SamlProfile::from_assertion_parts(
            Some("https://idp.example.com".into()),
            Some("user-1".into()),
            None,
            Some("_session".into()),
            vec![
                ("email".into(), vec!["user@example.com".into()]),
                ("groups".into(), vec!["dev".into(), "ops".into()]),
                ("empty".into(), vec![]),
            ],
        );
        assert_eq!(profile.get("issuer"), Some(&json!("https://idp.example.com")));
        assert_eq!(profile.get("nameID"), Some(&json!("user-1")));
        assert_eq!(profile.get("nameIDFormat"), None);
        assert_eq!(profile.get("groups"), Some(&json!(["dev", "ops"])));
        assert_eq!(profile.get("empty"), None);
        assert_eq!(profile.email(), Some("user@example.com"));
    }

    #[test]
    fn email_falls_back_to_mail_attributes() {
        let profile = SamlProfile::from_assertion_parts(
            None,
            Some("user-2".into()),
            None,
            None,
            vec![(
                "urn:oid:0.9.2342.19200300.100.1.3".into(),
                vec!["oid@example.com".into()],
            )],
        );
        assert_eq!(profile.email(), Some("oid@example.com"));

        let multi = SamlProfile::from_assertion_parts(
            None,
            None,
            None,
            None,
            vec![("mail".into(), vec!["a@example.com".into(), "b@example.com".into()])],
        );
        assert_eq!(multi.email(), None);
    }
}
