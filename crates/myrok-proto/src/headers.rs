//! Header multimap carried by proxied requests and responses

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Header multimap: name -> values
///
/// Values keep the order they were added in for each name; names themselves are
/// kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any values already present for `name`
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    /// All values for `name` (exact match), in insertion order
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for `name`, compared case-insensitively
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// A header value as tunnel clients actually send it
#[derive(Deserialize)]
#[serde(untagged)]
enum WireValue {
    Many(Vec<WireScalar>),
    One(WireScalar),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
}

impl WireScalar {
    fn into_string(self) -> String {
        match self {
            WireScalar::Text(s) => s,
            WireScalar::Signed(n) => n.to_string(),
            WireScalar::Unsigned(n) => n.to_string(),
            WireScalar::Float(n) => n.to_string(),
            WireScalar::Bool(b) => b.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // `null` is what a client with no headers at all tends to send
        let raw = Option::<BTreeMap<String, WireValue>>::deserialize(deserializer)?;

        let map = raw
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let values = match value {
                    WireValue::Many(values) => {
                        values.into_iter().map(WireScalar::into_string).collect()
                    }
                    WireValue::One(value) => vec![value.into_string()],
                };
                (name, values)
            })
            .collect();

        Ok(Headers(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_order() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        headers.append("Content-Type", "text/plain");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_all("Set-Cookie"), ["a=1", "b=2"]);
        assert!(headers.get_all("X-Missing").is_empty());

        // Names iterate sorted, not in insertion order
        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["Content-Type", "Set-Cookie"]);
    }

    #[test]
    fn test_get_ignore_case() {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        assert_eq!(headers.get_ignore_case("content-type"), Some("text/plain"));
        assert_eq!(headers.get_ignore_case("accept"), None);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let headers: Headers = [("Accept", "*/*")].into_iter().collect();
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"Accept":["*/*"]}"#);
    }

    #[test]
    fn test_deserialize_scalar_values() {
        let headers: Headers =
            serde_json::from_str(r#"{"Content-Length": 11, "X-Flag": true, "X-Name": "a"}"#)
                .unwrap();

        assert_eq!(headers.get_all("Content-Length"), ["11"]);
        assert_eq!(headers.get_all("X-Flag"), ["true"]);
        assert_eq!(headers.get_all("X-Name"), ["a"]);
    }

    #[test]
    fn test_deserialize_null_is_empty() {
        let headers: Headers = serde_json::from_str("null").unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_objects() {
        let result: Result<Headers, _> = serde_json::from_str(r#"{"X-Bad": {"nested": 1}}"#);
        assert!(result.is_err());
    }
}
