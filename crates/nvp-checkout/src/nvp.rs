//! NVP Wire Format
//!
//! Requests are `application/x-www-form-urlencoded` bodies; responses are
//! `&`-joined, percent-encoded `KEY=VALUE` pairs with an `ACK` field.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Fields every call carries, filled from the credentials
pub const AUTH_FIELDS: [&str; 5] = ["METHOD", "VERSION", "USER", "PWD", "SIGNATURE"];

/// Percent-encode a single key or value
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Ordered method-specific request fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NvpFields(Vec<(String, String)>);

impl NvpFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; authentication fields are ignored here, they come
    /// from the credentials only
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        if AUTH_FIELDS.contains(&key.as_str()) {
            tracing::debug!(field = %key, "Dropping reserved NVP field from call fields");
        } else {
            self.0.push((key, value.into()));
        }
        self
    }

    /// Builder-style [`push`](Self::push)
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Encode pairs as `k=v&k=v`, preserving order
pub fn encode<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parsed provider reply
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NvpResponse(BTreeMap<String, String>);

impl NvpResponse {
    /// Decode a `key=value&key=value` body
    pub fn parse(body: &str) -> Self {
        let fields = body
            .split('&')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = decode_component(key.trim());
                if key.is_empty() {
                    None
                } else {
                    Some((key, decode_component(value)))
                }
            })
            .collect();
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Acknowledgement code, empty when absent
    pub fn ack(&self) -> &str {
        self.get("ACK").unwrap_or_default()
    }

    /// `Success` and `SuccessWithWarning` both count
    pub fn is_success(&self) -> bool {
        self.ack()
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("success"))
    }

    pub fn error_message(&self) -> &str {
        self.get("L_LONGMESSAGE0")
            .filter(|m| !m.is_empty())
            .or_else(|| self.get("L_SHORTMESSAGE0").filter(|m| !m.is_empty()))
            .unwrap_or("Unknown error")
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.get("CORRELATIONID")
    }

    /// Group `<prefix><NAME><n>` keys into one record per index `n`.
    ///
    /// Record keys keep the prefix but drop the index, so `L_AMT0` lands in
    /// record 0 as `L_AMT`.
    pub fn indexed(&self, prefix: &str) -> Vec<BTreeMap<String, String>> {
        let mut records: BTreeMap<usize, BTreeMap<String, String>> = BTreeMap::new();

        for (key, value) in &self.0 {
            if !key.starts_with(prefix) {
                continue;
            }
            let name = key.trim_end_matches(|c: char| c.is_ascii_digit());
            let Ok(index) = key[name.len()..].parse::<usize>() else {
                continue;
            };
            if name.len() <= prefix.len() {
                continue;
            }
            records
                .entry(index)
                .or_default()
                .insert(name.to_string(), value.clone());
        }

        records.into_values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for NvpResponse {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
