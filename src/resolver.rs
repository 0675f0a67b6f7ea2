use serde_json::Value;
use tracing::debug;

use crate::errors::CapacityError;

pub const DEFAULT_CAPACITY_URL: &str = "https://1ml.com/channel/{scid}/json";
pub const SCID_PLACEHOLDER: &str = "{scid}";
const CAPACITY_FIELD: &str = "capacity";

/// Looks up the capacity of one channel by its packed identifier.
///
/// Implementations perform a single attempt; any failure is final.
pub trait CapacityResolver {
    fn resolve(&self, packed_scid: u64) -> Result<u64, CapacityError>;
}

impl<R: CapacityResolver + ?Sized> CapacityResolver for &R {
    fn resolve(&self, packed_scid: u64) -> Result<u64, CapacityError> {
        (**self).resolve(packed_scid)
    }
}

impl<R: CapacityResolver + ?Sized> CapacityResolver for Box<R> {
    fn resolve(&self, packed_scid: u64) -> Result<u64, CapacityError> {
        (**self).resolve(packed_scid)
    }
}

/// Blocking HTTP resolver; `{scid}` in the template is replaced by the
/// packed identifier.
#[derive(Clone, Debug)]
pub struct HttpResolver {
    url_template: String,
    agent: ureq::Agent,
}

impl HttpResolver {
    pub fn new<S: Into<String>>(url_template: S) -> Result<Self, CapacityError> {
        let url_template = url_template.into();
        if !url_template.contains(SCID_PLACEHOLDER) {
            return Err(CapacityError::resolution_failed(format!(
                "url template '{url_template}' has no {SCID_PLACEHOLDER} placeholder"
            )));
        }
        Ok(Self {
            url_template,
            agent: ureq::Agent::new(),
        })
    }

    pub fn url_for(&self, packed_scid: u64) -> String {
        self.url_template
            .replace(SCID_PLACEHOLDER, &packed_scid.to_string())
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_CAPACITY_URL.to_string(),
            agent: ureq::Agent::new(),
        }
    }
}

impl CapacityResolver for HttpResolver {
    fn resolve(&self, packed_scid: u64) -> Result<u64, CapacityError> {
        let url = self.url_for(packed_scid);
        debug!(%url, "querying channel capacity");
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(CapacityError::resolution_failed(format!(
                    "{url} returned status {status}"
                )));
            }
            Err(err) => {
                return Err(CapacityError::resolution_failed(format!("{url}: {err}")));
            }
        };
        if response.status() != 200 {
            return Err(CapacityError::resolution_failed(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        let body: Value = response
            .into_json()
            .map_err(|e| CapacityError::malformed_response(format!("{url}: {e}")))?;
        capacity_from_body(&body)
            .map_err(|msg| CapacityError::malformed_response(format!("{url}: {msg}")))
    }
}

/// Extracts the capacity field, accepting a JSON number or a numeric string.
pub fn capacity_from_body(body: &Value) -> Result<u64, String> {
    match body.get(CAPACITY_FIELD) {
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or_else(|| format!("capacity {number} is not an unsigned integer")),
        Some(Value::String(text)) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("capacity '{text}' is not an unsigned integer")),
        Some(other) => Err(format!("capacity has unexpected type: {other}")),
        None => Err("response has no capacity field".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn capacity_accepts_numbers_and_strings() {
        assert_eq!(capacity_from_body(&json!({"capacity": 500000})), Ok(500000));
        assert_eq!(capacity_from_body(&json!({"capacity": "100000"})), Ok(100000));
        assert!(capacity_from_body(&json!({"alias": "x"})).is_err());
        assert!(capacity_from_body(&json!({"capacity": -1})).is_err());
    }

    #[test]
    fn template_needs_placeholder() {
        assert!(HttpResolver::new("https://example.invalid/channel").is_err());
        let resolver = HttpResolver::new("http://127.0.0.1/c/{scid}/json").unwrap();
        assert_eq!(resolver.url_for(1 << 40), "http://127.0.0.1/c/1099511627776/json");
    }
}
