//! Wire types for `Awery.fetch`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extensions::codec::{opt_string, ToGuest};
use crate::extensions::value::GuestValue;

/// Request built from the first argument of `Awery.fetch`.
///
/// Accepts either a bare URL string or
/// `{ url, method?, headers?, body? }`. Non-string bodies are sent as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub method: FetchMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// HTTP method for fetch requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl FetchMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: FetchMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Parse the guest's request argument. Errors are guest-facing messages.
    pub fn from_guest(value: &GuestValue) -> Result<Self, String> {
        let mut request = match value {
            GuestValue::String(url) => Self::get(url),
            GuestValue::Mapping(_) => {
                let url = opt_string(value.get("url"))
                    .ok_or_else(|| "fetch request requires a url".to_string())?;
                let method = match opt_string(value.get("method")) {
                    Some(name) => FetchMethod::from_name(&name)
                        .ok_or_else(|| format!("unsupported HTTP method '{name}'"))?,
                    None => FetchMethod::Get,
                };
                let headers = value
                    .get("headers")
                    .as_mapping()
                    .map(|map| {
                        map.iter()
                            .filter_map(|(name, value)| {
                                value.to_scalar_string().map(|v| (name.clone(), v))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let mut request = Self {
                    url,
                    method,
                    headers,
                    body: None,
                };
                request.set_body(value.get("body"));
                request
            }
            other => {
                return Err(format!(
                    "fetch expects a url or request object, got {}",
                    other.kind()
                ))
            }
        };

        let parsed = url::Url::parse(&request.url)
            .map_err(|e| format!("invalid URL '{}': {e}", request.url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme '{}'", parsed.scheme()));
        }
        request.url = parsed.to_string();
        Ok(request)
    }

    fn set_body(&mut self, body: &GuestValue) {
        match body {
            GuestValue::Null => {}
            GuestValue::Sequence(_) | GuestValue::Mapping(_) => {
                self.body = Some(serde_json::Value::from(body.clone()).to_string());
                let has_content_type = self
                    .headers
                    .keys()
                    .any(|name| name.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    self.headers
                        .insert("Content-Type".to_string(), "application/json".to_string());
                }
            }
            scalar => self.body = scalar.to_scalar_string(),
        }
    }
}

/// Response handed to the guest's `resolve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl ToGuest for FetchResponse {
    fn to_guest(&self) -> GuestValue {
        GuestValue::mapping()
            .with("status", u32::from(self.status))
            .with("ok", self.is_success())
            .with("headers", self.headers.to_guest())
            .with("body", self.body.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_url() {
        let request = FetchRequest::from_guest(&GuestValue::from("https://example.com/a")).unwrap();
        assert_eq!(request.method, FetchMethod::Get);
        assert_eq!(request.url, "https://example.com/a");
    }

    #[test]
    fn test_object_request_with_json_body() {
        let value = GuestValue::from(json!({
            "url": "https://example.com/api",
            "method": "post",
            "headers": {"X-Page": 2},
            "body": {"query": "naruto"}
        }));
        let request = FetchRequest::from_guest(&value).unwrap();

        assert_eq!(request.method, FetchMethod::Post);
        assert_eq!(request.headers.get("X-Page").map(String::as_str), Some("2"));
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(r#"{"query":"naruto"}"#));
    }

    #[test]
    fn test_rejects_bad_requests() {
        assert!(FetchRequest::from_guest(&GuestValue::from("not a url")).is_err());
        assert!(FetchRequest::from_guest(&GuestValue::from("file:///etc/passwd")).is_err());
        assert!(FetchRequest::from_guest(&GuestValue::from(json!({"method": "GET"}))).is_err());
        assert!(FetchRequest::from_guest(&GuestValue::from(
            json!({"url": "https://example.com", "method": "TRACE"})
        ))
        .is_err());
        assert!(FetchRequest::from_guest(&GuestValue::Number(1.0)).is_err());
    }

    #[test]
    fn test_response_to_guest() {
        let response = FetchResponse {
            status: 404,
            headers: BTreeMap::new(),
            body: "missing".to_string(),
        };
        let value = response.to_guest();
        assert_eq!(value.get("status").as_f64(), Some(404.0));
        assert_eq!(value.get("ok").as_bool(), Some(false));
        assert_eq!(value.get("body").as_str(), Some("missing"));
    }
}
