use axum::http::{HeaderMap, Method, header, request::Parts};

use crate::locale::Locale;

/// Path marker of the external integration surface.
pub const OPEN_API_MARKER: &str = "/api/v1/open/";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn is_open_api_path(path: &str) -> bool {
    path.contains(OPEN_API_MARKER)
}

/// Per-request facts fixed at ingress and read by handlers and the classifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub open_api: bool,
    pub locale: Locale,
}

impl RequestContext {
    /// Open API requests always get English text, whatever the caller asks for.
    pub fn new(
        method: &Method,
        path: &str,
        accept_language: Option<&str>,
        request_id: Option<String>,
    ) -> Self {
        let open_api = is_open_api_path(path);
        let locale = if open_api {
            Locale::En
        } else {
            Locale::from_accept_language(accept_language)
        };
        Self {
            request_id,
            method: method.as_str().to_string(),
            path: path.to_string(),
            open_api,
            locale,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(
            &parts.method,
            parts.uri.path(),
            header_str(&parts.headers, header::ACCEPT_LANGUAGE.as_str()),
            header_str(&parts.headers, REQUEST_ID_HEADER).map(str::to_string),
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_api_forces_english() {
        let ctx = RequestContext::new(
            &Method::POST,
            "/api/v1/open/authorization/instance/",
            Some("zh-CN"),
            None,
        );
        assert!(ctx.open_api);
        assert_eq!(ctx.locale, Locale::En);
    }

    #[test]
    fn internal_requests_follow_accept_language() {
        let ctx = RequestContext::new(
            &Method::POST,
            "/api/v1/authorization/instance/",
            Some("zh-CN"),
            Some("req-1".into()),
        );
        assert!(!ctx.open_api);
        assert_eq!(ctx.locale, Locale::Zh);
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
    }
}
