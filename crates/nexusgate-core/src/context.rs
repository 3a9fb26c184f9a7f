use http::HeaderMap;
use http::header::HeaderName;

/// Header a client uses to pin a request to one provider (by id or name)
pub const PROVIDER_HEADER: &str = "x-nexusgate-provider";

/// Header carrying a client-chosen request id
pub const REQUEST_ID_HEADER: &str = "x-nexusgate-reqid";

/// Headers that must never be copied from a client onto an upstream request
const NEVER_FORWARDED: &[&str] = &["authorization", "x-api-key", "api-key", "host", "content-length", "content-type"];

/// Per-request data the gateway needs from the inbound HTTP layer
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
}

impl RequestContext {
    /// Wrap the inbound request headers
    pub const fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Context with no headers, for embedded use
    pub fn empty() -> Self {
        Self::default()
    }

    /// Access request headers
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Provider pin supplied by the client, if any
    pub fn provider_pin(&self) -> Option<&str> {
        self.header_str(PROVIDER_HEADER)
    }

    /// Client-supplied request id, if any
    pub fn request_id(&self) -> Option<&str> {
        self.header_str(REQUEST_ID_HEADER)
    }

    /// Copy of the headers named in `allow`, matched case-insensitively
    ///
    /// Credentials and framing headers are never returned even when listed.
    pub fn forwardable_headers<S: AsRef<str>>(&self, allow: &[S]) -> HeaderMap {
        let mut out = HeaderMap::new();

        for name in allow {
            let Ok(name) = HeaderName::try_from(name.as_ref().to_ascii_lowercase()) else {
                continue;
            };

            if NEVER_FORWARDED.contains(&name.as_str()) {
                continue;
            }

            for value in self.headers.get_all(&name) {
                out.append(name.clone(), value.clone());
            }
        }

        out
    }

    fn header_str(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
