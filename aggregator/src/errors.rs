use serde::Serialize;
use std::fmt;

/// Broad classification of an upstream call failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamErrorKind {
    /// Connection refused, DNS failure, timeout.
    Network,
    /// The upstream answered with a non-2xx status or an explicit failure flag.
    Http,
    /// The upstream answered but the payload was not what we expected.
    Unexpected,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamErrorKind::Network => "network",
            UpstreamErrorKind::Http => "http",
            UpstreamErrorKind::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("upstream {kind} error on {endpoint}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub endpoint: &'static str,
    pub status: Option<u16>,
    /// Error code or message supplied by the upstream body, if any.
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamError {
    pub fn network(endpoint: &'static str, message: impl Into<String>) -> Self {
        UpstreamError {
            kind: UpstreamErrorKind::Network,
            endpoint,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn http(endpoint: &'static str, status: u16, code: Option<String>) -> Self {
        UpstreamError {
            kind: UpstreamErrorKind::Http,
            endpoint,
            status: Some(status),
            code,
            message: format!("upstream returned status {status}"),
        }
    }

    pub fn unexpected(endpoint: &'static str, message: impl Into<String>) -> Self {
        UpstreamError {
            kind: UpstreamErrorKind::Unexpected,
            endpoint,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Classifies a reqwest failure. The API key is part of the request URL,
    /// so the URL is stripped before the error text is kept.
    pub fn from_reqwest(endpoint: &'static str, err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let err = err.without_url();

        if err.is_decode() {
            return UpstreamError::unexpected(endpoint, err.to_string());
        }

        match status {
            Some(status) if err.is_status() => UpstreamError::http(endpoint, status, None),
            _ => UpstreamError::network(endpoint, err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Malformed caller input. All failing fields are reported together.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid request: {}", self.summary())]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rate limit of {limit} requests exceeded, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub retry_after_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = UpstreamError::http("schema", 503, Some("busy".into()));
        assert_eq!(
            err.to_string(),
            "upstream http error on schema: upstream returned status 503"
        );

        let err = ValidationError {
            errors: vec![
                FieldError {
                    field: "steamId",
                    message: "must be a 17 digit SteamID64".into(),
                },
                FieldError {
                    field: "appId",
                    message: "must be a positive integer".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid request: steamId: must be a 17 digit SteamID64, appId: must be a positive integer"
        );
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_value(UpstreamErrorKind::Unexpected).unwrap(),
            serde_json::json!("unexpected")
        );
    }
}
