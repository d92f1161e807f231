use std::fmt;

/// Classified provider failure. The kind decides which user-facing notice
/// the manager sends when a turn dies on a model call.
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Seconds to wait before retrying, when the provider said so on a 429.
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403, bad API key or permissions.
    Auth,
    /// 402, billing or quota exhausted.
    Billing,
    /// 429.
    RateLimit,
    /// 404, usually a bad model name.
    NotFound,
    /// 408 or the request took too long.
    Timeout,
    /// Connection refused, DNS failure, reset.
    Network,
    /// 500/502/503/504.
    ServerError,
    Unknown,
}

impl ProviderError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            402 => ProviderErrorKind::Billing,
            404 => ProviderErrorKind::NotFound,
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimit,
            500 | 502 | 503 | 504 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Unknown,
        };

        let retry_after_secs = if kind == ProviderErrorKind::RateLimit {
            extract_retry_after(body)
        } else {
            None
        };

        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
            retry_after_secs,
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Network
        };
        Self {
            kind,
            status: None,
            message: err.to_string(),
            retry_after_secs: None,
        }
    }

    /// Short summary suitable for sending back to the user as-is.
    pub fn user_message(&self) -> String {
        match self.kind {
            ProviderErrorKind::Auth => {
                "Model API authentication failed. Check the api_key in config.toml.".to_string()
            }
            ProviderErrorKind::Billing => {
                "Model API billing error, the account quota may be exhausted.".to_string()
            }
            ProviderErrorKind::RateLimit => {
                if let Some(secs) = self.retry_after_secs {
                    format!("Rate limited by the model API. Try again in {}s.", secs)
                } else {
                    "Rate limited by the model API. Try again shortly.".to_string()
                }
            }
            ProviderErrorKind::NotFound => {
                "Model not found. Check the model name in config.toml.".to_string()
            }
            ProviderErrorKind::Timeout => "The model request timed out.".to_string(),
            ProviderErrorKind::Network => {
                "Cannot reach the model provider (network error).".to_string()
            }
            ProviderErrorKind::ServerError => {
                "The model provider is having issues (server error).".to_string()
            }
            ProviderErrorKind::Unknown => format!("Model API error: {}", self.message),
        }
    }

}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "Provider error ({}, {:?}): {}", status, self.kind, self.message)
        } else {
            write!(f, "Provider error ({:?}): {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

/// Pull retry_after out of a 429 JSON body. Providers put it either at the
/// top level or under "error", as an integer or a float.
fn extract_retry_after(body: &str) -> Option<u64> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v["error"]["retry_after"]
        .as_u64()
        .or_else(|| v["retry_after"].as_u64())
        .or_else(|| {
            v["error"]["retry_after"]
                .as_f64()
                .or_else(|| v["retry_after"].as_f64())
                .map(|f| f.ceil() as u64)
        })
}

fn truncate_body(body: &str) -> String {
    if body.len() > 300 {
        let mut end = 300;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(ProviderError::from_status(401, "").kind, ProviderErrorKind::Auth);
        assert_eq!(ProviderError::from_status(402, "").kind, ProviderErrorKind::Billing);
        assert_eq!(ProviderError::from_status(404, "").kind, ProviderErrorKind::NotFound);
        assert_eq!(ProviderError::from_status(429, "").kind, ProviderErrorKind::RateLimit);
        assert_eq!(ProviderError::from_status(503, "").kind, ProviderErrorKind::ServerError);
        assert_eq!(ProviderError::from_status(418, "").kind, ProviderErrorKind::Unknown);
    }

    #[test]
    fn retry_after_extracted_from_429_body() {
        let err = ProviderError::from_status(429, r#"{"error": {"retry_after": 7}}"#);
        assert_eq!(err.retry_after_secs, Some(7));

        let err = ProviderError::from_status(429, r#"{"retry_after": 2.5}"#);
        assert_eq!(err.retry_after_secs, Some(3));

        let err = ProviderError::from_status(429, "not json");
        assert_eq!(err.retry_after_secs, None);
    }

    #[test]
    fn rate_limit_user_message_includes_wait() {
        let err = ProviderError::from_status(429, r#"{"retry_after": 7}"#);
        assert!(err.user_message().contains("7s"));
    }
}
