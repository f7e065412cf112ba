pub type Result<T> = std::result::Result<T, Error>;

/// Rejection messages returned to the browser verbatim.
///
/// They are part of the observable contract and deliberately do not say which
/// of several equivalent sub-checks failed.
pub mod reason {
    pub const STATE_NOT_FOUND: &str = "State was NOT found.";
    pub const STATE_INVALID: &str = "State was invalid.";
    pub const NONCE_NOT_FOUND: &str = "Nonce was NOT found.";
    pub const NONCE_INVALID: &str = "Nonce was invalid.";
    pub const PKCE_INVALID: &str = "PKCE was invalid.";
    pub const ID_TOKEN_NOT_FOUND: &str = "ID token was NOT found.";
    pub const ACCESS_TOKEN_NOT_FOUND: &str = "Access token was NOT found.";
    pub const TOKEN_NOT_ACTIVE: &str = "Token was NOT active.";
    pub const INTROSPECTION_FAILED: &str = "Token introspection failed.";
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Admission errors
    #[error("{0}")]
    Unauthorized(String),
    #[error("forbidden")]
    Forbidden,

    // Route table errors, raised before anything is served
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    // Upstream call failed below the HTTP layer (DNS, refused, timeout)
    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized(message.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Proxy(e.to_string())
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Proxy(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Storage(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal details stay in the logs.
        let body = match &self {
            Error::Storage(_) | Error::Internal(_) | Error::Config(_) => {
                tracing::error!(error = %self, "request failed");
                "internal error".to_string()
            }
            Error::Proxy(_) => {
                tracing::error!(error = %self, "upstream unreachable");
                "bad gateway".to_string()
            }
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_displays_bare_message() {
        let err = Error::unauthorized(reason::STATE_INVALID);
        assert_eq!(err.to_string(), "State was invalid.");
    }

    #[cfg(feature = "axum")]
    #[test]
    fn status_mapping() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let cases = [
            (Error::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (Error::Forbidden, StatusCode::FORBIDDEN),
            (Error::Proxy("refused".into()), StatusCode::BAD_GATEWAY),
            (Error::Storage("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
