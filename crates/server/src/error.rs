use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use access::{KeyErr, PolicyErr};

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{}", .0.msg)]
    Key(#[from] KeyErr),

    #[error("{}", .0.msg)]
    Policy(#[from] PolicyErr),

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status for this error. Upstream gateway verdicts pass through
    /// verbatim.
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Key(err) => err.status,
            ServerError::Policy(err) => err.status,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        // Auth failures are logged with the key suffix; the response body
        // carries only the public message.
        match &self {
            ServerError::Key(err) => {
                tracing::warn!(
                    api_key_last_chars = %err.key_suffix,
                    status = err.status.as_u16(),
                    description = %err.description,
                    "api key validation failed"
                );
            }
            ServerError::Policy(err) => {
                tracing::warn!(
                    api_key_last_chars = %err.key_suffix,
                    status = err.status.as_u16(),
                    description = %err.description,
                    "policy lookup failed"
                );
            }
            _ => {}
        }

        (self.status_code(), self.to_string()).into_response()
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Internal(format!("JSON encoding error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_errors_pass_the_gateway_status_through() {
        let err = ServerError::Key(KeyErr::new(
            "Rate limit exceeded",
            StatusCode::TOO_MANY_REQUESTS,
            "abcdef",
        ));
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn bad_request_maps_to_400() {
        let err = ServerError::BadRequest("The specified type (Junk) is unsupported".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
