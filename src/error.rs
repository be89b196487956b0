use thiserror::Error;

/// Failure categories at the API boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    /// 401 that survived the refresh-and-replay attempt. The session has
    /// already been cleared by the time this is returned.
    #[error("authentication required")]
    Unauthorized,

    /// `message` is the JSON `error`/`detail`/`message` field when
    /// `from_field` is set, otherwise the raw body (logs only for 400s).
    #[error("server returned {status}: {message}")]
    Server {
        status: u16,
        message: String,
        from_field: bool,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("session storage error: {0}")]
    Session(String),
}

impl ApiError {
    /// Builds a `Server` error from a non-2xx response body, preferring the
    /// `error` or `detail` field the backend puts in JSON error bodies.
    pub fn from_status(status: u16, body: &str) -> Self {
        let field = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("detail"))
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            });
        match field {
            Some(message) => ApiError::Server {
                status,
                message,
                from_field: true,
            },
            None => ApiError::Server {
                status,
                message: body.trim().to_string(),
                from_field: false,
            },
        }
    }

    /// Text for the transient notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error. Please check your connection.".to_string(),
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::Server {
                status,
                message,
                from_field,
            } => match status {
                400 if *from_field && !message.is_empty() => message.clone(),
                400 => "Invalid request data".to_string(),
                401 => "Authentication required".to_string(),
                403 => "Access denied".to_string(),
                404 => "Resource not found".to_string(),
                500 => "Server error. Please try again later.".to_string(),
                _ if message.is_empty() => format!("Error {}: Unknown error", status),
                _ => format!("Error {}: {}", status, message),
            },
            ApiError::Decode(_) => "Unexpected response from server".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Session(msg) => format!("Could not update saved session: {}", msg),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_prefers_error_field() {
        let err = ApiError::from_status(400, r#"{"error": "User with this email already exists"}"#);
        assert_eq!(err.user_message(), "User with this email already exists");
    }

    #[test]
    fn test_from_status_reads_detail_field() {
        let err = ApiError::from_status(404, r#"{"detail": "Job not found"}"#);
        match &err {
            ApiError::Server { status, message, .. } => {
                assert_eq!(*status, 404);
                assert_eq!(message, "Job not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.user_message(), "Resource not found");
    }

    #[test]
    fn test_bad_request_without_error_field_is_generic() {
        let field_errors = ApiError::from_status(400, r#"{"password": ["This password is too short."]}"#);
        assert_eq!(field_errors.user_message(), "Invalid request data");
        assert!(field_errors.to_string().contains("This password is too short."));

        let html = ApiError::from_status(400, "<html>Bad Request</html>");
        assert_eq!(html.user_message(), "Invalid request data");
    }

    #[test]
    fn test_from_status_plain_text_body() {
        let err = ApiError::from_status(502, "  Bad Gateway \n");
        assert_eq!(err.user_message(), "Error 502: Bad Gateway");
    }

    #[test]
    fn test_user_messages_by_category() {
        assert_eq!(
            ApiError::Network("connection refused".into()).user_message(),
            "Network error. Please check your connection."
        );
        assert_eq!(ApiError::Unauthorized.user_message(), "Authentication required");
        assert_eq!(ApiError::from_status(400, "").user_message(), "Invalid request data");
        assert_eq!(ApiError::from_status(403, "{}").user_message(), "Access denied");
        assert_eq!(
            ApiError::from_status(500, "boom").user_message(),
            "Server error. Please try again later."
        );
        assert_eq!(ApiError::from_status(418, "").user_message(), "Error 418: Unknown error");
    }
}
