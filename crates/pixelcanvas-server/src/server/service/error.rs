use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use pixelcanvas::{Error, ErrorClass};
use serde_json::json;

/// HTTP rendering of a pipeline [`Error`].
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.class() {
            ErrorClass::Config | ErrorClass::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorClass::Malformed => StatusCode::BAD_REQUEST,
            ErrorClass::RateLimited => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0.class() {
            ErrorClass::RateLimited => tracing::info!("Request rejected: {}", self.0),
            ErrorClass::Malformed => tracing::warn!("Bad request: {}", self.0),
            ErrorClass::Config | ErrorClass::Dependency => {
                tracing::error!("Request failed: {}", self.0)
            }
        }

        let mut response = (status, Json(json!({ "error": self.0.to_string() }))).into_response();
        if let Error::RateLimited { retry_after } = self.0 {
            // Whole seconds, rounded up so a client never retries too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn statuses_follow_error_class() {
        let cases = [
            (
                Error::InvalidChunkSize { size: 0 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::InvalidUserId { user: "x".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Broker {
                    context: "down".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = ApiError(Error::RateLimited {
            retry_after: Duration::from_millis(1500),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[RETRY_AFTER], "2");
    }
}
