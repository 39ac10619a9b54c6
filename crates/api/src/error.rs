use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_errors::CourierError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Courier(#[from] CourierError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Courier(err) => match err {
                CourierError::Validation(_) | CourierError::UnknownJobType(_) => {
                    StatusCode::BAD_REQUEST
                }
                CourierError::JobNotFound { .. } | CourierError::WorkerNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        // The error message travels verbatim under "error".
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
