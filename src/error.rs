use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Every failure a request can surface. The first four are the vote
/// validation outcomes, checked in this order; `Internal` is the catch-all
/// for storage and mailbox faults and never leaks its cause to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidReference(String),
    #[error("{0}")]
    NotFound(String),
    #[error("The voting deadline for this destination has passed.")]
    DeadlineExpired,
    #[error("You have already cast your vote.")]
    AlreadyVoted,
    #[error("{0}")]
    Validation(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Not authorized to access this route")]
    Unauthorized,
    #[error("User role '{0}' is not authorized to access this route")]
    Forbidden(String),
    #[error("Server Error")]
    Internal(#[from] Report),
}

impl From<actix::MailboxError> for ApiError {
    fn from(err: actix::MailboxError) -> Self {
        ApiError::Internal(Report::new(err))
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidReference(_)
            | ApiError::DeadlineExpired
            | ApiError::AlreadyVoted
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(report) = self {
            error!(?report, "Request failed with server fault");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use color_eyre::eyre::eyre;

    #[test]
    fn validation_failures_map_to_client_statuses() {
        assert_eq!(
            ApiError::InvalidReference("Invalid Destination ID format.".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Destination not found.".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::DeadlineExpired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::AlreadyVoted.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::Forbidden("employee".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal(eyre!("pool exhausted")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_rt::test]
    async fn error_body_carries_flat_envelope() {
        let response = ApiError::AlreadyVoted.error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "message": "You have already cast your vote."
            })
        );
    }

    #[actix_rt::test]
    async fn internal_faults_never_leak_their_cause() {
        let response = ApiError::Internal(eyre!("connection refused")).error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Server Error");
    }

    #[test]
    fn forbidden_names_the_rejected_role() {
        assert_eq!(
            ApiError::Forbidden("employee".into()).to_string(),
            "User role 'employee' is not authorized to access this route"
        );
    }
}
