//! Conversions from the portal's layer errors into the HTTP error type.

use crm_core::error::AppError;

use crate::services::api_client::ApiError;
use crate::services::auth_client::AuthClientError;
use crate::services::backend::BackendError;
use crate::services::join_requests::JoinRequestError;
use crate::services::organizations::OrganizationError;
use crate::services::resolver::ResolveError;

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status, body } => AppError::Upstream {
                status,
                message: body,
            },
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Backend(e) => e.into(),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NoOrganizationContext => {
                AppError::Forbidden(anyhow::anyhow!("No organization context"))
            }
            ApiError::Status { status, body } => AppError::Upstream {
                status,
                message: body,
            },
            ApiError::InvalidUpload(msg) | ApiError::InvalidEndpoint(msg) => {
                AppError::BadRequest(anyhow::anyhow!(msg))
            }
            ApiError::Resolution(msg) | ApiError::Transport(msg) | ApiError::Decode(msg) => {
                AppError::BadGateway(msg)
            }
        }
    }
}

impl From<OrganizationError> for AppError {
    fn from(err: OrganizationError) -> Self {
        match err {
            OrganizationError::AlreadyMember => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            OrganizationError::NotAuthorized(_) | OrganizationError::SuperAdminRequired => {
                AppError::Forbidden(anyhow::anyhow!(err.to_string()))
            }
            OrganizationError::Resolve(e) => e.into(),
            OrganizationError::Backend(e) => e.into(),
        }
    }
}

impl From<JoinRequestError> for AppError {
    fn from(err: JoinRequestError) -> Self {
        match err {
            JoinRequestError::AlreadyMember
            | JoinRequestError::DuplicateRequest
            | JoinRequestError::AlreadyResolved(_) => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            JoinRequestError::OrganizationNotFound(_) | JoinRequestError::NotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            JoinRequestError::OrganizationInactive(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            JoinRequestError::NotAuthorized(_) => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            JoinRequestError::Resolve(e) => e.into(),
            JoinRequestError::Backend(e) => e.into(),
        }
    }
}

impl From<AuthClientError> for AppError {
    fn from(err: AuthClientError) -> Self {
        match err {
            AuthClientError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            AuthClientError::Rejected { status, body } => AppError::Upstream {
                status,
                message: body,
            },
            AuthClientError::Transport(e) => AppError::BadGateway(e.to_string()),
            AuthClientError::InvalidToken(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlreadyResolved, JoinRequestStatus};
    use axum::http::StatusCode;
    use uuid::Uuid;

    #[test]
    fn no_context_is_forbidden() {
        let err: AppError = ApiError::NoOrganizationContext.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn resolved_request_is_conflict() {
        let err: AppError = JoinRequestError::AlreadyResolved(AlreadyResolved {
            id: Uuid::nil(),
            status: JoinRequestStatus::Approved,
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_status_passes_through() {
        let err: AppError = ApiError::Status {
            status: 422,
            body: "bad segment".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn invalid_endpoint_is_bad_request() {
        let err: AppError = ApiError::InvalidEndpoint("customers/..".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
