//! Crate-wide error taxonomy and its mapping onto HTTP responses.
//!
//! Every domain module (`workspace`, `access`, `billing`, `artifacts`,
//! `release`, `signing`, `host_admission`) defines its own narrow error enum
//! and converts it into [`AppError`] at the boundary where it crosses into
//! the API layer. This mirrors the teacher's split between per-module error
//! enums and a crate-wide `EnterpriseError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// The error kinds named by the error-handling design. Each maps to exactly
/// one HTTP status and carries the detail needed to build a client-facing
/// message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("plan limit exceeded: {resource} ({current}/{max})")]
    PlanLimit {
        resource: String,
        current: i64,
        max: i64,
    },

    #[error("workspace payment suspended")]
    PaymentSuspended,

    #[error("access required")]
    AccessRequired,

    #[error("access request pending")]
    AccessPending,

    #[error("nda signature required for document {document_id}")]
    NdaRequired { document_id: Uuid },

    #[error("upstream provider error: {0}")]
    ProviderError(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid-input",
            Self::NotAuthenticated => "not-authenticated",
            Self::NotAuthorized(_) => "not-authorized",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "conflict",
            Self::PlanLimit { .. } => "plan-limit",
            Self::PaymentSuspended => "payment-suspended",
            Self::AccessRequired => "access-required",
            Self::AccessPending => "access-pending",
            Self::NdaRequired { .. } => "nda-required",
            Self::ProviderError(_) => "provider-error",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PlanLimit { .. } => StatusCode::FORBIDDEN,
            Self::PaymentSuspended => StatusCode::FORBIDDEN,
            Self::AccessRequired | Self::AccessPending | Self::NdaRequired { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::ProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<Uuid>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = matches!(self, Self::ProviderError(_) | Self::Internal(_))
            .then(Uuid::new_v4);

        match (&self, correlation_id) {
            (Self::Internal(source), Some(id)) => {
                tracing::error!(correlation_id = %id, error = %source, "internal error");
            }
            (Self::ProviderError(detail), Some(id)) => {
                tracing::warn!(correlation_id = %id, detail = %detail, "provider error");
            }
            _ => tracing::warn!(code = self.code(), "{self}"),
        }

        let message = match &self {
            // Unexpected errors never leak their source to the client.
            Self::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.code(),
            message,
            correlation_id,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".into()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Self::Conflict(db_err.message().to_string())
            }
            other => Self::internal(other),
        }
    }
}

impl From<crate::identity::IdentityError> for AppError {
    fn from(err: crate::identity::IdentityError) -> Self {
        match err {
            crate::identity::IdentityError::InvalidCredential => Self::NotAuthenticated,
            crate::identity::IdentityError::Db(e) => e.into(),
        }
    }
}

impl From<crate::workspace::WorkspaceError> for AppError {
    fn from(err: crate::workspace::WorkspaceError) -> Self {
        use crate::workspace::WorkspaceError as E;
        match err {
            E::NotFound => Self::NotFound("workspace".into()),
            E::DefaultWorkspace => Self::InvalidInput("cannot delete the default workspace".into()),
            E::LastWorkspace => Self::InvalidInput("owner has no other workspace".into()),
            E::LastOwner => Self::InvalidInput("target is the only remaining owner".into()),
            E::InvitationExpired => Self::InvalidInput("invitation has expired".into()),
            E::EmailMismatch => Self::InvalidInput("invitation email does not match".into()),
            E::AlreadyMember => Self::Conflict("already a member".into()),
            E::SeatLimit => Self::PlanLimit {
                resource: "users".into(),
                current: 0,
                max: 0,
            },
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::host_admission::HostAdmissionError> for AppError {
    fn from(err: crate::host_admission::HostAdmissionError) -> Self {
        use crate::host_admission::HostAdmissionError as E;
        match err {
            E::InvalidHost => Self::InvalidInput("invalid host header".into()),
            E::UnknownHost => Self::InvalidInput("invalid host header".into()),
        }
    }
}

impl From<crate::signing::VerifyFailure> for AppError {
    fn from(reason: crate::signing::VerifyFailure) -> Self {
        // Deliberately generic: never tell the caller which check failed.
        tracing::warn!(?reason, "signed url rejected");
        Self::NotAuthorized("invalid or expired link".into())
    }
}

impl From<crate::billing::PlanError> for AppError {
    fn from(err: crate::billing::PlanError) -> Self {
        use crate::billing::PlanError as E;
        match err {
            E::NotFound => Self::NotFound("billing plan".into()),
            E::LimitExceeded { resource, current, max } => Self::PlanLimit { resource, current, max },
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::billing::ProviderError> for AppError {
    fn from(err: crate::billing::ProviderError) -> Self {
        Self::ProviderError(err.to_string())
    }
}

impl From<crate::billing::BillingError> for AppError {
    fn from(err: crate::billing::BillingError) -> Self {
        use crate::billing::BillingError as E;
        match err {
            E::BadSignature => Self::NotAuthorized("bad webhook signature".into()),
            E::UnknownStatus(s) => Self::InvalidInput(format!("unrecognized subscription status: {s}")),
            E::WorkspaceNotFound => Self::NotFound("workspace".into()),
            E::Provider(e) => e.into(),
            E::Plan(e) => e.into(),
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::access::AccessRequestError> for AppError {
    fn from(err: crate::access::AccessRequestError) -> Self {
        use crate::access::AccessRequestError as E;
        match err {
            E::NotFound => Self::NotFound("access request".into()),
            E::WrongState => Self::NotAuthorized("access request is not in the expected state".into()),
            E::DocumentModified => Self::Conflict("the NDA document has changed; please re-review and re-sign".into()),
            E::ConsentRequired => Self::InvalidInput("consent is required to sign".into()),
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::access::Decision> for AppError {
    fn from(decision: crate::access::Decision) -> Self {
        use crate::access::{Decision, DenyReason};
        match decision {
            Decision::Allow => unreachable!("an Allow decision is never converted into an error"),
            Decision::Deny(DenyReason::PaymentSuspended) => Self::PaymentSuspended,
            Decision::Deny(DenyReason::NotAuthorized) => Self::NotAuthorized("not authorized".into()),
            Decision::Deny(DenyReason::AccessRequired) => Self::AccessRequired,
            Decision::Deny(DenyReason::AccessPending) => Self::AccessPending,
            Decision::RequireNdaSignature(document_id) => Self::NdaRequired { document_id },
        }
    }
}

impl From<crate::artifacts::ArtifactError> for AppError {
    fn from(err: crate::artifacts::ArtifactError) -> Self {
        use crate::artifacts::ArtifactError as E;
        match err {
            E::NotFound => Self::NotFound("artifact".into()),
            E::PlanLimit(e) => e.into(),
            E::VisibilityInvariant(_) => {
                Self::InvalidInput("visibility change would violate a containment invariant".into())
            }
            E::Conflict => Self::Conflict("duplicate artifact".into()),
            E::SbomParse(e) => Self::InvalidInput(e.to_string()),
            E::Storage(e) => Self::internal(e),
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::release::ComposeError> for AppError {
    fn from(err: crate::release::ComposeError) -> Self {
        use crate::release::ComposeError as E;
        match err {
            E::NotFound => Self::NotFound("release".into()),
            E::Artifact(e) => e.into(),
            E::Db(e) => e.into(),
        }
    }
}

impl From<crate::release::ReleaseError> for AppError {
    fn from(err: crate::release::ReleaseError) -> Self {
        use crate::release::ReleaseError as E;
        match err {
            E::NotFound => Self::NotFound("release".into()),
            E::Conflict => Self::Conflict("an artifact for this component already exists in the release".into()),
            E::Db(e) => e.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
