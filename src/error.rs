use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::logging::RequestTrace;
use crate::model::common::election::ElectionStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid ballot: {0}")]
    InvalidBallot(String),
    #[error("Position '{position}' does not exist in election {election_id}")]
    InvalidPosition {
        election_id: String,
        position: String,
    },
    #[error("Voter has already cast a ballot in this election")]
    AlreadyVoted,
    #[error("Election is {0}, not active")]
    ElectionNotActive(ElectionStatus),
    #[error("Election is outside its voting window")]
    OutOfWindow,
    #[error("Not eligible: {0}")]
    NotEligible(String),
    #[error("Cannot move an election from {from} to {to}")]
    InvalidTransition {
        from: ElectionStatus,
        to: ElectionStatus,
    },
    #[error("Election is {0} and can no longer be modified")]
    ElectionClosed(ElectionStatus),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Bad request: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a missing entity of the given kind.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} with ID '{id}'"))
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidBallot(_) => "invalid_ballot",
            Self::InvalidPosition { .. } => "invalid_position",
            Self::AlreadyVoted => "already_voted",
            Self::ElectionNotActive(_) => "election_not_active",
            Self::OutOfWindow => "out_of_window",
            Self::NotEligible(_) => "not_eligible",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ElectionClosed(_) => "election_closed",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Jwt(_) => "invalid_token",
            Self::Db(_) | Self::Argon2(_) | Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::InvalidBallot(_) | Self::InvalidPosition { .. } => Status::UnprocessableEntity,
            Self::AlreadyVoted
            | Self::ElectionNotActive(_)
            | Self::OutOfWindow
            | Self::InvalidTransition { .. }
            | Self::ElectionClosed(_)
            | Self::Conflict(_) => Status::Conflict,
            Self::NotEligible(_) => Status::Forbidden,
            Self::Validation(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Db(_) | Self::Argon2(_) | Self::Internal(_) => Status::InternalServerError,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    /// Matches the `reqN` tag in the server log.
    pub request_id: usize,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let trace = RequestTrace::of(req);
        let message = if status == Status::InternalServerError {
            error!("{trace} failed: {self}");
            "Internal server error".to_string()
        } else {
            debug!("{trace} rejected: {self}");
            self.to_string()
        };
        let body = ErrorBody {
            error: self.code(),
            message,
            request_id: trace.id,
        };
        (status, Json(body)).respond_to(req)
    }
}
