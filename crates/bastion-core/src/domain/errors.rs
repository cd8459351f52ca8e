//! Errors surfaced by workflows and queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::EntityKind;

/// Flat classification of a [`ControlError`], stable for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    NotFound,
    Unauthenticated,
    IdentityConflict,
    UnverifiedEmail,
    Conflict,
    UpstreamUnavailable,
    Internal,
}

/// Error returned by every control-plane entry point.
///
/// Validation variants are raised before any write. Storage failures abort the
/// whole transaction and surface as `Conflict`/`NotFound` when recognizable,
/// `Internal` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("missing input: {field}")]
    MissingInput { field: &'static str },

    #[error("{kind} not found: {identifier}")]
    NotFound { kind: EntityKind, identifier: String },

    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("identity conflict for subject {subject}: token username {token_username}, stored username {stored_username}")]
    IdentityConflict {
        subject: String,
        token_username: String,
        stored_username: String,
    },

    #[error("email address {email} is not verified")]
    UnverifiedEmail { email: String },

    #[error("conflict on {kind} {identifier}: {reason}")]
    Conflict {
        kind: EntityKind,
        identifier: String,
        reason: String,
    },

    #[error("agent {agent} unavailable: {reason}")]
    UpstreamUnavailable { agent: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::MissingInput { .. } => ErrorKind::MissingInput,
            ControlError::NotFound { .. } => ErrorKind::NotFound,
            ControlError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            ControlError::IdentityConflict { .. } => ErrorKind::IdentityConflict,
            ControlError::UnverifiedEmail { .. } => ErrorKind::UnverifiedEmail,
            ControlError::Conflict { .. } => ErrorKind::Conflict,
            ControlError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            ControlError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(kind: EntityKind, identifier: impl ToString) -> Self {
        ControlError::NotFound {
            kind,
            identifier: identifier.to_string(),
        }
    }

    pub fn conflict(kind: EntityKind, identifier: impl ToString, reason: impl Into<String>) -> Self {
        ControlError::Conflict {
            kind,
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(agent: impl ToString, reason: impl Into<String>) -> Self {
        ControlError::UpstreamUnavailable {
            agent: agent.to_string(),
            reason: reason.into(),
        }
    }
}
