use sqlx;
use thiserror::Error;

use crate::record::Id;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("database error")]
    Sqlx { source: sqlx::Error },

    /// Represents a request body or query string that could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Represents a field that failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// Represents a recommendation request without any tags.
    #[error("at least one tag must be selected")]
    EmptyTags,

    /// Represents a rating outside 1 to 5.
    #[error("rating must be between 1 and 5 (got {0})")]
    RatingOutOfRange(i64),

    #[error("place {0} does not exist")]
    NonExistentPlace(Id),

    #[error("review {0} does not exist")]
    NonExistentReview(Id),

    #[error("user {0} does not exist")]
    NonExistentUser(Id),

    #[error("pet {0} does not exist")]
    NonExistentPet(Id),

    /// Represents a lookup by account details that matched nobody.
    #[error("no account matches the given details")]
    NoMatchingAccount,

    /// Represents an attempt to modify somebody else's resource.
    #[error("not permitted to modify this resource")]
    NotOwner,

    #[error("login ID already exists")]
    LoginIdAlreadyExists,

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("nickname already exists")]
    NicknameAlreadyExists,

    #[error("login ID or password is incorrect")]
    InvalidCredentials,

    #[error("current password is incorrect")]
    WrongPassword,

    #[error("account is deactivated")]
    InactiveAccount,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,

    /// Represents a failure to sign a token or hash a password.
    #[error("could not compute signature")]
    SigningFailed,
}

impl BackendError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        BackendError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
