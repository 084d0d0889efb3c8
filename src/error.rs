use thiserror::Error;

/// Failures surfaced by the auth gateway, mapped from provider-specific
/// failure codes to a fixed set of user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no account exists for this email")]
    UnknownAccount,
    #[error("incorrect email or password")]
    WrongCredential,
    #[error("email address is not valid")]
    MalformedEmail,
    #[error("too many login attempts, try again later")]
    RateLimited,
    #[error("sign-in failed: {0}")]
    Other(String),
}

/// Error taxonomy for the tracker core.
///
/// Every store and gateway method catches provider-specific errors and
/// rethrows exactly one of these; nothing is retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    /// Required-field or format checks that fail before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Mapped identity-provider failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Blob upload failure. The violation record is never created when the
    /// upload fails, so no record carries a dangling image reference.
    #[error("image upload failed: {0}")]
    Storage(String),

    /// Generic data-store failure.
    #[error("data store failure: {0}")]
    Query(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_carry_fixed_messages() {
        assert_eq!(
            AuthError::UnknownAccount.to_string(),
            "no account exists for this email"
        );
        assert_eq!(
            AuthError::RateLimited.to_string(),
            "too many login attempts, try again later"
        );
    }

    #[test]
    fn auth_error_passes_through_transparently() {
        let err = Error::from(AuthError::WrongCredential);
        assert_eq!(err.to_string(), "incorrect email or password");
    }

    #[test]
    fn storage_error_names_the_upload() {
        let err = Error::storage("bucket unreachable");
        assert_eq!(err.to_string(), "image upload failed: bucket unreachable");
    }
}
