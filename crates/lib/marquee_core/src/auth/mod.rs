//! Authentication and authorization logic.
//!
//! Provides password hashing, scoped credential tokens, permission checks
//! and the layered access predicates shared by the API middleware.

pub mod access;
pub mod password;
pub mod permissions;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented credential is not a well-formed token.
    #[error("Invalid credential format")]
    InvalidCredentialFormat,

    /// Unknown, expired, wrong-scope or consumed token. The cases are not
    /// distinguished.
    #[error("Credential not recognized")]
    CredentialNotRecognized,

    #[error("Hash error: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
