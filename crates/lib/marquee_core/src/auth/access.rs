//! Layered access predicates.
//!
//! Each layer implies the ones before it: a permission check first requires
//! an activated account, which first requires an authenticated caller.

use thiserror::Error;

use crate::models::user::User;

/// Who is making the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    /// No credential was presented.
    #[default]
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    AccountNotActivated,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,
}

pub fn require_authenticated(identity: &Identity) -> Result<&User, AccessDenied> {
    identity.user().ok_or(AccessDenied::AuthenticationRequired)
}

pub fn require_activated(identity: &Identity) -> Result<&User, AccessDenied> {
    let user = require_authenticated(identity)?;
    if !user.activated {
        return Err(AccessDenied::AccountNotActivated);
    }
    Ok(user)
}
