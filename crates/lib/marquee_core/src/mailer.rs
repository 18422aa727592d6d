//! Outbound notifications.
//!
//! Delivery itself is an external collaborator behind the [`Mailer`] port.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// A templated message. Token-bearing variants never print their token
/// through `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub enum Notification {
    Welcome {
        user_id: i64,
        activation_token: String,
    },
    Activation {
        activation_token: String,
    },
    PasswordReset {
        reset_token: String,
    },
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template())
    }
}

impl Notification {
    /// Template name.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "user_welcome",
            Self::Activation { .. } => "token_activation",
            Self::PasswordReset { .. } => "token_password_reset",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "Welcome to Marquee!",
            Self::Activation { .. } => "Activate your Marquee account",
            Self::PasswordReset { .. } => "Reset your Marquee password",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Welcome {
                user_id,
                activation_token,
            } => format!(
                "Hi,\n\nThanks for signing up for a Marquee account. \
                 For future reference, your user ID number is {user_id}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint \
                 with the following JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n"
            ),
            Self::Activation { activation_token } => format!(
                "Hi,\n\nPlease send a `PUT /v1/users/activated` request with the following \
                 JSON body to activate your account:\n\n\
                 {{\"token\": \"{activation_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n"
            ),
            Self::PasswordReset { reset_token } => format!(
                "Hi,\n\nPlease send a `PUT /v1/users/password` request with the following \
                 JSON body to set a new password:\n\n\
                 {{\"password\": \"your new password\", \"token\": \"{reset_token}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 45 minutes.\n"
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), MailError>;
}

/// Records deliveries in the log instead of sending them. Message bodies are
/// not logged since they carry tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), MailError> {
        info!(
            recipient,
            template = notification.template(),
            subject = notification.subject(),
            "Mail delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_tokens() {
        let n = Notification::PasswordReset {
            reset_token: "Y3QMGX3PJ3WLRL2YRTQGQ6KRHU".into(),
        };
        assert_eq!(format!("{n:?}"), "token_password_reset");
        assert!(n.body().contains("Y3QMGX3PJ3WLRL2YRTQGQ6KRHU"));
    }

    #[test]
    fn welcome_mentions_user_id() {
        let n = Notification::Welcome {
            user_id: 42,
            activation_token: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".into(),
        };
        assert!(n.body().contains("user ID number is 42"));
        assert_eq!(n.subject(), "Welcome to Marquee!");
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let n = Notification::Activation {
            activation_token: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".into(),
        };
        assert!(LogMailer.send("alice@example.com", &n).await.is_ok());
    }
}
