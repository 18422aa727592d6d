//! Account lifecycle: registration, activation, login and password reset,
//! delegating to `marquee_core`.

use marquee_core::auth::AuthError;
use marquee_core::auth::password;
use marquee_core::auth::permissions::MOVIES_READ;
use marquee_core::auth::tokens::{IssuedToken, TokenScope, validate_token_plaintext};
use marquee_core::mailer::Notification;
use marquee_core::models::user::{NewUser, User, validate_registration};
use marquee_core::store::StoreError;
use marquee_core::validation::{Validator, validate_email, validate_password_plaintext};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// bcrypt is CPU-bound, so it runs on the blocking pool.
async fn hash_password(plaintext: String) -> AppResult<String> {
    Ok(tokio::task::spawn_blocking(move || password::hash_password(&plaintext)).await??)
}

async fn verify_password(plaintext: String, hash: String) -> AppResult<bool> {
    Ok(tokio::task::spawn_blocking(move || password::verify_password(&plaintext, &hash)).await??)
}

/// Deliver `notification` to `recipient` in the background.
fn notify(state: &AppState, name: &'static str, recipient: String, notification: Notification) {
    let mailer = state.mailer.clone();
    state.tasks.spawn(name, async move {
        mailer.send(&recipient, &notification).await
    });
}

/// Resolve a token from a request body, reporting failure as a field error.
async fn user_for_body_token(
    state: &AppState,
    scope: TokenScope,
    plaintext: &str,
    message: &str,
) -> AppResult<User> {
    match state.tokens.resolve(scope, plaintext).await {
        Ok(user) => Ok(user),
        Err(AuthError::InvalidCredentialFormat | AuthError::CredentialNotRecognized) => {
            Err(AppError::field("token", message))
        }
        Err(e) => Err(e.into()),
    }
}

/// Look up an account by the email given in a request body.
async fn user_for_body_email(state: &AppState, email: &str) -> AppResult<User> {
    match state.stores.users.get_by_email(email).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(AppError::field("email", "no matching email address found")),
        Err(e) => Err(e.into()),
    }
}

/// Create an inactive account holding `movies:read`, and mail it an
/// activation token.
pub async fn register(
    state: &AppState,
    name: String,
    email: String,
    plaintext_password: String,
) -> AppResult<User> {
    let mut v = Validator::new();
    validate_registration(&mut v, &name, &email, &plaintext_password);
    v.finish()?;

    let password_hash = hash_password(plaintext_password).await?;
    let user = state
        .stores
        .users
        .insert(NewUser {
            name,
            email,
            password_hash,
            activated: false,
        })
        .await?;

    state.permissions.grant(user.id, &[MOVIES_READ]).await?;
    let token = state
        .tokens
        .issue_for_scope(user.id, TokenScope::Activation)
        .await?;

    notify(
        state,
        "welcome-email",
        user.email.clone(),
        Notification::Welcome {
            user_id: user.id,
            activation_token: token.plaintext,
        },
    );
    info!(user_id = user.id, "Registered user");
    Ok(user)
}

/// Activate the account owning an activation token. All of the account's
/// activation tokens are revoked.
pub async fn activate(state: &AppState, token: &str) -> AppResult<User> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    v.finish()?;

    let mut user = user_for_body_token(
        state,
        TokenScope::Activation,
        token,
        "invalid or expired activation token",
    )
    .await?;

    user.activated = true;
    state.stores.users.update(&mut user).await?;
    state
        .tokens
        .revoke_all(TokenScope::Activation, user.id)
        .await?;

    info!(user_id = user.id, "Activated user");
    Ok(user)
}

/// Set a new password using a password-reset token. All of the account's
/// password-reset tokens are revoked.
pub async fn reset_password(state: &AppState, plaintext_password: String, token: &str) -> AppResult<()> {
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &plaintext_password);
    validate_token_plaintext(&mut v, token);
    v.finish()?;

    let mut user = user_for_body_token(
        state,
        TokenScope::PasswordReset,
        token,
        "invalid or expired password reset token",
    )
    .await?;

    user.password_hash = hash_password(plaintext_password).await?;
    state.stores.users.update(&mut user).await?;
    state
        .tokens
        .revoke_all(TokenScope::PasswordReset, user.id)
        .await?;

    info!(user_id = user.id, "Password reset");
    Ok(())
}

/// Exchange credentials for an authentication token. Unknown email and
/// wrong password fail identically.
pub async fn login(state: &AppState, email: &str, plaintext_password: String) -> AppResult<IssuedToken> {
    let mut v = Validator::new();
    validate_email(&mut v, email);
    validate_password_plaintext(&mut v, &plaintext_password);
    v.finish()?;

    let user = match state.stores.users.get_by_email(email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !verify_password(plaintext_password, user.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .tokens
        .issue_for_scope(user.id, TokenScope::Authentication)
        .await?;
    info!(user_id = user.id, "Issued authentication token");
    Ok(token)
}

/// Mail a fresh activation token to an account that is not yet active.
pub async fn resend_activation(state: &AppState, email: &str) -> AppResult<()> {
    let mut v = Validator::new();
    validate_email(&mut v, email);
    v.finish()?;

    let user = user_for_body_email(state, email).await?;
    if user.activated {
        return Err(AppError::field("email", "user has already been activated"));
    }

    let token = state
        .tokens
        .issue_for_scope(user.id, TokenScope::Activation)
        .await?;
    notify(
        state,
        "activation-email",
        user.email,
        Notification::Activation {
            activation_token: token.plaintext,
        },
    );
    Ok(())
}

/// Mail a password-reset token to an activated account.
pub async fn request_password_reset(state: &AppState, email: &str) -> AppResult<()> {
    let mut v = Validator::new();
    validate_email(&mut v, email);
    v.finish()?;

    let user = user_for_body_email(state, email).await?;
    if !user.activated {
        return Err(AppError::field("email", "user account must be activated"));
    }

    let token = state
        .tokens
        .issue_for_scope(user.id, TokenScope::PasswordReset)
        .await?;
    notify(
        state,
        "password-reset-email",
        user.email,
        Notification::PasswordReset {
            reset_token: token.plaintext,
        },
    );
    Ok(())
}
