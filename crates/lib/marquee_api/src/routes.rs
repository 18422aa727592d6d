//! Route paths.

pub const GET_HEALTHCHECK: &str = "/v1";

pub const POST_USERS_REGISTER: &str = "/v1/users/register";
pub const PUT_USERS_ACTIVATED: &str = "/v1/users/activated";
pub const PUT_USERS_PASSWORD: &str = "/v1/users/password";

pub const POST_TOKENS_AUTHENTICATION: &str = "/v1/tokens/authentication";
pub const POST_TOKENS_ACTIVATION: &str = "/v1/tokens/activation";
pub const POST_TOKENS_PASSWORD_RESET: &str = "/v1/tokens/password-reset";

pub const MOVIES: &str = "/v1/movies";
pub const MOVIES_ID: &str = "/v1/movies/{id}";

pub const GET_DEBUG_VARS: &str = "/debug/vars";

/// Location of a single movie.
pub fn movie_location(id: i64) -> String {
    format!("{MOVIES}/{id}")
}
