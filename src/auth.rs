use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::api::IdpApi;
use crate::error::Result;
use crate::schema::Token;
use crate::store::TokenStore;

/// Lifetime assumed for a freshly issued token. The server's own expiry claim is not consulted.
pub const TOKEN_LIFETIME_HOURS: i64 = 8;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Returns the cached token while it is still valid at `now`, otherwise
/// authenticates and caches a new one.
pub async fn ensure_token<A, S>(
    api: &A,
    store: &S,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<Token>
where
    A: IdpApi + ?Sized,
    S: TokenStore + ?Sized,
{
    if let Some(cached) = store.load()? {
        if cached.is_valid_at(now) {
            info!("Using existing token (expires {})", cached.expiry);
            return Ok(cached);
        }
        info!("Cached token expired at {}; reauthenticating", cached.expiry);
    } else {
        info!("No cached token found; authenticating");
    }

    let value = api
        .authenticate(&credentials.email, &credentials.password)
        .await?;
    let token = Token {
        value,
        expiry: now + Duration::hours(TOKEN_LIFETIME_HOURS),
    };
    store.save(&token)?;
    info!("Authentication successful; token valid until {}", token.expiry);

    Ok(token)
}
