//! Session extraction for authenticated routes.
//!
//! A session token travels either in the `session_token` cookie (browser
//! clients) or in the `Authorization` header (API clients and the WebSocket
//! handshake from non-browser clients). Any extraction failure maps to
//! `403 FORBIDDEN`; handlers take a [`Session`] argument and never see
//! unauthenticated requests.

use super::state::ServerState;
use crate::user::auth::AuthTokenValue;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

/// The authenticated caller of a request.
#[derive(Debug)]
pub struct Session {
    pub user_id: usize,
    pub token: String,
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

pub enum SessionExtractionError {
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

async fn token_from_request(parts: &mut Parts, state: &ServerState) -> Option<String> {
    let from_cookie = CookieJar::from_request_parts(parts, state)
        .await
        .ok()?
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(str::to_string);

    from_cookie.or_else(|| {
        parts
            .headers
            .get(HEADER_SESSION_TOKEN_KEY)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    })
}

async fn resolve_session(parts: &mut Parts, state: &ServerState) -> Option<Session> {
    let token = match token_from_request(parts, state).await {
        Some(token) => AuthTokenValue(token),
        None => {
            debug!("No session token in cookies or headers");
            return None;
        }
    };

    let user_manager = state.user_manager.lock().unwrap();
    match user_manager.get_auth_token(&token) {
        Ok(Some(auth_token)) => {
            // last_used is bookkeeping; a failed update does not invalidate
            // the session.
            if let Err(err) = user_manager.update_auth_token_last_used(&token) {
                debug!("Failed to bump auth token last_used: {}", err);
            }
            Some(Session {
                user_id: auth_token.user_id,
                token: auth_token.value.0,
            })
        }
        Ok(None) => {
            debug!("Unknown session token");
            None
        }
        Err(err) => {
            debug!("Failed to look up session token: {}", err);
            None
        }
    }
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state)
            .await
            .ok_or(SessionExtractionError::AccessDenied)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(resolve_session(parts, state).await)
    }
}
