use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, PrivateCookieJar};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{self, AuthSession, CODE_VERIFIER_COOKIE};
use crate::drive::tokens;
use crate::dtos::AuthCallbackQuery;
use crate::routes::app_redirect;
use crate::state::AppState;

const DEFAULT_SESSION_SECS: i64 = 3600;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/callback", get(auth_callback))
        .route("/api/auth/google/callback", get(google_callback))
}

#[utoipa::path(
    get,
    path = "/api/auth/callback",
    tag = "auth",
    params(AuthCallbackQuery),
    responses((status = 303, description = "Redirect to `next` on success, `/login?error=` otherwise"))
)]
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    headers: HeaderMap,
    private: PrivateCookieJar,
    plain: CookieJar,
) -> Response {
    complete_sign_in(&state, query, &headers, private, plain, false).await
}

#[utoipa::path(
    get,
    path = "/api/auth/google/callback",
    tag = "auth",
    params(AuthCallbackQuery),
    responses((status = 303, description = "Redirect after Google sign-in; stores the Drive grant"))
)]
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    headers: HeaderMap,
    private: PrivateCookieJar,
    plain: CookieJar,
) -> Response {
    complete_sign_in(&state, query, &headers, private, plain, true).await
}

async fn complete_sign_in(
    state: &AppState,
    query: AuthCallbackQuery,
    headers: &HeaderMap,
    private: PrivateCookieJar,
    plain: CookieJar,
    keep_provider_tokens: bool,
) -> Response {
    let app_url = state.config.app_url.as_str();
    let login_error = |error: &str| app_redirect(app_url, "/login", &[("error", error)]).into_response();

    if let Some(error) = query.error.as_deref() {
        let description = query.error_description.as_deref().unwrap_or(error);
        warn!(error, description, "Sign-in was not completed");
        return login_error(description);
    }
    let Some(code) = query.code.as_deref() else {
        return login_error("missing_code");
    };
    let Some(verifier) = auth::code_verifier(headers) else {
        return login_error("missing_code_verifier");
    };

    let session = match state.identity.exchange_code(code, &verifier).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "Code exchange failed");
            return login_error("auth_failed");
        }
    };

    if keep_provider_tokens {
        store_provider_tokens(state, &session).await;
    }

    info!(user_id = %session.user.id, "Owner signed in");
    let max_age = session.expires_in.unwrap_or(DEFAULT_SESSION_SECS);
    let private = private.add(auth::session_cookie(session.access_token, max_age));
    let plain = plain.remove(Cookie::build(Cookie::new(CODE_VERIFIER_COOKIE, "")).path("/").build());
    let target = auth::safe_next(query.next.as_deref());

    (private, plain, app_redirect(app_url, target, &[])).into_response()
}

/// Keep the Google grant from a Google sign-in as the owner's Drive token.
async fn store_provider_tokens(state: &AppState, session: &AuthSession) {
    let (Some(access), Some(refresh)) = (
        session.provider_token.as_deref(),
        session.provider_refresh_token.as_deref(),
    ) else {
        warn!(user_id = %session.user.id, "Google sign-in returned no refreshable provider token");
        return;
    };

    let expiry = tokens::expiry_from(Utc::now(), Some(tokens::DEFAULT_TOKEN_LIFETIME));
    match tokens::store(&state.pool, session.user.id, access, refresh, expiry).await {
        Ok(_) => info!(user_id = %session.user.id, "Drive token stored from Google sign-in"),
        Err(err) => warn!(user_id = %session.user.id, error = %err, "Failed to store Drive token"),
    }
}
