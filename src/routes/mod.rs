use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::response::Redirect;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use crate::openapi::openapi_with_security;
use crate::state::AppState;

pub mod auth;
pub mod drive;
pub mod health;
pub mod notifications;
pub mod portal;
pub mod projects;
pub mod review;
pub mod upload;

pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    let cors = cors_layer(&state.config.app_url);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", openapi_with_security()))
        .merge(auth::routes())
        .merge(drive::routes())
        .merge(upload::routes(max_upload_bytes))
        .merge(projects::routes())
        .merge(review::routes())
        .merge(notifications::routes())
        .merge(portal::routes())
        .merge(health::routes())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::debug!("request started");
                })
                .on_response(|response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::info!(
                        status = %response.status(),
                        latency_ms = latency.as_millis(),
                        "request completed"
                    );
                })
        )
        .with_state(state)
}

/// Browser access is limited to the web app's own origin.
fn cors_layer(app_url: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(app_url.parse::<HeaderValue>().ok()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(portal::LINK_PASSWORD_HEADER),
        ])
        .allow_credentials(true)
}

/// Redirect to a path of the web app with the given query parameters.
pub(crate) fn app_redirect(app_url: &str, path: &str, params: &[(&str, &str)]) -> Redirect {
    let base = format!("{app_url}{path}");
    let target = if params.is_empty() {
        reqwest::Url::parse(&base)
    } else {
        reqwest::Url::parse_with_params(&base, params)
    };
    match target {
        Ok(url) => Redirect::to(url.as_str()),
        Err(_) => Redirect::to(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn location(redirect: Redirect) -> String {
        let resp = redirect.into_response();
        resp.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    #[test]
    fn redirect_encodes_status_params() {
        let target = app_redirect("http://localhost:3000", "/dashboard", &[("error", "access denied")]);
        assert_eq!(location(target), "http://localhost:3000/dashboard?error=access+denied");
    }

    #[test]
    fn redirect_without_params_keeps_the_path() {
        let target = app_redirect("https://app.example.com", "/projects/42", &[]);
        assert_eq!(location(target), "https://app.example.com/projects/42");
    }
}
