use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::compression::CompressionLayer;
use tracing::debug;

use crate::{
    application::{error::HttpError, serve::SitemapReader},
    domain::site::SiteRegistry,
    infra::db::PostgresRepositories,
};

use super::{
    ARTIFACT_HEADER, db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub sitemaps: SitemapReader,
    pub sites: Arc<SiteRegistry>,
    /// Database probed by `/_health/db`; without one the probe reports unavailable.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    let sitemap_routes = Router::new()
        .route("/{site}/sitemap", get(sitemap))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(sitemap_routes)
        .route("/_health/db", get(db_health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn sitemap(State(state): State<HttpState>, Path(site): Path<String>) -> Response {
    let Some(profile) = state.sites.get(&site) else {
        return HttpError::unknown_site(&site).into_response();
    };

    match state.sitemaps.open(&profile.context).await {
        Ok(opened) => {
            debug!(
                target = "sitemapd::http::sitemap",
                site = %profile.context,
                artifact_id = %opened.artifact_id,
                "streaming sitemap artifact"
            );
            let mut response = Response::new(Body::from_stream(opened.body));
            let headers = response.headers_mut();
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/xml; charset=utf-8"),
            );
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=300"));
            if let Ok(value) = HeaderValue::from_str(&opened.artifact_id.to_string()) {
                headers.insert(ARTIFACT_HEADER, value);
            }
            response
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => HttpError::new(
            "infra::http::public::db_health",
            StatusCode::SERVICE_UNAVAILABLE,
            "Database unavailable",
            "no database is configured",
        )
        .into_response(),
    }
}

async fn fallback() -> Response {
    HttpError::new(
        "infra::http::public::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matches the request path",
    )
    .into_response()
}
