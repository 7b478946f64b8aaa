mod middleware;
mod public;

pub use middleware::RequestContext;
pub use public::{HttpState, build_router};

use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;

/// Response header naming the artifact that was served.
pub const ARTIFACT_HEADER: HeaderName = HeaderName::from_static("x-sitemap-artifact");

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
