// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # http
//!
//! HTTP plumbing shared by all the inkpot APIs.

use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tracing::error;

use crate::{
    blogs, counter_add, discovery,
    inkpot::Inkpot,
    metrics::{self, Sort},
    users,
};

/// Every inkpot API error is rendered as `{"error": "..."}`
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

impl IntoResponse for ErrorResponseBody {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

inventory::submit! {
    metrics::Registration::with_labels(
        "http.requests.total",
        Sort::IntegralCounter,
        &["method", "route"]
    )
}

/// Count requests by method & route
///
/// The route is the *matched* path (e.g. `/api/v1/blogs/{username}/posts`), not the request URI,
/// so as to keep the label cardinality bounded.
pub async fn count_requests(
    State(state): State<Arc<Inkpot>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    counter_add!(
        state.instruments,
        "http.requests.total",
        1,
        &[method.as_str(), route.as_str()]
    );
    next.run(request).await
}

async fn healthcheck() -> &'static str {
    "GOOD"
}

/// Prometheus text exposition of every registered instrument
async fn metrics(State(state): State<Arc<Inkpot>>) -> Response {
    match state.instruments.export() {
        Ok(text) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to export metrics: {:#?}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponseBody {
                    error: format!("{}", err),
                }),
            )
                .into_response()
        }
    }
}

/// Assemble the complete inkpot application: the User, Blog & Discovery APIs beneath `/api/v1`,
/// the health check, the metrics endpoint &, when media is kept on the local filesystem, the
/// uploaded images beneath `/media`
///
/// Request bodies larger than `max_upload_bytes` are refused with a 413.
pub fn make_router(
    state: Arc<Inkpot>,
    media_root: Option<PathBuf>,
    max_upload_bytes: usize,
) -> Router {
    let api = Router::new()
        .merge(users::make_router(state.clone()))
        .merge(blogs::make_router(state.clone()))
        .merge(discovery::make_router(state.clone()));
    let mut router = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
        .nest("/api/v1", api);
    if let Some(root) = media_root {
        router = router.nest_service("/media", ServeDir::new(root));
    }
    router
        .layer(from_fn_with_state(state.clone(), count_requests))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;

    use axum::body::{Body, to_bytes};
    use tower::ServiceExt;

    use crate::inkpot::test_support::state;

    #[tokio::test]
    async fn plumbing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "Hello, world!").unwrap();
        let state = state(dir.path());
        let router = make_router(state.clone(), Some(dir.path().to_owned()), 1024);

        let rsp = router
            .clone()
            .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);

        let rsp = router
            .clone()
            .oneshot(Request::get("/media/hello.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
        let body = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Hello, world!");

        let rsp = router
            .clone()
            .oneshot(
                Request::get("/api/v1/discovery/recent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);

        // Bodies over the limit are refused
        let rsp = router
            .clone()
            .oneshot(
                Request::post("/api/v1/users/signup")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(vec![b' '; 4096]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let rsp = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
        let body = to_bytes(rsp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("inkpot_http_requests_total"));
        assert!(text.contains("/api/v1/discovery/recent"));
    }
}
