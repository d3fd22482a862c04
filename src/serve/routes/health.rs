use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::serve::{types::BadRequest, Facade};

enum Rendering {
    Json,
    Prometheus,
    Unacceptable,
}

/// `text/plain` gets the Prometheus rendering, `application/json` the
/// JSON one; a bare wildcard defaults to Prometheus, no header at all to
/// JSON. Anything else is refused.
fn negotiate(accept: Option<&str>) -> Rendering {
    let Some(accept) = accept else {
        return Rendering::Json;
    };

    if accept.contains("text/plain") {
        return Rendering::Prometheus;
    }

    if accept.contains("application/json") {
        return Rendering::Json;
    }

    if accept.contains("*/*") {
        return Rendering::Prometheus;
    }

    Rendering::Unacceptable
}

pub async fn health(State(facade): State<Facade>, headers: HeaderMap) -> Response {
    let snapshot = facade.health.snapshot();

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    match negotiate(accept) {
        Rendering::Json => (StatusCode::OK, Json(snapshot)).into_response(),
        Rendering::Prometheus => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain;charset=utf-8"),
            );

            (StatusCode::OK, headers, snapshot.to_prometheus()).into_response()
        }
        Rendering::Unacceptable => (
            StatusCode::NOT_ACCEPTABLE,
            Json(BadRequest {
                hint: Some(
                    "unsupported_content_type: accepted types are application/json, text/plain"
                        .to_string(),
                ),
            }),
        )
            .into_response(),
    }
}
