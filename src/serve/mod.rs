use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower::Layer as _;
use tower_http::{cors::CorsLayer, normalize_path::NormalizePathLayer, trace};
use tracing::{error, Level};

use crate::health::HealthTracker;
use crate::prelude::Error;
use crate::registry::PatternRegistry;
use crate::store::{Store, StoreError};
use crate::sync::fetch::BlockFetcher;
use crate::sync::pull::RollbackHandle;

pub mod routes;
pub mod types;

#[cfg(test)]
mod tests;

use types::BadRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    pub listen_address: String,

    #[serde(default)]
    pub permissive_cors: bool,
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct Facade {
    pub store: Store,
    pub registry: PatternRegistry,
    pub health: HealthTracker,
    pub rollback: RollbackHandle,
    pub fetcher: BlockFetcher,
    /// Longest rollback the control plane accepts without `limit=any`.
    pub longest_rollback: u64,
}

impl Facade {
    /// Runs a store query on the blocking pool against a pooled reader.
    pub async fn query<T>(
        &self,
        body: impl FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.with_reader(body))
            .await
            .map_err(|err| StoreError::Corrupted(format!("query worker died: {err}")))?
    }

    /// Runs a store mutation on the blocking pool under the single writer.
    pub async fn mutate<T>(
        &self,
        body: impl FnOnce(&rusqlite::Transaction) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.with_writer(body))
            .await
            .map_err(|err| StoreError::Corrupted(format!("write worker died: {err}")))?
    }
}

pub fn build_router(facade: Facade, permissive_cors: bool) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/checkpoints", get(routes::checkpoints::list))
        .route("/checkpoints/{slot}", get(routes::checkpoints::by_slot))
        .route(
            "/matches",
            get(routes::matches::list_all).delete(routes::matches::delete_all),
        )
        .route(
            "/matches/{*pattern}",
            get(routes::matches::list_by_pattern).delete(routes::matches::delete_by_pattern),
        )
        .route("/datums/{datum-hash}", get(routes::datums::by_hash))
        .route("/scripts/{script-hash}", get(routes::scripts::by_hash))
        .route("/metadata/{slot-no}", get(routes::metadata::by_slot))
        .route(
            "/patterns",
            get(routes::patterns::list_all).put(routes::patterns::put_many),
        )
        .route(
            "/patterns/{*pattern}",
            get(routes::patterns::list_by_pattern)
                .put(routes::patterns::put_one)
                .delete(routes::patterns::delete_one),
        );

    // the whole surface is also reachable under a version prefix
    let app = Router::new()
        .merge(api.clone())
        .nest("/v1", api)
        .fallback(not_found)
        .with_state(facade.clone())
        .layer(middleware::from_fn_with_state(facade, checkpoint_header))
        .layer(
            trace::TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(if permissive_cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        });

    app
}

/// Every non-error response reports the most recent checkpoint, `0` when
/// the index is empty.
async fn checkpoint_header(State(facade): State<Facade>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    if !response.status().is_client_error() && !response.status().is_server_error() {
        let slot = facade
            .health
            .most_recent_checkpoint()
            .map(|point| point.slot())
            .unwrap_or(0);

        if let Ok(value) = HeaderValue::from_str(&slot.to_string()) {
            response
                .headers_mut()
                .insert("x-most-recent-checkpoint", value);
        }
    }

    response
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(BadRequest {
            hint: Some("not_found".to_string()),
        }),
    )
        .into_response()
}

pub async fn run(
    config: ServeConfig,
    facade: Facade,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let app = build_router(facade, config.permissive_cors);
    let app = NormalizePathLayer::trim_trailing_slash().layer(app);

    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .map_err(Error::server)?;

    tracing::info!(address = %config.listen_address, "http server listening");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(Error::server)?;

    Ok(())
}

pub(crate) fn bad_request(hint: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(BadRequest {
            hint: Some(hint.into()),
        }),
    )
        .into_response()
}

pub(crate) fn service_unavailable(hint: impl Into<String>) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(BadRequest {
            hint: Some(hint.into()),
        }),
    )
        .into_response()
}

pub(crate) fn server_error(err: impl std::fmt::Display) -> Response {
    error!(hint = %err, "unexpected error serving request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(BadRequest {
            hint: Some("server_error".to_string()),
        }),
    )
        .into_response()
}

/// Streams a JSON array built from rows produced on the blocking pool.
/// The producing side holds a read connection open for as long as the
/// client keeps reading; if the client goes away, the bounded channel
/// closes and the scan stops at the next row.
pub(crate) fn stream_json_array<T, F>(store: Store, fold: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&rusqlite::Connection, &mut dyn FnMut(T) -> bool) -> Result<(), StoreError>
        + Send
        + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel::<T>(16);

    tokio::task::spawn_blocking(move || {
        let outcome = store.with_reader(|db| fold(db, &mut |item| tx.blocking_send(item).is_ok()));

        if let Err(err) = outcome {
            tracing::warn!(%err, "streaming query aborted");
        }
    });

    enum StreamState<T> {
        Start(tokio::sync::mpsc::Receiver<T>),
        Running(tokio::sync::mpsc::Receiver<T>),
        Done,
    }

    let chunks = futures_util::stream::unfold(StreamState::Start(rx), |state| async move {
        match state {
            StreamState::Start(mut rx) => match rx.recv().await {
                Some(item) => {
                    let mut buf = b"[".to_vec();
                    buf.extend(serde_json::to_vec(&item).unwrap_or_else(|_| b"null".to_vec()));
                    Some((
                        Ok::<_, std::convert::Infallible>(Bytes::from(buf)),
                        StreamState::Running(rx),
                    ))
                }
                None => Some((Ok(Bytes::from_static(b"[]")), StreamState::Done)),
            },
            StreamState::Running(mut rx) => match rx.recv().await {
                Some(item) => {
                    let mut buf = b",".to_vec();
                    buf.extend(serde_json::to_vec(&item).unwrap_or_else(|_| b"null".to_vec()));
                    Some((Ok(Bytes::from(buf)), StreamState::Running(rx)))
                }
                None => Some((Ok(Bytes::from_static(b"]")), StreamState::Done)),
            },
            StreamState::Done => None,
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from_stream(chunks))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
