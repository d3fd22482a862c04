use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::serve::{bad_request, server_error, stream_json_array, types::PointBody, Facade};
use crate::store;

pub async fn list(State(facade): State<Facade>) -> Response {
    stream_json_array(facade.store.clone(), |db, yield_row| {
        store::fold_checkpoints_desc(db, |point| yield_row(PointBody::from(&point)))
    })
}

#[derive(Debug, Deserialize)]
pub struct BySlotQuery {
    strict: Option<String>,
}

pub async fn by_slot(
    State(facade): State<Facade>,
    Path(slot): Path<String>,
    Query(query): Query<BySlotQuery>,
) -> Response {
    let Ok(slot) = slot.parse::<u64>() else {
        return bad_request("invalid_slot_no");
    };

    let strict = match query.strict.as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(_) => return bad_request("invalid_strict_mode"),
    };

    let found = facade
        .query(move |db| {
            if strict {
                store::checkpoint_at(db, slot)
            } else {
                store::nearest_ancestor(db, slot)
            }
        })
        .await;

    match found {
        Ok(point) => Json(point.as_ref().map(PointBody::from)).into_response(),
        Err(err) => server_error(err),
    }
}
