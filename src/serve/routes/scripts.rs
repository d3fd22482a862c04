use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use pallas::crypto::hash::Hash;

use crate::serve::{bad_request, server_error, types::Script, Facade};
use crate::store;

pub async fn by_hash(State(facade): State<Facade>, Path(script_hash): Path<String>) -> Response {
    let Some(hash) = parse_hash28(&script_hash) else {
        return bad_request("malformed_script_hash");
    };

    match facade.query(move |db| store::get_script(db, &hash)).await {
        Ok(script) => Json(script.as_ref().map(Script::from)).into_response(),
        Err(err) => server_error(err),
    }
}

fn parse_hash28(value: &str) -> Option<Hash<28>> {
    if value.len() != 56 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let bytes: [u8; 28] = hex::decode(value).ok()?.try_into().ok()?;
    Some(Hash::new(bytes))
}
