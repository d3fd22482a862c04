use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use pallas::crypto::hash::Hash;

use crate::serve::{bad_request, server_error, types::Datum, Facade};
use crate::store;

pub async fn by_hash(State(facade): State<Facade>, Path(datum_hash): Path<String>) -> Response {
    let Some(hash) = parse_hash32(&datum_hash) else {
        return bad_request("malformed_datum_hash");
    };

    match facade.query(move |db| store::get_binary_data(db, &hash)).await {
        Ok(Some(bytes)) => Json(Datum {
            datum: hex::encode(bytes),
        })
        .into_response(),
        Ok(None) => Json(None::<Datum>).into_response(),
        Err(err) => server_error(err),
    }
}

pub(crate) fn parse_hash32(value: &str) -> Option<Hash<32>> {
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let bytes: [u8; 32] = hex::decode(value).ok()?.try_into().ok()?;
    Some(Hash::new(bytes))
}
