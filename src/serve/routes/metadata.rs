use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pallas::codec::minicbor;
use pallas::crypto::hash::Hasher;
use pallas::ledger::{primitives::alonzo, traverse::MultiEraBlock};
use serde::Deserialize;
use std::collections::HashMap;

use crate::serve::{
    bad_request, server_error, service_unavailable,
    types::{
        BadRequest, Metadata, Metadatum, MetadatumBytes, MetadatumInt, MetadatumList, MetadatumMap,
        MetadatumMapEntry, MetadatumString,
    },
    Facade,
};
use crate::store;

#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    transaction_id: Option<String>,
}

pub async fn by_slot(
    State(facade): State<Facade>,
    Path(slot): Path<String>,
    Query(query): Query<MetadataQuery>,
) -> Response {
    let Ok(slot) = slot.parse::<u64>() else {
        return bad_request("invalid_slot_no");
    };

    let transaction_id = match query.transaction_id.as_deref() {
        None => None,
        Some(value) if value.len() == 64 => match hex::decode(value) {
            Ok(bytes) => Some(bytes),
            Err(_) => return bad_request("invalid_metadata_filter"),
        },
        Some(_) => return bad_request("invalid_metadata_filter"),
    };

    // the block we report on is the nearest indexed ancestor of the slot
    let resolved = facade
        .query(move |db| {
            let Some(point) = store::nearest_ancestor(db, slot)? else {
                return Ok(None);
            };
            let previous = store::list_ancestors_desc(db, point.slot(), 1)?
                .into_iter()
                .next();
            Ok(Some((point, previous)))
        })
        .await;

    let (point, previous) = match resolved {
        Ok(Some(found)) => found,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(BadRequest {
                    hint: Some("no_ancestor".to_string()),
                }),
            )
                .into_response()
        }
        Err(err) => return server_error(err),
    };

    let raw = match facade.fetcher.fetch_block(&point, previous).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(%err, "block fetch failed");
            return service_unavailable("service_unavailable");
        }
    };

    let block = match MultiEraBlock::decode(&raw.body) {
        Ok(block) => block,
        Err(err) => return server_error(err),
    };

    let header_hash = block.hash().to_string();

    let mut out = Vec::new();
    for tx in block.txs() {
        if let Some(filter) = transaction_id.as_ref() {
            if tx.hash().as_ref() != filter.as_slice() {
                continue;
            }
        }

        let meta = tx.metadata();
        let Some(meta_map) = meta.as_alonzo() else {
            continue;
        };

        if meta_map.is_empty() {
            continue;
        }

        let schema = match build_schema(meta_map) {
            Ok(schema) => schema,
            Err(err) => return server_error(err),
        };

        let raw = match metadata_to_cbor(meta_map) {
            Ok(raw) => raw,
            Err(err) => return server_error(err),
        };

        let hash = Hasher::<256>::hash(raw.as_slice()).to_string();
        let raw = hex::encode(raw);

        out.push(Metadata { hash, raw, schema });
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&header_hash) {
        headers.insert("x-block-header-hash", value);
    }

    (StatusCode::OK, headers, Json(out)).into_response()
}

fn build_schema(metadata: &alonzo::Metadata) -> Result<HashMap<String, Metadatum>, String> {
    let mut schema = HashMap::new();
    for (label, datum) in metadata.iter() {
        let value = metadatum_to_model(datum)?;
        schema.insert(label.to_string(), value);
    }
    Ok(schema)
}

fn metadata_to_cbor(metadata: &alonzo::Metadata) -> Result<Vec<u8>, String> {
    let wrapped: alonzo::AuxiliaryData =
        alonzo::AuxiliaryData::ShelleyMa(alonzo::ShelleyMaAuxiliaryData {
            transaction_metadata: metadata.clone(),
            auxiliary_scripts: None,
        });

    minicbor::to_vec(wrapped).map_err(|err| err.to_string())
}

fn metadatum_to_model(datum: &alonzo::Metadatum) -> Result<Metadatum, String> {
    match datum {
        alonzo::Metadatum::Int(value) => {
            let value: i128 = (*value).into();
            let value = i64::try_from(value).map_err(|err| err.to_string())?;
            Ok(Metadatum::Int(MetadatumInt { int: value }))
        }
        alonzo::Metadatum::Bytes(bytes) => Ok(Metadatum::Bytes(MetadatumBytes {
            bytes: hex::encode(bytes.as_slice()),
        })),
        alonzo::Metadatum::Text(value) => Ok(Metadatum::String(MetadatumString {
            string: value.clone(),
        })),
        alonzo::Metadatum::Array(items) => {
            let list = items
                .iter()
                .map(metadatum_to_model)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Metadatum::List(MetadatumList { list }))
        }
        alonzo::Metadatum::Map(entries) => {
            let mut map = Vec::new();
            for (key, value) in entries.iter() {
                let key = metadatum_to_model(key)?;
                let value = metadatum_to_model(value)?;
                map.push(MetadatumMapEntry { k: key, v: value });
            }
            Ok(Metadatum::Map(MetadatumMap { map }))
        }
    }
}
