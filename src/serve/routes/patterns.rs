use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::model::{BlockSlot, ChainPoint};
use crate::patterns::Pattern;
use crate::serve::{
    bad_request, server_error, service_unavailable, stream_json_array, types::DeletedBody, Facade,
};
use crate::store::{self, StoreError};

use super::datums::parse_hash32;

pub async fn list_all(State(facade): State<Facade>) -> Response {
    let texts: Vec<String> = facade
        .registry
        .snapshot()
        .iter()
        .map(Pattern::to_string)
        .collect();

    stream_json_array(facade.store.clone(), move |_, yield_row| {
        for text in texts {
            if !yield_row(text) {
                break;
            }
        }
        Ok(())
    })
}

/// Active patterns that overlap the given one, in either direction.
pub async fn list_by_pattern(
    State(facade): State<Facade>,
    Path(pattern): Path<String>,
) -> Response {
    let pattern = match Pattern::parse(&pattern) {
        Ok(pattern) => pattern,
        Err(_) => return bad_request("invalid_pattern"),
    };

    let texts: Vec<String> = facade
        .registry
        .snapshot()
        .iter()
        .filter(|active| {
            *active == &pattern || pattern.includes(active) || active.includes(&pattern)
        })
        .map(Pattern::to_string)
        .collect();

    stream_json_array(facade.store.clone(), move |_, yield_row| {
        for text in texts {
            if !yield_row(text) {
                break;
            }
        }
        Ok(())
    })
}

pub async fn delete_one(State(facade): State<Facade>, Path(pattern): Path<String>) -> Response {
    let pattern = match Pattern::parse(&pattern) {
        Ok(pattern) => pattern,
        Err(_) => return bad_request("invalid_pattern"),
    };

    let to_delete = pattern.clone();
    match facade
        .mutate(move |db| store::delete_pattern(db, &to_delete))
        .await
    {
        Ok(deleted) => {
            facade.registry.remove(&pattern);
            Json(DeletedBody { deleted }).into_response()
        }
        Err(err) => server_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PutPatternsBody {
    rollback_to: RollbackTo,

    #[serde(default)]
    limit: Option<String>,

    #[serde(default)]
    patterns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RollbackTo {
    slot_no: BlockSlot,
    header_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RollbackLimit {
    WithinSafeZone,
    Unsafe,
}

/// `rollback_to` given either as a bare slot or as a full point; the two
/// resolve differently.
enum RequestedPoint {
    Slot(BlockSlot),
    Point(ChainPoint),
}

pub async fn put_many(State(facade): State<Facade>, Json(body): Json<PutPatternsBody>) -> Response {
    let Some(texts) = body.patterns.clone() else {
        return bad_request("invalid_patterns");
    };

    let mut patterns = Vec::with_capacity(texts.len());
    for text in &texts {
        match Pattern::parse(text) {
            Ok(pattern) => patterns.push(pattern),
            Err(_) => return bad_request("invalid_patterns"),
        }
    }

    if patterns.is_empty() {
        return bad_request("invalid_patterns");
    }

    apply_put(facade, patterns, body).await
}

pub async fn put_one(
    State(facade): State<Facade>,
    Path(pattern): Path<String>,
    Json(body): Json<PutPatternsBody>,
) -> Response {
    let pattern = match Pattern::parse(&pattern) {
        Ok(pattern) => pattern,
        Err(_) => return bad_request("invalid_pattern"),
    };

    apply_put(facade, vec![pattern], body).await
}

/// The pattern-mutation protocol: resolve the rollback target, check the
/// safe zone, rendezvous with the chain-sync client, and only then
/// persist and publish the new patterns.
async fn apply_put(facade: Facade, patterns: Vec<Pattern>, body: PutPatternsBody) -> Response {
    let limit = match body.limit.as_deref() {
        None | Some("within_safe_zone") => RollbackLimit::WithinSafeZone,
        Some("any") => RollbackLimit::Unsafe,
        Some(_) => return bad_request("invalid_rollback_limit"),
    };

    let requested = match body.rollback_to.header_hash.as_deref() {
        None => RequestedPoint::Slot(body.rollback_to.slot_no),
        Some(hash) => match parse_hash32(hash) {
            Some(hash) => RequestedPoint::Point(ChainPoint::Specific(body.rollback_to.slot_no, hash)),
            None => return bad_request("malformed_point"),
        },
    };

    let target = match facade.query(move |db| resolve_rollback_target(db, &requested)).await {
        Ok(Ok(target)) => target,
        Ok(Err(response)) => return response,
        Err(err) => return server_error(err),
    };

    if limit == RollbackLimit::WithinSafeZone {
        let tip_slot = facade
            .health
            .most_recent_node_tip()
            .map(|tip| tip.slot())
            .unwrap_or_default();

        if tip_slot.saturating_sub(target.slot()) > facade.longest_rollback {
            return bad_request("unsafe_rollback_beyond_safe_zone");
        }
    }

    let guard = match facade.rollback.force_rollback(target).await {
        Ok(guard) => guard,
        Err(err) => {
            info!(%err, "forced rollback failed");
            return service_unavailable("failed_to_rollback");
        }
    };

    let to_persist = patterns.clone();
    let persisted = facade
        .mutate(move |db| store::insert_patterns(db, &to_persist))
        .await;

    // the chain-sync client stays paused at the target until this guard
    // goes away, so nothing streams before the registry agrees
    let response = match persisted {
        Ok(()) => {
            facade.registry.insert_many(patterns);

            let texts: Vec<String> = facade
                .registry
                .snapshot()
                .iter()
                .map(Pattern::to_string)
                .collect();

            Json(texts).into_response()
        }
        Err(err) => {
            info!(%err, "pattern persistence failed after rollback");
            service_unavailable("service_unavailable")
        }
    };
    drop(guard);

    response
}

/// Resolution rules: a bare slot must name an exact checkpoint; a full
/// point is accepted when it matches the checkpoint at its slot, or
/// optimistically when that slot is unknown (the forced-rollback
/// machinery has the final word).
fn resolve_rollback_target(
    db: &rusqlite::Connection,
    requested: &RequestedPoint,
) -> Result<Result<ChainPoint, Response>, StoreError> {
    match requested {
        RequestedPoint::Slot(slot) => match store::checkpoint_at(db, *slot)? {
            Some(point) => Ok(Ok(point)),
            None => Ok(Err(bad_request("non_existing_point"))),
        },
        RequestedPoint::Point(point) => match store::checkpoint_at(db, point.slot())? {
            Some(known) if known == *point => Ok(Ok(*point)),
            Some(_) => Ok(Err(bad_request("non_existing_point"))),
            None => Ok(Ok(*point)),
        },
    }
}
