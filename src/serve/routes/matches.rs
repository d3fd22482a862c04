use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::model::{MatchFilter, OutputReference, SortDirection, StatusFlag};
use crate::patterns::Pattern;
use crate::serve::{
    bad_request, server_error, stream_json_array,
    types::{DeletedBody, MatchBody},
    Facade,
};
use crate::store;

#[derive(Default, Debug, Deserialize)]
pub struct MatchesQuery {
    spent: Option<String>,
    unspent: Option<String>,
    policy_id: Option<String>,
    asset_id: Option<String>,
    transaction_id: Option<String>,
    output_reference: Option<String>,
    order: Option<String>,
}

struct MatchesFilters {
    status: StatusFlag,
    filter: Option<MatchFilter>,
    sort: SortDirection,
}

impl MatchesFilters {
    fn try_from_query(query: MatchesQuery) -> Result<Self, Response> {
        let status = match (&query.spent, &query.unspent) {
            (None, None) => StatusFlag::All,
            (Some(_), None) => StatusFlag::Spent,
            (None, Some(_)) => StatusFlag::Unspent,
            (Some(_), Some(_)) => return Err(bad_request("invalid_status_flag")),
        };

        let mut filters = Vec::new();

        if let Some(value) = query.policy_id.as_deref() {
            let policy = parse_hex(value, 56).ok_or_else(|| bad_request("invalid_match_filter"))?;
            filters.push(MatchFilter::PolicyId(policy));
        }

        if let Some(value) = query.asset_id.as_deref() {
            let (policy, name) = value
                .split_once('.')
                .ok_or_else(|| bad_request("invalid_match_filter"))?;
            let policy = parse_hex(policy, 56).ok_or_else(|| bad_request("invalid_match_filter"))?;
            let name = parse_hex_any(name).ok_or_else(|| bad_request("invalid_match_filter"))?;
            filters.push(MatchFilter::AssetId { policy, name });
        }

        if let Some(value) = query.transaction_id.as_deref() {
            let tx_id = parse_hex(value, 64).ok_or_else(|| bad_request("invalid_match_filter"))?;
            let tx_id: [u8; 32] = tx_id
                .try_into()
                .map_err(|_| bad_request("invalid_match_filter"))?;
            filters.push(MatchFilter::TransactionId(tx_id.into()));
        }

        if let Some(value) = query.output_reference.as_deref() {
            let (tx_id, index) = value
                .split_once('#')
                .ok_or_else(|| bad_request("invalid_match_filter"))?;
            let tx_id = parse_hex(tx_id, 64).ok_or_else(|| bad_request("invalid_match_filter"))?;
            let tx_id: [u8; 32] = tx_id
                .try_into()
                .map_err(|_| bad_request("invalid_match_filter"))?;
            let output_index = index
                .parse::<u32>()
                .map_err(|_| bad_request("invalid_match_filter"))?;
            filters.push(MatchFilter::OutputReference(OutputReference {
                tx_id: tx_id.into(),
                output_index,
            }));
        }

        if filters.len() > 1 {
            return Err(bad_request("invalid_match_filter"));
        }

        let sort = match query.order.as_deref() {
            None | Some("most_recent_first") => SortDirection::MostRecentFirst,
            Some("oldest_first") => SortDirection::OldestFirst,
            Some(_) => return Err(bad_request("invalid_sort_direction")),
        };

        Ok(Self {
            status,
            filter: filters.pop(),
            sort,
        })
    }
}

pub async fn list_all(State(facade): State<Facade>, Query(query): Query<MatchesQuery>) -> Response {
    list(facade, Pattern::Any, query)
}

pub async fn list_by_pattern(
    State(facade): State<Facade>,
    Path(pattern): Path<String>,
    Query(query): Query<MatchesQuery>,
) -> Response {
    let pattern = match Pattern::parse(&pattern) {
        Ok(pattern) => pattern,
        Err(_) => return bad_request("invalid_pattern"),
    };

    list(facade, pattern, query)
}

fn list(facade: Facade, pattern: Pattern, query: MatchesQuery) -> Response {
    let filters = match MatchesFilters::try_from_query(query) {
        Ok(filters) => filters,
        Err(response) => return response,
    };

    stream_json_array(facade.store.clone(), move |db, yield_row| {
        store::fold_inputs(
            db,
            &pattern,
            filters.status,
            filters.filter.as_ref(),
            filters.sort,
            |input| yield_row(MatchBody::from(&input)),
        )
    })
}

pub async fn delete_all(State(facade): State<Facade>) -> Response {
    delete(facade, Pattern::Any).await
}

pub async fn delete_by_pattern(
    State(facade): State<Facade>,
    Path(pattern): Path<String>,
) -> Response {
    let pattern = match Pattern::parse(&pattern) {
        Ok(pattern) => pattern,
        Err(_) => return bad_request("invalid_pattern"),
    };

    delete(facade, pattern).await
}

/// Refuses to delete results a wider active pattern would immediately
/// re-index.
async fn delete(facade: Facade, pattern: Pattern) -> Response {
    let active = facade.registry.snapshot();
    if pattern.overlaps(&active) {
        return bad_request("still_active_pattern");
    }

    match facade
        .mutate(move |db| store::delete_inputs_matching(db, &pattern))
        .await
    {
        Ok(deleted) => Json(DeletedBody { deleted }).into_response(),
        Err(err) => server_error(err),
    }
}

fn parse_hex(value: &str, len: usize) -> Option<Vec<u8>> {
    if value.len() != len {
        return None;
    }
    hex::decode(value).ok()
}

fn parse_hex_any(value: &str) -> Option<Vec<u8>> {
    if value.is_empty() || value.len() > 64 || value.len() % 2 != 0 {
        return None;
    }
    hex::decode(value).ok()
}
