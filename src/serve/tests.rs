use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use pallas::crypto::hash::Hash;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use super::*;
use crate::health::HealthTracker;
use crate::model::{ChainPoint, InputManagement, MatchedInput, OutputReference, Value};
use crate::patterns::Pattern;
use crate::registry::PatternRegistry;
use crate::store::{self, Store};
use crate::sync::pull::{rollback_channel, CommandChannel};
use crate::sync::{fetch::BlockFetcher, UpstreamConfig};

/// Bech32 text of a mainnet base address built from a seed byte.
fn address_text(seed: u8) -> String {
    let mut raw = vec![0x01];
    raw.extend([seed; 28]);
    raw.extend([seed.wrapping_add(0x10); 28]);
    pallas::ledger::addresses::Address::from_bytes(&raw)
        .unwrap()
        .to_string()
}

fn addr_a() -> String {
    address_text(0xa1)
}

fn addr_b() -> String {
    address_text(0xb2)
}

fn point(slot: u64) -> ChainPoint {
    ChainPoint::Specific(slot, Hash::new([slot as u8; 32]))
}

fn test_facade() -> (Facade, CommandChannel) {
    let store = Store::in_memory().unwrap();
    let (rollback, commands) = rollback_channel();

    let facade = Facade {
        store,
        registry: PatternRegistry::new([Pattern::Any]),
        health: HealthTracker::new(InputManagement::MarkSpentInputs),
        rollback,
        fetcher: BlockFetcher::new(&UpstreamConfig {
            socket_path: "/nonexistent/node.socket".into(),
            network_magic: 2,
        }),
        longest_rollback: 36,
    };

    (facade, commands)
}

/// Stands in for the pipeline side of the forced-rollback rendezvous:
/// applies the rollback straight to the store, replies success, waits for
/// the resume guard.
fn drive_rollbacks(store: Store, commands: CommandChannel) {
    tokio::spawn(async move {
        let mut commands = commands.lock_owned().await;
        while let Some(request) = commands.recv().await {
            let target = request.target;
            store
                .with_writer(|db| store::rollback_to(db, target.slot()))
                .unwrap();

            if request.reply.send(Ok(())).is_ok() {
                let _ = request.resume.await;
            }
        }
    });
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn sample_input(slot: u64, addr: &str) -> MatchedInput {
    MatchedInput {
        output_reference: OutputReference {
            tx_id: Hash::new([0xaa; 32]),
            output_index: 0,
        },
        address: pallas::ledger::addresses::Address::from_bech32(addr)
            .unwrap()
            .to_vec(),
        value: Value::lovelace(1_000_000),
        datum_hash: None,
        script_hash: None,
        created_at: point(slot),
        created_at_tx_index: 0,
        spent_at: None,
    }
}

#[tokio::test]
async fn health_negotiates_content_type() {
    let (facade, _commands) = test_facade();
    let router = build_router(facade, false);

    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["connection_status"], "disconnected");

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ACCEPT, "text/plain")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("farol_connection_status"));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ACCEPT, "application/xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn version_prefix_is_transparent() {
    let (facade, _commands) = test_facade();
    let router = build_router(facade, false);

    let response = get(&router, "/v1/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn checkpoints_stream_and_resolve() {
    let (facade, _commands) = test_facade();
    facade
        .store
        .with_writer(|db| store::insert_checkpoints(db, [point(5), point(9)]))
        .unwrap();
    let router = build_router(facade, false);

    let response = get(&router, "/checkpoints").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["slot_no"], 9);
    assert_eq!(body[1]["slot_no"], 5);

    let body = body_json(get(&router, "/checkpoints/7").await).await;
    assert_eq!(body["slot_no"], 5);

    let body = body_json(get(&router, "/checkpoints/7?strict=true").await).await;
    assert_eq!(body, JsonValue::Null);

    let body = body_json(get(&router, "/checkpoints/9?strict=true").await).await;
    assert_eq!(body["slot_no"], 9);

    let response = get(&router, "/checkpoints/notaslot").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&router, "/checkpoints/7?strict=maybe").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn most_recent_checkpoint_header_on_success_only() {
    let (facade, _commands) = test_facade();
    facade.health.set_checkpoint(point(42), Some(point(40)));
    let router = build_router(facade, false);

    let response = get(&router, "/checkpoints").await;
    assert_eq!(
        response.headers()["x-most-recent-checkpoint"].to_str().unwrap(),
        "40"
    );

    let response = get(&router, "/checkpoints/notaslot").await;
    assert!(response.headers().get("x-most-recent-checkpoint").is_none());
}

#[tokio::test]
async fn header_reports_zero_without_checkpoints() {
    let (facade, _commands) = test_facade();
    let router = build_router(facade, false);

    let response = get(&router, "/health").await;
    assert_eq!(
        response.headers()["x-most-recent-checkpoint"].to_str().unwrap(),
        "0"
    );
}

#[tokio::test]
async fn matches_stream_indexed_inputs() {
    let (facade, _commands) = test_facade();
    facade
        .store
        .with_writer(|db| {
            store::insert_checkpoints(db, [point(5)])?;
            store::insert_inputs(db, [sample_input(5, &addr_a())])
        })
        .unwrap();
    let router = build_router(facade, false);

    let body = body_json(get(&router, "/matches").await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["created_at"]["slot_no"], 5);
    assert_eq!(body[0]["spent_at"], JsonValue::Null);
    assert_eq!(body[0]["value"]["coins"], 1_000_000);
    assert_eq!(body[0]["address"], addr_a());

    let body = body_json(get(&router, &format!("/matches/{}", addr_a())).await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let body = body_json(get(&router, &format!("/matches/{}", addr_b())).await).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn matches_query_validation() {
    let (facade, _commands) = test_facade();
    let router = build_router(facade, false);

    let response = get(&router, "/matches?spent&unspent").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "invalid_status_flag");

    let tx = hex::encode([0x3du8; 32]);
    let policy = hex::encode([0xc4u8; 28]);

    let response = get(
        &router,
        &format!("/matches?transaction_id={tx}&policy_id={policy}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "invalid_match_filter");

    let response = get(&router, "/matches?policy_id=nothex").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&router, "/matches?order=sideways").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "invalid_sort_direction");

    let response = get(&router, &format!("/matches?output_reference={tx}%230")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_matches_refuses_active_overlap() {
    let (facade, _commands) = test_facade();
    facade
        .store
        .with_writer(|db| {
            store::insert_checkpoints(db, [point(5)])?;
            store::insert_inputs(db, [sample_input(5, &addr_a())])
        })
        .unwrap();
    let store = facade.store.clone();
    let router = build_router(facade, false);

    // the active set is {*}, which strictly includes any address pattern
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&format!("/matches/{}", addr_a()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "still_active_pattern");

    // nothing was deleted
    let mut count = 0;
    store
        .with_reader(|db| {
            store::fold_inputs(
                db,
                &Pattern::Any,
                crate::model::StatusFlag::All,
                None,
                crate::model::SortDirection::OldestFirst,
                |_| {
                    count += 1;
                    true
                },
            )
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn delete_matches_without_overlap_deletes() {
    let (facade, _commands) = test_facade();
    facade.registry.remove(&Pattern::Any);
    facade.registry.insert_many([Pattern::parse(&addr_b()).unwrap()]);
    facade
        .store
        .with_writer(|db| {
            store::insert_checkpoints(db, [point(5)])?;
            store::insert_inputs(db, [sample_input(5, &addr_a())])
        })
        .unwrap();
    let router = build_router(facade, false);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&format!("/matches/{}", addr_a()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn patterns_listing_and_deletion() {
    let (facade, _commands) = test_facade();
    facade
        .store
        .with_writer(|db| store::insert_patterns(db, &[Pattern::Any]))
        .unwrap();
    let store = facade.store.clone();
    let router = build_router(facade, false);

    let body = body_json(get(&router, "/patterns").await).await;
    assert_eq!(body, json!(["*"]));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/patterns/*")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["deleted"], 1);

    assert!(store.with_reader(store::list_patterns).unwrap().is_empty());

    let body = body_json(get(&router, "/patterns").await).await;
    assert_eq!(body, json!([]));
}

fn seed_chain(facade: &Facade) {
    facade
        .store
        .with_writer(|db| {
            store::insert_checkpoints(db, (1..=10).map(|i| point(i * 10)))?;
            store::insert_inputs(
                db,
                (1..=10).map(|i| {
                    let mut input = sample_input(i * 10, &addr_a());
                    input.output_reference.tx_id = Hash::new([i as u8; 32]);
                    input
                }),
            )?;
            store::insert_patterns(db, &[Pattern::Any])
        })
        .unwrap();

    facade.health.set_checkpoint(point(100), Some(point(100)));
}

async fn put_patterns(router: &Router, uri: &str, body: JsonValue) -> axum::response::Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn put_patterns_rolls_back_and_installs() {
    let (facade, commands) = test_facade();
    seed_chain(&facade);
    drive_rollbacks(facade.store.clone(), commands);
    let store = facade.store.clone();
    let registry = facade.registry.clone();
    let router = build_router(facade, false);

    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 70 },
            "limit": "within_safe_zone",
            "patterns": [addr_b()],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let texts = body.as_array().unwrap();
    assert!(texts.iter().any(|t| t == "*"));
    assert!(texts.iter().any(|t| t == &addr_b()));

    // the store rewound to the target before the patterns landed
    let latest = store.with_reader(store::most_recent_checkpoint).unwrap();
    assert!(latest.unwrap().slot() <= 70);

    // persisted and in-memory sets agree
    let persisted = store.with_reader(store::list_patterns).unwrap();
    let in_memory: Vec<_> = registry.snapshot().into_iter().collect();
    assert_eq!(persisted, in_memory);
    assert_eq!(persisted.len(), 2);
}

#[tokio::test]
async fn put_patterns_rejects_unsafe_rollback() {
    let (facade, _commands) = test_facade();
    seed_chain(&facade);
    let store = facade.store.clone();
    let router = build_router(facade, false);

    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 50 },
            "limit": "within_safe_zone",
            "patterns": [addr_b()],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "unsafe_rollback_beyond_safe_zone");

    // patterns unchanged, chain unchanged
    assert_eq!(store.with_reader(store::list_patterns).unwrap().len(), 1);
    let latest = store.with_reader(store::most_recent_checkpoint).unwrap();
    assert_eq!(latest.unwrap().slot(), 100);
}

#[tokio::test]
async fn put_patterns_resolution_rules() {
    let (facade, commands) = test_facade();
    seed_chain(&facade);
    drive_rollbacks(facade.store.clone(), commands);
    let router = build_router(facade, false);

    // a bare slot with no checkpoint at exactly that slot is refused
    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 75 },
            "patterns": [addr_b()],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "non_existing_point");

    // a full point at a known slot must match the stored checkpoint
    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 70, "header_hash": hex::encode([0xffu8; 32]) },
            "patterns": [addr_b()],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // a full point at an unknown slot is accepted optimistically
    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 75, "header_hash": hex::encode([0x4bu8; 32]) },
            "patterns": [addr_b()],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn put_patterns_reports_rollback_failure() {
    let (facade, commands) = test_facade();
    seed_chain(&facade);

    // pipeline side refuses the target
    tokio::spawn(async move {
        let mut commands = commands.lock_owned().await;
        while let Some(request) = commands.recv().await {
            let _ = request
                .reply
                .send(Err(crate::sync::pull::ForceRollbackError::TargetNotFound));
        }
    });

    let router = build_router(facade, false);

    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 70 },
            "patterns": [addr_b()],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "failed_to_rollback");
}

#[tokio::test]
async fn put_patterns_validates_body() {
    let (facade, _commands) = test_facade();
    seed_chain(&facade);
    let router = build_router(facade, false);

    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 70 },
            "patterns": ["definitely not a pattern"],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "invalid_patterns");

    let response = put_patterns(
        &router,
        "/patterns",
        json!({
            "rollback_to": { "slot_no": 70, "header_hash": "deadbeef" },
            "patterns": [addr_b()],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["hint"], "malformed_point");
}
