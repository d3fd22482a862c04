use pallas::crypto::hash::Hash;
use pallas::ledger::addresses::Address;
use proptest::prelude::*;

use super::*;
use crate::model::{MatchedInput, OutputReference, Value};

fn hash32(byte: u8) -> Hash<32> {
    Hash::new([byte; 32])
}

fn point(slot: u64) -> ChainPoint {
    ChainPoint::Specific(slot, hash32(slot as u8))
}

fn reference(tx: u8, index: u32) -> OutputReference {
    OutputReference {
        tx_id: hash32(tx),
        output_index: index,
    }
}

/// Mainnet base address (key payment + key delegation) built from a seed.
fn shelley_address(seed: u8) -> Vec<u8> {
    let mut raw = vec![0x01];
    raw.extend([seed; 28]);
    raw.extend([seed.wrapping_add(0x10); 28]);
    raw
}

fn address_text(seed: u8) -> String {
    Address::from_bytes(&shelley_address(seed))
        .unwrap()
        .to_string()
}

fn input_at(slot: u64, tx: u8, index: u32) -> MatchedInput {
    MatchedInput {
        output_reference: reference(tx, index),
        address: shelley_address(0xa0),
        value: Value::lovelace(1_000_000),
        datum_hash: None,
        script_hash: None,
        created_at: point(slot),
        created_at_tx_index: 0,
        spent_at: None,
    }
}

fn all_inputs(store: &Store) -> Vec<MatchedInput> {
    let mut out = Vec::new();
    store
        .with_reader(|db| {
            fold_inputs(
                db,
                &Pattern::Any,
                StatusFlag::All,
                None,
                SortDirection::OldestFirst,
                |input| {
                    out.push(input);
                    true
                },
            )
        })
        .unwrap();
    out
}

fn all_checkpoints(store: &Store) -> Vec<ChainPoint> {
    let mut out = Vec::new();
    store
        .with_reader(|db| {
            fold_checkpoints_desc(db, |p| {
                out.push(p);
                true
            })
        })
        .unwrap();
    out
}

#[test]
fn checkpoints_track_applied_blocks() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| insert_checkpoints(db, [point(5), point(9)]))
        .unwrap();
    store
        .with_writer(|db| insert_checkpoints(db, [point(12)]))
        .unwrap();

    let slots: Vec<_> = all_checkpoints(&store).iter().map(|p| p.slot()).collect();
    assert_eq!(slots, vec![12, 9, 5]);

    let latest = store.with_reader(most_recent_checkpoint).unwrap();
    assert_eq!(latest, Some(point(12)));
}

#[test]
fn single_block_scenario() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(5)])?;
            insert_inputs(db, [input_at(5, 0xaa, 0)])
        })
        .unwrap();

    let results = all_inputs(&store);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].created_at.slot(), 5);
    assert_eq!(results[0].spent_at, None);
    assert_eq!(results[0].value.coins, 1_000_000);
}

#[test]
fn rollback_drops_future_state() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(5)])?;
            insert_inputs(db, [input_at(5, 0xaa, 0)])
        })
        .unwrap();

    let last = store.with_writer(|db| rollback_to(db, 0)).unwrap();
    assert_eq!(last, None);
    assert!(all_inputs(&store).is_empty());
    assert!(all_checkpoints(&store).is_empty());
}

#[test]
fn rollback_clears_later_spent_marks() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(5), point(8)])?;
            insert_inputs(db, [input_at(5, 0xaa, 0)])?;
            mark_inputs_spent(db, &point(8), &[reference(0xaa, 0)])?;
            Ok(())
        })
        .unwrap();

    let last = store.with_writer(|db| rollback_to(db, 5)).unwrap();
    assert_eq!(last, Some(5));

    let results = all_inputs(&store);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].spent_at, None);
}

#[test]
fn mark_then_prune_equals_remove() {
    // mark mode + gardener prune
    let marked = Store::in_memory().unwrap();
    marked
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(3), point(20)])?;
            insert_inputs(db, [input_at(1, 0xaa, 0)])?;
            mark_inputs_spent(db, &point(3), &[reference(0xaa, 0)])?;
            Ok(())
        })
        .unwrap();
    let pruned = marked.with_writer(|db| prune_inputs(db, 10)).unwrap();
    assert_eq!(pruned, 1);

    // remove mode deletes inside the spending transaction
    let removed = Store::in_memory().unwrap();
    removed
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(3), point(20)])?;
            insert_inputs(db, [input_at(1, 0xaa, 0)])?;
            delete_inputs_by_reference(db, &[reference(0xaa, 0)])?;
            Ok(())
        })
        .unwrap();

    assert_eq!(all_inputs(&marked), all_inputs(&removed));
    assert!(all_inputs(&marked).is_empty());
}

#[test]
fn prune_respects_stability_window() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(3), point(10)])?;
            insert_inputs(db, [input_at(1, 0xaa, 0)])?;
            mark_inputs_spent(db, &point(3), &[reference(0xaa, 0)])?;
            Ok(())
        })
        .unwrap();

    // 3 + 10 >= 10: still within the window, nothing to prune
    let pruned = store.with_writer(|db| prune_inputs(db, 10)).unwrap();
    assert_eq!(pruned, 0);
    assert_eq!(all_inputs(&store).len(), 1);
}

#[test]
fn status_flag_filters_spent() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(2), point(3)])?;
            insert_inputs(db, [input_at(1, 0xaa, 0), input_at(2, 0xbb, 0)])?;
            mark_inputs_spent(db, &point(3), &[reference(0xaa, 0)])?;
            Ok(())
        })
        .unwrap();

    let count = |status: StatusFlag| {
        let mut n = 0;
        store
            .with_reader(|db| {
                fold_inputs(
                    db,
                    &Pattern::Any,
                    status,
                    None,
                    SortDirection::OldestFirst,
                    |_| {
                        n += 1;
                        true
                    },
                )
            })
            .unwrap();
        n
    };

    assert_eq!(count(StatusFlag::All), 2);
    assert_eq!(count(StatusFlag::Unspent), 1);
    assert_eq!(count(StatusFlag::Spent), 1);
}

#[test]
fn fold_inputs_sorts_by_slot_then_position() {
    let store = Store::in_memory().unwrap();

    let mut early = input_at(5, 0xaa, 1);
    early.created_at_tx_index = 0;
    let mut later_tx = input_at(5, 0xbb, 0);
    later_tx.created_at_tx_index = 1;
    let newer = input_at(9, 0xcc, 0);

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(5), point(9)])?;
            insert_inputs(db, [newer.clone(), later_tx.clone(), early.clone()])
        })
        .unwrap();

    let oldest_first: Vec<_> = all_inputs(&store)
        .iter()
        .map(|i| i.output_reference)
        .collect();
    assert_eq!(
        oldest_first,
        vec![
            early.output_reference,
            later_tx.output_reference,
            newer.output_reference
        ]
    );

    let mut recent_first = Vec::new();
    store
        .with_reader(|db| {
            fold_inputs(
                db,
                &Pattern::Any,
                StatusFlag::All,
                None,
                SortDirection::MostRecentFirst,
                |input| {
                    recent_first.push(input.output_reference);
                    true
                },
            )
        })
        .unwrap();
    assert_eq!(
        recent_first,
        vec![
            newer.output_reference,
            later_tx.output_reference,
            early.output_reference
        ]
    );
}

#[test]
fn fold_inputs_applies_pattern_and_filter() {
    let store = Store::in_memory().unwrap();

    let policy = [0xc4u8; 28];
    let policy_hex = hex::encode(policy);
    let mut with_asset = input_at(1, 0xaa, 0);
    with_asset
        .value
        .assets
        .insert(format!("{policy_hex}.{}", hex::encode(b"tokens")), 7);

    let mut other_address = input_at(2, 0xbb, 0);
    other_address.address = shelley_address(0xb0);

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(2)])?;
            insert_inputs(db, [with_asset.clone(), other_address.clone()])
        })
        .unwrap();

    // by address pattern
    let pattern = Pattern::parse(&address_text(0xb0)).unwrap();
    let mut found = Vec::new();
    store
        .with_reader(|db| {
            fold_inputs(
                db,
                &pattern,
                StatusFlag::All,
                None,
                SortDirection::OldestFirst,
                |input| {
                    found.push(input.output_reference);
                    true
                },
            )
        })
        .unwrap();
    assert_eq!(found, vec![other_address.output_reference]);

    // by policy filter, via the policies join
    let filter = MatchFilter::PolicyId(policy.to_vec());
    let mut found = Vec::new();
    store
        .with_reader(|db| {
            fold_inputs(
                db,
                &Pattern::Any,
                StatusFlag::All,
                Some(&filter),
                SortDirection::OldestFirst,
                |input| {
                    found.push(input.output_reference);
                    true
                },
            )
        })
        .unwrap();
    assert_eq!(found, vec![with_asset.output_reference]);

    // asset id narrows on the name
    let filter = MatchFilter::AssetId {
        policy: policy.to_vec(),
        name: b"others".to_vec(),
    };
    let mut found = Vec::new();
    store
        .with_reader(|db| {
            fold_inputs(
                db,
                &Pattern::Any,
                StatusFlag::All,
                Some(&filter),
                SortDirection::OldestFirst,
                |input| {
                    found.push(input.output_reference);
                    true
                },
            )
        })
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn delete_inputs_matching_pattern() {
    let store = Store::in_memory().unwrap();

    let mut target = input_at(1, 0xaa, 0);
    target.address = shelley_address(0xb0);
    let keep = input_at(2, 0xbb, 0);

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(1), point(2)])?;
            insert_inputs(db, [target, keep.clone()])
        })
        .unwrap();

    let pattern = Pattern::parse(&address_text(0xb0)).unwrap();
    let deleted = store
        .with_writer(|db| delete_inputs_matching(db, &pattern))
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = all_inputs(&store);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].output_reference, keep.output_reference);
}

#[test]
fn binary_data_pruning_keeps_referenced_datums() {
    let store = Store::in_memory().unwrap();

    let referenced = hash32(0xd1);
    let orphan = hash32(0xd2);

    let mut input = input_at(1, 0xaa, 0);
    input.datum_hash = Some(referenced);

    store
        .with_writer(|db| {
            insert_checkpoints(db, [point(1)])?;
            insert_inputs(db, [input])?;
            insert_binary_data(db, [(&referenced, b"\x01".as_slice()), (&orphan, b"\x02".as_slice())])
        })
        .unwrap();

    let pruned = store.with_writer(|db| prune_binary_data(db)).unwrap();
    assert_eq!(pruned, 1);

    store
        .with_reader(|db| {
            assert!(get_binary_data(db, &referenced)?.is_some());
            assert!(get_binary_data(db, &orphan)?.is_none());
            Ok(())
        })
        .unwrap();

    // once the input is rolled back, its datum becomes prunable
    store.with_writer(|db| rollback_to(db, 0)).unwrap();
    let pruned = store.with_writer(|db| prune_binary_data(db)).unwrap();
    assert_eq!(pruned, 1);
}

#[test]
fn scripts_roundtrip() {
    let store = Store::in_memory().unwrap();

    let hash: Hash<28> = Hash::new([0x5c; 28]);
    let script = ScriptData {
        language: ScriptLanguage::PlutusV2,
        bytes: vec![0x82, 0x01],
    };

    store
        .with_writer(|db| insert_scripts(db, [(&hash, &script)]))
        .unwrap();

    let loaded = store.with_reader(|db| get_script(db, &hash)).unwrap();
    assert_eq!(loaded, Some(script));
}

#[test]
fn patterns_roundtrip_through_store() {
    let store = Store::in_memory().unwrap();

    let patterns = vec![Pattern::Any, Pattern::parse(&address_text(0xa0)).unwrap()];

    store
        .with_writer(|db| insert_patterns(db, &patterns))
        .unwrap();

    let mut loaded = store.with_reader(list_patterns).unwrap();
    loaded.sort();
    let mut expected = patterns.clone();
    expected.sort();
    assert_eq!(loaded, expected);

    let deleted = store
        .with_writer(|db| delete_pattern(db, &Pattern::Any))
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.with_reader(list_patterns).unwrap().len(), 1);
}

#[test]
fn ancestors_and_resolution_helpers() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| insert_checkpoints(db, [point(5), point(9), point(12)]))
        .unwrap();

    store
        .with_reader(|db| {
            let ancestors = list_ancestors_desc(db, 12, 2)?;
            let slots: Vec<_> = ancestors.iter().map(|p| p.slot()).collect();
            assert_eq!(slots, vec![9, 5]);

            assert_eq!(nearest_ancestor(db, 10)?, Some(point(9)));
            assert_eq!(nearest_ancestor(db, 9)?, Some(point(9)));
            assert_eq!(nearest_ancestor(db, 4)?, None);

            assert_eq!(checkpoint_at(db, 9)?, Some(point(9)));
            assert_eq!(checkpoint_at(db, 10)?, None);
            Ok(())
        })
        .unwrap();
}

#[test]
fn intersection_candidates_thin_out_with_distance() {
    let store = Store::in_memory().unwrap();

    store
        .with_writer(|db| insert_checkpoints(db, (1..=200).map(point)))
        .unwrap();

    let candidates = store.with_reader(intersection_candidates).unwrap();

    let slots: Vec<_> = candidates.iter().map(|p| p.slot()).collect();
    assert_eq!(&slots[0..10], &[200, 199, 198, 197, 196, 195, 194, 193, 192, 191]);
    assert!(slots.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(*slots.last().unwrap(), 1);
    assert!(slots.len() <= 30);
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farol.sqlite3");

    {
        let store = Store::open(&path).unwrap();
        store
            .with_writer(|db| {
                insert_checkpoints(db, [point(5)])?;
                set_network_magic(db, 2)
            })
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(
        store.with_reader(most_recent_checkpoint).unwrap(),
        Some(point(5))
    );
    assert_eq!(store.with_reader(network_magic).unwrap(), Some(2));
}

#[test]
fn network_magic_pinning() {
    let store = Store::in_memory().unwrap();

    assert_eq!(store.with_reader(network_magic).unwrap(), None);

    store.with_writer(|db| set_network_magic(db, 764824073)).unwrap();
    assert_eq!(store.with_reader(network_magic).unwrap(), Some(764824073));
}

#[test]
fn failed_transaction_leaves_no_trace() {
    let store = Store::in_memory().unwrap();

    let result: Result<(), StoreError> = store.with_writer(|db| {
        insert_checkpoints(db, [point(5)])?;
        insert_inputs(db, [input_at(5, 0xaa, 0)])?;
        Err(StoreError::Corrupted("boom".to_string()))
    });
    assert!(result.is_err());

    assert!(all_checkpoints(&store).is_empty());
    assert!(all_inputs(&store).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rolling back twice is the same as rolling back once, and nothing
    /// created or spent after the target survives.
    #[test]
    fn rollback_is_idempotent_and_erases_the_future(
        slots in proptest::collection::btree_set(1u64..50, 1..12),
        target in 0u64..50,
    ) {
        let store = Store::in_memory().unwrap();

        let slots: Vec<u64> = slots.into_iter().collect();
        store
            .with_writer(|db| {
                insert_checkpoints(db, slots.iter().map(|s| point(*s)))?;
                insert_inputs(db, slots.iter().map(|s| input_at(*s, *s as u8, 0)))?;

                // every other block spends the previous block's output
                for pair in slots.windows(2) {
                    mark_inputs_spent(db, &point(pair[1]), &[reference(pair[0] as u8, 0)])?;
                }
                Ok(())
            })
            .unwrap();

        store.with_writer(|db| rollback_to(db, target)).unwrap();
        let once_inputs = all_inputs(&store);
        let once_checkpoints = all_checkpoints(&store);

        store.with_writer(|db| rollback_to(db, target)).unwrap();
        prop_assert_eq!(&all_inputs(&store), &once_inputs);
        prop_assert_eq!(&all_checkpoints(&store), &once_checkpoints);

        for input in &once_inputs {
            prop_assert!(input.created_at.slot() <= target);
            if let Some(spent_at) = &input.spent_at {
                prop_assert!(spent_at.slot() <= target);
            }
        }
        for checkpoint in &once_checkpoints {
            prop_assert!(checkpoint.slot() <= target);
        }
    }

    /// Applying a batch strictly after `p` and rolling back to `p` is a
    /// no-op over the whole store.
    #[test]
    fn forward_then_rollback_cancels(
        base in 1u64..20,
        extra in proptest::collection::btree_set(21u64..60, 1..8),
    ) {
        let store = Store::in_memory().unwrap();

        store
            .with_writer(|db| {
                insert_checkpoints(db, [point(base)])?;
                insert_inputs(db, [input_at(base, base as u8, 0)])
            })
            .unwrap();

        let before_inputs = all_inputs(&store);
        let before_checkpoints = all_checkpoints(&store);

        store
            .with_writer(|db| {
                insert_checkpoints(db, extra.iter().map(|s| point(*s)))?;
                insert_inputs(db, extra.iter().map(|s| input_at(*s, *s as u8, 0)))?;
                let first = *extra.iter().next().unwrap();
                mark_inputs_spent(db, &point(first), &[reference(base as u8, 0)])?;
                Ok(())
            })
            .unwrap();

        store.with_writer(|db| rollback_to(db, base)).unwrap();

        prop_assert_eq!(all_inputs(&store), before_inputs);
        prop_assert_eq!(all_checkpoints(&store), before_checkpoints);
    }
}
