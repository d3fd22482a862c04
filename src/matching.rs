use std::collections::BTreeSet;

use pallas::codec::minicbor;
use pallas::ledger::primitives::conway::{MintedDatumOption as DatumOption, MintedScriptRef as ScriptRef};
use pallas::ledger::traverse::{
    ComputeHash, MultiEraBlock, MultiEraOutput, MultiEraValue, OriginalHash,
};

use crate::patterns::Pattern;
use crate::prelude::*;

/// Everything a block contributes to the index: new entries captured by
/// the active patterns, the references it consumes, and the inline data
/// observed along the way.
#[derive(Debug, Default)]
pub struct BlockMatch {
    pub produced: Vec<MatchedInput>,
    pub spent: Vec<OutputReference>,
    pub datums: Vec<(DatumHash, Vec<u8>)>,
    pub scripts: Vec<(ScriptHash, ScriptData)>,
}

/// Runs every transaction of `block` through the pattern set. Spends are
/// collected unconditionally; whether a consumed reference was ever
/// indexed is the store's business, not ours.
pub fn match_block(
    patterns: &BTreeSet<Pattern>,
    block: &MultiEraBlock,
    point: &ChainPoint,
) -> Result<BlockMatch, Error> {
    let mut out = BlockMatch::default();

    for (tx_index, tx) in block.txs().iter().enumerate() {
        for consumed in tx.consumes() {
            out.spent.push(OutputReference {
                tx_id: *consumed.hash(),
                output_index: consumed.index() as u32,
            });
        }

        for (output_index, output) in tx.produces() {
            let address = output.address().map_err(Error::parse)?;
            let value = map_value(&output.value());

            let reference = OutputReference {
                tx_id: tx.hash(),
                output_index: output_index as u32,
            };

            let captured = patterns
                .iter()
                .any(|pattern| pattern.matches(&address, &value, &reference));

            if !captured {
                continue;
            }

            let (datum_hash, inline_datum) = output_datum(&output)?;
            let script = output_script(&output)?;

            if let Some(entry) = inline_datum {
                out.datums.push(entry);
            }

            let script_hash = script.as_ref().map(|(hash, _)| *hash);
            if let Some(entry) = script {
                out.scripts.push(entry);
            }

            out.produced.push(MatchedInput {
                output_reference: reference,
                address: address.to_vec(),
                value,
                datum_hash,
                script_hash,
                created_at: *point,
                created_at_tx_index: tx_index as u32,
                spent_at: None,
            });
        }
    }

    Ok(out)
}

/// Flattens a multi-asset value into `policy[.name]` hex units. An asset
/// with an empty name is keyed by its policy alone.
pub fn map_value(value: &MultiEraValue) -> Value {
    let assets = value
        .assets()
        .iter()
        .flat_map(|bundle| {
            let policy_hex = hex::encode(bundle.policy().as_slice());
            bundle.assets().into_iter().map(move |asset| {
                let unit = match hex::encode(asset.name()) {
                    name if name.is_empty() => policy_hex.clone(),
                    name => format!("{policy_hex}.{name}"),
                };
                (unit, asset.output_coin().unwrap_or_default())
            })
        })
        .collect();

    Value {
        coins: value.coin(),
        assets,
    }
}

type InlineDatum = (DatumHash, Vec<u8>);

fn output_datum(output: &MultiEraOutput) -> Result<(Option<DatumHash>, Option<InlineDatum>), Error> {
    match output.datum() {
        None => Ok((None, None)),
        Some(DatumOption::Hash(hash)) => Ok((Some(hash), None)),
        Some(DatumOption::Data(data)) => {
            let hash = data.original_hash();
            let bytes = minicbor::to_vec(&data.0).map_err(Error::parse)?;
            Ok((Some(hash), Some((hash, bytes))))
        }
    }
}

fn output_script(output: &MultiEraOutput) -> Result<Option<(ScriptHash, ScriptData)>, Error> {
    let Some(script) = output.script_ref() else {
        return Ok(None);
    };

    let entry = match script {
        ScriptRef::NativeScript(x) => (
            x.original_hash(),
            ScriptData {
                language: ScriptLanguage::Native,
                bytes: x.raw_cbor().to_vec(),
            },
        ),
        ScriptRef::PlutusV1Script(x) => (
            x.compute_hash(),
            ScriptData {
                language: ScriptLanguage::PlutusV1,
                bytes: x.0.to_vec(),
            },
        ),
        ScriptRef::PlutusV2Script(x) => (
            x.compute_hash(),
            ScriptData {
                language: ScriptLanguage::PlutusV2,
                bytes: x.0.to_vec(),
            },
        ),
        ScriptRef::PlutusV3Script(x) => (
            x.compute_hash(),
            ScriptData {
                language: ScriptLanguage::PlutusV3,
                bytes: x.0.to_vec(),
            },
        ),
    };

    Ok(Some(entry))
}
