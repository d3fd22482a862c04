use std::collections::HashMap;

use pallas::ledger::addresses::Address;
use serde::{Deserialize, Serialize};

use crate::model::{BlockSlot, ChainPoint, MatchedInput, ScriptData, ScriptLanguage, Value};

#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct BadRequest {
    /// Some hint about what went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointBody {
    pub slot_no: BlockSlot,
    pub header_hash: String,
}

impl From<&ChainPoint> for PointBody {
    fn from(point: &ChainPoint) -> Self {
        Self {
            slot_no: point.slot(),
            header_hash: point
                .hash()
                .map(|hash| hash.to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchBody {
    pub transaction_index: u32,
    pub transaction_id: String,
    pub output_index: u32,
    pub address: String,
    pub value: Value,
    pub datum_hash: Option<String>,
    pub script_hash: Option<String>,
    pub created_at: PointBody,
    pub spent_at: Option<PointBody>,
}

impl From<&MatchedInput> for MatchBody {
    fn from(input: &MatchedInput) -> Self {
        let address = match Address::from_bytes(&input.address) {
            Ok(address) => address.to_string(),
            Err(_) => hex::encode(&input.address),
        };

        Self {
            transaction_index: input.created_at_tx_index,
            transaction_id: input.output_reference.tx_id.to_string(),
            output_index: input.output_reference.output_index,
            address,
            value: input.value.clone(),
            datum_hash: input.datum_hash.map(|hash| hash.to_string()),
            script_hash: input.script_hash.map(|hash| hash.to_string()),
            created_at: PointBody::from(&input.created_at),
            spent_at: input.spent_at.as_ref().map(PointBody::from),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub datum: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub language: ScriptLanguage,
    pub script: String,
}

impl From<&ScriptData> for Script {
    fn from(data: &ScriptData) -> Self {
        Self {
            language: data.language,
            script: hex::encode(&data.bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeletedBody {
    pub deleted: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub hash: String,
    pub raw: String,
    pub schema: HashMap<String, Metadatum>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metadatum {
    Int(MetadatumInt),
    String(MetadatumString),
    Bytes(MetadatumBytes),
    List(MetadatumList),
    Map(MetadatumMap),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumInt {
    pub int: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumString {
    pub string: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumBytes {
    pub bytes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumList {
    pub list: Vec<Metadatum>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumMap {
    pub map: Vec<MetadatumMapEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadatumMapEntry {
    pub k: Metadatum,
    pub v: Metadatum,
}
