use std::collections::BTreeMap;
use std::fmt::Display;

use pallas::crypto::hash::Hash;
use serde::{Deserialize, Serialize};

pub type BlockSlot = u64;
pub type BlockHash = Hash<32>;
pub type TxHash = Hash<32>;
pub type BlockBody = Vec<u8>;
pub type DatumHash = Hash<32>;
pub type ScriptHash = Hash<28>;

/// A block pulled from the producer, still in wire form. Decoding is
/// deferred to the consumer so the mailbox stays cheap to fill.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub slot: BlockSlot,
    pub hash: BlockHash,
    pub body: BlockBody,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ChainPoint {
    Origin,
    Specific(BlockSlot, BlockHash),
}

impl ChainPoint {
    pub fn slot(&self) -> BlockSlot {
        match self {
            Self::Origin => 0,
            Self::Specific(slot, _) => *slot,
        }
    }

    pub fn hash(&self) -> Option<BlockHash> {
        match self {
            Self::Specific(_, hash) => Some(*hash),
            Self::Origin => None,
        }
    }
}

impl Display for ChainPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Origin => write!(f, "origin"),
            Self::Specific(slot, hash) => write!(f, "{slot}.{hash}"),
        }
    }
}

impl Ord for ChainPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let by_slot = self.slot().cmp(&other.slot());
        by_slot.then_with(|| self.hash().cmp(&other.hash()))
    }
}

impl PartialOrd for ChainPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<pallas::network::miniprotocols::Point> for ChainPoint {
    fn from(value: pallas::network::miniprotocols::Point) -> Self {
        match value {
            pallas::network::miniprotocols::Point::Origin => ChainPoint::Origin,
            pallas::network::miniprotocols::Point::Specific(slot, hash) => {
                ChainPoint::Specific(slot, hash.as_slice().into())
            }
        }
    }
}

impl From<ChainPoint> for pallas::network::miniprotocols::Point {
    fn from(value: ChainPoint) -> Self {
        match value {
            ChainPoint::Origin => pallas::network::miniprotocols::Point::Origin,
            ChainPoint::Specific(slot, hash) => {
                pallas::network::miniprotocols::Point::Specific(slot, hash.to_vec())
            }
        }
    }
}

/// Most recent point known to the producer.
pub type Tip = ChainPoint;

/// Slot distance from the tip down to a given slot, saturating at zero.
pub fn distance_to_tip(tip: &Tip, slot: BlockSlot) -> u64 {
    tip.slot().saturating_sub(slot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputReference {
    pub tx_id: TxHash,
    pub output_index: u32,
}

impl OutputReference {
    /// Canonical 36-byte key: tx id followed by the big-endian index.
    /// Used as the store's primary key so references group by transaction.
    pub fn to_key(self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[0..32].copy_from_slice(self.tx_id.as_slice());
        out[32..36].copy_from_slice(&self.output_index.to_be_bytes());
        out
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != 36 {
            return None;
        }
        let tx_id: [u8; 32] = key[0..32].try_into().ok()?;
        let index: [u8; 4] = key[32..36].try_into().ok()?;
        Some(Self {
            tx_id: Hash::new(tx_id),
            output_index: u32::from_be_bytes(index),
        })
    }
}

impl Display for OutputReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.output_index)
    }
}

/// Lovelace plus multi-assets, keyed `policy` or `policy.name` in hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub coins: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, u64>,
}

impl Value {
    pub fn lovelace(coins: u64) -> Self {
        Self {
            coins,
            assets: BTreeMap::new(),
        }
    }

    /// Whether any asset under `policy` (hex) is present, optionally
    /// narrowed to an exact asset name (hex).
    pub fn has_asset(&self, policy_hex: &str, name_hex: Option<&str>) -> bool {
        match name_hex {
            Some(name) if name.is_empty() => self.assets.contains_key(policy_hex),
            Some(name) => self.assets.contains_key(&format!("{policy_hex}.{name}")),
            None => {
                let prefix = format!("{policy_hex}.");
                self.assets
                    .keys()
                    .any(|unit| unit == policy_hex || unit.starts_with(&prefix))
            }
        }
    }
}

/// An indexed UTxO entry. "Input" in the historical sense: something a
/// future transaction may consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedInput {
    pub output_reference: OutputReference,
    /// Raw address bytes as found on chain.
    pub address: Vec<u8>,
    pub value: Value,
    pub datum_hash: Option<DatumHash>,
    pub script_hash: Option<ScriptHash>,
    pub created_at: ChainPoint,
    /// Position of the producing transaction within its block.
    pub created_at_tx_index: u32,
    pub spent_at: Option<ChainPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptLanguage {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "plutus:v1")]
    PlutusV1,
    #[serde(rename = "plutus:v2")]
    PlutusV2,
    #[serde(rename = "plutus:v3")]
    PlutusV3,
}

impl ScriptLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::PlutusV1 => "plutus:v1",
            Self::PlutusV2 => "plutus:v2",
            Self::PlutusV3 => "plutus:v3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "native" => Some(Self::Native),
            "plutus:v1" => Some(Self::PlutusV1),
            "plutus:v2" => Some(Self::PlutusV2),
            "plutus:v3" => Some(Self::PlutusV3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptData {
    pub language: ScriptLanguage,
    pub bytes: Vec<u8>,
}

/// Spent filter on `/matches` queries and `fold_inputs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFlag {
    #[default]
    All,
    Unspent,
    Spent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    MostRecentFirst,
    OldestFirst,
}

/// Narrowing filter on `/matches`; at most one may be given per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFilter {
    PolicyId(Vec<u8>),
    AssetId { policy: Vec<u8>, name: Vec<u8> },
    TransactionId(TxHash),
    OutputReference(OutputReference),
}

/// What to do with inputs once a spend is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputManagement {
    /// Keep every spent input, only recording the point of the spend.
    #[default]
    MarkSpentInputs,
    /// Delete spends that happened deeper than the stability window;
    /// shallower spends are marked until the gardener catches up.
    RemoveSpentInputs,
}
