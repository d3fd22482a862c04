use base58::FromBase58;
use pallas::crypto::hash::Hasher;
use pallas::ledger::addresses::{Address, ShelleyDelegationPart, ShelleyPaymentPart};
use std::fmt;
use std::ops::RangeInclusive;

use crate::model::{OutputReference, Value};

/// A filter over chain outputs. The text form is the canonical, stable
/// identifier of a pattern: it is what travels in URLs, config files and
/// the patterns table, and `parse`/`Display` round-trip it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pattern {
    Any,
    Address(AddressPattern),
    Asset(AssetPattern),
    OutputRef(OutputRefPattern),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressPattern {
    Full(Vec<u8>),
    /// Prefix over the raw address bytes, text form `<hex>*`.
    Prefix(Vec<u8>),
    Credentials {
        payment: CredentialPattern,
        delegation: CredentialPattern,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetPattern {
    policy: Vec<u8>,
    name: AssetNamePattern,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetNamePattern {
    Any,
    Exact(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputRefPattern {
    index: OutputIndexPattern,
    tx_id: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputIndexPattern {
    Any,
    Exact(u32),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialPattern {
    Any,
    KeyHash(Vec<u8>),
    ScriptHash(Vec<u8>),
    AnyHash(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatternParseError {
    Empty,
    MetadataTagNotQueryable,
    InvalidPattern(String),
}

impl fmt::Display for PatternParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternParseError::Empty => write!(f, "pattern is empty"),
            PatternParseError::MetadataTagNotQueryable => {
                write!(f, "metadata tag patterns are index-only")
            }
            PatternParseError::InvalidPattern(value) => {
                write!(f, "invalid pattern: {value}")
            }
        }
    }
}

impl std::error::Error for PatternParseError {}

impl Pattern {
    pub fn parse(input: &str) -> Result<Self, PatternParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PatternParseError::Empty);
        }

        if input == "*" {
            return Ok(Pattern::Any);
        }

        if input.starts_with('{') && input.ends_with('}') {
            return Err(PatternParseError::MetadataTagNotQueryable);
        }

        if let Some((left, right)) = input.split_once('/') {
            if left.is_empty() || right.is_empty() {
                return Err(invalid(input));
            }
            let payment = credential_pattern(left)?;
            let delegation = credential_pattern(right)?;
            return Ok(Pattern::Address(AddressPattern::Credentials {
                payment,
                delegation,
            }));
        }

        if let Some((policy, name)) = input.split_once('.') {
            if policy.is_empty() || name.is_empty() {
                return Err(invalid(input));
            }
            let policy = hex_of_len(policy, 56..=56)?;
            let name = if name == "*" {
                AssetNamePattern::Any
            } else {
                AssetNamePattern::Exact(hex_of_len(name, 2..=64)?)
            };
            return Ok(Pattern::Asset(AssetPattern { policy, name }));
        }

        if let Some((index, tx_id)) = input.split_once('@') {
            if index.is_empty() || tx_id.is_empty() {
                return Err(invalid(input));
            }
            let index = if index == "*" {
                OutputIndexPattern::Any
            } else {
                let parsed = index.parse::<u32>().map_err(|_| invalid(input))?;
                OutputIndexPattern::Exact(parsed)
            };

            let tx_id = hex_of_len(tx_id, 64..=64)?;
            return Ok(Pattern::OutputRef(OutputRefPattern { index, tx_id }));
        }

        if let Some(prefix) = input.strip_suffix('*') {
            let bytes = hex_of_len(prefix, 2..=112)?;
            return Ok(Pattern::Address(AddressPattern::Prefix(bytes)));
        }

        full_address_pattern(input).map(Pattern::Address)
    }

    /// Whether an output with the given address, value and reference is
    /// captured by this pattern.
    pub fn matches(&self, address: &Address, value: &Value, reference: &OutputReference) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Address(pattern) => pattern.matches(address),
            Pattern::Asset(pattern) => pattern.matches(value),
            Pattern::OutputRef(pattern) => {
                pattern.matches(reference.tx_id.as_slice(), reference.output_index)
            }
        }
    }

    pub fn matches_address(&self, address: &Address) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Address(pattern) => pattern.matches(address),
            _ => false,
        }
    }

    /// Structural subsumption: does `self` match everything `other` does?
    pub fn includes(&self, other: &Pattern) -> bool {
        match (self, other) {
            (Pattern::Any, _) => true,
            (Pattern::Address(a), Pattern::Address(b)) => a.includes(b),
            (Pattern::Asset(a), Pattern::Asset(b)) => a.includes(b),
            (Pattern::OutputRef(a), Pattern::OutputRef(b)) => a.includes(b),
            _ => false,
        }
    }

    /// Whether some pattern in `others` matches a strict superset of what
    /// `self` matches. Deleting results for an overlapped pattern would be
    /// futile since the wider pattern re-indexes them right away.
    pub fn overlaps<'a>(&self, others: impl IntoIterator<Item = &'a Pattern>) -> bool {
        others
            .into_iter()
            .any(|other| other != self && other.includes(self))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "*"),
            Pattern::Address(AddressPattern::Full(bytes)) => match Address::from_bytes(bytes) {
                Ok(address) => write!(f, "{}", address.to_string()),
                Err(_) => write!(f, "{}", hex::encode(bytes)),
            },
            Pattern::Address(AddressPattern::Prefix(bytes)) => {
                write!(f, "{}*", hex::encode(bytes))
            }
            Pattern::Address(AddressPattern::Credentials {
                payment,
                delegation,
            }) => {
                write!(
                    f,
                    "{}/{}",
                    payment.render("addr_vkh"),
                    delegation.render("stake_vkh")
                )
            }
            Pattern::Asset(AssetPattern { policy, name }) => match name {
                AssetNamePattern::Any => write!(f, "{}.*", hex::encode(policy)),
                AssetNamePattern::Exact(name) => {
                    write!(f, "{}.{}", hex::encode(policy), hex::encode(name))
                }
            },
            Pattern::OutputRef(OutputRefPattern { index, tx_id }) => match index {
                OutputIndexPattern::Any => write!(f, "*@{}", hex::encode(tx_id)),
                OutputIndexPattern::Exact(index) => {
                    write!(f, "{}@{}", index, hex::encode(tx_id))
                }
            },
        }
    }
}

impl AddressPattern {
    fn matches(&self, address: &Address) -> bool {
        match self {
            AddressPattern::Full(bytes) => address.to_vec() == *bytes,
            AddressPattern::Prefix(prefix) => address.to_vec().starts_with(prefix),
            AddressPattern::Credentials {
                payment,
                delegation,
            } => match address {
                Address::Shelley(shelley) => {
                    payment.matches_payment(shelley.payment())
                        && delegation.matches_delegation(shelley.delegation())
                }
                _ => false,
            },
        }
    }

    fn includes(&self, other: &AddressPattern) -> bool {
        match (self, other) {
            (AddressPattern::Full(a), AddressPattern::Full(b)) => a == b,
            (AddressPattern::Prefix(prefix), AddressPattern::Full(full)) => {
                full.starts_with(prefix)
            }
            (AddressPattern::Prefix(short), AddressPattern::Prefix(long)) => {
                long.starts_with(short)
            }
            (
                AddressPattern::Credentials {
                    payment: lp,
                    delegation: ld,
                },
                AddressPattern::Credentials {
                    payment: rp,
                    delegation: rd,
                },
            ) => lp.includes(rp) && ld.includes(rd),
            (
                AddressPattern::Credentials {
                    payment,
                    delegation,
                },
                AddressPattern::Full(bytes),
            ) => match Address::from_bytes(bytes) {
                Ok(Address::Shelley(shelley)) => {
                    payment.matches_payment(shelley.payment())
                        && delegation.matches_delegation(shelley.delegation())
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl AssetPattern {
    pub fn policy(&self) -> &[u8] {
        &self.policy
    }

    pub fn name(&self) -> &AssetNamePattern {
        &self.name
    }

    fn matches(&self, value: &Value) -> bool {
        let policy_hex = hex::encode(&self.policy);
        match &self.name {
            AssetNamePattern::Any => value.has_asset(&policy_hex, None),
            AssetNamePattern::Exact(name) => {
                value.has_asset(&policy_hex, Some(&hex::encode(name)))
            }
        }
    }

    fn includes(&self, other: &AssetPattern) -> bool {
        if self.policy != other.policy {
            return false;
        }
        match (&self.name, &other.name) {
            (AssetNamePattern::Any, _) => true,
            (AssetNamePattern::Exact(a), AssetNamePattern::Exact(b)) => a == b,
            _ => false,
        }
    }
}

impl OutputRefPattern {
    pub fn tx_id(&self) -> &[u8] {
        &self.tx_id
    }

    pub fn index(&self) -> &OutputIndexPattern {
        &self.index
    }

    fn matches(&self, tx_id: &[u8], index: u32) -> bool {
        if self.tx_id != tx_id {
            return false;
        }

        match self.index {
            OutputIndexPattern::Any => true,
            OutputIndexPattern::Exact(expected) => expected == index,
        }
    }

    fn includes(&self, other: &OutputRefPattern) -> bool {
        if self.tx_id != other.tx_id {
            return false;
        }
        match (&self.index, &other.index) {
            (OutputIndexPattern::Any, _) => true,
            (OutputIndexPattern::Exact(a), OutputIndexPattern::Exact(b)) => a == b,
            _ => false,
        }
    }
}

impl CredentialPattern {
    fn matches_payment(&self, payment: &ShelleyPaymentPart) -> bool {
        match (self, payment) {
            (CredentialPattern::Any, _) => true,
            (CredentialPattern::KeyHash(expected), ShelleyPaymentPart::Key(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::ScriptHash(expected), ShelleyPaymentPart::Script(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::AnyHash(expected), ShelleyPaymentPart::Key(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::AnyHash(expected), ShelleyPaymentPart::Script(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            _ => false,
        }
    }

    fn matches_delegation(&self, delegation: &ShelleyDelegationPart) -> bool {
        match (self, delegation) {
            (CredentialPattern::Any, _) => true,
            (CredentialPattern::KeyHash(expected), ShelleyDelegationPart::Key(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::ScriptHash(expected), ShelleyDelegationPart::Script(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::AnyHash(expected), ShelleyDelegationPart::Key(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            (CredentialPattern::AnyHash(expected), ShelleyDelegationPart::Script(hash)) => {
                expected.as_slice() == hash.as_ref()
            }
            _ => false,
        }
    }

    fn includes(&self, other: &CredentialPattern) -> bool {
        match (self, other) {
            (CredentialPattern::Any, _) => true,
            (CredentialPattern::AnyHash(a), CredentialPattern::KeyHash(b)) => a == b,
            (CredentialPattern::AnyHash(a), CredentialPattern::ScriptHash(b)) => a == b,
            (a, b) => a == b,
        }
    }

    fn render(&self, key_hrp: &str) -> String {
        match self {
            CredentialPattern::Any => "*".to_string(),
            CredentialPattern::KeyHash(bytes) => {
                encode_bech32(key_hrp, bytes).unwrap_or_else(|| hex::encode(bytes))
            }
            CredentialPattern::ScriptHash(bytes) => {
                encode_bech32("script", bytes).unwrap_or_else(|| hex::encode(bytes))
            }
            CredentialPattern::AnyHash(bytes) => hex::encode(bytes),
        }
    }
}

fn encode_bech32(hrp: &str, payload: &[u8]) -> Option<String> {
    let hrp = bech32::Hrp::parse(hrp).ok()?;
    bech32::encode::<bech32::Bech32>(hrp, payload).ok()
}

fn invalid(text: &str) -> PatternParseError {
    PatternParseError::InvalidPattern(text.to_string())
}

/// Hex with a character-count window. The grammar only ever names whole
/// bytes, so odd digit counts are rejected outright.
fn hex_of_len(text: &str, want: RangeInclusive<usize>) -> Result<Vec<u8>, PatternParseError> {
    if !want.contains(&text.len()) || text.len() % 2 != 0 {
        return Err(invalid(text));
    }

    hex::decode(text).map_err(|_| invalid(text))
}

fn full_address_pattern(text: &str) -> Result<AddressPattern, PatternParseError> {
    let from_hex = || Address::from_bytes(&hex::decode(text).ok()?).ok();
    let from_base58 = || Address::from_bytes(&text.from_base58().ok()?).ok();

    Address::from_bech32(text)
        .ok()
        .or_else(from_hex)
        .or_else(from_base58)
        .map(|address| AddressPattern::Full(address.to_vec()))
        .ok_or_else(|| invalid(text))
}

/// One side of a `payment/delegation` pattern: a wildcard, a bech32 key
/// or script, or bare hex (28 bytes of hash, 32 bytes of key yet to be
/// hashed).
fn credential_pattern(text: &str) -> Result<CredentialPattern, PatternParseError> {
    if text == "*" {
        return Ok(CredentialPattern::Any);
    }

    if let Ok((hrp, payload)) = bech32::decode(text) {
        return credential_from_bech32(hrp.as_str(), &payload).ok_or_else(|| invalid(text));
    }

    match text.len() {
        56 => hex_of_len(text, 56..=56).map(CredentialPattern::AnyHash),
        64 => {
            let key = hex_of_len(text, 64..=64)?;
            Ok(CredentialPattern::KeyHash(blake2b_224(&key)))
        }
        _ => Err(invalid(text)),
    }
}

fn credential_from_bech32(hrp: &str, payload: &[u8]) -> Option<CredentialPattern> {
    match (hrp, payload.len()) {
        ("vk" | "addr_vk" | "stake_vk", 32) => {
            Some(CredentialPattern::KeyHash(blake2b_224(payload)))
        }
        ("vkh" | "addr_vkh" | "stake_vkh", 28) => {
            Some(CredentialPattern::KeyHash(payload.to_vec()))
        }
        ("script", 28) => Some(CredentialPattern::ScriptHash(payload.to_vec())),
        _ => None,
    }
}

fn blake2b_224(bytes: &[u8]) -> Vec<u8> {
    Hasher::<224>::hash(bytes).to_vec()
}
