use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{params, params_from_iter, Connection, OpenFlags, TransactionBehavior};
use thiserror::Error;

use crate::model::{
    BlockSlot, ChainPoint, DatumHash, MatchFilter, MatchedInput, OutputReference, ScriptData,
    ScriptHash, ScriptLanguage, SortDirection, StatusFlag, Value,
};
use crate::patterns::Pattern;

mod schema;

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("corrupted row: {0}")]
    Corrupted(String),
}

/// How many read-only connections the pool starts with.
const DEFAULT_READERS: usize = 4;

enum StoreOrigin {
    File(std::path::PathBuf),
    Memory(String),
}

/// Handle over the embedded SQLite file. One writer connection guarded by
/// a mutex (single-writer) plus a pool of read-only connections; WAL mode
/// lets readers run while a write transaction is open.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
    origin: StoreOrigin,
}

static MEMORY_STORE_SEQ: AtomicUsize = AtomicUsize::new(0);

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&mut writer)?;

        let origin = StoreOrigin::File(path.to_path_buf());
        let readers = (0..DEFAULT_READERS)
            .map(|_| Self::open_reader(&origin))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                writer: Mutex::new(writer),
                readers: Mutex::new(readers),
                origin,
            }),
        })
    }

    /// Shared-cache in-memory store; the writer connection keeps the
    /// database alive for the lifetime of the handle.
    pub fn in_memory() -> Result<Self, StoreError> {
        let seq = MEMORY_STORE_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:farol-mem-{seq}?mode=memory&cache=shared");

        let flags = OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI;
        let mut writer = Connection::open_with_flags(&uri, flags)?;
        Self::init(&mut writer)?;

        let origin = StoreOrigin::Memory(uri);
        let readers = vec![Self::open_reader(&origin)?];

        Ok(Self {
            inner: Arc::new(StoreInner {
                writer: Mutex::new(writer),
                readers: Mutex::new(readers),
                origin,
            }),
        })
    }

    fn init(writer: &mut Connection) -> Result<(), StoreError> {
        writer.pragma_update(None, "synchronous", "NORMAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        let tx = writer.transaction()?;
        schema::migrate(&tx)?;
        tx.commit()?;

        Ok(())
    }

    fn open_reader(origin: &StoreOrigin) -> Result<Connection, StoreError> {
        let conn = match origin {
            StoreOrigin::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            StoreOrigin::Memory(uri) => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_URI,
            )?,
        };

        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(conn)
    }

    /// Runs `body` inside an exclusive read-write transaction. Either the
    /// whole transaction commits or none of it does; a failure leaves the
    /// store at the previous checkpoint.
    pub fn with_writer<T>(
        &self,
        body: impl FnOnce(&rusqlite::Transaction) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.writer.lock().expect("store writer poisoned");
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = body(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Runs `body` against a pooled read-only connection.
    pub fn with_reader<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = {
            let mut pool = self.inner.readers.lock().expect("reader pool poisoned");
            pool.pop()
        };

        let conn = match conn {
            Some(conn) => conn,
            None => Self::open_reader(&self.inner.origin)?,
        };

        let out = body(&conn);

        let mut pool = self.inner.readers.lock().expect("reader pool poisoned");
        pool.push(conn);

        out
    }
}

// ---------------------------------------------------------------------------
// checkpoints

pub fn insert_checkpoints(
    db: &Connection,
    points: impl IntoIterator<Item = ChainPoint>,
) -> Result<(), StoreError> {
    let mut stmt =
        db.prepare_cached("INSERT OR REPLACE INTO checkpoints (slot, header_hash) VALUES (?, ?)")?;

    for point in points {
        let Some(hash) = point.hash() else {
            continue;
        };
        stmt.execute(params![point.slot(), hash.as_slice()])?;
    }

    Ok(())
}

pub fn most_recent_checkpoint(db: &Connection) -> Result<Option<ChainPoint>, StoreError> {
    let mut stmt =
        db.prepare_cached("SELECT slot, header_hash FROM checkpoints ORDER BY slot DESC LIMIT 1")?;
    let mut rows = stmt.query(())?;

    match rows.next()? {
        Some(row) => Ok(Some(read_checkpoint(row)?)),
        None => Ok(None),
    }
}

pub fn checkpoint_at(db: &Connection, slot: BlockSlot) -> Result<Option<ChainPoint>, StoreError> {
    let mut stmt = db.prepare_cached("SELECT slot, header_hash FROM checkpoints WHERE slot = ?")?;
    let mut rows = stmt.query(params![slot])?;

    match rows.next()? {
        Some(row) => Ok(Some(read_checkpoint(row)?)),
        None => Ok(None),
    }
}

/// Streams every checkpoint, newest first, until `yield_row` declines.
pub fn fold_checkpoints_desc(
    db: &Connection,
    mut yield_row: impl FnMut(ChainPoint) -> bool,
) -> Result<(), StoreError> {
    let mut stmt =
        db.prepare_cached("SELECT slot, header_hash FROM checkpoints ORDER BY slot DESC")?;
    let mut rows = stmt.query(())?;

    while let Some(row) = rows.next()? {
        if !yield_row(read_checkpoint(row)?) {
            break;
        }
    }

    Ok(())
}

/// Up to `limit` checkpoints strictly before `slot`, newest first.
pub fn list_ancestors_desc(
    db: &Connection,
    slot: BlockSlot,
    limit: usize,
) -> Result<Vec<ChainPoint>, StoreError> {
    let mut stmt = db.prepare_cached(
        "SELECT slot, header_hash FROM checkpoints WHERE slot < ? ORDER BY slot DESC LIMIT ?",
    )?;
    let mut rows = stmt.query(params![slot, limit])?;

    let mut out = Vec::with_capacity(limit);
    while let Some(row) = rows.next()? {
        out.push(read_checkpoint(row)?);
    }

    Ok(out)
}

/// The nearest checkpoint at or before `slot`, if any.
pub fn nearest_ancestor(db: &Connection, slot: BlockSlot) -> Result<Option<ChainPoint>, StoreError> {
    let ancestors = list_ancestors_desc(db, slot.saturating_add(1), 1)?;
    Ok(ancestors.into_iter().next())
}

/// Intersection candidates offered to the producer: the most recent
/// checkpoints densely, then points at doubling distance, capped, always
/// ending with the oldest known checkpoint.
pub fn intersection_candidates(db: &Connection) -> Result<Vec<ChainPoint>, StoreError> {
    const DENSE: usize = 10;
    const CAP: usize = 30;

    let mut out = Vec::new();
    fold_checkpoints_desc(db, |point| {
        out.push(point);
        out.len() < DENSE
    })?;

    let Some(last_dense) = out.last().copied() else {
        return Ok(out);
    };

    let mut stmt = db.prepare_cached(
        "SELECT slot, header_hash FROM checkpoints WHERE slot <= ? ORDER BY slot DESC LIMIT 1",
    )?;

    let mut gap: u64 = 2;
    let mut cursor = last_dense.slot();
    while out.len() < CAP {
        let Some(target) = cursor.checked_sub(gap) else {
            break;
        };

        let mut rows = stmt.query(params![target])?;
        let Some(row) = rows.next()? else {
            break;
        };

        let point = read_checkpoint(row)?;
        if out.last().map(|p: &ChainPoint| p.slot()) == Some(point.slot()) {
            break;
        }

        cursor = point.slot();
        out.push(point);
        gap = gap.saturating_mul(2);
    }

    let mut stmt =
        db.prepare_cached("SELECT slot, header_hash FROM checkpoints ORDER BY slot ASC LIMIT 1")?;
    let mut rows = stmt.query(())?;
    if let Some(row) = rows.next()? {
        let oldest = read_checkpoint(row)?;
        if out.last().map(|p| p.slot()) != Some(oldest.slot()) {
            out.push(oldest);
        }
    }

    Ok(out)
}

fn read_checkpoint(row: &rusqlite::Row) -> Result<ChainPoint, StoreError> {
    let slot: u64 = row.get(0)?;
    let hash: Vec<u8> = row.get(1)?;
    Ok(ChainPoint::Specific(slot, blob_to_hash32(&hash)?))
}

// ---------------------------------------------------------------------------
// inputs

pub fn insert_inputs(
    db: &Connection,
    inputs: impl IntoIterator<Item = MatchedInput>,
) -> Result<(), StoreError> {
    let mut insert_input = db.prepare_cached(
        "INSERT OR REPLACE INTO inputs ( \
            output_reference, tx_id, output_index, address, value, \
            datum_hash, script_hash, \
            created_at_slot, created_at_hash, created_at_tx_index, \
            spent_at_slot, spent_at_hash \
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    let mut insert_policy = db.prepare_cached(
        "INSERT OR IGNORE INTO policies (output_reference, policy_id) VALUES (?, ?)",
    )?;

    for input in inputs {
        let reference = input.output_reference.to_key();
        let value_json = serde_json::to_string(&input.value)
            .map_err(|err| StoreError::Corrupted(err.to_string()))?;

        let created_at_hash = input
            .created_at
            .hash()
            .ok_or_else(|| StoreError::Corrupted("input created at origin".to_string()))?;

        insert_input.execute(params![
            reference.as_slice(),
            input.output_reference.tx_id.as_slice(),
            input.output_reference.output_index,
            input.address,
            value_json,
            input.datum_hash.as_ref().map(|h| h.as_slice().to_vec()),
            input.script_hash.as_ref().map(|h| h.as_slice().to_vec()),
            input.created_at.slot(),
            created_at_hash.as_slice(),
            input.created_at_tx_index,
            input.spent_at.as_ref().map(ChainPoint::slot),
            input
                .spent_at
                .as_ref()
                .and_then(ChainPoint::hash)
                .map(|h| h.as_slice().to_vec()),
        ])?;

        for policy in value_policies(&input.value) {
            insert_policy.execute(params![reference.as_slice(), policy])?;
        }
    }

    Ok(())
}

fn value_policies(value: &Value) -> impl Iterator<Item = Vec<u8>> + '_ {
    value
        .assets
        .keys()
        .filter_map(|unit| {
            let policy_hex = unit.split_once('.').map(|(p, _)| p).unwrap_or(unit);
            hex::decode(policy_hex).ok()
        })
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
}

/// Records a spend for each reference: `spent_at` becomes the point where
/// the spend happened. References the store never indexed are skipped.
pub fn mark_inputs_spent(
    db: &Connection,
    spent_at: &ChainPoint,
    refs: &[OutputReference],
) -> Result<usize, StoreError> {
    let mut stmt = db.prepare_cached(
        "UPDATE inputs SET spent_at_slot = ?, spent_at_hash = ? WHERE output_reference = ?",
    )?;

    let hash = spent_at
        .hash()
        .ok_or_else(|| StoreError::Corrupted("spend recorded at origin".to_string()))?;

    let mut changed = 0;
    for reference in refs {
        changed += stmt.execute(params![
            spent_at.slot(),
            hash.as_slice(),
            reference.to_key().as_slice()
        ])?;
    }

    Ok(changed)
}

pub fn delete_inputs_by_reference(
    db: &Connection,
    refs: &[OutputReference],
) -> Result<usize, StoreError> {
    let mut stmt = db.prepare_cached("DELETE FROM inputs WHERE output_reference = ?")?;

    let mut deleted = 0;
    for reference in refs {
        deleted += stmt.execute(params![reference.to_key().as_slice()])?;
    }

    Ok(deleted)
}

/// Deletes every indexed input captured by `pattern`; returns the count.
pub fn delete_inputs_matching(db: &Connection, pattern: &Pattern) -> Result<usize, StoreError> {
    let mut refs = Vec::new();
    fold_inputs(
        db,
        pattern,
        StatusFlag::All,
        None,
        SortDirection::OldestFirst,
        |input| {
            refs.push(input.output_reference);
            true
        },
    )?;

    delete_inputs_by_reference(db, &refs)
}

/// Deletes spent inputs buried deeper than the stability window below the
/// most recent checkpoint. Only safe once reorgs can no longer resurrect
/// them; the caller decides when that is.
pub fn prune_inputs(db: &Connection, stability_window: u64) -> Result<usize, StoreError> {
    let deleted = db.execute(
        "DELETE FROM inputs WHERE spent_at_slot IS NOT NULL \
         AND spent_at_slot + ? < (SELECT COALESCE(MAX(slot), 0) FROM checkpoints)",
        params![stability_window],
    )?;

    Ok(deleted)
}

/// Rewinds the store to `slot`: results created later are deleted, spends
/// recorded later are cleared, checkpoints beyond it are dropped. Returns
/// the slot of the new latest checkpoint.
pub fn rollback_to(db: &Connection, slot: BlockSlot) -> Result<Option<BlockSlot>, StoreError> {
    db.execute("DELETE FROM inputs WHERE created_at_slot > ?", params![slot])?;
    db.execute(
        "UPDATE inputs SET spent_at_slot = NULL, spent_at_hash = NULL WHERE spent_at_slot > ?",
        params![slot],
    )?;
    db.execute("DELETE FROM checkpoints WHERE slot > ?", params![slot])?;

    Ok(most_recent_checkpoint(db)?.map(|point| point.slot()))
}

/// Streams inputs matching `pattern` plus the optional query filter. The
/// status flag and filter narrow in SQL; the pattern itself is applied
/// row by row. Returning `false` from `yield_row` stops the scan.
pub fn fold_inputs(
    db: &Connection,
    pattern: &Pattern,
    status: StatusFlag,
    filter: Option<&MatchFilter>,
    sort: SortDirection,
    mut yield_row: impl FnMut(MatchedInput) -> bool,
) -> Result<(), StoreError> {
    let mut sql = String::from(
        "SELECT i.output_reference, i.address, i.value, i.datum_hash, i.script_hash, \
         i.created_at_slot, i.created_at_hash, i.created_at_tx_index, \
         i.spent_at_slot, i.spent_at_hash FROM inputs i",
    );

    let mut params: Vec<rusqlite::types::Value> = Vec::new();
    let mut clauses: Vec<&str> = Vec::new();

    match filter {
        Some(MatchFilter::PolicyId(policy)) | Some(MatchFilter::AssetId { policy, .. }) => {
            sql.push_str(" JOIN policies p ON p.output_reference = i.output_reference");
            clauses.push("p.policy_id = ?");
            params.push(policy.clone().into());
        }
        Some(MatchFilter::TransactionId(tx_id)) => {
            clauses.push("i.tx_id = ?");
            params.push(tx_id.as_slice().to_vec().into());
        }
        Some(MatchFilter::OutputReference(reference)) => {
            clauses.push("i.output_reference = ?");
            params.push(reference.to_key().to_vec().into());
        }
        None => {}
    }

    match status {
        StatusFlag::All => {}
        StatusFlag::Unspent => clauses.push("i.spent_at_slot IS NULL"),
        StatusFlag::Spent => clauses.push("i.spent_at_slot IS NOT NULL"),
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let direction = match sort {
        SortDirection::MostRecentFirst => "DESC",
        SortDirection::OldestFirst => "ASC",
    };
    sql.push_str(&format!(
        " ORDER BY i.created_at_slot {direction}, \
         i.created_at_tx_index {direction}, i.output_index {direction}"
    ));

    let asset_name_hex = match filter {
        Some(MatchFilter::AssetId { policy, name }) => {
            Some((hex::encode(policy), hex::encode(name)))
        }
        _ => None,
    };

    let mut stmt = db.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;

    while let Some(row) = rows.next()? {
        let input = read_input(row)?;

        if let Some((policy_hex, name_hex)) = &asset_name_hex {
            if !input.value.has_asset(policy_hex, Some(name_hex)) {
                continue;
            }
        }

        if !input_matches(pattern, &input) {
            continue;
        }

        if !yield_row(input) {
            break;
        }
    }

    Ok(())
}

fn input_matches(pattern: &Pattern, input: &MatchedInput) -> bool {
    if matches!(pattern, Pattern::Any) {
        return true;
    }

    match pallas::ledger::addresses::Address::from_bytes(&input.address) {
        Ok(address) => pattern.matches(&address, &input.value, &input.output_reference),
        Err(_) => false,
    }
}

fn read_input(row: &rusqlite::Row) -> Result<MatchedInput, StoreError> {
    let reference: Vec<u8> = row.get(0)?;
    let output_reference = OutputReference::from_key(&reference)
        .ok_or_else(|| StoreError::Corrupted("malformed output reference key".to_string()))?;

    let value_json: String = row.get(2)?;
    let value: Value = serde_json::from_str(&value_json)
        .map_err(|err| StoreError::Corrupted(err.to_string()))?;

    let datum_hash: Option<Vec<u8>> = row.get(3)?;
    let script_hash: Option<Vec<u8>> = row.get(4)?;

    let created_at_slot: u64 = row.get(5)?;
    let created_at_hash: Vec<u8> = row.get(6)?;

    let spent_at_slot: Option<u64> = row.get(8)?;
    let spent_at_hash: Option<Vec<u8>> = row.get(9)?;

    let spent_at = match (spent_at_slot, spent_at_hash) {
        (Some(slot), Some(hash)) => Some(ChainPoint::Specific(slot, blob_to_hash32(&hash)?)),
        _ => None,
    };

    Ok(MatchedInput {
        output_reference,
        address: row.get(1)?,
        value,
        datum_hash: datum_hash.as_deref().map(blob_to_hash32).transpose()?,
        script_hash: script_hash.as_deref().map(blob_to_hash28).transpose()?,
        created_at: ChainPoint::Specific(created_at_slot, blob_to_hash32(&created_at_hash)?),
        created_at_tx_index: row.get(7)?,
        spent_at,
    })
}

// ---------------------------------------------------------------------------
// binary data & scripts

pub fn insert_binary_data<'a>(
    db: &Connection,
    items: impl IntoIterator<Item = (&'a DatumHash, &'a [u8])>,
) -> Result<(), StoreError> {
    let mut stmt = db.prepare_cached(
        "INSERT OR IGNORE INTO binary_data (binary_data_hash, binary_data) VALUES (?, ?)",
    )?;

    for (hash, bytes) in items {
        stmt.execute(params![hash.as_slice(), bytes])?;
    }

    Ok(())
}

pub fn get_binary_data(db: &Connection, hash: &DatumHash) -> Result<Option<Vec<u8>>, StoreError> {
    let mut stmt =
        db.prepare_cached("SELECT binary_data FROM binary_data WHERE binary_data_hash = ?")?;
    let mut rows = stmt.query(params![hash.as_slice()])?;

    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Deletes binary data no longer referenced by any live input.
pub fn prune_binary_data(db: &Connection) -> Result<usize, StoreError> {
    let deleted = db.execute(
        "DELETE FROM binary_data WHERE binary_data_hash NOT IN \
         (SELECT datum_hash FROM inputs WHERE datum_hash IS NOT NULL)",
        (),
    )?;

    Ok(deleted)
}

pub fn insert_scripts<'a>(
    db: &Connection,
    items: impl IntoIterator<Item = (&'a ScriptHash, &'a ScriptData)>,
) -> Result<(), StoreError> {
    let mut stmt = db.prepare_cached(
        "INSERT OR IGNORE INTO scripts (script_hash, language, script) VALUES (?, ?, ?)",
    )?;

    for (hash, script) in items {
        stmt.execute(params![
            hash.as_slice(),
            script.language.as_str(),
            script.bytes
        ])?;
    }

    Ok(())
}

pub fn get_script(db: &Connection, hash: &ScriptHash) -> Result<Option<ScriptData>, StoreError> {
    let mut stmt =
        db.prepare_cached("SELECT language, script FROM scripts WHERE script_hash = ?")?;
    let mut rows = stmt.query(params![hash.as_slice()])?;

    match rows.next()? {
        Some(row) => {
            let language: String = row.get(0)?;
            let language = ScriptLanguage::parse(&language)
                .ok_or_else(|| StoreError::Corrupted(format!("unknown language {language}")))?;
            Ok(Some(ScriptData {
                language,
                bytes: row.get(1)?,
            }))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// patterns

pub fn insert_patterns<'a>(
    db: &Connection,
    patterns: impl IntoIterator<Item = &'a Pattern>,
) -> Result<(), StoreError> {
    let mut stmt = db.prepare_cached("INSERT OR IGNORE INTO patterns (pattern) VALUES (?)")?;

    for pattern in patterns {
        stmt.execute(params![pattern.to_string()])?;
    }

    Ok(())
}

pub fn delete_pattern(db: &Connection, pattern: &Pattern) -> Result<usize, StoreError> {
    let deleted = db.execute(
        "DELETE FROM patterns WHERE pattern = ?",
        params![pattern.to_string()],
    )?;

    Ok(deleted)
}

pub fn list_patterns(db: &Connection) -> Result<Vec<Pattern>, StoreError> {
    let mut stmt = db.prepare_cached("SELECT pattern FROM patterns ORDER BY pattern")?;
    let mut rows = stmt.query(())?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        let pattern = Pattern::parse(&text)
            .map_err(|err| StoreError::Corrupted(format!("stored pattern: {err}")))?;
        out.push(pattern);
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// meta

pub fn network_magic(db: &Connection) -> Result<Option<u64>, StoreError> {
    let mut stmt = db.prepare_cached("SELECT value FROM meta WHERE key = 'network_magic'")?;
    let mut rows = stmt.query(())?;

    match rows.next()? {
        Some(row) => {
            let text: String = row.get(0)?;
            let magic = text
                .parse::<u64>()
                .map_err(|err| StoreError::Corrupted(format!("network magic: {err}")))?;
            Ok(Some(magic))
        }
        None => Ok(None),
    }
}

pub fn set_network_magic(db: &Connection, magic: u64) -> Result<(), StoreError> {
    db.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('network_magic', ?)",
        params![magic.to_string()],
    )?;

    Ok(())
}

fn blob_to_hash32(bytes: &[u8]) -> Result<pallas::crypto::hash::Hash<32>, StoreError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupted("expected 32-byte hash".to_string()))?;
    Ok(pallas::crypto::hash::Hash::new(bytes))
}

fn blob_to_hash28(bytes: &[u8]) -> Result<pallas::crypto::hash::Hash<28>, StoreError> {
    let bytes: [u8; 28] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupted("expected 28-byte hash".to_string()))?;
    Ok(pallas::crypto::hash::Hash::new(bytes))
}
