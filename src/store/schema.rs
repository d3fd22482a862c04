use rusqlite::Transaction;

use super::StoreError;

const SCHEMAS_TABLE: &str = "farol_schemas";

/// Versioned migration scripts; index is the schema version. Append-only:
/// released versions never change.
const MIGRATIONS: &[&[&str]] = &[&[
    "CREATE TABLE checkpoints ( \
        slot INTEGER PRIMARY KEY, \
        header_hash BLOB NOT NULL \
    ) STRICT",
    "CREATE TABLE inputs ( \
        output_reference BLOB PRIMARY KEY, \
        tx_id BLOB NOT NULL, \
        output_index INTEGER NOT NULL, \
        address BLOB NOT NULL, \
        value TEXT NOT NULL, \
        datum_hash BLOB, \
        script_hash BLOB, \
        created_at_slot INTEGER NOT NULL, \
        created_at_hash BLOB NOT NULL, \
        created_at_tx_index INTEGER NOT NULL, \
        spent_at_slot INTEGER, \
        spent_at_hash BLOB \
    ) STRICT",
    "CREATE INDEX inputs_by_created_at ON inputs(created_at_slot)",
    "CREATE INDEX inputs_by_spent_at ON inputs(spent_at_slot)",
    "CREATE INDEX inputs_by_tx_id ON inputs(tx_id)",
    "CREATE TABLE policies ( \
        output_reference BLOB NOT NULL REFERENCES inputs(output_reference) ON DELETE CASCADE, \
        policy_id BLOB NOT NULL, \
        PRIMARY KEY (output_reference, policy_id) \
    ) STRICT, WITHOUT ROWID",
    "CREATE INDEX policies_by_policy_id ON policies(policy_id)",
    "CREATE TABLE binary_data ( \
        binary_data_hash BLOB PRIMARY KEY, \
        binary_data BLOB NOT NULL \
    ) STRICT",
    "CREATE TABLE scripts ( \
        script_hash BLOB PRIMARY KEY, \
        language TEXT NOT NULL, \
        script BLOB NOT NULL \
    ) STRICT",
    "CREATE TABLE patterns ( \
        pattern TEXT PRIMARY KEY \
    ) STRICT",
    "CREATE TABLE meta ( \
        key TEXT PRIMARY KEY, \
        value TEXT NOT NULL \
    ) STRICT",
]];

fn init_schemas_table(db_tx: &Transaction) -> Result<(), rusqlite::Error> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {SCHEMAS_TABLE} ( \
            name TEXT PRIMARY KEY NOT NULL, \
            version INTEGER NOT NULL \
        ) STRICT"
    );
    db_tx.execute(&sql, ())?;
    Ok(())
}

fn schema_version(db_tx: &Transaction) -> Result<Option<u32>, rusqlite::Error> {
    use rusqlite::OptionalExtension;

    let sql = format!("SELECT version FROM {SCHEMAS_TABLE} WHERE name = 'farol'");
    db_tx
        .query_row(&sql, (), |row| row.get::<_, u32>("version"))
        .optional()
}

fn set_schema_version(db_tx: &Transaction, version: u32) -> Result<(), rusqlite::Error> {
    let sql = format!("REPLACE INTO {SCHEMAS_TABLE} (name, version) VALUES ('farol', :version)");
    db_tx.execute(&sql, rusqlite::named_params! { ":version": version })?;
    Ok(())
}

/// Applies any migration scripts newer than the recorded schema version.
pub fn migrate(db_tx: &Transaction) -> Result<(), StoreError> {
    init_schemas_table(db_tx)?;
    let current = schema_version(db_tx)?;
    let exec_from = current.map_or(0_usize, |v| v as usize + 1);

    for (version, script) in MIGRATIONS.iter().enumerate().skip(exec_from) {
        set_schema_version(db_tx, version as u32)?;
        for statement in *script {
            db_tx.execute(statement, ())?;
        }
    }

    Ok(())
}
