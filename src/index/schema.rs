use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!("Upgrading schema from v{} to v{}", current_version, SCHEMA_VERSION);
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Create v1 schema: symbols, references and the incremental file ledger
fn create_v1_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symbols (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            namespace TEXT,
            parent_id TEXT,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            col INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            end_col INTEGER NOT NULL,
            visibility TEXT,
            is_static INTEGER NOT NULL DEFAULT 0,
            is_abstract INTEGER NOT NULL DEFAULT 0,
            is_final INTEGER NOT NULL DEFAULT 0,
            return_type TEXT,
            parameters TEXT NOT NULL DEFAULT '[]',
            extends TEXT NOT NULL DEFAULT '',
            implements TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            external INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            last_indexed INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_namespace ON symbols(namespace);
        CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);
        CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file);
        CREATE INDEX IF NOT EXISTS idx_symbols_extends ON symbols(extends);
        CREATE INDEX IF NOT EXISTS idx_symbols_implements ON symbols(implements);

        CREATE TABLE IF NOT EXISTS symbol_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            col INTEGER NOT NULL,
            context TEXT,
            UNIQUE (source_id, target_id, kind, line, col),
            FOREIGN KEY (source_id) REFERENCES symbols(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
            FOREIGN KEY (target_id) REFERENCES symbols(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
        );

        CREATE INDEX IF NOT EXISTS idx_references_source ON symbol_references(source_id, kind);
        CREATE INDEX IF NOT EXISTS idx_references_target ON symbol_references(target_id, kind);
        CREATE INDEX IF NOT EXISTS idx_references_kind ON symbol_references(kind);

        CREATE TABLE IF NOT EXISTS file_hashes (
            path TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            symbol_count INTEGER NOT NULL DEFAULT 0,
            last_indexed INTEGER NOT NULL
        );",
    )?;

    info!("v1 schema created successfully");

    Ok(())
}

/// Drop all tables (for rebuilding)
pub fn drop_schema(conn: &Connection) -> Result<()> {
    info!("Dropping all schema tables");

    conn.execute_batch(
        "DROP TABLE IF EXISTS symbol_references;
         DROP TABLE IF EXISTS symbols;
         DROP TABLE IF EXISTS file_hashes;
         DROP TABLE IF EXISTS schema_version;",
    )?;

    Ok(())
}
