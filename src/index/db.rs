use parking_lot::{Mutex, MutexGuard};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{drop_schema, init_schema};
use super::{Location, Reference, ReferenceKind, Symbol, SymbolKind, Visibility, TYPE_BEARING_KINDS};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Namespace separator understood by the lookup chain.
pub const NS_SEPARATOR: char = '\\';

const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

const SYMBOL_COLUMNS: &str = "id, kind, name, namespace, parent_id, file, line, col, end_line, end_col,
    visibility, is_static, is_abstract, is_final, return_type, parameters, extends, implements,
    language, metadata, external, content_hash";

const REFERENCE_COLUMNS: &str = "source_id, target_id, kind, file, line, col, context";

/// Error type for symbol store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid stored data: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which step of the lookup chain produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    FullyQualified,
    Alias,
    CurrentNamespace,
    Global,
    Suffix,
}

#[derive(Debug, Clone)]
pub struct LookupHit {
    pub symbol: Symbol,
    pub strategy: LookupStrategy,
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_symbols: usize,
    pub total_references: usize,
    pub total_files: usize,
    pub external_symbols: usize,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub references_by_kind: BTreeMap<String, usize>,
}

/// Everything in the store, for export collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDump {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
}

/// Durable symbol/reference store backed by SQLite.
///
/// All pipeline reads and writes go through a single writer connection so a
/// file's transaction sees its own uncommitted rows. Read-only consumers
/// (queries, stats) take pooled connections via [`SymbolStore::reader`].
pub struct SymbolStore {
    pool: ConnectionPool,
    writer: Mutex<PooledConnection<SqliteConnectionManager>>,
    tx_gate: Mutex<()>,
    db_path: PathBuf,
}

impl SymbolStore {
    /// Create or open a store
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_pool_size(db_path, 4)
    }

    pub fn open_with_pool_size(db_path: impl AsRef<Path>, pool_size: u32) -> StoreResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening symbol store at: {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));

        // One connection is held by the writer for the store's lifetime.
        let pool = Pool::builder().max_size(pool_size.max(2)).build(manager)?;

        let writer = pool.get()?;
        init_schema(&writer)?;

        Ok(Self {
            pool,
            writer: Mutex::new(writer),
            tx_gate: Mutex::new(()),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Pooled read-only connection; sees committed data only.
    pub fn reader(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn conn(&self) -> MutexGuard<'_, PooledConnection<SqliteConnectionManager>> {
        self.writer.lock()
    }

    /// Drop and recreate every table.
    pub fn rebuild(&self) -> StoreResult<()> {
        let _gate = self.tx_gate.lock();
        let conn = self.conn();
        drop_schema(&conn)?;
        init_schema(&conn)?;
        Ok(())
    }

    /// Start a file-scoped transaction. Only one can be in flight; a second
    /// caller blocks until the first commits or rolls back.
    pub fn begin(&self) -> StoreResult<StoreTransaction<'_>> {
        let gate = self.tx_gate.lock();
        self.conn().execute_batch("BEGIN IMMEDIATE")?;
        Ok(StoreTransaction {
            store: self,
            _gate: gate,
            finished: false,
        })
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&SymbolStore) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.begin()?;
        match f(self) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback()?;
                Err(err)
            }
        }
    }

    /// Insert or replace a symbol by id. Returns `false` when the stored row
    /// already has the same content hash.
    pub fn add_symbol(&self, symbol: &Symbol) -> StoreResult<bool> {
        let content_hash = symbol.compute_content_hash();
        let conn = self.conn();

        let changed = conn.execute(
            "INSERT INTO symbols (
                id, kind, name, namespace, parent_id, file, line, col, end_line, end_col,
                visibility, is_static, is_abstract, is_final, return_type, parameters, extends,
                implements, language, metadata, external, content_hash, last_indexed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                namespace = excluded.namespace,
                parent_id = COALESCE(symbols.parent_id, excluded.parent_id),
                file = excluded.file,
                line = excluded.line,
                col = excluded.col,
                end_line = excluded.end_line,
                end_col = excluded.end_col,
                visibility = excluded.visibility,
                is_static = excluded.is_static,
                is_abstract = excluded.is_abstract,
                is_final = excluded.is_final,
                return_type = excluded.return_type,
                parameters = excluded.parameters,
                extends = excluded.extends,
                implements = excluded.implements,
                language = excluded.language,
                metadata = excluded.metadata,
                external = excluded.external,
                content_hash = excluded.content_hash,
                last_indexed = excluded.last_indexed
            WHERE symbols.content_hash <> excluded.content_hash",
            params![
                symbol.id,
                symbol.kind.as_str(),
                symbol.name,
                symbol.namespace,
                symbol.parent_id,
                symbol.location.file,
                symbol.location.line,
                symbol.location.column,
                symbol.location.end_line,
                symbol.location.end_column,
                symbol.visibility.map(|v| v.as_str()),
                symbol.is_static,
                symbol.is_abstract,
                symbol.is_final,
                symbol.return_type,
                serde_json::to_string(&symbol.parameters)?,
                symbol.extends.join(","),
                symbol.implements.join(","),
                symbol.language,
                serde_json::Value::Object(symbol.metadata.clone()).to_string(),
                symbol.external,
                content_hash,
                now(),
            ],
        )?;

        Ok(changed > 0)
    }

    /// Synthesize (or reuse) a placeholder for an unresolvable name.
    pub fn ensure_external(&self, kind: SymbolKind, name: &str, internal: bool) -> StoreResult<Symbol> {
        let symbol = Symbol::external(kind, name, internal);
        self.add_symbol(&symbol)?;
        Ok(symbol)
    }

    /// Insert a reference; duplicate (source, target, kind, line, column)
    /// tuples are ignored. Returns whether a row was written.
    pub fn add_reference(&self, reference: &Reference) -> StoreResult<bool> {
        let conn = self.conn();

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO symbol_references (source_id, target_id, kind, file, line, col, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reference.source_id,
                reference.target_id,
                reference.kind.as_str(),
                reference.file,
                reference.line,
                reference.column,
                reference.context,
            ],
        )?;

        if inserted > 0 {
            debug!(
                "Reference {} {} -> {}",
                reference.kind, reference.source_id, reference.target_id
            );
        }

        Ok(inserted > 0)
    }

    /// Get symbol by ID
    pub fn get_by_id(&self, id: &str) -> StoreResult<Option<Symbol>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM symbols WHERE id = ?1", SYMBOL_COLUMNS);
        let symbol = conn.query_row(&sql, [id], row_to_symbol).optional()?;
        Ok(symbol)
    }

    /// All symbols recorded for a file, in source order
    pub fn get_in_file(&self, file: &str) -> StoreResult<Vec<Symbol>> {
        let conn = self.conn();
        Ok(query_symbols(
            &conn,
            "file = ?1 ORDER BY line, col",
            params_from_iter([file]),
        )?)
    }

    pub fn get_children(&self, parent_id: &str) -> StoreResult<Vec<Symbol>> {
        let conn = self.conn();
        Ok(query_symbols(
            &conn,
            "parent_id = ?1 ORDER BY line, col",
            params_from_iter([parent_id]),
        )?)
    }

    pub fn find_by_kind(&self, kind: &SymbolKind) -> StoreResult<Vec<Symbol>> {
        let conn = self.conn();
        Ok(query_symbols(
            &conn,
            "kind = ?1 ORDER BY file, line, col",
            params_from_iter([kind.as_str()]),
        )?)
    }

    /// Exact name match, optionally restricted to one language
    pub fn find_by_name(&self, name: &str, language: Option<&str>) -> StoreResult<Vec<Symbol>> {
        let conn = self.conn();
        let symbols = match language {
            Some(language) => query_symbols(
                &conn,
                "name = ?1 AND language = ?2 AND external = 0 ORDER BY rowid",
                params_from_iter([name, language]),
            )?,
            None => query_symbols(
                &conn,
                "name = ?1 AND external = 0 ORDER BY rowid",
                params_from_iter([name]),
            )?,
        };
        Ok(symbols)
    }

    /// First non-placeholder symbol with exactly this qualified name and one
    /// of the given kinds.
    pub fn find_by_qualified_name(&self, name: &str, kinds: &[SymbolKind]) -> StoreResult<Option<Symbol>> {
        let conn = self.conn();
        let clause = format!(
            "name = ?1 AND external = 0 AND kind IN ({}) ORDER BY rowid LIMIT 1",
            placeholders(2, kinds.len())
        );
        let args = std::iter::once(name.to_string()).chain(kinds.iter().map(|k| k.as_str().to_string()));
        Ok(query_symbols(&conn, &clause, params_from_iter(args))?.into_iter().next())
    }

    /// Symbols whose qualified name ends with `\name`, shortest name first.
    pub fn find_by_suffix(&self, name: &str, kinds: &[SymbolKind], limit: usize) -> StoreResult<Vec<Symbol>> {
        let conn = self.conn();
        let suffix = format!("{}{}", NS_SEPARATOR, name);
        let clause = format!(
            "external = 0 AND length(name) > length(?1) AND substr(name, -length(?1)) = ?1
             AND kind IN ({}) ORDER BY length(name), name LIMIT {}",
            placeholders(2, kinds.len()),
            limit
        );
        let args = std::iter::once(suffix).chain(kinds.iter().map(|k| k.as_str().to_string()));
        Ok(query_symbols(&conn, &clause, params_from_iter(args))?)
    }

    /// Symbols whose recorded `extends` list names `name`, either exactly
    /// or as the last segments of a longer qualified name.
    pub fn find_extending(&self, name: &str) -> StoreResult<Vec<Symbol>> {
        self.find_by_declared_supertype("extends", name, |symbol| &symbol.extends)
    }

    /// Symbols whose recorded `implements` list names `name`.
    pub fn find_implementing(&self, name: &str) -> StoreResult<Vec<Symbol>> {
        self.find_by_declared_supertype("implements", name, |symbol| &symbol.implements)
    }

    fn find_by_declared_supertype(
        &self,
        column: &str,
        name: &str,
        names: impl Fn(&Symbol) -> &Vec<String>,
    ) -> StoreResult<Vec<Symbol>> {
        let name = name.trim_start_matches(NS_SEPARATOR);
        if name.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let clause = format!("{col} <> '' AND instr({col}, ?1) > 0 ORDER BY name", col = column);
        let candidates = query_symbols(&conn, &clause, params_from_iter([name]))?;
        Ok(candidates
            .into_iter()
            .filter(|symbol| names(symbol).iter().any(|declared| names_match(declared, name)))
            .collect())
    }

    /// Raw resolution primitive: the ordered lookup chain without caching.
    pub fn resolve_lookup(
        &self,
        name: &str,
        namespace: Option<&str>,
        aliases: &BTreeMap<String, String>,
    ) -> StoreResult<Option<Symbol>> {
        Ok(self.lookup(name, namespace, aliases)?.map(|hit| hit.symbol))
    }

    /// Ordered lookup chain; the first strategy with a hit wins.
    pub fn lookup(
        &self,
        name: &str,
        namespace: Option<&str>,
        aliases: &BTreeMap<String, String>,
    ) -> StoreResult<Option<LookupHit>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let hit = |symbol: Symbol, strategy| LookupHit { symbol, strategy };

        if let Some(rooted) = name.strip_prefix(NS_SEPARATOR) {
            return Ok(self
                .find_by_qualified_name(rooted, TYPE_BEARING_KINDS)?
                .map(|s| hit(s, LookupStrategy::FullyQualified)));
        }

        let (head, rest) = match name.split_once(NS_SEPARATOR) {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };

        if let Some(target) = aliases.get(head) {
            let target = target.trim_start_matches(NS_SEPARATOR);
            let qualified = match rest {
                Some(rest) => format!("{}{}{}", target, NS_SEPARATOR, rest),
                None => target.to_string(),
            };
            if let Some(symbol) = self.find_by_qualified_name(&qualified, TYPE_BEARING_KINDS)? {
                return Ok(Some(hit(symbol, LookupStrategy::Alias)));
            }
        }

        if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
            let qualified = format!("{}{}{}", namespace, NS_SEPARATOR, name);
            if let Some(symbol) = self.find_by_qualified_name(&qualified, TYPE_BEARING_KINDS)? {
                return Ok(Some(hit(symbol, LookupStrategy::CurrentNamespace)));
            }
        }

        if let Some(symbol) = self.find_by_qualified_name(name, TYPE_BEARING_KINDS)? {
            return Ok(Some(hit(symbol, LookupStrategy::Global)));
        }

        if rest.is_none() {
            let mut candidates = self.find_by_suffix(name, TYPE_BEARING_KINDS, 2)?;
            if candidates.len() > 1 {
                debug!(
                    "Ambiguous suffix match for '{}': picking '{}' over '{}'",
                    name, candidates[0].name, candidates[1].name
                );
            }
            if !candidates.is_empty() {
                return Ok(Some(hit(candidates.swap_remove(0), LookupStrategy::Suffix)));
            }
        }

        Ok(None)
    }

    /// True when the file is new or its content hash changed.
    pub fn needs_reparse(&self, file: &str, content_hash: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let stored: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM file_hashes WHERE path = ?1",
                [file],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref() != Some(content_hash))
    }

    pub fn record_file_hash(&self, file: &str, language: &str, content_hash: &str, symbol_count: usize) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO file_hashes (path, language, content_hash, symbol_count, last_indexed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![file, language, content_hash, symbol_count as i64, now()],
        )?;
        Ok(())
    }

    /// Purge the analysis symbols of a file (references touching them
    /// cascade). The file/directory skeleton is left in place.
    pub fn clear_file(&self, file: &str) -> StoreResult<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM symbols WHERE file = ?1 AND kind NOT IN ('file', 'directory')",
            [file],
        )?;
        Ok(removed)
    }

    /// Forget a file entirely: its symbols, skeleton symbol and hash record.
    pub fn remove_file(&self, file: &str) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM symbols WHERE file = ?1", [file])?;
        conn.execute("DELETE FROM file_hashes WHERE path = ?1", [file])?;
        Ok(())
    }

    /// Drop the analysis references a file produced. CONTAINS and DEFINES
    /// edges belong to the file tree and plugins and are kept.
    pub fn clear_file_references(&self, file: &str) -> StoreResult<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM symbol_references WHERE file = ?1 AND kind NOT IN ('CONTAINS', 'DEFINES')",
            [file],
        )?;
        Ok(removed)
    }

    /// Delete placeholder symbols no reference points at any more.
    pub fn prune_placeholders(&self) -> StoreResult<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM symbols WHERE external = 1
             AND NOT EXISTS (SELECT 1 FROM symbol_references r WHERE r.target_id = symbols.id)",
            [],
        )?;
        Ok(removed)
    }

    /// Paths carrying file or directory skeleton symbols.
    pub fn skeleton_paths(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file FROM symbols WHERE kind IN ('file', 'directory') ORDER BY file",
        )?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    pub fn references_from(&self, source_id: &str, kind: Option<&ReferenceKind>) -> StoreResult<Vec<Reference>> {
        let conn = self.conn();
        Ok(query_references(&conn, "source_id", source_id, kind)?)
    }

    pub fn references_to(&self, target_id: &str, kind: Option<&ReferenceKind>) -> StoreResult<Vec<Reference>> {
        let conn = self.conn();
        Ok(query_references(&conn, "target_id", target_id, kind)?)
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn();
        Ok(collect_stats(&conn)?)
    }

    /// Read-only dump of every symbol and reference.
    pub fn dump(&self) -> StoreResult<GraphDump> {
        let conn = self.conn();
        let symbols = query_symbols(&conn, "1 = 1 ORDER BY file, line, col, id", params_from_iter(Vec::<String>::new()))?;

        let sql = format!("SELECT {} FROM symbol_references ORDER BY id", REFERENCE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let references = stmt
            .query_map([], row_to_reference)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(GraphDump { symbols, references })
    }
}

/// Guard for a file-scoped transaction. Dropping it without calling
/// [`commit`](Self::commit) rolls the transaction back.
pub struct StoreTransaction<'a> {
    store: &'a SymbolStore,
    _gate: MutexGuard<'a, ()>,
    finished: bool,
}

impl StoreTransaction<'_> {
    /// Commit. Deferred foreign keys are checked here; on failure the whole
    /// transaction is rolled back and the error returned.
    pub fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        let conn = self.store.conn();
        if let Err(err) = conn.execute_batch("COMMIT") {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                warn!("Rollback after failed commit also failed: {}", rollback_err);
            }
            return Err(err.into());
        }
        Ok(())
    }

    pub fn rollback(mut self) -> StoreResult<()> {
        self.finished = true;
        self.store.conn().execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for StoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Transaction dropped without commit, rolling back");
            if let Err(err) = self.store.conn().execute_batch("ROLLBACK") {
                warn!("Rollback on drop failed: {}", err);
            }
        }
    }
}

/// `?start, ?start+1, ...` for an IN list
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Select symbols with a `WHERE` clause (which may carry ORDER BY / LIMIT).
pub(crate) fn query_symbols<P: rusqlite::Params>(
    conn: &Connection,
    clause: &str,
    params: P,
) -> rusqlite::Result<Vec<Symbol>> {
    let sql = format!("SELECT {} FROM symbols WHERE {}", SYMBOL_COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let symbols = stmt
        .query_map(params, row_to_symbol)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(symbols)
}

pub(crate) fn query_references(
    conn: &Connection,
    column: &str,
    id: &str,
    kind: Option<&ReferenceKind>,
) -> rusqlite::Result<Vec<Reference>> {
    let references = if let Some(kind) = kind {
        let sql = format!(
            "SELECT {} FROM symbol_references WHERE {} = ?1 AND kind = ?2 ORDER BY file, line, col",
            REFERENCE_COLUMNS, column
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_map(params![id, kind.as_str()], row_to_reference)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        result
    } else {
        let sql = format!(
            "SELECT {} FROM symbol_references WHERE {} = ?1 ORDER BY file, line, col",
            REFERENCE_COLUMNS, column
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_map([id], row_to_reference)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        result
    };

    Ok(references)
}

pub(crate) fn collect_stats(conn: &Connection) -> rusqlite::Result<StoreStats> {
    let count = |sql: &str| -> rusqlite::Result<usize> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as usize)
    };
    let grouped = |sql: &str| -> rusqlite::Result<BTreeMap<String, usize>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        rows.collect()
    };

    Ok(StoreStats {
        total_symbols: count("SELECT COUNT(*) FROM symbols")?,
        total_references: count("SELECT COUNT(*) FROM symbol_references")?,
        total_files: count("SELECT COUNT(*) FROM file_hashes")?,
        external_symbols: count("SELECT COUNT(*) FROM symbols WHERE external = 1")?,
        symbols_by_kind: grouped("SELECT kind, COUNT(*) FROM symbols GROUP BY kind")?,
        references_by_kind: grouped("SELECT kind, COUNT(*) FROM symbol_references GROUP BY kind")?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn split_names(text: String) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split(',').map(str::to_string).collect()
    }
}

/// Convert database row to Symbol
fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(1)?;
    let visibility: Option<String> = row.get(10)?;

    Ok(Symbol {
        id: row.get(0)?,
        kind: SymbolKind::from(kind),
        name: row.get(2)?,
        namespace: row.get(3)?,
        parent_id: row.get(4)?,
        location: Location {
            file: row.get(5)?,
            line: row.get(6)?,
            column: row.get(7)?,
            end_line: row.get(8)?,
            end_column: row.get(9)?,
        },
        visibility: visibility.as_deref().and_then(Visibility::parse),
        is_static: row.get(11)?,
        is_abstract: row.get(12)?,
        is_final: row.get(13)?,
        return_type: row.get(14)?,
        parameters: json_column(row, 15)?,
        extends: split_names(row.get(16)?),
        implements: split_names(row.get(17)?),
        language: row.get(18)?,
        metadata: json_column(row, 19)?,
        external: row.get(20)?,
        content_hash: row.get(21)?,
    })
}

/// Convert database row to Reference
fn row_to_reference(row: &Row) -> rusqlite::Result<Reference> {
    let kind: String = row.get(2)?;

    Ok(Reference {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        kind: ReferenceKind::from(kind),
        file: row.get(3)?,
        line: row.get(4)?,
        column: row.get(5)?,
        context: row.get(6)?,
    })
}

/// `Base` matches `Base`, `App\Base` and `\App\Base`, but not `MyBase`.
fn names_match(declared: &str, name: &str) -> bool {
    let declared = declared.trim_start_matches(NS_SEPARATOR);
    declared == name
        || declared
            .strip_suffix(name)
            .is_some_and(|head| head.ends_with(NS_SEPARATOR))
}

/// Current timestamp in seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
