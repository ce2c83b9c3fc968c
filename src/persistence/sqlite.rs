use super::{check_identifier, CellValue, PersistenceGateway, Record};
use crate::error::PersistenceError;
use rusqlite::types::{Null, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Log IO-related store errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation; the caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!("[DB] {}: Disk full. Free space on the drive holding the store.", context);
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check the store directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                warn!("[DB] {}: Store is locked by another process.", context);
            }
            _ => {}
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::from(Null),
            CellValue::Integer(i) => ToSqlOutput::from(*i),
            CellValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

fn cell_from_value(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Text(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            CellValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

/// SQLite-backed gateway. Each logical table becomes an SQLite table whose
/// columns are the record keys; column types are left to SQLite affinity.
pub struct SqliteGateway {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Current store version (PRAGMA user_version).
    const STORE_VERSION: i32 = 1;

    /// Lock the connection, mapping a poisoned mutex to a typed error
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|e| {
            PersistenceError::Poisoned(format!(
                "store mutex poisoned: {}. A panic occurred while holding the lock.",
                e
            ))
        })
    }

    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            log_io_error_if_any("open", &e);
            e
        })?;

        // Detect corruption before touching the schema
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
        if !integrity.eq_ignore_ascii_case("ok") {
            return Err(PersistenceError::Unavailable(format!(
                "store corruption detected in {}: {}",
                path.display(),
                integrity
            )));
        }

        let gateway = Self::configure(conn, busy_timeout)?;
        info!("[DB] Opened store at {}", path.display());
        Ok(gateway)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::configure(Connection::open_in_memory()?, Duration::ZERO)
    }

    fn configure(conn: Connection, busy_timeout: Duration) -> Result<Self, PersistenceError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        // Zero disables the busy handler: a locked store fails fast
        conn.busy_timeout(busy_timeout)?;

        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if current < Self::STORE_VERSION {
            conn.pragma_update(None, "user_version", Self::STORE_VERSION)?;
        } else if current > Self::STORE_VERSION {
            warn!(
                "[DB] Store version {} is newer than supported {}",
                current,
                Self::STORE_VERSION
            );
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
    }

    fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Create the table from the record header, or add columns it lacks.
    fn ensure_table(conn: &Connection, table: &str, columns: &[&str]) -> rusqlite::Result<()> {
        let existing = Self::table_columns(conn, table)?;
        if existing.is_empty() {
            let header = columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute(
                &format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(table), header),
                [],
            )?;
            debug!("[DB] Created table {} ({})", table, header);
            return Ok(());
        }
        for column in columns {
            if !existing.iter().any(|c| c == column) {
                conn.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        quote_ident(table),
                        quote_ident(column)
                    ),
                    [],
                )?;
                info!("[DB] Added column {} to {}", column, table);
            }
        }
        Ok(())
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        args: &[&dyn ToSql],
    ) -> rusqlite::Result<Vec<Record>> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(args, |row| {
                let mut record = Record::new();
                for (i, name) in names.iter().enumerate() {
                    record.set(name, cell_from_value(row.get_ref(i)?));
                }
                Ok(record)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Run `op` inside BEGIN IMMEDIATE; commit on success, roll back otherwise.
    fn write_transaction<T>(
        &self,
        context: &str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, PersistenceError> {
        let conn = self.lock_conn()?;

        // BEGIN IMMEDIATE takes the write lock up front so a busy store fails here
        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any(context, &e);
            error!("[DB] {}: failed to begin transaction: {}", context, e);
            e
        })?;

        match op(&*conn) {
            Ok(value) => {
                conn.execute("COMMIT", []).map_err(|e| {
                    log_io_error_if_any(context, &e);
                    error!("[DB] {}: failed to commit transaction: {}", context, e);
                    let _ = conn.execute("ROLLBACK", []);
                    e
                })?;
                Ok(value)
            }
            Err(e) => {
                log_io_error_if_any(context, &e);
                error!("[DB] {}: {}. Rolling back transaction.", context, e);
                let _ = conn.execute("ROLLBACK", []);
                Err(e.into())
            }
        }
    }
}

impl PersistenceGateway for SqliteGateway {
    fn append(&self, table: &str, record: &Record) -> Result<(), PersistenceError> {
        check_identifier("table", table)?;
        if record.is_empty() {
            return Err(PersistenceError::Schema(format!(
                "refusing to append an empty record to {}",
                table
            )));
        }
        for column in record.columns() {
            check_identifier("column", column)?;
        }

        let columns: Vec<&str> = record.columns().collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.write_transaction("append", |conn| {
            Self::ensure_table(conn, table, &columns)?;
            conn.execute(&sql, params_from_iter(record.iter().map(|(_, v)| v)))?;
            Ok(())
        })
    }

    fn select_all(&self, table: &str) -> Result<Vec<Record>, PersistenceError> {
        check_identifier("table", table)?;
        let conn = self.lock_conn()?;
        if !Self::table_exists(&conn, table)? {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
        Ok(Self::query_records(&conn, &sql, &[])?)
    }

    fn select_where(
        &self,
        table: &str,
        column: &str,
        value: &CellValue,
    ) -> Result<Vec<Record>, PersistenceError> {
        check_identifier("table", table)?;
        check_identifier("column", column)?;
        let conn = self.lock_conn()?;
        if !Self::table_columns(&conn, table)?.iter().any(|c| c == column) {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY rowid",
            quote_ident(table),
            quote_ident(column)
        );
        Ok(Self::query_records(&conn, &sql, &[value as &dyn ToSql])?)
    }

    fn update_where(
        &self,
        table: &str,
        key_column: &str,
        key: &CellValue,
        column: &str,
        value: &CellValue,
    ) -> Result<usize, PersistenceError> {
        check_identifier("table", table)?;
        check_identifier("column", key_column)?;
        check_identifier("column", column)?;

        self.write_transaction("update_where", |conn| {
            let existing = Self::table_columns(conn, table)?;
            if !existing.iter().any(|c| c == key_column) {
                return Ok(0);
            }
            Self::ensure_table(conn, table, &[column])?;
            conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    quote_ident(table),
                    quote_ident(column),
                    quote_ident(key_column)
                ),
                params![value, key],
            )
        })
    }
}
