//! DuckDB backend: local data service and identity provider
//!
//! Serves the `users`, `accounts` and `transactions` collections from a
//! single `teller.duckdb` file and keeps local credentials and sessions in
//! `sys_credentials` / `sys_sessions`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use duckdb::{params, Connection};
use rand::Rng;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::adapters::session_file::{SessionSlot, StoredSession};
use crate::domain::result::{Error, Result as CoreResult};
use crate::domain::{AuthSession, AuthUser, Row};
use crate::ports::{DataStore, Filter, IdentityProvider, Order, Table};
use crate::services::migration::{MigrationResult, MigrationService};

/// Provider name recorded with persisted sessions
pub const PROVIDER_NAME: &str = "local";

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const MIN_PASSWORD_LEN: usize = 6;

/// Argon2id cost for local password hashes
const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_TIME_COST: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_HASH_LEN: usize = 32;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// RFC 3339 UTC with nanoseconds; fixed width, so text order is time order
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Text,
    Integer,
}

/// Column layout of each collection, in select order
fn table_columns(table: Table) -> &'static [(&'static str, ColumnType)] {
    use ColumnType::*;
    match table {
        Table::Users => &[
            ("id", Text),
            ("username", Text),
            ("full_name", Text),
            ("created_at", Text),
        ],
        Table::Accounts => &[
            ("id", Text),
            ("user_id", Text),
            ("account_number", Text),
            ("type", Text),
            ("balance", Integer),
            ("created_at", Text),
        ],
        Table::Transactions => &[
            ("id", Text),
            ("account_id", Text),
            ("type", Text),
            ("amount", Integer),
            ("balance_after", Integer),
            ("created_at", Text),
        ],
    }
}

fn column_type(table: Table, column: &str) -> Result<ColumnType> {
    table_columns(table)
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, ty)| *ty)
        .ok_or_else(|| anyhow!("unknown column '{}' on {}", column, table))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_list(table: Table) -> String {
    table_columns(table)
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a JSON value to a DuckDB parameter for a column of type `ty`
fn json_to_duckdb_param(value: &JsonValue, ty: ColumnType) -> Result<Box<dyn duckdb::ToSql>> {
    match (ty, value) {
        (_, JsonValue::Null) => Ok(Box::new(None::<String>)),
        (ColumnType::Integer, JsonValue::Number(n)) => n
            .as_i64()
            .map(|i| Box::new(i) as Box<dyn duckdb::ToSql>)
            .ok_or_else(|| anyhow!("expected an integer, got {}", n)),
        (ColumnType::Integer, other) => bail!("expected an integer, got {}", other),
        (ColumnType::Text, JsonValue::String(s)) => Ok(Box::new(s.clone())),
        (ColumnType::Text, JsonValue::Number(n)) => Ok(Box::new(n.to_string())),
        (ColumnType::Text, JsonValue::Bool(b)) => Ok(Box::new(b.to_string())),
        (ColumnType::Text, other) => bail!("cannot store {} in a text column", other),
    }
}

fn read_row(table: Table, row: &duckdb::Row) -> duckdb::Result<Row> {
    let mut out = Row::new();
    for (idx, (name, ty)) in table_columns(table).iter().enumerate() {
        let value = match ty {
            ColumnType::Text => row
                .get::<_, Option<String>>(idx)?
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
            ColumnType::Integer => row
                .get::<_, Option<i64>>(idx)?
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
        };
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

/// WHERE clause and parameters for equality filters
fn where_clause(table: Table, filters: &[Filter]) -> Result<(String, Vec<Box<dyn duckdb::ToSql>>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for filter in filters {
        let ty = column_type(table, &filter.column)?;
        clauses.push(format!("{} = ?", quote_ident(&filter.column)));
        params.push(json_to_duckdb_param(&filter.value, ty)?);
    }
    Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
}

fn hash_password(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let params = argon2::Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(ARGON2_HASH_LEN),
    )
    .map_err(|e| anyhow!("Failed to create argon2 params: {:?}", e))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut hash = vec![0u8; ARGON2_HASH_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| anyhow!("Password hashing failed: {:?}", e))?;
    Ok(hash)
}

fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

struct Credentials {
    user_id: Uuid,
    email: String,
    salt: String,
    hash: String,
    metadata: JsonValue,
}

impl Credentials {
    fn auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.user_id,
            email: self.email.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Local data service and identity provider backed by DuckDB
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    session: SessionSlot,
}

impl DuckDbBackend {
    /// Open (or create) the database at `db_path` and apply pending migrations
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when two CLI invocations open the file at the same time.
    pub fn open(db_path: &Path, session: SessionSlot) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    let backend = Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        session,
                    };
                    backend.ensure_schema()?;
                    return Ok(backend);
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[teller] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory database with an in-memory session, for tests and embedding
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let backend = Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: PathBuf::from(":memory:"),
            session: SessionSlot::memory(),
        };
        backend.ensure_schema()?;
        Ok(backend)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Extension autoloading is off; cached extensions may not be signed
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.connection()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the schema is up to date (runs any pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn select_rows(&self, table: Table, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>> {
        let (clause, params) = where_clause(table, filters)?;
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            select_list(table),
            quote_ident(table.as_str()),
            clause
        );
        if let Some(order) = order {
            column_type(table, &order.column)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(&order.column),
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }

        let conn = self.connection()?;
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(table, row)?);
        }
        Ok(out)
    }

    fn insert_row(&self, table: Table, mut row: Row) -> Result<Row> {
        row.entry("id".to_string())
            .or_insert_with(|| JsonValue::String(Uuid::new_v4().to_string()));
        row.entry("created_at".to_string())
            .or_insert_with(|| JsonValue::String(now_timestamp()));

        let mut columns = Vec::with_capacity(row.len());
        let mut params = Vec::with_capacity(row.len());
        for (column, value) in &row {
            let ty = column_type(table, column)?;
            columns.push(quote_ident(column));
            params.push(json_to_duckdb_param(value, ty)?);
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quote_ident(table.as_str()),
            columns.join(", "),
            vec!["?"; columns.len()].join(", "),
            select_list(table)
        );

        let conn = self.connection()?;
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;
        match rows.next()? {
            Some(stored) => Ok(read_row(table, stored)?),
            None => bail!("insert into {} returned no row", table),
        }
    }

    fn update_rows(&self, table: Table, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        if filters.is_empty() {
            bail!("refusing to update every row of {}", table);
        }
        if patch.is_empty() {
            bail!("empty update for {}", table);
        }

        let mut assignments = Vec::with_capacity(patch.len());
        let mut params = Vec::with_capacity(patch.len() + filters.len());
        for (column, value) in &patch {
            if column == "id" {
                bail!("the id column cannot be updated");
            }
            let ty = column_type(table, column)?;
            assignments.push(format!("{} = ?", quote_ident(column)));
            params.push(json_to_duckdb_param(value, ty)?);
        }
        let (clause, filter_params) = where_clause(table, filters)?;
        params.extend(filter_params);

        let sql = format!(
            "UPDATE {} SET {}{} RETURNING {}",
            quote_ident(table.as_str()),
            assignments.join(", "),
            clause,
            select_list(table)
        );

        let conn = self.connection()?;
        let param_refs: Vec<&dyn duckdb::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(table, row)?);
        }
        Ok(out)
    }

    fn find_credentials(&self, conn: &Connection, column: &str, value: &str) -> Result<Option<Credentials>> {
        let sql = format!(
            "SELECT user_id, email, password_salt, password_hash, metadata FROM sys_credentials WHERE {} = ?",
            quote_ident(column)
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([value])?;
        let row = match rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: String = row.get(0)?;
        let metadata: String = row.get(4)?;
        Ok(Some(Credentials {
            user_id: Uuid::parse_str(&user_id)?,
            email: row.get(1)?,
            salt: row.get(2)?,
            hash: row.get(3)?,
            metadata: serde_json::from_str(&metadata).unwrap_or(JsonValue::Null),
        }))
    }

    fn register(&self, email: &str, password: &str, metadata: &JsonValue) -> CoreResult<AuthUser> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(Error::auth("Unable to validate email address: invalid format"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::auth(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let result: Result<Option<AuthUser>> = (|| {
            let conn = self.connection()?;
            if self.find_credentials(&conn, "email", &email)?.is_some() {
                return Ok(None);
            }

            let salt: [u8; 16] = rand::thread_rng().gen();
            let hash = hash_password(password, &salt)?;
            let user = AuthUser {
                id: Uuid::new_v4(),
                email: email.clone(),
                metadata: metadata.clone(),
            };

            conn.execute(
                "INSERT INTO sys_credentials (user_id, email, password_salt, password_hash, metadata, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    user.id.to_string(),
                    &user.email,
                    base64::engine::general_purpose::STANDARD.encode(salt),
                    hex::encode(&hash),
                    serde_json::to_string(metadata)?,
                    now_timestamp(),
                ],
            )?;
            Ok(Some(user))
        })();

        match result {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(Error::auth("User already registered")),
            Err(e) => Err(Error::auth(format!("sign-up failed: {}", e))),
        }
    }

    fn verify(&self, email: &str, password: &str) -> CoreResult<AuthUser> {
        let email = normalize_email(email);

        let result: Result<Option<AuthUser>> = (|| {
            let conn = self.connection()?;
            let creds = match self.find_credentials(&conn, "email", &email)? {
                Some(creds) => creds,
                None => return Ok(None),
            };
            let salt = base64::engine::general_purpose::STANDARD
                .decode(&creds.salt)
                .map_err(|e| anyhow!("Invalid stored salt: {}", e))?;
            let expected = hex::decode(&creds.hash)?;
            let actual = hash_password(password, &salt)?;
            Ok(constant_time_eq(&expected, &actual).then(|| creds.auth_user()))
        })();

        match result {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(Error::auth("Invalid login credentials")),
            Err(e) => Err(Error::auth(format!("sign-in failed: {}", e))),
        }
    }

    /// Issue a session token for `user` and persist it
    fn start_session(&self, user: AuthUser) -> CoreResult<AuthSession> {
        let result: Result<AuthSession> = (|| {
            let token_bytes: [u8; 32] = rand::thread_rng().gen();
            let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes);

            self.connection()?.execute(
                "INSERT INTO sys_sessions (token_hash, user_id, created_at) VALUES (?, ?, ?)",
                params![token_hash(&token), user.id.to_string(), now_timestamp()],
            )?;

            let session = AuthSession {
                access_token: token,
                user,
            };
            self.session.save(&StoredSession {
                provider: PROVIDER_NAME.to_string(),
                session: session.clone(),
            })?;
            Ok(session)
        })();

        result.map_err(|e| Error::auth(format!("could not start session: {}", e)))
    }

    fn lookup_session(&self) -> Result<Option<AuthSession>> {
        let stored = match self.session.load(PROVIDER_NAME)? {
            Some(stored) => stored,
            None => return Ok(None),
        };

        let conn = self.connection()?;
        let user_id: Option<String> = {
            let mut stmt = conn.prepare("SELECT user_id FROM sys_sessions WHERE token_hash = ?")?;
            let mut rows = stmt.query([token_hash(&stored.session.access_token)])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        let creds = match user_id {
            Some(id) => self.find_credentials(&conn, "user_id", &id)?,
            None => None,
        };
        drop(conn);

        match creds {
            Some(creds) => Ok(Some(AuthSession {
                access_token: stored.session.access_token,
                user: creds.auth_user(),
            })),
            None => {
                // Revoked or from another database
                self.session.clear()?;
                Ok(None)
            }
        }
    }

    fn end_session(&self) -> Result<()> {
        let stored = self.session.load(PROVIDER_NAME)?;
        self.session.clear()?;
        if let Some(stored) = stored {
            self.connection()?.execute(
                "DELETE FROM sys_sessions WHERE token_hash = ?",
                [token_hash(&stored.session.access_token)],
            )?;
        }
        Ok(())
    }
}

impl DataStore for DuckDbBackend {
    fn select(&self, table: Table, filters: &[Filter], order: Option<&Order>) -> CoreResult<Vec<Row>> {
        self.select_rows(table, filters, order)
            .map_err(|e| Error::persistence(format!("select from {} failed: {}", table, e)))
    }

    fn insert(&self, table: Table, row: Row) -> CoreResult<Row> {
        self.insert_row(table, row)
            .map_err(|e| Error::persistence(format!("insert into {} failed: {}", table, e)))
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> CoreResult<Vec<Row>> {
        self.update_rows(table, filters, patch)
            .map_err(|e| Error::persistence(format!("update of {} failed: {}", table, e)))
    }
}

impl IdentityProvider for DuckDbBackend {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn get_session(&self) -> CoreResult<Option<AuthSession>> {
        self.lookup_session()
            .map_err(|e| Error::auth(format!("could not read session: {}", e)))
    }

    fn sign_up(&self, email: &str, password: &str, metadata: &JsonValue) -> CoreResult<AuthSession> {
        let user = self.register(email, password, metadata)?;
        self.start_session(user)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> CoreResult<AuthSession> {
        let user = self.verify(email, password)?;
        self.start_session(user)
    }

    fn sign_out(&self) -> CoreResult<()> {
        self.end_session()
            .map_err(|e| Error::auth(format!("sign-out failed: {}", e)))
    }
}
