//! SQLite Persistent Storage for the Casino Ledger
//!
//! Durable storage for users, wallets, games, sessions, and the
//! append-only transaction ledger. Uses connection pooling via r2d2 for
//! concurrent access.
//!
//! Balance mutations run inside a single `BEGIN IMMEDIATE` transaction
//! opened through [`SqliteCasinoStore::with_tx`]: the statement takes the
//! database writer lock at once, so the (read wallet, update balance,
//! append entry) sequence of one request never interleaves with another
//! writer. The lock lives in the database file, not in this process.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

use super::{StorageError, StorageResult};
use crate::types::{
    CachedResponse, Game, GameProvider, GameSession, NewTransaction, TransactionKind,
    TransactionRecord, User, Wallet,
};

/// SQLite-backed casino store with connection pooling
pub struct SqliteCasinoStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCasinoStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS casino_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS casino_game_providers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                api_url TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS casino_games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_id INTEGER NOT NULL
                    REFERENCES casino_game_providers(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                external_game_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS casino_wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL
                    REFERENCES casino_users(id) ON DELETE CASCADE,
                currency TEXT NOT NULL,
                playable_balance INTEGER NOT NULL DEFAULT 0
                    CHECK (playable_balance >= 0),
                redeemable_balance INTEGER NOT NULL DEFAULT 0
                    CHECK (redeemable_balance >= 0),
                created_at INTEGER NOT NULL,
                UNIQUE (user_id, currency)
            );

            CREATE TABLE IF NOT EXISTS casino_game_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL
                    REFERENCES casino_users(id) ON DELETE CASCADE,
                wallet_id INTEGER NOT NULL
                    REFERENCES casino_wallets(id) ON DELETE CASCADE,
                game_id INTEGER NOT NULL
                    REFERENCES casino_games(id) ON DELETE CASCADE,
                provider_session_id TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                ended_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS casino_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_transaction_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL CHECK (amount >= 0),
                wallet_id INTEGER NOT NULL
                    REFERENCES casino_wallets(id) ON DELETE CASCADE,
                session_id INTEGER NOT NULL
                    REFERENCES casino_game_sessions(id) ON DELETE CASCADE,
                round_id TEXT,
                related_external_transaction_id TEXT,
                balance_after INTEGER NOT NULL,
                response_cache TEXT NOT NULL,
                is_rollback INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_casino_transactions_wallet
                ON casino_transactions(wallet_id);
            CREATE INDEX IF NOT EXISTS idx_casino_transactions_related
                ON casino_transactions(related_external_transaction_id);
            CREATE INDEX IF NOT EXISTS idx_casino_game_sessions_user
                ON casino_game_sessions(user_id);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    // =========================================================================
    // Users, providers, games
    // =========================================================================

    /// Insert a user
    pub fn create_user(&self, username: &str, email: &str) -> StorageResult<User> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO casino_users (username, email, created_at) VALUES (?1, ?2, ?3)",
            params![username, email, now],
        )
        .map_err(|e| map_constraint_error(e, username))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            created_at: now,
        })
    }

    /// Get a user by id
    pub fn get_user(&self, id: i64) -> StorageResult<Option<User>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id, username, email, created_at FROM casino_users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Insert a game provider
    pub fn create_provider(
        &self,
        name: &str,
        api_url: &str,
        enabled: bool,
    ) -> StorageResult<GameProvider> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO casino_game_providers (name, api_url, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, api_url, enabled as i64, now],
        )
        .map_err(|e| map_constraint_error(e, name))?;

        Ok(GameProvider {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            api_url: api_url.to_string(),
            enabled,
            created_at: now,
        })
    }

    /// Get a provider by id
    pub fn get_provider(&self, id: i64) -> StorageResult<Option<GameProvider>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id, name, api_url, enabled, created_at
             FROM casino_game_providers WHERE id = ?1",
            params![id],
            Self::row_to_provider,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Insert a game
    pub fn create_game(
        &self,
        provider_id: i64,
        name: &str,
        external_game_id: &str,
        active: bool,
    ) -> StorageResult<Game> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO casino_games (provider_id, name, external_game_id, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![provider_id, name, external_game_id, active as i64, now],
        )
        .map_err(|e| map_constraint_error(e, name))?;

        Ok(Game {
            id: conn.last_insert_rowid(),
            provider_id,
            name: name.to_string(),
            external_game_id: external_game_id.to_string(),
            active,
            created_at: now,
        })
    }

    /// Get a game by id
    pub fn get_game(&self, id: i64) -> StorageResult<Option<Game>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id, provider_id, name, external_game_id, active, created_at
             FROM casino_games WHERE id = ?1",
            params![id],
            Self::row_to_game,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Get the wallet for (user, currency), creating it with zero balance
    /// on first use. The UNIQUE index makes concurrent creation converge
    /// on a single row.
    pub fn get_or_create_wallet(&self, user_id: i64, currency: &str) -> StorageResult<Wallet> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT OR IGNORE INTO casino_wallets (user_id, currency, created_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, currency, now],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        conn.query_row(
            "SELECT id, user_id, currency, playable_balance, redeemable_balance, created_at
             FROM casino_wallets WHERE user_id = ?1 AND currency = ?2",
            params![user_id, currency],
            Self::row_to_wallet,
        )
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Get a wallet by id, without locking
    pub fn get_wallet(&self, id: i64) -> StorageResult<Option<Wallet>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id, user_id, currency, playable_balance, redeemable_balance, created_at
             FROM casino_wallets WHERE id = ?1",
            params![id],
            Self::row_to_wallet,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a new game session
    pub fn insert_session(
        &self,
        token: &str,
        user_id: i64,
        wallet_id: i64,
        game_id: i64,
    ) -> StorageResult<GameSession> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT INTO casino_game_sessions (token, user_id, wallet_id, game_id, active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![token, user_id, wallet_id, game_id, now],
        )
        .map_err(|e| map_constraint_error(e, token))?;

        Ok(GameSession {
            id: conn.last_insert_rowid(),
            token: token.to_string(),
            user_id,
            wallet_id,
            game_id,
            provider_session_id: None,
            active: true,
            created_at: now,
            ended_at: None,
        })
    }

    /// Look up a session by token, active or not
    pub fn session_by_token(&self, token: &str) -> StorageResult<Option<GameSession>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id, token, user_id, wallet_id, game_id, provider_session_id,
                    active, created_at, ended_at
             FROM casino_game_sessions WHERE token = ?1",
            params![token],
            Self::row_to_session,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Record the provider's own session id after a launch ack
    pub fn set_provider_session_id(
        &self,
        session_id: i64,
        provider_session_id: &str,
    ) -> StorageResult<()> {
        let conn = self.conn()?;

        let updated = conn
            .execute(
                "UPDATE casino_game_sessions SET provider_session_id = ?1 WHERE id = ?2",
                params![provider_session_id, session_id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    /// Mark a session ended. Returns false when the token is unknown.
    pub fn end_session(&self, token: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();

        let updated = conn
            .execute(
                "UPDATE casino_game_sessions SET active = 0, ended_at = ?1 WHERE token = ?2",
                params![now, token],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    // =========================================================================
    // Ledger entries
    // =========================================================================

    /// Look up a ledger entry by its external transaction id
    pub fn find_transaction(&self, external_id: &str) -> StorageResult<Option<TransactionRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("{} WHERE external_transaction_id = ?1", SELECT_TRANSACTION),
            params![external_id],
            Self::row_to_transaction,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Find the rollback entry that reversed the given original, if any
    pub fn find_reversal(&self, original_external_id: &str) -> StorageResult<Option<TransactionRecord>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "{} WHERE kind = 'rollback' AND related_external_transaction_id = ?1",
                SELECT_TRANSACTION
            ),
            params![original_external_id],
            Self::row_to_transaction,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// All ledger entries for a wallet in insertion order
    pub fn transactions_for_wallet(&self, wallet_id: i64) -> StorageResult<Vec<TransactionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE wallet_id = ?1 ORDER BY id ASC",
                SELECT_TRANSACTION
            ))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![wallet_id], Self::row_to_transaction)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StorageError::Database(e.to_string()))?);
        }
        Ok(records)
    }

    /// Append a ledger entry that moves no money (tombstones and
    /// idempotency markers). A single INSERT is atomic on its own; a
    /// duplicate external id maps to `StorageError::Duplicate`.
    pub fn append_transaction(&self, entry: &NewTransaction<'_>) -> StorageResult<TransactionRecord> {
        let conn = self.conn()?;
        Self::insert_transaction_with(&conn, entry)
    }

    // =========================================================================
    // Transactional core
    // =========================================================================

    /// Run `f` inside a single `BEGIN IMMEDIATE` transaction.
    ///
    /// The transaction takes the database writer lock up front, so wallet
    /// reads made through [`Self::wallet_for_update`] are stable until
    /// commit. Commits on `Ok`, rolls back on `Err`.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.conn().map_err(E::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(StorageError::Database(e.to_string())))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| E::from(StorageError::Database(e.to_string())))?;
        Ok(value)
    }

    /// Read a wallet under the open write transaction's lock.
    ///
    /// Only callable with a transaction started by [`Self::with_tx`]; the
    /// returned state cannot change before the caller commits or aborts.
    pub fn wallet_for_update(tx: &Transaction<'_>, wallet_id: i64) -> StorageResult<Wallet> {
        tx.query_row(
            "SELECT id, user_id, currency, playable_balance, redeemable_balance, created_at
             FROM casino_wallets WHERE id = ?1",
            params![wallet_id],
            Self::row_to_wallet,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Write a wallet's playable balance under the open transaction
    pub fn set_wallet_balance(
        tx: &Transaction<'_>,
        wallet_id: i64,
        new_balance: i64,
    ) -> StorageResult<()> {
        let updated = tx
            .execute(
                "UPDATE casino_wallets SET playable_balance = ?1 WHERE id = ?2",
                params![new_balance, wallet_id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("wallet {}", wallet_id)));
        }
        Ok(())
    }

    /// Append a ledger entry under the open transaction
    pub fn insert_transaction(
        tx: &Transaction<'_>,
        entry: &NewTransaction<'_>,
    ) -> StorageResult<TransactionRecord> {
        Self::insert_transaction_with(tx, entry)
    }

    /// Re-read a ledger entry under the open transaction. Used to
    /// re-check an original's reversal state once the wallet lock is
    /// held, since the pre-check ran outside the transaction.
    pub fn transaction_by_external_id(
        tx: &Transaction<'_>,
        external_id: &str,
    ) -> StorageResult<Option<TransactionRecord>> {
        tx.query_row(
            &format!("{} WHERE external_transaction_id = ?1", SELECT_TRANSACTION),
            params![external_id],
            Self::row_to_transaction,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Flag the original debit as reversed, under the open transaction
    pub fn mark_rolled_back(tx: &Transaction<'_>, external_id: &str) -> StorageResult<()> {
        let updated = tx
            .execute(
                "UPDATE casino_transactions SET is_rollback = 1
                 WHERE external_transaction_id = ?1",
                params![external_id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("transaction {}", external_id)));
        }
        Ok(())
    }

    fn insert_transaction_with(
        conn: &rusqlite::Connection,
        entry: &NewTransaction<'_>,
    ) -> StorageResult<TransactionRecord> {
        let now = chrono::Utc::now().timestamp();
        let cache_json = serde_json::to_string(entry.response_cache)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        conn.execute(
            "INSERT INTO casino_transactions
                 (external_transaction_id, kind, amount, wallet_id, session_id, round_id,
                  related_external_transaction_id, balance_after, response_cache,
                  is_rollback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.external_transaction_id,
                entry.kind.to_string(),
                entry.amount,
                entry.wallet_id,
                entry.session_id,
                entry.round_id,
                entry.related_external_transaction_id,
                entry.balance_after,
                cache_json,
                entry.is_rollback as i64,
                now,
            ],
        )
        .map_err(|e| map_constraint_error(e, entry.external_transaction_id))?;

        Ok(TransactionRecord {
            id: conn.last_insert_rowid(),
            external_transaction_id: entry.external_transaction_id.to_string(),
            kind: entry.kind,
            amount: entry.amount,
            wallet_id: entry.wallet_id,
            session_id: entry.session_id,
            round_id: entry.round_id.map(str::to_string),
            related_external_transaction_id: entry
                .related_external_transaction_id
                .map(str::to_string),
            balance_after: entry.balance_after,
            response_cache: entry.response_cache.clone(),
            is_rollback: entry.is_rollback,
            created_at: now,
        })
    }

    // =========================================================================
    // Row mapping
    // =========================================================================

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_provider(row: &rusqlite::Row) -> rusqlite::Result<GameProvider> {
        Ok(GameProvider {
            id: row.get("id")?,
            name: row.get("name")?,
            api_url: row.get("api_url")?,
            enabled: row.get::<_, i64>("enabled")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<Game> {
        Ok(Game {
            id: row.get("id")?,
            provider_id: row.get("provider_id")?,
            name: row.get("name")?,
            external_game_id: row.get("external_game_id")?,
            active: row.get::<_, i64>("active")? != 0,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<Wallet> {
        Ok(Wallet {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            currency: row.get("currency")?,
            playable_balance: row.get("playable_balance")?,
            redeemable_balance: row.get("redeemable_balance")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<GameSession> {
        Ok(GameSession {
            id: row.get("id")?,
            token: row.get("token")?,
            user_id: row.get("user_id")?,
            wallet_id: row.get("wallet_id")?,
            game_id: row.get("game_id")?,
            provider_session_id: row.get("provider_session_id")?,
            active: row.get::<_, i64>("active")? != 0,
            created_at: row.get("created_at")?,
            ended_at: row.get("ended_at")?,
        })
    }

    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        let kind_str: String = row.get("kind")?;
        let kind: TransactionKind = kind_str.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown transaction kind: {}", kind_str).into(),
            )
        })?;

        let cache_json: String = row.get("response_cache")?;
        let response_cache: CachedResponse = serde_json::from_str(&cache_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(TransactionRecord {
            id: row.get("id")?,
            external_transaction_id: row.get("external_transaction_id")?,
            kind,
            amount: row.get("amount")?,
            wallet_id: row.get("wallet_id")?,
            session_id: row.get("session_id")?,
            round_id: row.get("round_id")?,
            related_external_transaction_id: row.get("related_external_transaction_id")?,
            balance_after: row.get("balance_after")?,
            response_cache,
            is_rollback: row.get::<_, i64>("is_rollback")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

const SELECT_TRANSACTION: &str = "SELECT id, external_transaction_id, kind, amount, wallet_id, \
     session_id, round_id, related_external_transaction_id, balance_after, response_cache, \
     is_rollback, created_at FROM casino_transactions";

/// Map a constraint violation to `Duplicate`, anything else to `Database`
fn map_constraint_error(err: rusqlite::Error, id: &str) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::Duplicate(id.to_string())
        }
        _ => StorageError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (SqliteCasinoStore, Wallet, GameSession) {
        let store = SqliteCasinoStore::in_memory().unwrap();
        let user = store.create_user("alice", "alice@example.com").unwrap();
        let provider = store
            .create_provider("acme-games", "http://provider.test", true)
            .unwrap();
        let game = store.create_game(provider.id, "Book of Crabs", "boc-1", true).unwrap();
        let wallet = store.get_or_create_wallet(user.id, "USD").unwrap();
        let session = store
            .insert_session("deadbeef", user.id, wallet.id, game.id)
            .unwrap();
        (store, wallet, session)
    }

    #[test]
    fn test_wallet_created_once_per_user_currency() {
        let store = SqliteCasinoStore::in_memory().unwrap();
        let user = store.create_user("bob", "bob@example.com").unwrap();

        let first = store.get_or_create_wallet(user.id, "USD").unwrap();
        let second = store.get_or_create_wallet(user.id, "USD").unwrap();
        let other = store.get_or_create_wallet(user.id, "EUR").unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.playable_balance, 0);
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = SqliteCasinoStore::in_memory().unwrap();
        store.create_user("carol", "carol@example.com").unwrap();

        let err = store.create_user("carol", "other@example.com").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));
    }

    #[test]
    fn test_session_lifecycle() {
        let (store, _wallet, session) = seeded_store();

        let resolved = store.session_by_token(&session.token).unwrap().unwrap();
        assert!(resolved.active);
        assert!(resolved.provider_session_id.is_none());

        store
            .set_provider_session_id(session.id, "prov-sess-9")
            .unwrap();
        let resolved = store.session_by_token(&session.token).unwrap().unwrap();
        assert_eq!(resolved.provider_session_id.as_deref(), Some("prov-sess-9"));

        assert!(store.end_session(&session.token).unwrap());
        let resolved = store.session_by_token(&session.token).unwrap().unwrap();
        assert!(!resolved.active);
        assert!(resolved.ended_at.is_some());

        assert!(!store.end_session("unknown-token").unwrap());
    }

    #[test]
    fn test_duplicate_external_id_maps_to_duplicate() {
        let (store, wallet, session) = seeded_store();
        let cache = CachedResponse::money_moved("t1", 0, "USD");
        let entry = NewTransaction {
            external_transaction_id: "t1",
            kind: TransactionKind::Debit,
            amount: 100,
            wallet_id: wallet.id,
            session_id: session.id,
            round_id: Some("r1"),
            related_external_transaction_id: None,
            balance_after: 0,
            response_cache: &cache,
            is_rollback: false,
        };

        store.append_transaction(&entry).unwrap();
        let err = store.append_transaction(&entry).unwrap_err();

        assert!(matches!(err, StorageError::Duplicate(id) if id == "t1"));
    }

    #[test]
    fn test_with_tx_commits_on_ok_and_rolls_back_on_err() {
        let (store, wallet, session) = seeded_store();
        let cache = CachedResponse::money_moved("t1", 500, "USD");

        store
            .with_tx::<_, StorageError>(|tx| {
                SqliteCasinoStore::set_wallet_balance(tx, wallet.id, 500)?;
                SqliteCasinoStore::insert_transaction(
                    tx,
                    &NewTransaction {
                        external_transaction_id: "t1",
                        kind: TransactionKind::Credit,
                        amount: 500,
                        wallet_id: wallet.id,
                        session_id: session.id,
                        round_id: None,
                        related_external_transaction_id: None,
                        balance_after: 500,
                        response_cache: &cache,
                        is_rollback: false,
                    },
                )?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_wallet(wallet.id).unwrap().unwrap().playable_balance, 500);

        // A failing closure must leave both the wallet and the ledger untouched
        let result = store.with_tx::<(), StorageError>(|tx| {
            SqliteCasinoStore::set_wallet_balance(tx, wallet.id, 9_999)?;
            Err(StorageError::InvalidData("forced abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.get_wallet(wallet.id).unwrap().unwrap().playable_balance, 500);
        assert_eq!(store.transactions_for_wallet(wallet.id).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_rolled_back_and_find_reversal() {
        let (store, wallet, session) = seeded_store();
        let debit_cache = CachedResponse::money_moved("bet-1", 900, "USD");
        store
            .append_transaction(&NewTransaction {
                external_transaction_id: "bet-1",
                kind: TransactionKind::Debit,
                amount: 100,
                wallet_id: wallet.id,
                session_id: session.id,
                round_id: Some("r1"),
                related_external_transaction_id: None,
                balance_after: 900,
                response_cache: &debit_cache,
                is_rollback: false,
            })
            .unwrap();

        let rollback_cache = CachedResponse::rollback("rb-1", true, 1_000, "USD", "rolled back");
        store
            .with_tx::<_, StorageError>(|tx| {
                SqliteCasinoStore::mark_rolled_back(tx, "bet-1")?;
                SqliteCasinoStore::insert_transaction(
                    tx,
                    &NewTransaction {
                        external_transaction_id: "rb-1",
                        kind: TransactionKind::Rollback,
                        amount: 100,
                        wallet_id: wallet.id,
                        session_id: session.id,
                        round_id: None,
                        related_external_transaction_id: Some("bet-1"),
                        balance_after: 1_000,
                        response_cache: &rollback_cache,
                        is_rollback: true,
                    },
                )?;
                Ok(())
            })
            .unwrap();

        let original = store.find_transaction("bet-1").unwrap().unwrap();
        assert!(original.is_rollback);

        let reversal = store.find_reversal("bet-1").unwrap().unwrap();
        assert_eq!(reversal.external_transaction_id, "rb-1");
        assert_eq!(reversal.amount, 100);
    }
}
