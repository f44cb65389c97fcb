use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::constants::{CREDITS_PER_CALL, SQLITE_BUSY_TIMEOUT_MS};
use crate::error::LedgerError;

/// Stable identifier assigned to a client at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct ClientId(pub i64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client record
#[derive(Debug, Clone, serde::Serialize)]
pub struct Client {
    pub id: ClientId,
    #[serde(skip_serializing)]
    pub auth_token: String,
    pub balance: i64,
    /// Unix seconds
    pub created_at: i64,
}

/// Aggregate of a client's usage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UsageSummary {
    pub calls: u64,
    pub last_call_at: Option<i64>,
}

/// Trait for ledger backends.
///
/// The ledger is the only component allowed to mutate a balance. Implementations
/// must be thread-safe (`Send + Sync`) and must make [`Ledger::charge_and_log`]
/// atomic: a usage record is visible if and only if its decrement is.
pub trait Ledger: Send + Sync {
    /// Persist a new client. Fails with [`LedgerError::DuplicateToken`] if the token is taken.
    fn create_client(&self, token: &str, initial_balance: i64) -> Result<ClientId, LedgerError>;

    /// Resolve a token to its client id and current balance.
    fn lookup_by_token(&self, token: &str) -> Result<(ClientId, i64), LedgerError>;

    /// Spend one credit and append a usage record, as one unit of work.
    ///
    /// The decrement is conditional on the balance still covering the charge, so
    /// two concurrent callers racing on the last credit cannot both succeed; the
    /// loser gets [`LedgerError::InsufficientBalance`] and nothing is written.
    /// Returns the balance remaining after the charge.
    fn charge_and_log(&self, client_id: ClientId) -> Result<i64, LedgerError>;

    /// Add `delta` credits to the client holding `token`. Returns the new balance.
    fn top_up(&self, token: &str, delta: i64) -> Result<i64, LedgerError>;

    /// Fetch the full client record.
    fn client(&self, client_id: ClientId) -> Result<Client, LedgerError>;

    /// Count the client's usage records.
    fn usage_summary(&self, client_id: ClientId) -> Result<UsageSummary, LedgerError>;
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn checked_top_up(balance: i64, delta: i64) -> Result<i64, LedgerError> {
    if delta <= 0 {
        return Err(LedgerError::InvalidAmount(delta));
    }
    balance
        .checked_add(delta)
        .ok_or(LedgerError::InvalidAmount(delta))
}

/// Persistent ledger backed by SQLite. Survives restarts.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) a ledger database at the given path and ensure the schema exists.
    ///
    /// On Unix the database file is restricted to 0600, since it holds bearer tokens.
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                auth_token TEXT UNIQUE NOT NULL,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS usage_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL REFERENCES clients(id),
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_usage_records_client ON usage_records(client_id);
            "#,
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if path != ":memory:" {
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set ledger database file permissions to 0600"
                    );
                }
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ephemeral ledger, mostly for tests.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Persistence("ledger lock poisoned".to_string()))
    }
}

impl Ledger for SqliteLedger {
    fn create_client(&self, token: &str, initial_balance: i64) -> Result<ClientId, LedgerError> {
        if initial_balance < 0 {
            return Err(LedgerError::InvalidAmount(initial_balance));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO clients (auth_token, balance, created_at) VALUES (?1, ?2, ?3)",
            params![token, initial_balance, unix_now()],
        )?;
        Ok(ClientId(conn.last_insert_rowid()))
    }

    fn lookup_by_token(&self, token: &str) -> Result<(ClientId, i64), LedgerError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, balance FROM clients WHERE auth_token = ?1",
            params![token],
            |row| Ok((ClientId(row.get(0)?), row.get(1)?)),
        )
        .optional()?
        .ok_or(LedgerError::NotFound)
    }

    fn charge_and_log(&self, client_id: ClientId) -> Result<i64, LedgerError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so other connections to the same
        // file cannot interleave between the decrement and the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let remaining: Option<i64> = tx
            .query_row(
                r#"
                UPDATE clients SET balance = balance - ?2
                WHERE id = ?1 AND balance >= ?2
                RETURNING balance
                "#,
                params![client_id.0, CREDITS_PER_CALL],
                |row| row.get(0),
            )
            .optional()?;

        let Some(remaining) = remaining else {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM clients WHERE id = ?1",
                    params![client_id.0],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            // Dropping the transaction rolls it back; nothing was written.
            return Err(if exists {
                LedgerError::InsufficientBalance
            } else {
                LedgerError::NotFound
            });
        };

        tx.execute(
            "INSERT INTO usage_records (client_id, timestamp) VALUES (?1, ?2)",
            params![client_id.0, unix_now()],
        )?;
        tx.commit()?;

        Ok(remaining)
    }

    fn top_up(&self, token: &str, delta: i64) -> Result<i64, LedgerError> {
        if delta <= 0 {
            return Err(LedgerError::InvalidAmount(delta));
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (id, balance): (i64, i64) = tx
            .query_row(
                "SELECT id, balance FROM clients WHERE auth_token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(LedgerError::NotFound)?;
        let new_balance = checked_top_up(balance, delta)?;

        tx.execute(
            "UPDATE clients SET balance = ?1 WHERE id = ?2",
            params![new_balance, id],
        )?;
        tx.commit()?;

        Ok(new_balance)
    }

    fn client(&self, client_id: ClientId) -> Result<Client, LedgerError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, auth_token, balance, created_at FROM clients WHERE id = ?1",
            params![client_id.0],
            |row| {
                Ok(Client {
                    id: ClientId(row.get(0)?),
                    auth_token: row.get(1)?,
                    balance: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(LedgerError::NotFound)
    }

    fn usage_summary(&self, client_id: ClientId) -> Result<UsageSummary, LedgerError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM clients WHERE id = ?1",
                params![client_id.0],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(LedgerError::NotFound);
        }

        let (calls, last_call_at): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MAX(timestamp) FROM usage_records WHERE client_id = ?1",
            params![client_id.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(UsageSummary {
            calls: u64::try_from(calls).unwrap_or(0),
            last_call_at,
        })
    }
}

/// One spent credit. Append-only.
struct UsageRecord {
    client_id: ClientId,
    /// Unix seconds
    timestamp: i64,
}

#[derive(Default)]
struct MemoryState {
    next_client_id: i64,
    clients: HashMap<ClientId, Client>,
    by_token: HashMap<String, ClientId>,
    usage: Vec<UsageRecord>,
}

/// In-memory ledger. Fast but lost on restart.
///
/// A single mutex covers every table, which makes each operation trivially atomic.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<MemoryState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Persistence("ledger lock poisoned".to_string()))
    }
}

impl Ledger for InMemoryLedger {
    fn create_client(&self, token: &str, initial_balance: i64) -> Result<ClientId, LedgerError> {
        if initial_balance < 0 {
            return Err(LedgerError::InvalidAmount(initial_balance));
        }
        let mut state = self.state()?;
        if state.by_token.contains_key(token) {
            return Err(LedgerError::DuplicateToken);
        }

        state.next_client_id += 1;
        let id = ClientId(state.next_client_id);
        state.by_token.insert(token.to_string(), id);
        state.clients.insert(
            id,
            Client {
                id,
                auth_token: token.to_string(),
                balance: initial_balance,
                created_at: unix_now(),
            },
        );
        Ok(id)
    }

    fn lookup_by_token(&self, token: &str) -> Result<(ClientId, i64), LedgerError> {
        let state = self.state()?;
        let id = *state.by_token.get(token).ok_or(LedgerError::NotFound)?;
        let client = state.clients.get(&id).ok_or(LedgerError::NotFound)?;
        Ok((id, client.balance))
    }

    fn charge_and_log(&self, client_id: ClientId) -> Result<i64, LedgerError> {
        let mut state = self.state()?;
        let client = state
            .clients
            .get_mut(&client_id)
            .ok_or(LedgerError::NotFound)?;
        if client.balance < CREDITS_PER_CALL {
            return Err(LedgerError::InsufficientBalance);
        }
        client.balance -= CREDITS_PER_CALL;
        let remaining = client.balance;

        state.usage.push(UsageRecord {
            client_id,
            timestamp: unix_now(),
        });
        Ok(remaining)
    }

    fn top_up(&self, token: &str, delta: i64) -> Result<i64, LedgerError> {
        let mut state = self.state()?;
        let id = *state.by_token.get(token).ok_or(LedgerError::NotFound)?;
        let client = state.clients.get_mut(&id).ok_or(LedgerError::NotFound)?;
        client.balance = checked_top_up(client.balance, delta)?;
        Ok(client.balance)
    }

    fn client(&self, client_id: ClientId) -> Result<Client, LedgerError> {
        let state = self.state()?;
        state
            .clients
            .get(&client_id)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn usage_summary(&self, client_id: ClientId) -> Result<UsageSummary, LedgerError> {
        let state = self.state()?;
        if !state.clients.contains_key(&client_id) {
            return Err(LedgerError::NotFound);
        }
        let mut summary = UsageSummary {
            calls: 0,
            last_call_at: None,
        };
        for record in state.usage.iter().filter(|r| r.client_id == client_id) {
            summary.calls += 1;
            summary.last_call_at = summary.last_call_at.max(Some(record.timestamp));
        }
        Ok(summary)
    }
}
