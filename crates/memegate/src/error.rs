use thiserror::Error;

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// Errors returned by ledger backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("auth token already exists")]
    DuplicateToken,

    #[error("client not found")]
    NotFound,

    /// The conditional decrement found no spendable credit.
    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.extended_code == SQLITE_CONSTRAINT_UNIQUE {
                return LedgerError::DuplicateToken;
            }
        }
        LedgerError::Persistence(e.to_string())
    }
}

/// Errors returned by [`crate::TokenIssuer`].
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("token collision persisted after {0} attempts")]
    CollisionsExhausted(u32),

    #[error("failed to persist client: {0}")]
    Ledger(#[from] LedgerError),
}

/// Why the admission guard refused a request.
///
/// Each variant maps to a distinct status class so callers can tell
/// "fix your token" from "top up" from "try again later".
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("missing or invalid auth token")]
    Unauthenticated,

    #[error("insufficient credit")]
    InsufficientCredit,

    #[error("failed to record charge: {0}")]
    ChargeFailed(#[source] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_maps_to_duplicate_token() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(matches!(LedgerError::from(err), LedgerError::DuplicateToken));
    }

    #[test]
    fn test_other_sqlite_errors_map_to_persistence() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(matches!(LedgerError::from(err), LedgerError::Persistence(_)));
    }
}
