//! Credit metering and admission control for the memegate API.
//!
//! Every metered call spends exactly one credit from the caller's balance.
//! The charge and its usage record are written as a single atomic unit, so
//! the audit trail and the balance never disagree.
//!
//! # Components
//!
//! - **Ledger** ([`Ledger`], [`SqliteLedger`], [`InMemoryLedger`]): clients, balances, usage log
//! - **Issuer** ([`TokenIssuer`]): mints bearer tokens with an initial grant
//! - **Guard** ([`AdmissionGuard`]): authenticates, authorizes and charges a request
//!
//! # Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use memegate::{AdmissionGuard, SqliteLedger, TokenIssuer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(SqliteLedger::open("./client_tokens.db")?);
//! let issued = TokenIssuer::new(ledger.clone(), 100).issue()?;
//!
//! let guard = AdmissionGuard::new(ledger);
//! let admission = guard.admit(Some(&issued.token))?;
//! assert_eq!(admission.remaining, 99);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod error;
pub mod guard;
pub mod issuer;
pub mod ledger;

pub use constants::*;
pub use error::{IssuanceError, LedgerError, Rejection};
pub use guard::{redact_token, Admission, AdmissionGuard};
pub use issuer::{IssuedToken, TokenIssuer};
pub use ledger::{
    Client, ClientId, InMemoryLedger, Ledger, SqliteLedger, UsageSummary,
};
