//! Admission control for metered requests.
//!
//! A request moves through `extract -> authenticate -> authorize -> charge ->
//! forward`, and any gate may reject it. Charging precedes forwarding, so a
//! failed charge can never yield a free call.

use std::future::Future;
use std::sync::Arc;

use crate::constants::TOKEN_LOG_PREFIX_LEN;
use crate::error::{LedgerError, Rejection};
use crate::ledger::{ClientId, Ledger};

/// A request that passed every gate and has been charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub client_id: ClientId,
    /// Balance left after this request's charge.
    pub remaining: i64,
}

/// Gate in front of a metered operation.
#[derive(Clone)]
pub struct AdmissionGuard {
    ledger: Arc<dyn Ledger>,
}

impl AdmissionGuard {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Resolve a presented token to a client without charging it.
    ///
    /// Unknown tokens and store failures are both reported as
    /// [`Rejection::Unauthenticated`]; the store failure is logged.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<(ClientId, i64), Rejection> {
        let token = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(Rejection::Unauthenticated)?;

        match self.ledger.lookup_by_token(token) {
            Ok(found) => Ok(found),
            Err(LedgerError::NotFound) => {
                tracing::debug!(token = %redact_token(token), "unknown auth token");
                Err(Rejection::Unauthenticated)
            }
            Err(e) => {
                tracing::error!(error = %e, "token lookup failed");
                Err(Rejection::Unauthenticated)
            }
        }
    }

    /// Run every gate up to and including the charge.
    ///
    /// On success exactly one usage record has been written for the client and
    /// its balance is one lower. On rejection the ledger is unchanged.
    pub fn admit(&self, presented: Option<&str>) -> Result<Admission, Rejection> {
        let (client_id, balance) = self.authenticate(presented)?;

        if balance <= 0 {
            tracing::debug!(client_id = %client_id, balance, "rejected: no credit");
            return Err(Rejection::InsufficientCredit);
        }

        match self.ledger.charge_and_log(client_id) {
            Ok(remaining) => {
                tracing::debug!(client_id = %client_id, remaining, "charged");
                Ok(Admission {
                    client_id,
                    remaining,
                })
            }
            // Another request spent the last credit between the lookup and the charge.
            Err(LedgerError::InsufficientBalance) => {
                tracing::debug!(client_id = %client_id, "rejected: lost race for last credit");
                Err(Rejection::InsufficientCredit)
            }
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "charge failed");
                Err(Rejection::ChargeFailed(e))
            }
        }
    }

    /// Admit the request, then run `op` and hand back its output unchanged.
    ///
    /// `op` is never invoked for a rejected request. Once admitted, the credit
    /// stays spent whatever `op` returns.
    pub async fn forward<F, Fut, T>(&self, presented: Option<&str>, op: F) -> Result<T, Rejection>
    where
        F: FnOnce(Admission) -> Fut,
        Fut: Future<Output = T>,
    {
        let admission = self.admit(presented)?;
        Ok(op(admission).await)
    }
}

/// Leading characters of a token, safe to log.
pub fn redact_token(token: &str) -> &str {
    match token.char_indices().nth(TOKEN_LOG_PREFIX_LEN) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
