use std::sync::Arc;

use crate::constants::DEFAULT_ISSUE_ATTEMPTS;
use crate::error::{IssuanceError, LedgerError};
use crate::guard::redact_token;
use crate::ledger::{ClientId, Ledger};

/// A freshly minted bearer token and the credit it starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub client_id: ClientId,
    pub token: String,
    pub balance: i64,
}

/// Mints client identities with a fixed initial grant.
#[derive(Clone)]
pub struct TokenIssuer {
    ledger: Arc<dyn Ledger>,
    initial_grant: i64,
    max_attempts: u32,
}

impl TokenIssuer {
    pub fn new(ledger: Arc<dyn Ledger>, initial_grant: i64) -> Self {
        Self {
            ledger,
            initial_grant,
            max_attempts: DEFAULT_ISSUE_ATTEMPTS,
        }
    }

    /// Total attempts made when a generated token collides (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Issue a new random 128-bit token.
    pub fn issue(&self) -> Result<IssuedToken, IssuanceError> {
        self.issue_with(|| uuid::Uuid::new_v4().to_string())
    }

    fn issue_with<G>(&self, mut generate: G) -> Result<IssuedToken, IssuanceError>
    where
        G: FnMut() -> String,
    {
        for attempt in 1..=self.max_attempts {
            let token = generate();
            match self.ledger.create_client(&token, self.initial_grant) {
                Ok(client_id) => {
                    tracing::info!(
                        client_id = %client_id,
                        token = %redact_token(&token),
                        balance = self.initial_grant,
                        "issued auth token"
                    );
                    return Ok(IssuedToken {
                        client_id,
                        token,
                        balance: self.initial_grant,
                    });
                }
                Err(LedgerError::DuplicateToken) => {
                    tracing::warn!(attempt, "generated token collided, retrying");
                }
                Err(e) => return Err(IssuanceError::Ledger(e)),
            }
        }
        Err(IssuanceError::CollisionsExhausted(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    #[test]
    fn test_issue_grants_initial_balance() {
        let ledger = Arc::new(InMemoryLedger::new());
        let issuer = TokenIssuer::new(ledger.clone(), 100);

        let issued = issuer.issue().unwrap();
        assert_eq!(issued.balance, 100);
        assert_eq!(issued.token.len(), 36);

        let (id, balance) = ledger.lookup_by_token(&issued.token).unwrap();
        assert_eq!(id, issued.client_id);
        assert_eq!(balance, 100);
    }

    #[test]
    fn test_issued_tokens_are_distinct() {
        let issuer = TokenIssuer::new(Arc::new(InMemoryLedger::new()), 1);
        let a = issuer.issue().unwrap();
        let b = issuer.issue().unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_collision_is_retried() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.create_client("taken", 0).unwrap();
        let issuer = TokenIssuer::new(ledger.clone(), 10);

        let mut candidates = vec!["fresh", "taken"];
        let issued = issuer
            .issue_with(|| candidates.pop().unwrap().to_string())
            .unwrap();
        assert_eq!(issued.token, "fresh");
        assert_eq!(ledger.lookup_by_token("fresh").unwrap().1, 10);
    }

    #[test]
    fn test_collisions_exhausted() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.create_client("taken", 0).unwrap();
        let issuer = TokenIssuer::new(ledger, 10).with_max_attempts(2);

        let mut calls = 0;
        let err = issuer
            .issue_with(|| {
                calls += 1;
                "taken".to_string()
            })
            .unwrap_err();
        assert!(matches!(err, IssuanceError::CollisionsExhausted(2)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_store_failure_is_not_retried() {
        // A negative grant is refused by the ledger itself.
        let issuer = TokenIssuer::new(Arc::new(InMemoryLedger::new()), -1);
        let err = issuer.issue().unwrap_err();
        assert!(matches!(
            err,
            IssuanceError::Ledger(LedgerError::InvalidAmount(-1))
        ));
    }
}
