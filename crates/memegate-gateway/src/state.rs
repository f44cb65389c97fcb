use crate::config::GatewayConfig;
use crate::upstream::MemeSource;
use memegate::{AdmissionGuard, Ledger, TokenIssuer};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub ledger: Arc<dyn Ledger>,
    pub issuer: TokenIssuer,
    pub guard: AdmissionGuard,
    /// Collaborators of the metered `/memes` operation
    pub memes: Arc<dyn MemeSource>,
}

impl AppState {
    pub fn new(config: GatewayConfig, ledger: Arc<dyn Ledger>, memes: Arc<dyn MemeSource>) -> Self {
        let issuer = TokenIssuer::new(ledger.clone(), config.initial_grant);
        let guard = AdmissionGuard::new(ledger.clone());

        Self {
            config: Arc::new(config),
            ledger,
            issuer,
            guard,
            memes,
        }
    }
}
