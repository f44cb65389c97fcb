pub mod config;
pub mod cors;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use state::AppState;
pub use upstream::{HttpMemeSource, MemeSource, UpstreamError};
