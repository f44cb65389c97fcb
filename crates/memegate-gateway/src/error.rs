use actix_web::{HttpResponse, ResponseError};
use memegate::{IssuanceError, LedgerError, Rejection};
use std::fmt;

use crate::upstream::{UpstreamError, GEOCODER};

#[derive(Debug)]
pub enum GatewayError {
    /// Missing, unknown or unreadable auth token
    Unauthenticated,
    /// Balance exhausted
    InsufficientCredit,
    /// The metered charge could not be recorded
    ChargeFailed(LedgerError),
    /// Token issuance failed
    Issuance(IssuanceError),
    /// Top-up target does not exist
    ClientNotFound,
    /// Malformed request parameters
    InvalidRequest(String),
    /// Admin bearer token missing or wrong
    AdminUnauthorized,
    /// Upstream geocoding or media search failed
    Upstream(UpstreamError),
    /// Ledger error outside the charge path
    Ledger(LedgerError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unauthenticated => write!(f, "missing or invalid auth token"),
            GatewayError::InsufficientCredit => write!(f, "insufficient tokens"),
            GatewayError::ChargeFailed(e) => write!(f, "failed to log API call: {}", e),
            GatewayError::Issuance(e) => write!(f, "failed to generate auth token: {}", e),
            GatewayError::ClientNotFound => write!(f, "client not found"),
            GatewayError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            GatewayError::AdminUnauthorized => write!(f, "admin token required"),
            GatewayError::Upstream(e) => write!(f, "upstream error: {}", e),
            GatewayError::Ledger(e) => write!(f, "ledger error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<Rejection> for GatewayError {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Unauthenticated => GatewayError::Unauthenticated,
            Rejection::InsufficientCredit => GatewayError::InsufficientCredit,
            Rejection::ChargeFailed(e) => GatewayError::ChargeFailed(e),
        }
    }
}

impl From<IssuanceError> for GatewayError {
    fn from(e: IssuanceError) -> Self {
        GatewayError::Issuance(e)
    }
}

impl From<LedgerError> for GatewayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound => GatewayError::ClientNotFound,
            LedgerError::InvalidAmount(amount) => {
                GatewayError::InvalidRequest(format!("invalid token amount: {}", amount))
            }
            other => GatewayError::Ledger(other),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(e: UpstreamError) -> Self {
        GatewayError::Upstream(e)
    }
}

fn internal_error(message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "internal_error",
        "message": message
    }))
}

impl ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::Unauthenticated => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "unauthenticated",
                "message": "Missing or invalid auth token"
            })),
            GatewayError::InsufficientCredit => {
                HttpResponse::PaymentRequired().json(serde_json::json!({
                    "error": "insufficient_credit",
                    "message": "Insufficient tokens"
                }))
            }
            GatewayError::ClientNotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "client_not_found",
                "message": "No client holds that auth token"
            })),
            GatewayError::InvalidRequest(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_request",
                    "message": msg
                }))
            }
            GatewayError::AdminUnauthorized => {
                HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /update_tokens"
                }))
            }
            GatewayError::ChargeFailed(e) => {
                tracing::error!("Charge error: {}", e);
                internal_error("Failed to log API call")
            }
            GatewayError::Issuance(e) => {
                tracing::error!("Issuance error: {}", e);
                internal_error("Failed to generate auth token")
            }
            GatewayError::Upstream(e) => {
                tracing::error!("Upstream error: {}", e);
                let message = if e.service() == GEOCODER {
                    "Failed to get location name"
                } else {
                    "Failed to fetch meme"
                };
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "upstream_error",
                    "message": message
                }))
            }
            GatewayError::Ledger(e) => {
                tracing::error!("Ledger error: {}", e);
                internal_error("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_rejections_map_to_distinct_status_classes() {
        let status = |r: Rejection| GatewayError::from(r).error_response().status();
        assert_eq!(status(Rejection::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(Rejection::InsufficientCredit),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status(Rejection::ChargeFailed(LedgerError::Persistence(
                "disk I/O error".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ledger_errors() {
        assert!(matches!(
            GatewayError::from(LedgerError::NotFound),
            GatewayError::ClientNotFound
        ));
        assert!(matches!(
            GatewayError::from(LedgerError::InvalidAmount(-2)),
            GatewayError::InvalidRequest(_)
        ));
        let resp = GatewayError::from(LedgerError::Persistence("locked".into())).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upstream_errors_are_server_errors() {
        let resp = GatewayError::from(UpstreamError::NoLocation).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = GatewayError::from(UpstreamError::NoMedia("cats".into())).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
