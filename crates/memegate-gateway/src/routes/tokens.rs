use actix_web::{web, HttpRequest, HttpResponse};
use memegate::redact_token;

use crate::error::GatewayError;
use crate::metrics::{CREDITS_ADDED, TOKENS_ISSUED, TOP_UPS_TOTAL};
use crate::middleware::bearer_matches;
use crate::state::AppState;

/// Query parameters for a top-up
#[derive(Debug, serde::Deserialize)]
pub struct TopUpQuery {
    pub auth_token: Option<String>,
    pub tokens: Option<String>,
}

/// GET|POST /generate_token - Issue a new auth token with the initial grant
pub async fn generate_token(state: web::Data<AppState>) -> Result<HttpResponse, GatewayError> {
    let issued = state.issuer.issue()?;
    TOKENS_ISSUED.inc();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "auth_token": issued.token,
        "balance": issued.balance,
    })))
}

/// Parse the `tokens` delta. Only positive integers are accepted.
fn parse_delta(raw: Option<&str>) -> Result<i64, GatewayError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("tokens is required".to_string()))?;
    let delta: i64 = raw
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("tokens must be an integer: {}", raw)))?;
    if delta <= 0 {
        return Err(GatewayError::InvalidRequest(
            "tokens must be positive".to_string(),
        ));
    }
    Ok(delta)
}

/// GET|POST /update_tokens?auth_token=..&tokens=.. - Operator top-up
pub async fn update_tokens(
    req: HttpRequest,
    query: web::Query<TopUpQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    if !bearer_matches(&req, state.config.admin_token.as_deref()) {
        return Err(GatewayError::AdminUnauthorized);
    }

    let token = query
        .auth_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("auth_token is required".to_string()))?;
    let delta = parse_delta(query.tokens.as_deref())?;

    let balance = state.ledger.top_up(token, delta)?;

    TOP_UPS_TOTAL.inc();
    CREDITS_ADDED.inc_by(delta.unsigned_abs());
    tracing::info!(token = %redact_token(token), delta, balance, "balance topped up");

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Tokens updated successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/generate_token")
            .route(web::get().to(generate_token))
            .route(web::post().to(generate_token)),
    )
    .service(
        web::resource("/update_tokens")
            .route(web::get().to(update_tokens))
            .route(web::post().to(update_tokens)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta() {
        assert_eq!(parse_delta(Some("5")).unwrap(), 5);
        assert_eq!(parse_delta(Some(" 12 ")).unwrap(), 12);
        assert!(parse_delta(None).is_err());
        assert!(parse_delta(Some("")).is_err());
        assert!(parse_delta(Some("0")).is_err());
        assert!(parse_delta(Some("-4")).is_err());
        assert!(parse_delta(Some("five")).is_err());
        assert!(parse_delta(Some("1.5")).is_err());
    }
}
