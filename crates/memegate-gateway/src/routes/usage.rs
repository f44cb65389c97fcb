use actix_web::{web, HttpRequest, HttpResponse};

use crate::error::GatewayError;
use crate::middleware::presented_token;
use crate::state::AppState;

/// GET /usage - Balance and call count for the presented token. Not metered.
pub async fn usage(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let (client_id, _) = state.guard.authenticate(presented_token(&req))?;
    let client = state.ledger.client(client_id)?;
    let summary = state.ledger.usage_summary(client_id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "client_id": client.id,
        "balance": client.balance,
        "calls": summary.calls,
        "last_call_at": summary.last_call_at,
        "created_at": client.created_at,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/usage", web::get().to(usage));
}
